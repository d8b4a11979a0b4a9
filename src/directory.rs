use crate::config::ScoringConfig;
use crate::error::SchedError;
use crate::model::{DriverId, DriverProfile, Presence, Requirements};

/// Annuaire livreurs : notes, historique, véhicule, présence.
pub trait DriverDirectory: Send + Sync {
    fn profile(&self, id: &DriverId) -> Result<Option<DriverProfile>, SchedError>;
    fn profiles(&self) -> Result<Vec<DriverProfile>, SchedError>;
    fn set_presence(&self, id: &DriverId, presence: Presence) -> Result<(), SchedError>;

    fn require(&self, id: &DriverId) -> Result<DriverProfile, SchedError> {
        self.profile(id)?
            .ok_or_else(|| SchedError::not_found("driver", id))
    }

    /// Livreurs actifs sans créneau en cours ni pause.
    fn idle_drivers(&self) -> Result<Vec<DriverProfile>, SchedError> {
        Ok(self
            .profiles()?
            .into_iter()
            .filter(DriverProfile::is_idle)
            .collect())
    }
}

/// Moyenne des notes récentes, ou la note par défaut s'il n'y en a aucune.
pub fn reliability(profile: &DriverProfile, cfg: &ScoringConfig) -> f64 {
    let recent: Vec<f64> = profile
        .ratings
        .iter()
        .rev()
        .take(cfg.recent_ratings)
        .copied()
        .collect();
    if recent.is_empty() {
        return cfg.default_rating;
    }
    recent.iter().sum::<f64>() / recent.len() as f64
}

pub fn completion_rate(profile: &DriverProfile, cfg: &ScoringConfig) -> f64 {
    profile
        .completion_rate
        .unwrap_or(cfg.default_completion_rate)
}

/// Vérifie les exigences d'un template ; renvoie la première règle non respectée.
pub fn check_requirements(
    profile: &DriverProfile,
    requirements: &Requirements,
    cfg: &ScoringConfig,
) -> Result<(), String> {
    if let Some(min) = requirements.min_rating {
        let rating = reliability(profile, cfg);
        if rating < min {
            return Err(format!("rating {rating:.2} below minimum {min:.2}"));
        }
    }
    if let Some(min) = requirements.min_deliveries {
        if profile.completed_deliveries < min {
            return Err(format!(
                "{} completed deliveries, {min} required",
                profile.completed_deliveries
            ));
        }
    }
    if !requirements.vehicle_types.is_empty() {
        let ok = profile
            .vehicle_type
            .as_ref()
            .is_some_and(|v| requirements.vehicle_types.iter().any(|t| t.eq_ignore_ascii_case(v)));
        if !ok {
            return Err(format!(
                "vehicle {} not in [{}]",
                profile.vehicle_type.as_deref().unwrap_or("none"),
                requirements.vehicle_types.join(", ")
            ));
        }
    }
    if let Some(missing) = requirements
        .certifications
        .iter()
        .find(|c| !profile.certifications.contains(c))
    {
        return Err(format!("missing certification {missing}"));
    }
    Ok(())
}
