//! Configuration du planificateur (fichier JSON, tous les champs ont une valeur par défaut).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub lifecycle: LifecycleConfig,
    pub scoring: ScoringConfig,
    pub coverage: CoverageConfig,
    pub swaps: SwapConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Ouverture du pointage avant le début du créneau.
    pub clock_in_lead_minutes: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            clock_in_lead_minutes: 15,
        }
    }
}

/// Pondérations du score d'affectation et valeurs de démarrage à froid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Note retenue quand le livreur n'a encore aucune note.
    pub default_rating: f64,
    /// Taux de complétion retenu quand l'historique est absent.
    pub default_completion_rate: f64,
    /// Nombre de notes récentes moyennées.
    pub recent_ratings: usize,
    pub rating_weight: f64,
    pub zone_weight: f64,
    pub experience_weight: f64,
    pub experience_cap: f64,
    pub completion_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_rating: 4.0,
            default_completion_rate: 0.9,
            recent_ratings: 10,
            rating_weight: 20.0,
            zone_weight: 10.0,
            experience_weight: 2.0,
            experience_cap: 20.0,
            completion_weight: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub shortage_penalty: f64,
    pub overstaff_penalty: f64,
    /// Au-delà de `ratio × requis`, chaque livreur compte comme sureffectif.
    pub overstaff_ratio: f64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            shortage_penalty: 2.0,
            overstaff_penalty: 1.0,
            overstaff_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Expiration d'une demande d'échange avant le début du créneau.
    pub cutoff_hours: i64,
    /// Ne prévenir que les livreurs dont la fenêtre contient celle du créneau.
    pub notify_requires_window: bool,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            cutoff_hours: 2,
            notify_requires_window: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub weekly_generation_secs: u64,
    pub reminders_secs: u64,
    pub coverage_sweep_secs: u64,
    pub swap_expiry_secs: u64,
    pub reminder_lead_minutes: i64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            weekly_generation_secs: 7 * 24 * 3600,
            reminders_secs: 3600,
            coverage_sweep_secs: 30 * 60,
            swap_expiry_secs: 15 * 60,
            reminder_lead_minutes: 120,
        }
    }
}

impl DaemonConfig {
    pub fn period(secs: u64) -> Duration {
        Duration::from_secs(secs.max(1))
    }
}

impl SchedulerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: SchedulerConfig = serde_json::from_slice(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lifecycle.clock_in_lead_minutes < 0 {
            bail!("clock_in_lead_minutes must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.scoring.default_completion_rate) {
            bail!("default_completion_rate must be within 0..=1");
        }
        if self.scoring.recent_ratings == 0 {
            bail!("recent_ratings must be > 0");
        }
        if self.coverage.overstaff_ratio < 1.0 {
            bail!("overstaff_ratio must be >= 1");
        }
        if self.swaps.cutoff_hours < 0 {
            bail!("swap cutoff_hours must be >= 0");
        }
        if self.daemon.reminder_lead_minutes <= 0 {
            bail!("reminder_lead_minutes must be > 0");
        }
        Ok(())
    }
}
