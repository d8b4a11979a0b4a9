//! Catalogue : templates de créneaux et disponibilités livreurs.

use crate::error::SchedError;
use crate::model::{DriverAvailability, DriverId, Shift, ShiftStatus, ShiftTemplate};
use crate::repository::{Cas, Repository, ShiftGuard};
use crate::template::validate_template;
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

/// Horizon de réévaluation des créneaux futurs après un changement de disponibilité.
const REEVALUATION_HORIZON_DAYS: i64 = 56;

#[derive(Clone)]
pub struct Catalog {
    repo: Arc<dyn Repository>,
}

impl Catalog {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub fn save_template(&self, template: ShiftTemplate) -> Result<(), SchedError> {
        validate_template(&template)?;
        self.repo.upsert_template(template)
    }

    pub fn active_templates(&self) -> Result<Vec<ShiftTemplate>, SchedError> {
        Ok(self
            .repo
            .templates()?
            .into_iter()
            .filter(|t| t.active)
            .collect())
    }

    /// Remplace les disponibilités d'un livreur puis libère ses créneaux
    /// futurs (à partir de `today`) qui ne sont plus couverts.
    ///
    /// Renvoie les créneaux libérés, repassés à `open` sans livreur.
    pub fn replace_availability(
        &self,
        driver: &DriverId,
        rows: Vec<DriverAvailability>,
        today: NaiveDate,
    ) -> Result<Vec<Shift>, SchedError> {
        for row in &rows {
            if &row.driver_id != driver {
                return Err(SchedError::unauthorized(
                    driver,
                    format!("availability of {}", row.driver_id),
                ));
            }
            if row.day_of_week > 6 {
                return Err(SchedError::InvalidTemplate(format!(
                    "availability day_of_week must be within 0..=6, got {}",
                    row.day_of_week
                )));
            }
        }
        self.repo.replace_availability(driver, rows.clone())?;

        let horizon = today + Duration::days(REEVALUATION_HORIZON_DAYS);
        let upcoming = self.repo.shifts_for_driver(driver, today, horizon)?;
        let held = [ShiftStatus::Assigned, ShiftStatus::Confirmed];

        let mut released = Vec::new();
        for shift in upcoming {
            if !held.contains(&shift.status) || rows.iter().any(|a| a.covers(&shift)) {
                continue;
            }
            let guard = ShiftGuard::held_by(driver, &held);
            if let Cas::Applied(updated) = self.repo.update_shift_if(&shift.id, &guard, &mut |s| {
                s.driver_id = None;
                s.status = ShiftStatus::Open;
                s.reminder_sent = false;
            })? {
                tracing::info!(driver = %driver, shift = %updated.id, "shift released after availability change");
                released.push(updated);
            }
        }
        Ok(released)
    }
}
