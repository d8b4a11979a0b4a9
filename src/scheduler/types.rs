use super::coverage::CoverageReport;
use crate::model::{DriverId, ShiftId};
use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// chevauchement pour le même livreur
    Overlap,
    /// statut et livreur incohérents (ex. `assigned` sans livreur)
    StatusMismatch,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub driver: Option<DriverId>,
    pub shift_a: ShiftId,
    pub shift_b: Option<ShiftId>,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub score: f64,
}

/// Candidat écarté pour un créneau, avec la règle en cause.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentReport {
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<ShiftId>,
    pub rejections: Vec<Rejection>,
}

impl AssignmentReport {
    pub fn driver_for(&self, shift: &ShiftId) -> Option<&DriverId> {
        self.assignments
            .iter()
            .find(|a| &a.shift_id == shift)
            .map(|a| &a.driver_id)
    }
}

/// Résultat d'une génération hebdomadaire.
#[derive(Debug, Clone)]
pub struct WeekPlan {
    pub week_start: NaiveDate,
    pub generated: usize,
    pub report: AssignmentReport,
    pub coverage: CoverageReport,
}

/// Bilan rendu au livreur en fin de créneau.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftSummary {
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub hours: f64,
    pub earnings: f64,
    pub deliveries: u32,
}

impl ShiftSummary {
    pub fn per_delivery(&self) -> Option<f64> {
        (self.deliveries > 0).then(|| self.earnings / f64::from(self.deliveries))
    }

    pub fn hourly_rate(&self) -> Option<f64> {
        (self.hours > 0.0).then(|| self.earnings / self.hours)
    }
}

impl fmt::Display for ShiftSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = (self.hours * 60.0).round() as i64;
        write!(
            f,
            "Shift completed in {}h{:02}: {} deliveries, {:.2} earned",
            minutes / 60,
            minutes % 60,
            self.deliveries,
            self.earnings
        )?;
        match (self.per_delivery(), self.hourly_rate()) {
            (Some(avg), Some(rate)) => write!(f, " ({avg:.2} per delivery, {rate:.2} per hour)"),
            (None, Some(rate)) => write!(f, " ({rate:.2} per hour)"),
            _ => Ok(()),
        }
    }
}
