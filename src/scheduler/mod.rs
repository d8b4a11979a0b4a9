mod assignment;
mod conflicts;
mod coverage;
mod lifecycle;
mod planning;
mod sweeps;
mod swap;
mod types;

pub use assignment::{assign_greedy, score, Candidate};
pub use coverage::{analyze as analyze_coverage, CoverageReport, HourCoverage};
pub use types::{
    Assignment, AssignmentReport, Conflict, ConflictKind, Rejection, ShiftSummary, WeekPlan,
};

use crate::catalog::Catalog;
use crate::config::SchedulerConfig;
use crate::directory::DriverDirectory;
use crate::error::SchedError;
use crate::forecast::{DemandForecaster, Forecast};
use crate::model::{
    DriverAvailability, DriverId, GeoPoint, Shift, ShiftBreak, ShiftId, ShiftSwapRequest,
    ShiftTemplate, SwapId,
};
use crate::notification::{self, Notification, Notifier};
use crate::repository::{MemoryRepository, Repository};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;

/// Point d'entrée du planificateur : relie le stockage, l'annuaire et les notifications.
///
/// Ne démarre aucune tâche de fond ; voir [`crate::daemon::Daemon`].
pub struct Scheduler {
    repo: Arc<dyn Repository>,
    directory: Arc<dyn DriverDirectory>,
    notifier: Arc<dyn Notifier>,
    catalog: Catalog,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        repo: Arc<dyn Repository>,
        directory: Arc<dyn DriverDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            catalog: Catalog::new(repo.clone()),
            repo,
            directory,
            notifier,
            config: SchedulerConfig::default(),
        }
    }

    /// Stockage et annuaire servis par le même dépôt en mémoire.
    pub fn in_memory(repo: Arc<MemoryRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(repo.clone(), repo, notifier)
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }
    pub fn directory(&self) -> &Arc<dyn DriverDirectory> {
        &self.directory
    }
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn notify(&self, n: Notification) {
        notification::dispatch(self.notifier.as_ref(), n);
    }

    fn load_shift(&self, id: &ShiftId) -> Result<Shift, SchedError> {
        self.repo
            .shift(id)?
            .ok_or_else(|| SchedError::not_found("shift", id))
    }

    fn template_for(&self, shift: &Shift) -> Result<Option<ShiftTemplate>, SchedError> {
        let Some(id) = shift.template_id.as_ref() else {
            return Ok(None);
        };
        Ok(self.repo.templates()?.into_iter().find(|t| &t.id == id))
    }

    // --- catalogue & planification -------------------------------------

    pub fn save_template(&self, template: ShiftTemplate) -> Result<(), SchedError> {
        self.catalog.save_template(template)
    }

    /// Remplace les disponibilités et prévient le livreur des créneaux libérés.
    pub fn update_availability(
        &self,
        driver: &DriverId,
        rows: Vec<DriverAvailability>,
        today: NaiveDate,
    ) -> Result<Vec<Shift>, SchedError> {
        let released = self.catalog.replace_availability(driver, rows, today)?;
        for shift in &released {
            self.notify(notification::shift_released(driver, shift));
        }
        Ok(released)
    }

    pub fn generate_week(
        &self,
        week_start: NaiveDate,
        forecast: &Forecast,
    ) -> Result<Vec<Shift>, SchedError> {
        planning::generate_week(self, week_start, forecast)
    }

    pub fn assign(&self, shifts: &mut [Shift]) -> Result<AssignmentReport, SchedError> {
        planning::assign(self, shifts)
    }

    pub fn plan_week(
        &self,
        week_start: NaiveDate,
        forecaster: &dyn DemandForecaster,
    ) -> Result<WeekPlan, SchedError> {
        planning::plan_week(self, week_start, forecaster)
    }

    pub fn assign_open_shifts(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<AssignmentReport, SchedError> {
        planning::assign_open_shifts(self, from, to)
    }

    pub fn coverage(
        &self,
        week_start: NaiveDate,
        forecast: &Forecast,
    ) -> Result<CoverageReport, SchedError> {
        let shifts = self
            .repo
            .shifts_between(week_start, week_start + Duration::days(6))?;
        Ok(coverage::analyze(
            &shifts,
            forecast,
            week_start,
            &self.config.coverage,
        ))
    }

    /// Créneaux actifs du livreur qui chevauchent `shift`.
    pub fn check_shift_conflicts(
        &self,
        driver: &DriverId,
        shift: &Shift,
    ) -> Result<Vec<ShiftId>, SchedError> {
        let held = self.repo.shifts_for_driver(
            driver,
            shift.date - Duration::days(1),
            shift.date + Duration::days(1),
        )?;
        Ok(conflicts::conflicting_ids(shift, &held))
    }

    pub fn detect_conflicts(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Conflict>, SchedError> {
        let shifts = self.repo.shifts_between(from, to)?;
        Ok(conflicts::detect_conflicts(&shifts))
    }

    // --- cycle de vie ---------------------------------------------------

    pub fn request_shift(&self, driver: &DriverId, shift: &ShiftId) -> Result<Shift, SchedError> {
        lifecycle::request_shift(self, driver, shift)
    }

    pub fn confirm_shift(&self, driver: &DriverId, shift: &ShiftId) -> Result<Shift, SchedError> {
        lifecycle::confirm_shift(self, driver, shift)
    }

    pub fn clock_in(
        &self,
        driver: &DriverId,
        shift: &ShiftId,
        location: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Result<Shift, SchedError> {
        lifecycle::clock_in(self, driver, shift, location, now)
    }

    pub fn clock_out(
        &self,
        driver: &DriverId,
        shift: &ShiftId,
        location: Option<GeoPoint>,
        now: DateTime<Utc>,
    ) -> Result<ShiftSummary, SchedError> {
        lifecycle::clock_out(self, driver, shift, location, now)
    }

    pub fn cancel_shift(&self, shift: &ShiftId, now: DateTime<Utc>) -> Result<Shift, SchedError> {
        lifecycle::cancel_shift(self, shift, now)
    }

    pub fn take_break(
        &self,
        driver: &DriverId,
        planned_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<ShiftBreak, SchedError> {
        lifecycle::take_break(self, driver, planned_minutes, now)
    }

    pub fn end_break(&self, driver: &DriverId, now: DateTime<Utc>) -> Result<ShiftBreak, SchedError> {
        lifecycle::end_break(self, driver, now)
    }

    // --- échanges -------------------------------------------------------

    pub fn request_swap(
        &self,
        driver: &DriverId,
        shift: &ShiftId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ShiftSwapRequest, SchedError> {
        swap::request_swap(self, driver, shift, reason, now)
    }

    pub fn accept_swap(
        &self,
        swap: &SwapId,
        driver: &DriverId,
        now: DateTime<Utc>,
    ) -> Result<ShiftSwapRequest, SchedError> {
        swap::accept_swap(self, swap, driver, now)
    }

    pub fn reject_swap(&self, swap: &SwapId, now: DateTime<Utc>) -> Result<ShiftSwapRequest, SchedError> {
        swap::reject_swap(self, swap, now)
    }

    pub fn cancel_swap(
        &self,
        swap: &SwapId,
        driver: &DriverId,
        now: DateTime<Utc>,
    ) -> Result<ShiftSwapRequest, SchedError> {
        swap::cancel_swap(self, swap, driver, now)
    }

    /// Annule les demandes `pending` expirées ; renvoie leur nombre.
    pub fn expire_swaps(&self, now: DateTime<Utc>) -> Result<usize, SchedError> {
        swap::expire_swaps(self, now)
    }

    // --- balayages ------------------------------------------------------

    pub fn send_reminders(&self, now: DateTime<Utc>) -> Result<usize, SchedError> {
        sweeps::send_reminders(self, now)
    }

    pub fn coverage_sweep(&self, now: DateTime<Utc>) -> Result<usize, SchedError> {
        sweeps::coverage_sweep(self, now)
    }
}
