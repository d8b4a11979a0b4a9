#![allow(dead_code)]
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use relais::clock::parse_hhmm;
use relais::model::{
    DeliveryRecord, DriverAvailability, DriverId, DriverProfile, EarningRecord, Roster, Shift,
    ShiftBreak, ShiftId, ShiftStatus, ShiftSwapRequest, ShiftTemplate, SwapId, SwapStatus,
};
use relais::repository::{Cas, RepoResult, ShiftGuard};
use relais::{MemoryRepository, Outbox, Repository, SchedError, Scheduler, SchedulerConfig};
use std::sync::{Arc, Mutex};

pub struct Fixture {
    pub repo: Arc<MemoryRepository>,
    pub outbox: Arc<Outbox>,
    pub scheduler: Scheduler,
}

pub fn fixture() -> Fixture {
    fixture_with(SchedulerConfig::default())
}

pub fn fixture_with(config: SchedulerConfig) -> Fixture {
    let repo = Arc::new(MemoryRepository::new());
    let outbox = Arc::new(Outbox::new());
    let scheduler = Scheduler::in_memory(repo.clone(), outbox.clone()).with_config(config);
    Fixture {
        repo,
        outbox,
        scheduler,
    }
}

type Hook = Box<dyn FnOnce(&MemoryRepository) + Send>;

/// Dépôt en mémoire qui fait passer une écriture concurrente juste avant
/// sa prochaine écriture (`update_shift_if` ou `transaction`).
pub struct Interleaved {
    inner: Arc<MemoryRepository>,
    hook: Mutex<Option<Hook>>,
}

impl Interleaved {
    pub fn new(inner: Arc<MemoryRepository>) -> Self {
        Self {
            inner,
            hook: Mutex::new(None),
        }
    }

    pub fn before_next_write(&self, hook: impl FnOnce(&MemoryRepository) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn fire(&self) {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
    }
}

impl Repository for Interleaved {
    fn templates(&self) -> RepoResult<Vec<ShiftTemplate>> {
        self.inner.templates()
    }
    fn upsert_template(&self, template: ShiftTemplate) -> RepoResult<()> {
        self.inner.upsert_template(template)
    }
    fn availability(&self) -> RepoResult<Vec<DriverAvailability>> {
        self.inner.availability()
    }
    fn availability_for(&self, driver: &DriverId) -> RepoResult<Vec<DriverAvailability>> {
        self.inner.availability_for(driver)
    }
    fn replace_availability(
        &self,
        driver: &DriverId,
        rows: Vec<DriverAvailability>,
    ) -> RepoResult<()> {
        self.inner.replace_availability(driver, rows)
    }
    fn insert_shifts(&self, shifts: Vec<Shift>) -> RepoResult<()> {
        self.inner.insert_shifts(shifts)
    }
    fn shift(&self, id: &ShiftId) -> RepoResult<Option<Shift>> {
        self.inner.shift(id)
    }
    fn shifts_between(&self, from: NaiveDate, to: NaiveDate) -> RepoResult<Vec<Shift>> {
        self.inner.shifts_between(from, to)
    }
    fn shifts_for_driver(
        &self,
        driver: &DriverId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Shift>> {
        self.inner.shifts_for_driver(driver, from, to)
    }
    fn driver_history(&self, driver: &DriverId) -> RepoResult<Vec<Shift>> {
        self.inner.driver_history(driver)
    }
    fn update_shift_if(
        &self,
        id: &ShiftId,
        guard: &ShiftGuard,
        apply: &mut dyn FnMut(&mut Shift),
    ) -> RepoResult<Cas<Shift>> {
        self.fire();
        self.inner.update_shift_if(id, guard, apply)
    }
    fn insert_swap(&self, request: ShiftSwapRequest) -> RepoResult<Cas<ShiftSwapRequest>> {
        self.inner.insert_swap(request)
    }
    fn swap_request(&self, id: &SwapId) -> RepoResult<Option<ShiftSwapRequest>> {
        self.inner.swap_request(id)
    }
    fn swaps_with_status(&self, status: SwapStatus) -> RepoResult<Vec<ShiftSwapRequest>> {
        self.inner.swaps_with_status(status)
    }
    fn update_swap_if(
        &self,
        id: &SwapId,
        expected: SwapStatus,
        apply: &mut dyn FnMut(&mut ShiftSwapRequest),
    ) -> RepoResult<Cas<ShiftSwapRequest>> {
        self.inner.update_swap_if(id, expected, apply)
    }
    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut Roster) -> Result<(), SchedError>,
    ) -> RepoResult<()> {
        self.fire();
        self.inner.transaction(work)
    }
    fn open_break(&self, brk: ShiftBreak) -> RepoResult<Cas<ShiftBreak>> {
        self.inner.open_break(brk)
    }
    fn close_break(&self, shift: &ShiftId, end: DateTime<Utc>) -> RepoResult<Option<ShiftBreak>> {
        self.inner.close_break(shift, end)
    }
    fn record_delivery(&self, record: DeliveryRecord) -> RepoResult<()> {
        self.inner.record_delivery(record)
    }
    fn record_earning(&self, record: EarningRecord) -> RepoResult<()> {
        self.inner.record_earning(record)
    }
}

/// Comme [`fixture`], mais le planificateur écrit à travers un [`Interleaved`].
pub fn interleaved_fixture() -> (Fixture, Arc<Interleaved>) {
    let repo = Arc::new(MemoryRepository::new());
    let outbox = Arc::new(Outbox::new());
    let interleaved = Arc::new(Interleaved::new(repo.clone()));
    let scheduler = Scheduler::new(interleaved.clone(), repo.clone(), outbox.clone());
    (
        Fixture {
            repo,
            outbox,
            scheduler,
        },
        interleaved,
    )
}

/// Lundi 27 octobre 2025.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 27).unwrap()
}

/// Vendredi 31 octobre 2025.
pub fn friday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 31).unwrap()
}

pub fn at(date: NaiveDate, hhmm: &str) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(parse_hhmm(hhmm).unwrap()))
}

/// Livreur actif, disponible le vendredi de `from` à `to`.
pub fn driver(repo: &MemoryRepository, id: &str, ratings: &[f64], from: &str, to: &str) -> DriverId {
    let id = DriverId::new(id);
    let mut profile = DriverProfile::new(id.clone(), id.as_str());
    profile.ratings = ratings.to_vec();
    repo.upsert_driver(profile).unwrap();
    let mut rows = repo.availability_for(&id).unwrap();
    rows.push(DriverAvailability::new(
        id.clone(),
        5,
        parse_hhmm(from).unwrap(),
        parse_hhmm(to).unwrap(),
    ));
    repo.replace_availability(&id, rows).unwrap();
    id
}

pub fn open_shift(repo: &MemoryRepository, date: NaiveDate, start: &str, end: &str) -> ShiftId {
    let shift = Shift::open(date, parse_hhmm(start).unwrap(), parse_hhmm(end).unwrap());
    let id = shift.id.clone();
    repo.insert_shifts(vec![shift]).unwrap();
    id
}

pub fn held_shift(
    repo: &MemoryRepository,
    driver: &DriverId,
    date: NaiveDate,
    start: &str,
    end: &str,
) -> ShiftId {
    let mut shift = Shift::open(date, parse_hhmm(start).unwrap(), parse_hhmm(end).unwrap());
    shift.driver_id = Some(driver.clone());
    shift.status = ShiftStatus::Assigned;
    let id = shift.id.clone();
    repo.insert_shifts(vec![shift]).unwrap();
    id
}

pub fn kinds_sent_to(outbox: &Outbox, driver: &DriverId) -> Vec<String> {
    outbox
        .sent_to(driver)
        .into_iter()
        .filter_map(|n| n.metadata.get("kind").cloned())
        .collect()
}
