//! Port de persistance.
//!
//! Toutes les mutations partagées passent par des mises à jour conditionnelles
//! (`update_shift_if`, `update_swap_if`, `insert_swap`, `open_break`) ou par
//! `transaction`, qui applique plusieurs changements en tout-ou-rien. Deux
//! appels concurrents sur le même créneau ne peuvent donc pas réussir tous
//! les deux : le second voit `Cas::Stale`.

use crate::directory::DriverDirectory;
use crate::error::SchedError;
use crate::model::{
    DeliveryRecord, DriverAvailability, DriverId, DriverProfile, EarningRecord, Presence, Roster,
    Shift, ShiftBreak, ShiftId, ShiftStatus, ShiftSwapRequest, ShiftTemplate, SwapId, SwapStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Mutex, MutexGuard};

/// Résultat d'une mise à jour conditionnelle.
#[derive(Debug, Clone, PartialEq)]
pub enum Cas<T> {
    /// Condition vérifiée, nouvelle valeur.
    Applied(T),
    /// Condition non vérifiée, valeur actuelle inchangée.
    Stale(T),
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverGuard {
    Any,
    Unassigned,
    HeldBy(DriverId),
}

/// Condition sur le statut et le livreur d'un créneau.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftGuard {
    pub statuses: Vec<ShiftStatus>,
    pub driver: DriverGuard,
}

impl ShiftGuard {
    pub fn open_unassigned() -> Self {
        Self {
            statuses: vec![ShiftStatus::Open],
            driver: DriverGuard::Unassigned,
        }
    }

    pub fn held_by(driver: &DriverId, statuses: &[ShiftStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            driver: DriverGuard::HeldBy(driver.clone()),
        }
    }

    pub fn status_in(statuses: &[ShiftStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            driver: DriverGuard::Any,
        }
    }

    pub fn matches(&self, shift: &Shift) -> bool {
        let driver_ok = match &self.driver {
            DriverGuard::Any => true,
            DriverGuard::Unassigned => shift.driver_id.is_none(),
            DriverGuard::HeldBy(d) => shift.is_held_by(d),
        };
        driver_ok && self.statuses.contains(&shift.status)
    }
}

pub type RepoResult<T> = Result<T, SchedError>;

pub trait Repository: Send + Sync {
    fn templates(&self) -> RepoResult<Vec<ShiftTemplate>>;
    fn upsert_template(&self, template: ShiftTemplate) -> RepoResult<()>;

    fn availability(&self) -> RepoResult<Vec<DriverAvailability>>;
    fn availability_for(&self, driver: &DriverId) -> RepoResult<Vec<DriverAvailability>>;
    /// Remplace toutes les lignes de disponibilité du livreur.
    fn replace_availability(
        &self,
        driver: &DriverId,
        rows: Vec<DriverAvailability>,
    ) -> RepoResult<()>;

    fn insert_shifts(&self, shifts: Vec<Shift>) -> RepoResult<()>;
    fn shift(&self, id: &ShiftId) -> RepoResult<Option<Shift>>;
    /// Créneaux dont la date est dans `[from, to]`.
    fn shifts_between(&self, from: NaiveDate, to: NaiveDate) -> RepoResult<Vec<Shift>>;
    fn shifts_for_driver(
        &self,
        driver: &DriverId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Shift>>;
    /// Historique complet d'un livreur (toutes dates).
    fn driver_history(&self, driver: &DriverId) -> RepoResult<Vec<Shift>>;
    /// Applique `apply` seulement si `guard` est vérifié, sous le même verrou.
    fn update_shift_if(
        &self,
        id: &ShiftId,
        guard: &ShiftGuard,
        apply: &mut dyn FnMut(&mut Shift),
    ) -> RepoResult<Cas<Shift>>;

    /// Insère la demande sauf si une demande `pending` existe déjà pour le créneau.
    fn insert_swap(&self, request: ShiftSwapRequest) -> RepoResult<Cas<ShiftSwapRequest>>;
    fn swap_request(&self, id: &SwapId) -> RepoResult<Option<ShiftSwapRequest>>;
    fn swaps_with_status(&self, status: SwapStatus) -> RepoResult<Vec<ShiftSwapRequest>>;
    fn update_swap_if(
        &self,
        id: &SwapId,
        expected: SwapStatus,
        apply: &mut dyn FnMut(&mut ShiftSwapRequest),
    ) -> RepoResult<Cas<ShiftSwapRequest>>;

    /// Exécute `work` sur une copie de travail ; la copie n'est publiée que si `work` réussit.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut Roster) -> Result<(), SchedError>,
    ) -> RepoResult<()>;

    /// Ouvre une pause sauf si une pause est déjà ouverte sur le créneau.
    fn open_break(&self, brk: ShiftBreak) -> RepoResult<Cas<ShiftBreak>>;
    fn close_break(&self, shift: &ShiftId, end: DateTime<Utc>) -> RepoResult<Option<ShiftBreak>>;

    fn record_delivery(&self, record: DeliveryRecord) -> RepoResult<()>;
    fn record_earning(&self, record: EarningRecord) -> RepoResult<()>;
}

/// Implémentation en mémoire, un seul verrou sur tout le `Roster`.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<Roster>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roster(roster: Roster) -> Self {
        Self {
            state: Mutex::new(roster),
        }
    }

    /// Copie cohérente de tout l'état (pour sauvegarde).
    pub fn snapshot(&self) -> RepoResult<Roster> {
        Ok(self.lock()?.clone())
    }

    pub fn upsert_driver(&self, profile: DriverProfile) -> RepoResult<()> {
        let mut roster = self.lock()?;
        match roster.find_driver_mut(&profile.id) {
            Some(existing) => *existing = profile,
            None => roster.drivers.push(profile),
        }
        Ok(())
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Roster>> {
        self.state
            .lock()
            .map_err(|_| SchedError::Other(anyhow::anyhow!("repository lock poisoned")))
    }
}

impl Repository for MemoryRepository {
    fn templates(&self) -> RepoResult<Vec<ShiftTemplate>> {
        Ok(self.lock()?.templates.clone())
    }

    fn upsert_template(&self, template: ShiftTemplate) -> RepoResult<()> {
        let mut roster = self.lock()?;
        match roster.templates.iter_mut().find(|t| t.id == template.id) {
            Some(existing) => *existing = template,
            None => roster.templates.push(template),
        }
        Ok(())
    }

    fn availability(&self) -> RepoResult<Vec<DriverAvailability>> {
        Ok(self.lock()?.availability.clone())
    }

    fn availability_for(&self, driver: &DriverId) -> RepoResult<Vec<DriverAvailability>> {
        Ok(self
            .lock()?
            .availability
            .iter()
            .filter(|a| &a.driver_id == driver)
            .cloned()
            .collect())
    }

    fn replace_availability(
        &self,
        driver: &DriverId,
        rows: Vec<DriverAvailability>,
    ) -> RepoResult<()> {
        let mut roster = self.lock()?;
        roster.availability.retain(|a| &a.driver_id != driver);
        roster.availability.extend(rows);
        Ok(())
    }

    fn insert_shifts(&self, shifts: Vec<Shift>) -> RepoResult<()> {
        self.lock()?.shifts.extend(shifts);
        Ok(())
    }

    fn shift(&self, id: &ShiftId) -> RepoResult<Option<Shift>> {
        Ok(self.lock()?.find_shift(id).cloned())
    }

    fn shifts_between(&self, from: NaiveDate, to: NaiveDate) -> RepoResult<Vec<Shift>> {
        Ok(self
            .lock()?
            .shifts
            .iter()
            .filter(|s| s.date >= from && s.date <= to)
            .cloned()
            .collect())
    }

    fn shifts_for_driver(
        &self,
        driver: &DriverId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoResult<Vec<Shift>> {
        Ok(self
            .lock()?
            .shifts
            .iter()
            .filter(|s| s.is_held_by(driver) && s.date >= from && s.date <= to)
            .cloned()
            .collect())
    }

    fn driver_history(&self, driver: &DriverId) -> RepoResult<Vec<Shift>> {
        Ok(self
            .lock()?
            .shifts
            .iter()
            .filter(|s| s.is_held_by(driver))
            .cloned()
            .collect())
    }

    fn update_shift_if(
        &self,
        id: &ShiftId,
        guard: &ShiftGuard,
        apply: &mut dyn FnMut(&mut Shift),
    ) -> RepoResult<Cas<Shift>> {
        let mut roster = self.lock()?;
        let Some(shift) = roster.find_shift_mut(id) else {
            return Ok(Cas::Missing);
        };
        if !guard.matches(shift) {
            return Ok(Cas::Stale(shift.clone()));
        }
        apply(shift);
        Ok(Cas::Applied(shift.clone()))
    }

    fn insert_swap(&self, request: ShiftSwapRequest) -> RepoResult<Cas<ShiftSwapRequest>> {
        let mut roster = self.lock()?;
        if let Some(pending) = roster
            .swaps
            .iter()
            .find(|s| s.shift_id == request.shift_id && s.status == SwapStatus::Pending)
        {
            return Ok(Cas::Stale(pending.clone()));
        }
        roster.swaps.push(request.clone());
        Ok(Cas::Applied(request))
    }

    fn swap_request(&self, id: &SwapId) -> RepoResult<Option<ShiftSwapRequest>> {
        Ok(self.lock()?.swaps.iter().find(|s| &s.id == id).cloned())
    }

    fn swaps_with_status(&self, status: SwapStatus) -> RepoResult<Vec<ShiftSwapRequest>> {
        Ok(self
            .lock()?
            .swaps
            .iter()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    fn update_swap_if(
        &self,
        id: &SwapId,
        expected: SwapStatus,
        apply: &mut dyn FnMut(&mut ShiftSwapRequest),
    ) -> RepoResult<Cas<ShiftSwapRequest>> {
        let mut roster = self.lock()?;
        let Some(request) = roster.find_swap_mut(id) else {
            return Ok(Cas::Missing);
        };
        if request.status != expected {
            return Ok(Cas::Stale(request.clone()));
        }
        apply(request);
        Ok(Cas::Applied(request.clone()))
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut Roster) -> Result<(), SchedError>,
    ) -> RepoResult<()> {
        let mut roster = self.lock()?;
        let mut draft = roster.clone();
        work(&mut draft)?;
        *roster = draft;
        Ok(())
    }

    fn open_break(&self, brk: ShiftBreak) -> RepoResult<Cas<ShiftBreak>> {
        let mut roster = self.lock()?;
        if let Some(open) = roster
            .breaks
            .iter()
            .find(|b| b.shift_id == brk.shift_id && b.is_open())
        {
            return Ok(Cas::Stale(open.clone()));
        }
        roster.breaks.push(brk.clone());
        Ok(Cas::Applied(brk))
    }

    fn close_break(&self, shift: &ShiftId, end: DateTime<Utc>) -> RepoResult<Option<ShiftBreak>> {
        let mut roster = self.lock()?;
        let Some(brk) = roster
            .breaks
            .iter_mut()
            .find(|b| &b.shift_id == shift && b.is_open())
        else {
            return Ok(None);
        };
        brk.close(end);
        Ok(Some(brk.clone()))
    }

    fn record_delivery(&self, record: DeliveryRecord) -> RepoResult<()> {
        self.lock()?.deliveries.push(record);
        Ok(())
    }

    fn record_earning(&self, record: EarningRecord) -> RepoResult<()> {
        self.lock()?.earnings.push(record);
        Ok(())
    }
}

impl DriverDirectory for MemoryRepository {
    fn profile(&self, id: &DriverId) -> RepoResult<Option<DriverProfile>> {
        Ok(self.lock()?.find_driver(id).cloned())
    }

    fn profiles(&self) -> RepoResult<Vec<DriverProfile>> {
        Ok(self.lock()?.drivers.clone())
    }

    fn set_presence(&self, id: &DriverId, presence: Presence) -> RepoResult<()> {
        let mut roster = self.lock()?;
        let driver = roster
            .find_driver_mut(id)
            .ok_or_else(|| SchedError::not_found("driver", id))?;
        driver.presence = presence;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_hhmm;

    fn open_shift() -> Shift {
        let date = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        Shift::open(date, parse_hhmm("17:00").unwrap(), parse_hhmm("21:00").unwrap())
    }

    #[test]
    fn conditional_update_rejects_second_claim() {
        let repo = MemoryRepository::new();
        let shift = open_shift();
        let id = shift.id.clone();
        repo.insert_shifts(vec![shift]).unwrap();

        let claim = |driver: &str| {
            let driver = DriverId::new(driver);
            repo.update_shift_if(&id, &ShiftGuard::open_unassigned(), &mut |s| {
                s.driver_id = Some(driver.clone());
                s.status = ShiftStatus::Assigned;
            })
            .unwrap()
        };

        assert!(matches!(claim("a"), Cas::Applied(_)));
        match claim("b") {
            Cas::Stale(current) => assert_eq!(current.driver_id, Some(DriverId::new("a"))),
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[test]
    fn failed_transaction_leaves_state_untouched() {
        let repo = MemoryRepository::new();
        let shift = open_shift();
        let id = shift.id.clone();
        repo.insert_shifts(vec![shift]).unwrap();

        let res = repo.transaction(&mut |roster| {
            roster.find_shift_mut(&id).unwrap().status = ShiftStatus::Cancelled;
            Err(SchedError::not_found("swap", "nope"))
        });
        assert!(res.is_err());
        assert_eq!(repo.shift(&id).unwrap().unwrap().status, ShiftStatus::Open);
    }
}
