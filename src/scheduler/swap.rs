//! Échanges de créneaux entre livreurs.
//!
//! Une demande reste `pending` jusqu'à `start − cutoff`. L'acceptation
//! modifie la demande et le créneau dans une seule transaction du dépôt.

use super::{conflicts, Scheduler};
use crate::clock;
use crate::directory::check_requirements;
use crate::error::{SchedError, Violation};
use crate::model::{
    DriverId, Shift, ShiftId, ShiftStatus, ShiftSwapRequest, SwapId, SwapStatus,
};
use crate::notification;
use crate::repository::Cas;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

const SWAPPABLE: [ShiftStatus; 2] = [ShiftStatus::Assigned, ShiftStatus::Confirmed];

fn load_swap(scheduler: &Scheduler, id: &SwapId) -> Result<ShiftSwapRequest, SchedError> {
    scheduler
        .repo
        .swap_request(id)?
        .ok_or_else(|| SchedError::not_found("swap", id))
}

fn not_pending(request: &ShiftSwapRequest) -> SchedError {
    SchedError::invalid_state("swap", &request.id, "pending", request.status)
}

pub(super) fn request_swap(
    scheduler: &Scheduler,
    driver: &DriverId,
    shift_id: &ShiftId,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<ShiftSwapRequest, SchedError> {
    let shift = scheduler.load_shift(shift_id)?;
    if !shift.is_held_by(driver) {
        return Err(SchedError::unauthorized(driver, format!("shift {shift_id}")));
    }
    if !SWAPPABLE.contains(&shift.status) {
        return Err(SchedError::invalid_state(
            "shift",
            shift_id,
            "assigned or confirmed",
            shift.status,
        ));
    }
    let expires_at = shift.starts_at() - Duration::hours(scheduler.config.swaps.cutoff_hours);
    if expires_at <= now {
        return Err(Violation::SwapWindowClosed {
            closes_at: expires_at,
        }
        .into());
    }

    let request = ShiftSwapRequest {
        id: SwapId::random(),
        requester_id: driver.clone(),
        shift_id: shift_id.clone(),
        reason: reason.to_string(),
        status: SwapStatus::Pending,
        covered_by: None,
        created_at: now,
        expires_at,
        resolved_at: None,
    };
    let request = match scheduler.repo.insert_swap(request)? {
        Cas::Applied(request) => request,
        Cas::Stale(_) | Cas::Missing => {
            return Err(Violation::DuplicatePendingSwap(shift_id.to_string()).into())
        }
    };

    let notified = notify_eligible(scheduler, &shift, &request)?;
    tracing::info!(
        swap = %request.id,
        shift = %shift_id,
        requester = %driver,
        notified,
        "swap requested"
    );
    Ok(request)
}

/// Prévient les livreurs susceptibles de reprendre le créneau.
fn notify_eligible(
    scheduler: &Scheduler,
    shift: &Shift,
    request: &ShiftSwapRequest,
) -> Result<usize, SchedError> {
    let weekday = clock::day_of_week(shift.date);
    let strict = scheduler.config.swaps.notify_requires_window;
    let eligible: BTreeSet<DriverId> = scheduler
        .repo
        .availability()?
        .into_iter()
        .filter(|a| a.driver_id != request.requester_id)
        .filter(|a| {
            if strict {
                a.covers(shift)
            } else {
                a.day_of_week == weekday
            }
        })
        .map(|a| a.driver_id)
        .collect();

    let mut notified = 0;
    for driver in eligible {
        match scheduler.directory.profile(&driver)? {
            Some(profile) if profile.active => {
                scheduler.notify(notification::swap_available(&driver, shift, request));
                notified += 1;
            }
            _ => {}
        }
    }
    Ok(notified)
}

pub(super) fn accept_swap(
    scheduler: &Scheduler,
    swap_id: &SwapId,
    driver: &DriverId,
    now: DateTime<Utc>,
) -> Result<ShiftSwapRequest, SchedError> {
    let profile = scheduler.directory.require(driver)?;
    if !profile.active {
        return Err(Violation::RequirementNotMet(format!("driver {driver} is inactive")).into());
    }
    let cfg = &scheduler.config.scoring;

    let mut accepted: Option<(ShiftSwapRequest, Shift)> = None;
    scheduler.repo.transaction(&mut |roster| {
        let Some(request) = roster.swaps.iter().find(|s| &s.id == swap_id).cloned() else {
            return Err(SchedError::not_found("swap", swap_id));
        };
        if request.status != SwapStatus::Pending {
            return Err(not_pending(&request));
        }
        if request.expires_at < now {
            return Err(SchedError::invalid_state("swap", swap_id, "pending", "expired"));
        }
        if &request.requester_id == driver {
            return Err(Violation::SelfSwap.into());
        }

        let Some(shift) = roster.find_shift(&request.shift_id).cloned() else {
            return Err(SchedError::not_found("shift", &request.shift_id));
        };
        if !shift.is_held_by(&request.requester_id) || !SWAPPABLE.contains(&shift.status) {
            return Err(SchedError::invalid_state(
                "shift",
                &shift.id,
                format!("held by {} and assigned or confirmed", request.requester_id),
                shift.status,
            ));
        }
        if let Some(template) = shift.template_id.as_ref().and_then(|t| roster.find_template(t)) {
            check_requirements(&profile, &template.requirements, cfg)
                .map_err(Violation::RequirementNotMet)?;
        }
        if let Some(other) = conflicts::first_conflict(&shift, &roster.held_by(driver)) {
            return Err(Violation::TimeConflict(other.id.to_string()).into());
        }

        let Some(stored) = roster.find_swap_mut(swap_id) else {
            return Err(SchedError::not_found("swap", swap_id));
        };
        stored.status = SwapStatus::Approved;
        stored.covered_by = Some(driver.clone());
        stored.resolved_at = Some(now);
        let request = stored.clone();

        let Some(target) = roster.find_shift_mut(&request.shift_id) else {
            return Err(SchedError::not_found("shift", &request.shift_id));
        };
        target.swapped_from = target.driver_id.replace(driver.clone());
        target.status = ShiftStatus::Assigned;
        target.reminder_sent = false;
        accepted = Some((request, target.clone()));
        Ok(())
    })?;

    let Some((request, shift)) = accepted else {
        return Err(SchedError::not_found("swap", swap_id));
    };
    scheduler.notify(notification::swap_accepted(&request, &shift));
    tracing::info!(
        swap = %request.id,
        shift = %shift.id,
        from = %request.requester_id,
        to = %driver,
        "swap accepted"
    );
    Ok(request)
}

fn resolve(
    scheduler: &Scheduler,
    swap_id: &SwapId,
    status: SwapStatus,
    now: DateTime<Utc>,
) -> Result<ShiftSwapRequest, SchedError> {
    match scheduler
        .repo
        .update_swap_if(swap_id, SwapStatus::Pending, &mut |r| {
            r.status = status;
            r.resolved_at = Some(now);
        })? {
        Cas::Applied(request) => Ok(request),
        Cas::Stale(current) => Err(not_pending(&current)),
        Cas::Missing => Err(SchedError::not_found("swap", swap_id)),
    }
}

pub(super) fn reject_swap(
    scheduler: &Scheduler,
    swap_id: &SwapId,
    now: DateTime<Utc>,
) -> Result<ShiftSwapRequest, SchedError> {
    let request = resolve(scheduler, swap_id, SwapStatus::Rejected, now)?;
    scheduler.notify(notification::swap_rejected(&request));
    Ok(request)
}

pub(super) fn cancel_swap(
    scheduler: &Scheduler,
    swap_id: &SwapId,
    driver: &DriverId,
    now: DateTime<Utc>,
) -> Result<ShiftSwapRequest, SchedError> {
    let request = load_swap(scheduler, swap_id)?;
    if &request.requester_id != driver {
        return Err(SchedError::unauthorized(driver, format!("swap {swap_id}")));
    }
    resolve(scheduler, swap_id, SwapStatus::Cancelled, now)
}

pub(super) fn expire_swaps(scheduler: &Scheduler, now: DateTime<Utc>) -> Result<usize, SchedError> {
    let mut expired = 0;
    for request in scheduler.repo.swaps_with_status(SwapStatus::Pending)? {
        if request.expires_at >= now {
            continue;
        }
        // une acceptation concurrente a pu passer entre la lecture et ici
        if let Cas::Applied(request) = scheduler.repo.update_swap_if(
            &request.id,
            SwapStatus::Pending,
            &mut |r| {
                r.status = SwapStatus::Cancelled;
                r.resolved_at = Some(now);
            },
        )? {
            scheduler.notify(notification::swap_expired(&request));
            expired += 1;
        }
    }
    if expired > 0 {
        tracing::info!(expired, "pending swaps expired");
    }
    Ok(expired)
}
