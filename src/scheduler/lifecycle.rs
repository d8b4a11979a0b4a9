use super::{conflicts, Scheduler, ShiftSummary};
use crate::clock;
use crate::directory::check_requirements;
use crate::error::{SchedError, Violation};
use crate::model::{
    BreakId, DriverId, GeoPoint, Presence, Roster, Shift, ShiftBreak, ShiftId, ShiftStatus,
    SwapStatus,
};
use crate::notification;
use crate::repository::{Cas, ShiftGuard};
use chrono::{DateTime, Duration, Utc};

const HELD: [ShiftStatus; 2] = [ShiftStatus::Assigned, ShiftStatus::Confirmed];

fn stale_state(shift: &Shift, expected: &str) -> SchedError {
    SchedError::invalid_state("shift", &shift.id, expected, shift.status)
}

fn ensure_claimable(shift: &Shift) -> Result<(), SchedError> {
    match shift.status {
        ShiftStatus::Open if shift.driver_id.is_none() => Ok(()),
        status if status.is_active() => Err(Violation::AlreadyTaken(shift.id.to_string()).into()),
        _ => Err(stale_state(shift, "open")),
    }
}

/// Attribue le créneau ouvert à `driver` dans une transaction déjà ouverte.
///
/// Le contrôle de chevauchement se fait sur le même état que l'écriture.
pub(super) fn claim(
    roster: &mut Roster,
    shift_id: &ShiftId,
    driver: &DriverId,
) -> Result<Shift, SchedError> {
    let Some(current) = roster.find_shift(shift_id).cloned() else {
        return Err(SchedError::not_found("shift", shift_id));
    };
    ensure_claimable(&current)?;
    if let Some(other) = conflicts::first_conflict(&current, &roster.held_by(driver)) {
        return Err(Violation::TimeConflict(other.id.to_string()).into());
    }
    let Some(target) = roster.find_shift_mut(shift_id) else {
        return Err(SchedError::not_found("shift", shift_id));
    };
    target.driver_id = Some(driver.clone());
    target.status = ShiftStatus::Assigned;
    Ok(target.clone())
}

pub(super) fn request_shift(
    scheduler: &Scheduler,
    driver: &DriverId,
    shift_id: &ShiftId,
) -> Result<Shift, SchedError> {
    let shift = scheduler.load_shift(shift_id)?;
    ensure_claimable(&shift)?;

    let profile = scheduler.directory.require(driver)?;
    if !profile.active {
        return Err(Violation::RequirementNotMet(format!("driver {driver} is inactive")).into());
    }
    if let Some(template) = scheduler.template_for(&shift)? {
        check_requirements(&profile, &template.requirements, &scheduler.config.scoring)
            .map_err(Violation::RequirementNotMet)?;
    }

    let mut claimed = None;
    scheduler.repo.transaction(&mut |roster| {
        claimed = Some(claim(roster, shift_id, driver)?);
        Ok(())
    })?;
    let shift = claimed.ok_or_else(|| SchedError::not_found("shift", shift_id))?;
    tracing::info!(driver = %driver, shift = %shift.id, "shift requested");
    Ok(shift)
}

pub(super) fn confirm_shift(
    scheduler: &Scheduler,
    driver: &DriverId,
    shift_id: &ShiftId,
) -> Result<Shift, SchedError> {
    let shift = scheduler.load_shift(shift_id)?;
    if !shift.is_held_by(driver) {
        return Err(SchedError::unauthorized(driver, format!("shift {shift_id}")));
    }
    let guard = ShiftGuard::held_by(driver, &[ShiftStatus::Assigned]);
    match scheduler
        .repo
        .update_shift_if(shift_id, &guard, &mut |s| s.status = ShiftStatus::Confirmed)?
    {
        Cas::Applied(shift) => Ok(shift),
        Cas::Stale(current) => Err(stale_state(&current, "assigned")),
        Cas::Missing => Err(SchedError::not_found("shift", shift_id)),
    }
}

pub(super) fn clock_in(
    scheduler: &Scheduler,
    driver: &DriverId,
    shift_id: &ShiftId,
    location: Option<GeoPoint>,
    now: DateTime<Utc>,
) -> Result<Shift, SchedError> {
    let shift = scheduler.load_shift(shift_id)?;
    if !shift.is_held_by(driver) {
        return Err(SchedError::unauthorized(driver, format!("shift {shift_id}")));
    }
    if !HELD.contains(&shift.status) {
        return Err(stale_state(&shift, "assigned or confirmed"));
    }
    let opens_at =
        shift.starts_at() - Duration::minutes(scheduler.config.lifecycle.clock_in_lead_minutes);
    if now < opens_at {
        return Err(Violation::TooEarly { opens_at }.into());
    }

    let guard = ShiftGuard::held_by(driver, &HELD);
    let updated = match scheduler.repo.update_shift_if(shift_id, &guard, &mut |s| {
        s.status = ShiftStatus::InProgress;
        s.actual_start_time = Some(now);
        s.start_location = location;
    })? {
        Cas::Applied(shift) => shift,
        Cas::Stale(current) => return Err(stale_state(&current, "assigned or confirmed")),
        Cas::Missing => return Err(SchedError::not_found("shift", shift_id)),
    };

    scheduler.directory.set_presence(
        driver,
        Presence {
            is_online: true,
            on_break: false,
            current_shift_id: Some(shift_id.clone()),
        },
    )?;
    tracing::info!(driver = %driver, shift = %shift_id, "clocked in");
    Ok(updated)
}

pub(super) fn clock_out(
    scheduler: &Scheduler,
    driver: &DriverId,
    shift_id: &ShiftId,
    location: Option<GeoPoint>,
    now: DateTime<Utc>,
) -> Result<ShiftSummary, SchedError> {
    let shift = scheduler.load_shift(shift_id)?;
    if !shift.is_held_by(driver) {
        return Err(SchedError::unauthorized(driver, format!("shift {shift_id}")));
    }

    // Gains et livraisons sont lus sous le même verrou que le passage à `completed`.
    let mut summary = None;
    scheduler.repo.transaction(&mut |roster| {
        let Some(current) = roster.find_shift(shift_id).cloned() else {
            return Err(SchedError::not_found("shift", shift_id));
        };
        if !current.is_held_by(driver) || current.status != ShiftStatus::InProgress {
            return Err(stale_state(&current, "in_progress"));
        }
        let started = current.actual_start_time.unwrap_or_else(|| current.starts_at());
        let hours = clock::hours_between(started, now);
        let earnings: f64 = roster
            .earnings
            .iter()
            .filter(|e| &e.shift_id == shift_id)
            .map(|e| e.amount)
            .sum();
        let deliveries = roster
            .deliveries
            .iter()
            .filter(|d| &d.shift_id == shift_id && d.completed)
            .count() as u32;

        if let Some(brk) = roster
            .breaks
            .iter_mut()
            .find(|b| &b.shift_id == shift_id && b.is_open())
        {
            brk.close(now);
        }
        let Some(target) = roster.find_shift_mut(shift_id) else {
            return Err(SchedError::not_found("shift", shift_id));
        };
        target.status = ShiftStatus::Completed;
        target.actual_end_time = Some(now);
        target.actual_hours = Some(hours);
        target.actual_earnings = Some(earnings);
        target.delivery_count = Some(deliveries);
        target.end_location = location;

        summary = Some(ShiftSummary {
            shift_id: shift_id.clone(),
            driver_id: driver.clone(),
            hours,
            earnings,
            deliveries,
        });
        Ok(())
    })?;
    let summary = summary.ok_or_else(|| SchedError::not_found("shift", shift_id))?;

    scheduler.directory.set_presence(driver, Presence::default())?;
    tracing::info!(
        driver = %driver,
        shift = %shift_id,
        hours = summary.hours,
        earnings = summary.earnings,
        deliveries = summary.deliveries,
        "clocked out"
    );
    Ok(summary)
}

/// Annule un créneau pas encore commencé et les demandes d'échange en attente dessus.
pub(super) fn cancel_shift(
    scheduler: &Scheduler,
    shift_id: &ShiftId,
    now: DateTime<Utc>,
) -> Result<Shift, SchedError> {
    let cancellable = [
        ShiftStatus::Open,
        ShiftStatus::Assigned,
        ShiftStatus::Confirmed,
    ];
    let cancelled = match scheduler.repo.update_shift_if(
        shift_id,
        &ShiftGuard::status_in(&cancellable),
        &mut |s| s.status = ShiftStatus::Cancelled,
    )? {
        Cas::Applied(shift) => shift,
        Cas::Stale(current) => return Err(stale_state(&current, "open, assigned or confirmed")),
        Cas::Missing => return Err(SchedError::not_found("shift", shift_id)),
    };

    for request in scheduler.repo.swaps_with_status(SwapStatus::Pending)? {
        if &request.shift_id != shift_id {
            continue;
        }
        scheduler
            .repo
            .update_swap_if(&request.id, SwapStatus::Pending, &mut |r| {
                r.status = SwapStatus::Cancelled;
                r.resolved_at = Some(now);
            })?;
    }

    if let Some(driver) = cancelled.driver_id.as_ref() {
        scheduler.notify(notification::shift_cancelled(driver, &cancelled));
    }
    Ok(cancelled)
}

fn current_shift(scheduler: &Scheduler, driver: &DriverId) -> Result<(Presence, ShiftId), SchedError> {
    let profile = scheduler.directory.require(driver)?;
    let Some(shift_id) = profile.presence.current_shift_id.clone() else {
        return Err(SchedError::invalid_state("driver", driver, "on shift", "off shift"));
    };
    Ok((profile.presence, shift_id))
}

pub(super) fn take_break(
    scheduler: &Scheduler,
    driver: &DriverId,
    planned_minutes: u32,
    now: DateTime<Utc>,
) -> Result<ShiftBreak, SchedError> {
    let (presence, shift_id) = current_shift(scheduler, driver)?;
    let shift = scheduler.load_shift(&shift_id)?;
    if shift.status != ShiftStatus::InProgress {
        return Err(stale_state(&shift, "in_progress"));
    }

    let brk = ShiftBreak {
        id: BreakId::random(),
        shift_id: shift_id.clone(),
        driver_id: driver.clone(),
        start_time: now,
        planned_duration_minutes: planned_minutes,
        end_time: None,
        actual_duration_minutes: None,
    };
    let opened = match scheduler.repo.open_break(brk)? {
        Cas::Applied(brk) => brk,
        Cas::Stale(_) | Cas::Missing => {
            return Err(Violation::BreakAlreadyOpen(shift_id.to_string()).into())
        }
    };

    scheduler.directory.set_presence(
        driver,
        Presence {
            on_break: true,
            ..presence
        },
    )?;
    Ok(opened)
}

pub(super) fn end_break(
    scheduler: &Scheduler,
    driver: &DriverId,
    now: DateTime<Utc>,
) -> Result<ShiftBreak, SchedError> {
    let (presence, shift_id) = current_shift(scheduler, driver)?;
    let closed = scheduler
        .repo
        .close_break(&shift_id, now)?
        .ok_or_else(|| SchedError::not_found("open break", &shift_id))?;
    scheduler.directory.set_presence(
        driver,
        Presence {
            on_break: false,
            ..presence
        },
    )?;
    Ok(closed)
}
