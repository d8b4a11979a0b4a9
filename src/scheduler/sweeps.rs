use super::Scheduler;
use crate::error::SchedError;
use crate::model::{Shift, ShiftStatus};
use crate::notification;
use crate::repository::{Cas, ShiftGuard};
use chrono::{DateTime, Duration, Utc};

/// Rappel unique pour les créneaux tenus qui démarrent dans le délai de rappel.
///
/// Le drapeau `reminder_sent` est posé par mise à jour conditionnelle avant
/// l'envoi : deux balayages simultanés n'envoient qu'un rappel.
pub(super) fn send_reminders(scheduler: &Scheduler, now: DateTime<Utc>) -> Result<usize, SchedError> {
    let horizon = now + Duration::minutes(scheduler.config.daemon.reminder_lead_minutes);
    let held = [ShiftStatus::Assigned, ShiftStatus::Confirmed];
    let due: Vec<Shift> = scheduler
        .repo
        .shifts_between(now.date_naive() - Duration::days(1), horizon.date_naive())?
        .into_iter()
        .filter(|s| held.contains(&s.status) && !s.reminder_sent && s.driver_id.is_some())
        .filter(|s| {
            let start = s.starts_at();
            now < start && start <= horizon
        })
        .collect();

    let mut sent = 0;
    for shift in due {
        let mut flipped = false;
        let outcome = scheduler
            .repo
            .update_shift_if(&shift.id, &ShiftGuard::status_in(&held), &mut |s| {
                if !s.reminder_sent {
                    s.reminder_sent = true;
                    flipped = true;
                }
            })?;
        let Cas::Applied(updated) = outcome else {
            continue;
        };
        if !flipped {
            continue;
        }
        if let Some(driver) = updated.driver_id.as_ref() {
            scheduler.notify(notification::shift_reminder(
                driver,
                &updated,
                scheduler.config.lifecycle.clock_in_lead_minutes,
            ));
            sent += 1;
        }
    }
    tracing::debug!(sent, "reminder sweep done");
    Ok(sent)
}

/// Relance les livreurs libres quand des créneaux du jour restent ouverts.
pub(super) fn coverage_sweep(scheduler: &Scheduler, now: DateTime<Utc>) -> Result<usize, SchedError> {
    let today = now.date_naive();
    let mut open: Vec<Shift> = scheduler
        .repo
        .shifts_between(today, today)?
        .into_iter()
        .filter(|s| s.status == ShiftStatus::Open && s.driver_id.is_none())
        .filter(|s| s.window().1 > now)
        .collect();
    if open.is_empty() {
        return Ok(0);
    }
    open.sort_by_key(|s| s.start_time);
    let refs: Vec<&Shift> = open.iter().collect();

    let idle = scheduler.directory.idle_drivers()?;
    for driver in &idle {
        scheduler.notify(notification::coverage_incentive(&driver.id, &refs));
    }
    tracing::info!(open = open.len(), notified = idle.len(), "coverage sweep");
    Ok(idle.len())
}
