use crate::clock;
use crate::model::{DriverId, Shift, ShiftSwapRequest};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Message à remettre à un livreur ; le canal (push, SMS, mail) est choisi en aval.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub driver_id: DriverId,
    pub title: String,
    pub body: String,
    pub metadata: BTreeMap<String, String>,
}

impl Notification {
    pub fn new<T: Into<String>, B: Into<String>>(driver_id: DriverId, title: T, body: B) -> Self {
        Self {
            driver_id,
            title: title.into(),
            body: body.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Envoi best-effort : un échec est journalisé, jamais propagé.
pub fn dispatch(notifier: &dyn Notifier, notification: Notification) {
    if let Err(err) = notifier.notify(&notification) {
        tracing::warn!(
            driver = %notification.driver_id,
            title = %notification.title,
            error = %err,
            "notification delivery failed"
        );
    }
}

/// Notifier qui se contente de journaliser.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        tracing::info!(driver = %n.driver_id, title = %n.title, "{}", n.body);
        Ok(())
    }
}

/// Garde les messages en mémoire (tests, sortie CLI).
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<Notification>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, driver: &DriverId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| &n.driver_id == driver)
            .collect()
    }
}

impl Notifier for Outbox {
    fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox lock poisoned"))?
            .push(n.clone());
        Ok(())
    }
}

fn describe(shift: &Shift) -> String {
    let zone = shift
        .zone
        .as_deref()
        .map(|z| format!(" ({z})"))
        .unwrap_or_default();
    format!(
        "{} {}–{}{}",
        shift.date,
        clock::format_hhmm(shift.start_time),
        clock::format_hhmm(shift.end_time),
        zone
    )
}

/// `clock_in_lead_minutes` : ouverture du pointage avant le début du créneau.
pub fn shift_reminder(
    driver: &DriverId,
    shift: &Shift,
    clock_in_lead_minutes: i64,
) -> Notification {
    Notification::new(
        driver.clone(),
        "Shift starting soon",
        format!(
            "Your {} shift starts at {}. Clock-in opens {} minutes before.",
            describe(shift),
            clock::format_hhmm(shift.start_time),
            clock_in_lead_minutes
        ),
    )
    .with("shift_id", &shift.id)
    .with("kind", "reminder")
}

/// Récapitulatif des créneaux attribués à un livreur pour la semaine.
pub fn weekly_digest(driver: &DriverId, shifts: &[&Shift]) -> Notification {
    let lines: Vec<String> = shifts.iter().map(|s| format!("- {}", describe(s))).collect();
    Notification::new(
        driver.clone(),
        "Your schedule for next week",
        format!(
            "You have been assigned {} shift(s):\n{}",
            shifts.len(),
            lines.join("\n")
        ),
    )
    .with("kind", "weekly_schedule")
    .with("shift_count", shifts.len())
}

pub fn swap_available(driver: &DriverId, shift: &Shift, request: &ShiftSwapRequest) -> Notification {
    Notification::new(
        driver.clone(),
        "Shift swap available",
        format!(
            "A {} shift is up for grabs: {}. Reason: {}",
            shift.shift_type,
            describe(shift),
            request.reason
        ),
    )
    .with("swap_id", &request.id)
    .with("shift_id", &shift.id)
    .with("kind", "swap_available")
}

pub fn swap_accepted(request: &ShiftSwapRequest, shift: &Shift) -> Notification {
    Notification::new(
        request.requester_id.clone(),
        "Swap accepted",
        format!("Your {} shift has been covered.", describe(shift)),
    )
    .with("swap_id", &request.id)
    .with("kind", "swap_accepted")
}

pub fn swap_rejected(request: &ShiftSwapRequest) -> Notification {
    Notification::new(
        request.requester_id.clone(),
        "Swap request rejected",
        "Your swap request was rejected; you are still scheduled.",
    )
    .with("swap_id", &request.id)
    .with("kind", "swap_rejected")
}

pub fn swap_expired(request: &ShiftSwapRequest) -> Notification {
    Notification::new(
        request.requester_id.clone(),
        "Swap request expired",
        "Nobody picked up your shift in time; you are still scheduled.",
    )
    .with("swap_id", &request.id)
    .with("kind", "swap_expired")
}

pub fn coverage_incentive(driver: &DriverId, open_shifts: &[&Shift]) -> Notification {
    let first = open_shifts
        .first()
        .map(|s| describe(s))
        .unwrap_or_default();
    Notification::new(
        driver.clone(),
        "Drivers needed today",
        format!(
            "{} shift(s) still need a driver today, starting with {}. Grab one for a bonus!",
            open_shifts.len(),
            first
        ),
    )
    .with("kind", "coverage_incentive")
    .with("open_shifts", open_shifts.len())
}

pub fn shift_released(driver: &DriverId, shift: &Shift) -> Notification {
    Notification::new(
        driver.clone(),
        "Shift released",
        format!(
            "Your {} shift no longer fits your availability and was released.",
            describe(shift)
        ),
    )
    .with("shift_id", &shift.id)
    .with("kind", "shift_released")
}

pub fn shift_cancelled(driver: &DriverId, shift: &Shift) -> Notification {
    Notification::new(
        driver.clone(),
        "Shift cancelled",
        format!("Your {} shift has been cancelled.", describe(shift)),
    )
    .with("shift_id", &shift.id)
    .with("kind", "shift_cancelled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_hhmm;
    use chrono::NaiveDate;

    struct Broken;

    impl Notifier for Broken {
        fn notify(&self, _: &Notification) -> anyhow::Result<()> {
            anyhow::bail!("gateway down")
        }
    }

    #[test]
    fn dispatch_swallows_failures() {
        let n = Notification::new(DriverId::new("d1"), "t", "b");
        dispatch(&Broken, n);
    }

    #[test]
    fn reminder_copy_mentions_window_and_zone() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let mut shift = Shift::open(date, parse_hhmm("17:00").unwrap(), parse_hhmm("21:00").unwrap());
        shift.zone = Some("centre".into());
        let n = shift_reminder(&DriverId::new("d1"), &shift, 10);
        insta::assert_snapshot!(
            n.body,
            @"Your 2025-10-24 17:00–21:00 (centre) shift starts at 17:00. Clock-in opens 10 minutes before."
        );
        assert_eq!(n.metadata["kind"], "reminder");
    }
}
