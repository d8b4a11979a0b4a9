//! Utilitaires calendaires : heures "HH:MM", fenêtres en minutes du jour,
//! jours de semaine (0 = dimanche) et instants UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono::{ParseError, Timelike};
use std::sync::Mutex;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Parse "HH:MM" (ou "HH:MM:SS").
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, ParseError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M").or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

/// Jour de semaine d'une date, 0 = dimanche … 6 = samedi.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Fenêtre `[start, end)` en minutes ; une fin <= début déborde sur le lendemain.
pub fn window_minutes(start: NaiveTime, end: NaiveTime) -> (u32, u32) {
    let start_min = minute_of_day(start);
    let mut end_min = minute_of_day(end);
    if end_min <= start_min {
        end_min += MINUTES_PER_DAY;
    }
    (start_min, end_min)
}

/// Vrai si la fenêtre `outer` contient entièrement `inner` (même journée de référence).
pub fn window_contains(outer: (u32, u32), inner: (u32, u32)) -> bool {
    outer.0 <= inner.0 && outer.1 >= inner.1
}

pub fn instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&NaiveDateTime::new(date, time))
}

/// Bornes absolues d'un créneau daté.
pub fn shift_window(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start_min, end_min) = window_minutes(start, end);
    let start_dt = instant(date, start);
    let end_dt = start_dt + Duration::minutes(i64::from(end_min - start_min));
    (start_dt, end_dt)
}

pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Heures écoulées, à la milliseconde près.
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}

/// Lundi de la semaine contenant `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Lundi strictement après `today`.
pub fn next_week_start(today: NaiveDate) -> NaiveDate {
    week_start_of(today) + Duration::days(7)
}

pub fn week_dates(week_start: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    (0..7).map(move |offset| week_start + Duration::days(offset))
}

/// Source de temps injectable (jobs de fond, tests).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Horloge figée, avançable à la main.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Sérialisation serde d'un `NaiveTime` au format "HH:MM".
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hhmm(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).map_err(D::Error::custom)
    }
}
