use crate::clock::{self, hhmm};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: AsRef<str>>(s: S) -> Self {
                Self(s.as_ref().to_owned())
            }
            pub fn random() -> Self {
                Self(Uuid::new_v4().to_string())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifiant fort pour un livreur
    DriverId
);
string_id!(
    /// Identifiant fort pour un créneau
    ShiftId
);
string_id!(TemplateId);
string_id!(SwapId);
string_id!(BreakId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    Regular,
    Peak,
    LateNight,
    Weekend,
    Holiday,
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftType::Regular => "regular",
            ShiftType::Peak => "peak",
            ShiftType::LateNight => "late_night",
            ShiftType::Weekend => "weekend",
            ShiftType::Holiday => "holiday",
        })
    }
}

impl std::str::FromStr for ShiftType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(ShiftType::Regular),
            "peak" => Ok(ShiftType::Peak),
            "late_night" => Ok(ShiftType::LateNight),
            "weekend" => Ok(ShiftType::Weekend),
            "holiday" => Ok(ShiftType::Holiday),
            other => Err(format!("invalid shift type: {other}")),
        }
    }
}

/// Cycle de vie d'un créneau.
///
/// ```text
/// open -> assigned -> confirmed -> in_progress -> completed
/// open|assigned|confirmed -> cancelled
/// assigned|confirmed -> open (libération)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Assigned,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl ShiftStatus {
    pub fn can_become(self, next: ShiftStatus) -> bool {
        use ShiftStatus::*;
        matches!(
            (self, next),
            (Open, Assigned)
                | (Assigned, Confirmed)
                | (Assigned | Confirmed, InProgress)
                | (InProgress, Completed)
                | (Open | Assigned | Confirmed, Cancelled)
                | (Assigned | Confirmed, Open)
        )
    }

    /// Créneau tenu par un livreur et pas encore terminé.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ShiftStatus::Assigned | ShiftStatus::Confirmed | ShiftStatus::InProgress
        )
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftStatus::Open => "open",
            ShiftStatus::Assigned => "assigned",
            ShiftStatus::Confirmed => "confirmed",
            ShiftStatus::InProgress => "in_progress",
            ShiftStatus::Completed => "completed",
            ShiftStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub min_deliveries: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vehicle_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
}

/// Modèle de créneau récurrent (un jour de semaine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: TemplateId,
    pub name: String,
    /// 0 = dimanche … 6 = samedi
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub shift_type: ShiftType,
    pub drivers_needed: u32,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub minimum_deliveries: u32,
    #[serde(default)]
    pub guaranteed_earnings: Option<f64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl ShiftTemplate {
    pub fn new<N: Into<String>>(
        name: N,
        day_of_week: u8,
        start_time: NaiveTime,
        end_time: NaiveTime,
        drivers_needed: u32,
    ) -> Self {
        Self {
            id: TemplateId::random(),
            name: name.into(),
            day_of_week,
            start_time,
            end_time,
            shift_type: ShiftType::Regular,
            drivers_needed,
            zone: None,
            requirements: Requirements::default(),
            minimum_deliveries: 0,
            guaranteed_earnings: None,
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Créneau daté, instance concrète d'un template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub driver_id: Option<DriverId>,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub shift_type: ShiftType,
    pub status: ShiftStatus,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub minimum_deliveries: u32,
    #[serde(default)]
    pub guaranteed_earnings: Option<f64>,
    #[serde(default)]
    pub actual_earnings: Option<f64>,
    #[serde(default)]
    pub delivery_count: Option<u32>,
    #[serde(default)]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_hours: Option<f64>,
    #[serde(default)]
    pub start_location: Option<GeoPoint>,
    #[serde(default)]
    pub end_location: Option<GeoPoint>,
    #[serde(default)]
    pub reminder_sent: bool,
    #[serde(default)]
    pub swapped_from: Option<DriverId>,
}

impl Shift {
    /// Crée un créneau ouvert, non affecté.
    pub fn open(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: ShiftId::random(),
            driver_id: None,
            template_id: None,
            date,
            start_time,
            end_time,
            shift_type: ShiftType::Regular,
            status: ShiftStatus::Open,
            zone: None,
            minimum_deliveries: 0,
            guaranteed_earnings: None,
            actual_earnings: None,
            delivery_count: None,
            actual_start_time: None,
            actual_end_time: None,
            actual_hours: None,
            start_location: None,
            end_location: None,
            reminder_sent: false,
            swapped_from: None,
        }
    }

    pub fn from_template(template: &ShiftTemplate, date: NaiveDate) -> Self {
        Self {
            template_id: Some(template.id.clone()),
            shift_type: template.shift_type,
            zone: template.zone.clone(),
            minimum_deliveries: template.minimum_deliveries,
            guaranteed_earnings: template.guaranteed_earnings,
            ..Self::open(date, template.start_time, template.end_time)
        }
    }

    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        clock::shift_window(self.date, self.start_time, self.end_time)
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.window().0
    }

    pub fn duration_minutes(&self) -> i64 {
        let (start, end) = self.window();
        (end - start).num_minutes()
    }

    pub fn is_held_by(&self, driver: &DriverId) -> bool {
        self.driver_id.as_ref() == Some(driver)
    }

    pub fn label(&self) -> String {
        format!(
            "{} {}-{}",
            self.date,
            clock::format_hhmm(self.start_time),
            clock::format_hhmm(self.end_time)
        )
    }
}

/// Disponibilité récurrente d'un livreur pour un jour de semaine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverAvailability {
    pub driver_id: DriverId,
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_zones: Vec<String>,
    #[serde(default)]
    pub max_hours_per_day: Option<f64>,
    #[serde(default)]
    pub max_shifts_per_week: Option<u32>,
}

impl DriverAvailability {
    pub fn new(driver_id: DriverId, day_of_week: u8, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            driver_id,
            day_of_week,
            start_time: start,
            end_time: end,
            preferred_zones: Vec::new(),
            max_hours_per_day: None,
            max_shifts_per_week: None,
        }
    }

    /// Même jour et fenêtre qui contient entièrement celle du créneau.
    pub fn covers(&self, shift: &Shift) -> bool {
        self.day_of_week == clock::day_of_week(shift.date)
            && clock::window_contains(
                clock::window_minutes(self.start_time, self.end_time),
                clock::window_minutes(shift.start_time, shift.end_time),
            )
    }

    pub fn prefers_zone(&self, zone: Option<&str>) -> bool {
        zone.is_some_and(|z| self.preferred_zones.iter().any(|p| p == z))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Approved => "approved",
            SwapStatus::Rejected => "rejected",
            SwapStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftSwapRequest {
    pub id: SwapId,
    pub requester_id: DriverId,
    pub shift_id: ShiftId,
    pub reason: String,
    pub status: SwapStatus,
    #[serde(default)]
    pub covered_by: Option<DriverId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftBreak {
    pub id: BreakId,
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub start_time: DateTime<Utc>,
    pub planned_duration_minutes: u32,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_duration_minutes: Option<i64>,
}

impl ShiftBreak {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn close(&mut self, end: DateTime<Utc>) {
        self.end_time = Some(end);
        self.actual_duration_minutes = Some((end - self.start_time).num_minutes());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub on_break: bool,
    #[serde(default)]
    pub current_shift_id: Option<ShiftId>,
}

/// Fiche livreur exposée par l'annuaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: DriverId,
    pub name: String,
    /// Notes reçues, la plus récente en dernier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ratings: Vec<f64>,
    #[serde(default)]
    pub completion_rate: Option<f64>,
    #[serde(default)]
    pub completed_deliveries: u32,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub presence: Presence,
}

impl DriverProfile {
    pub fn new<N: Into<String>>(id: DriverId, name: N) -> Self {
        Self {
            id,
            name: name.into(),
            ratings: Vec::new(),
            completion_rate: None,
            completed_deliveries: 0,
            vehicle_type: None,
            certifications: Vec::new(),
            active: true,
            presence: Presence::default(),
        }
    }

    /// Actif, sans créneau en cours ni pause.
    pub fn is_idle(&self) -> bool {
        self.active && self.presence.current_shift_id.is_none() && !self.presence.on_break
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningRecord {
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub amount: f64,
}

/// Agrégat persisté : tout l'état du planning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub templates: Vec<ShiftTemplate>,
    #[serde(default)]
    pub availability: Vec<DriverAvailability>,
    #[serde(default)]
    pub shifts: Vec<Shift>,
    #[serde(default)]
    pub swaps: Vec<ShiftSwapRequest>,
    #[serde(default)]
    pub breaks: Vec<ShiftBreak>,
    #[serde(default)]
    pub drivers: Vec<DriverProfile>,
    #[serde(default)]
    pub deliveries: Vec<DeliveryRecord>,
    #[serde(default)]
    pub earnings: Vec<EarningRecord>,
}

impl Roster {
    pub fn find_driver(&self, id: &DriverId) -> Option<&DriverProfile> {
        self.drivers.iter().find(|d| &d.id == id)
    }
    pub fn find_driver_mut(&mut self, id: &DriverId) -> Option<&mut DriverProfile> {
        self.drivers.iter_mut().find(|d| &d.id == id)
    }
    pub fn find_shift(&self, id: &ShiftId) -> Option<&Shift> {
        self.shifts.iter().find(|s| &s.id == id)
    }
    pub fn find_shift_mut(&mut self, id: &ShiftId) -> Option<&mut Shift> {
        self.shifts.iter_mut().find(|s| &s.id == id)
    }
    pub fn find_swap_mut(&mut self, id: &SwapId) -> Option<&mut ShiftSwapRequest> {
        self.swaps.iter_mut().find(|s| &s.id == id)
    }
    pub fn find_template(&self, id: &TemplateId) -> Option<&ShiftTemplate> {
        self.templates.iter().find(|t| &t.id == id)
    }
    /// Créneaux tenus par le livreur, toutes dates et tous statuts.
    pub fn held_by(&self, driver: &DriverId) -> Vec<Shift> {
        self.shifts
            .iter()
            .filter(|s| s.is_held_by(driver))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_hhmm;

    #[test]
    fn status_transitions_follow_lifecycle() {
        assert!(ShiftStatus::Open.can_become(ShiftStatus::Assigned));
        assert!(ShiftStatus::Confirmed.can_become(ShiftStatus::InProgress));
        assert!(!ShiftStatus::Open.can_become(ShiftStatus::InProgress));
        assert!(!ShiftStatus::InProgress.can_become(ShiftStatus::Cancelled));
        assert!(!ShiftStatus::Completed.can_become(ShiftStatus::Open));
    }

    #[test]
    fn availability_must_contain_shift_window() {
        let friday = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let shift = Shift::open(friday, parse_hhmm("17:00").unwrap(), parse_hhmm("21:00").unwrap());
        let wide = DriverAvailability::new(
            DriverId::new("d1"),
            5,
            parse_hhmm("16:00").unwrap(),
            parse_hhmm("22:00").unwrap(),
        );
        let narrow = DriverAvailability {
            end_time: parse_hhmm("20:00").unwrap(),
            ..wide.clone()
        };
        let other_day = DriverAvailability { day_of_week: 4, ..wide.clone() };
        assert!(wide.covers(&shift));
        assert!(!narrow.covers(&shift));
        assert!(!other_day.covers(&shift));
    }

    #[test]
    fn shift_serializes_times_as_hhmm() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 24).unwrap();
        let shift = Shift::open(date, parse_hhmm("17:00").unwrap(), parse_hhmm("21:00").unwrap());
        let json = serde_json::to_value(&shift).unwrap();
        assert_eq!(json["start_time"], "17:00");
        assert_eq!(json["status"], "open");
        let back: Shift = serde_json::from_value(json).unwrap();
        assert_eq!(back, shift);
    }
}
