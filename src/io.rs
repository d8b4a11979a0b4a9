use crate::clock::{format_hhmm, parse_hhmm};
use crate::model::{DriverAvailability, DriverId, DriverProfile, Requirements, Roster, ShiftTemplate};
use crate::template::validate_template;
use anyhow::{bail, Context};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs;
use std::path::Path;
use std::str::FromStr;

fn field<'a>(rec: &'a StringRecord, idx: usize) -> Option<&'a str> {
    rec.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn required<'a>(rec: &'a StringRecord, idx: usize, name: &str) -> anyhow::Result<&'a str> {
    field(rec, idx).with_context(|| format!("missing {name}"))
}

fn optional<T>(rec: &StringRecord, idx: usize, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    field(rec, idx)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {name} {raw:?}: {e}"))
        })
        .transpose()
}

fn list(rec: &StringRecord, idx: usize) -> Vec<String> {
    field(rec, idx)
        .map(|raw| {
            raw.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_bool(s: &str) -> anyhow::Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "oui" => Ok(true),
        "false" | "0" | "no" | "n" | "non" => Ok(false),
        _ => bail!("expected boolean"),
    }
}

fn day(rec: &StringRecord, idx: usize) -> anyhow::Result<u8> {
    let raw = required(rec, idx, "day_of_week")?;
    let day: u8 = raw
        .parse()
        .with_context(|| format!("invalid day_of_week {raw:?}"))?;
    if day > 6 {
        bail!("day_of_week must be within 0..=6, got {day}");
    }
    Ok(day)
}

fn time(rec: &StringRecord, idx: usize, name: &str) -> anyhow::Result<chrono::NaiveTime> {
    let raw = required(rec, idx, name)?;
    parse_hhmm(raw).with_context(|| format!("invalid {name} {raw:?}, expected HH:MM"))
}

/// Import de templates depuis CSV, header
/// `name,day_of_week,start_time,end_time,shift_type,drivers_needed[,zone][,min_rating][,min_deliveries][,vehicle_types][,certifications][,minimum_deliveries][,guaranteed_earnings]`.
///
/// Les listes sont séparées par `;`.
pub fn import_templates_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<ShiftTemplate>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).flexible(true).from_path(path)?;
    let mut out = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let row = line + 2;
        let name = required(&rec, 0, "name")?;
        let mut template = ShiftTemplate::new(
            name,
            day(&rec, 1).with_context(|| format!("row {row}"))?,
            time(&rec, 2, "start_time")?,
            time(&rec, 3, "end_time")?,
            0,
        );
        if let Some(kind) = optional(&rec, 4, "shift_type")? {
            template.shift_type = kind;
        }
        template.drivers_needed = optional(&rec, 5, "drivers_needed")?.unwrap_or(1);
        template.zone = field(&rec, 6).map(str::to_string);
        template.requirements = Requirements {
            min_rating: optional(&rec, 7, "min_rating")?,
            min_deliveries: optional(&rec, 8, "min_deliveries")?,
            vehicle_types: list(&rec, 9),
            certifications: list(&rec, 10),
        };
        template.minimum_deliveries = optional(&rec, 11, "minimum_deliveries")?.unwrap_or(0);
        template.guaranteed_earnings = optional(&rec, 12, "guaranteed_earnings")?;
        validate_template(&template).with_context(|| format!("row {row} ({name})"))?;
        out.push(template);
    }
    Ok(out)
}

/// Import de disponibilités, header
/// `driver_id,day_of_week,start_time,end_time[,preferred_zones][,max_hours_per_day][,max_shifts_per_week]`.
pub fn import_availability_csv<P: AsRef<Path>>(
    path: P,
) -> anyhow::Result<Vec<DriverAvailability>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).flexible(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let driver = DriverId::new(required(&rec, 0, "driver_id")?);
        let mut row = DriverAvailability::new(
            driver,
            day(&rec, 1)?,
            time(&rec, 2, "start_time")?,
            time(&rec, 3, "end_time")?,
        );
        row.preferred_zones = list(&rec, 4);
        row.max_hours_per_day = optional(&rec, 5, "max_hours_per_day")?;
        row.max_shifts_per_week = optional(&rec, 6, "max_shifts_per_week")?;
        out.push(row);
    }
    Ok(out)
}

/// Import de livreurs, header
/// `id,name[,vehicle_type][,certifications][,ratings][,completion_rate][,completed_deliveries][,active]`.
pub fn import_drivers_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<DriverProfile>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).flexible(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let id = required(&rec, 0, "id")?;
        let name = required(&rec, 1, "name")?;
        let mut profile = DriverProfile::new(DriverId::new(id), name);
        profile.vehicle_type = field(&rec, 2).map(str::to_string);
        profile.certifications = list(&rec, 3);
        profile.ratings = list(&rec, 4)
            .iter()
            .map(|r| {
                r.parse::<f64>()
                    .with_context(|| format!("invalid rating {r:?} for driver {id}"))
            })
            .collect::<anyhow::Result<_>>()?;
        profile.completion_rate = optional(&rec, 5, "completion_rate")?;
        if let Some(rate) = profile.completion_rate {
            if !(0.0..=1.0).contains(&rate) {
                bail!("completion_rate for driver {id} must be within 0..=1");
            }
        }
        profile.completed_deliveries = optional(&rec, 6, "completed_deliveries")?.unwrap_or(0);
        if let Some(flag) = field(&rec, 7) {
            profile.active = parse_bool(flag)
                .with_context(|| format!("invalid active value for driver {id}"))?;
        }
        out.push(profile);
    }
    Ok(out)
}

/// Export JSON du planning (jolie mise en forme), sans enveloppe de version.
pub fn export_roster_json<P: AsRef<Path>>(path: P, roster: &Roster) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(roster)?;
    fs::write(path, s)?;
    Ok(())
}

/// Export CSV des créneaux : header `id,date,start,end,shift_type,status,driver_id,driver_name,zone`.
pub fn export_shifts_csv<P: AsRef<Path>>(path: P, roster: &Roster) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record([
        "id",
        "date",
        "start",
        "end",
        "shift_type",
        "status",
        "driver_id",
        "driver_name",
        "zone",
    ])?;
    let mut shifts: Vec<_> = roster.shifts.iter().collect();
    shifts.sort_by_key(|s| (s.date, s.start_time));
    for s in shifts {
        let driver_id = s.driver_id.as_ref().map(|d| d.as_str()).unwrap_or("");
        let driver_name = s
            .driver_id
            .as_ref()
            .and_then(|d| roster.find_driver(d))
            .map(|p| p.name.as_str())
            .unwrap_or("");
        let date = s.date.to_string();
        let start = format_hhmm(s.start_time);
        let end = format_hhmm(s.end_time);
        let shift_type = s.shift_type.to_string();
        let status = s.status.to_string();
        w.write_record([
            s.id.as_str(),
            date.as_str(),
            start.as_str(),
            end.as_str(),
            shift_type.as_str(),
            status.as_str(),
            driver_id,
            driver_name,
            s.zone.as_deref().unwrap_or(""),
        ])?;
    }
    w.flush()?;
    Ok(())
}
