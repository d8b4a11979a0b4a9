//! Affectation gloutonne des livreurs aux créneaux ouverts.
//!
//! L'algorithme est volontairement simple et ne garantit pas un optimum
//! global (un couplage biparti pondéré ferait mieux) : les créneaux sont
//! traités dans l'ordre de génération et chacun prend le meilleur candidat
//! encore compatible.

use super::{conflicts, Assignment, AssignmentReport, Rejection};
use crate::clock;
use crate::config::ScoringConfig;
use crate::directory::{check_requirements, completion_rate, reliability};
use crate::model::{
    DriverAvailability, DriverId, DriverProfile, Shift, ShiftStatus, ShiftTemplate, ShiftType,
    TemplateId,
};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Livreur candidat, avec ses disponibilités et son historique.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub profile: DriverProfile,
    pub availability: Vec<DriverAvailability>,
    /// Créneaux terminés par type.
    pub experience: HashMap<ShiftType, u32>,
    /// Créneaux déjà tenus (hors passe courante).
    pub held: Vec<Shift>,
}

impl Candidate {
    pub fn new(profile: DriverProfile, availability: Vec<DriverAvailability>) -> Self {
        Self {
            profile,
            availability,
            experience: HashMap::new(),
            held: Vec::new(),
        }
    }
}

/// `rating×20 + zone×10 + min(20, 2×expérience) + complétion×30` avec les poids de `cfg`.
pub fn score(
    candidate: &Candidate,
    availability: &DriverAvailability,
    shift: &Shift,
    cfg: &ScoringConfig,
) -> f64 {
    let rating = reliability(&candidate.profile, cfg);
    let zone = if availability.prefers_zone(shift.zone.as_deref()) {
        1.0
    } else {
        0.0
    };
    let experience = f64::from(
        candidate
            .experience
            .get(&shift.shift_type)
            .copied()
            .unwrap_or(0),
    );
    cfg.rating_weight * rating
        + cfg.zone_weight * zone
        + (cfg.experience_weight * experience).min(cfg.experience_cap)
        + cfg.completion_weight * completion_rate(&candidate.profile, cfg)
}

fn limit_violation(shift: &Shift, availability: &DriverAvailability, booked: &[Shift]) -> Option<String> {
    if let Some(max) = availability.max_shifts_per_week {
        let week = clock::week_start_of(shift.date);
        let count = booked
            .iter()
            .filter(|s| s.status.is_active() && clock::week_start_of(s.date) == week)
            .count();
        if count as u32 >= max {
            return Some(format!("already {count} shift(s) this week, max {max}"));
        }
    }
    if let Some(max) = availability.max_hours_per_day {
        let minutes: i64 = booked
            .iter()
            .filter(|s| s.status.is_active() && s.date == shift.date)
            .map(Shift::duration_minutes)
            .sum::<i64>()
            + shift.duration_minutes();
        let hours = minutes as f64 / 60.0;
        if hours > max {
            return Some(format!("{hours:.1}h on {}, max {max}h per day", shift.date));
        }
    }
    None
}

/// Affecte les créneaux `open` non affectés de `shifts`, sur place.
pub fn assign_greedy(
    shifts: &mut [Shift],
    candidates: &[Candidate],
    templates: &HashMap<TemplateId, ShiftTemplate>,
    cfg: &ScoringConfig,
) -> AssignmentReport {
    let mut report = AssignmentReport::default();

    let mut ranked: Vec<(&Candidate, f64)> = candidates
        .iter()
        .filter(|c| c.profile.active)
        .map(|c| (c, reliability(&c.profile, cfg)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut booked: HashMap<DriverId, Vec<Shift>> = ranked
        .iter()
        .map(|(c, _)| (c.profile.id.clone(), c.held.clone()))
        .collect();

    for shift in shifts.iter_mut() {
        if shift.status != ShiftStatus::Open || shift.driver_id.is_some() {
            continue;
        }
        let template = shift.template_id.as_ref().and_then(|id| templates.get(id));

        let mut best: Option<(&Candidate, f64)> = None;
        for (candidate, _) in &ranked {
            let driver = &candidate.profile.id;
            let Some(availability) = candidate.availability.iter().find(|a| a.covers(shift)) else {
                continue;
            };

            let mut reject = |reason: String| {
                report.rejections.push(Rejection {
                    shift_id: shift.id.clone(),
                    driver_id: driver.clone(),
                    reason,
                });
            };

            if let Some(template) = template {
                if let Err(reason) = check_requirements(&candidate.profile, &template.requirements, cfg) {
                    reject(reason);
                    continue;
                }
            }
            let already = booked.get(driver).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(other) = conflicts::first_conflict(shift, already) {
                reject(format!("overlaps {}", other.label()));
                continue;
            }
            if let Some(reason) = limit_violation(shift, availability, already) {
                reject(reason);
                continue;
            }

            let value = score(candidate, availability, shift, cfg);
            if best.map_or(true, |(_, top)| value > top) {
                best = Some((*candidate, value));
            }
        }

        match best {
            Some((candidate, value)) => {
                let driver = candidate.profile.id.clone();
                shift.driver_id = Some(driver.clone());
                shift.status = ShiftStatus::Assigned;
                booked.entry(driver.clone()).or_default().push(shift.clone());
                report.assignments.push(Assignment {
                    shift_id: shift.id.clone(),
                    driver_id: driver,
                    score: value,
                });
            }
            None => report.unassigned.push(shift.id.clone()),
        }
    }

    report
}
