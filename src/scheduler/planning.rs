use super::{
    assignment, conflicts, coverage, lifecycle, AssignmentReport, Candidate, Scheduler, WeekPlan,
};
use crate::error::{SchedError, Violation};
use crate::forecast::{self, DemandForecaster, Forecast};
use crate::model::{DriverId, Shift, ShiftId, ShiftStatus, TemplateId};
use crate::notification;
use crate::template;
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Génère la semaine en ignorant les couples (template, date) déjà présents.
pub(super) fn generate_week(
    scheduler: &Scheduler,
    week_start: NaiveDate,
    forecast: &Forecast,
) -> Result<Vec<Shift>, SchedError> {
    let templates = scheduler.catalog.active_templates()?;
    let week_end = week_start + Duration::days(6);
    let existing: HashSet<(TemplateId, NaiveDate)> = scheduler
        .repo
        .shifts_between(week_start, week_end)?
        .into_iter()
        .filter_map(|s| s.template_id.map(|t| (t, s.date)))
        .collect();

    let mut shifts = template::generate_week(&templates, week_start, forecast)?;
    shifts.retain(|s| {
        s.template_id
            .as_ref()
            .map_or(true, |t| !existing.contains(&(t.clone(), s.date)))
    });
    Ok(shifts)
}

fn candidates(scheduler: &Scheduler) -> Result<Vec<Candidate>, SchedError> {
    let mut availability: HashMap<DriverId, Vec<_>> = HashMap::new();
    for row in scheduler.repo.availability()? {
        availability.entry(row.driver_id.clone()).or_default().push(row);
    }

    let mut out = Vec::new();
    for profile in scheduler.directory.profiles()? {
        if !profile.active {
            continue;
        }
        let Some(rows) = availability.remove(&profile.id) else {
            continue;
        };
        let history = scheduler.repo.driver_history(&profile.id)?;
        let mut candidate = Candidate::new(profile, rows);
        for shift in history {
            match shift.status {
                ShiftStatus::Completed => {
                    *candidate.experience.entry(shift.shift_type).or_default() += 1;
                }
                status if status.is_active() => candidate.held.push(shift),
                _ => {}
            }
        }
        out.push(candidate);
    }
    Ok(out)
}

pub(super) fn assign(
    scheduler: &Scheduler,
    shifts: &mut [Shift],
) -> Result<AssignmentReport, SchedError> {
    let candidates = candidates(scheduler)?;
    let templates: HashMap<_, _> = scheduler
        .repo
        .templates()?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();
    Ok(assignment::assign_greedy(
        shifts,
        &candidates,
        &templates,
        &scheduler.config.scoring,
    ))
}

fn notify_assigned(scheduler: &Scheduler, shifts: &[Shift], report: &AssignmentReport) {
    let mut per_driver: BTreeMap<&DriverId, Vec<&Shift>> = BTreeMap::new();
    for shift in shifts {
        if let Some(driver) = report.driver_for(&shift.id) {
            per_driver.entry(driver).or_default().push(shift);
        }
    }
    for (driver, shifts) in per_driver {
        scheduler.notify(notification::weekly_digest(driver, &shifts));
    }
}

/// Génère, affecte, enregistre et prévient les livreurs pour la semaine donnée.
///
/// Une panne du prévisionniste interrompt la génération : rien n'est écrit.
pub(super) fn plan_week(
    scheduler: &Scheduler,
    week_start: NaiveDate,
    forecaster: &dyn DemandForecaster,
) -> Result<WeekPlan, SchedError> {
    let week_end = week_start + Duration::days(6);
    let forecast = forecast::fetch(forecaster, week_start, week_end)?;

    let mut shifts = generate_week(scheduler, week_start, &forecast)?;
    let mut report = assign(scheduler, &mut shifts)?;

    // Écriture atomique : une génération concurrente de la même semaine ou un
    // livreur qui a pris un créneau chevauchant entre-temps sont vus ici.
    let mut stored: Vec<Shift> = Vec::new();
    let mut released: Vec<ShiftId> = Vec::new();
    scheduler.repo.transaction(&mut |roster| {
        stored.clear();
        released.clear();
        let existing: HashSet<(TemplateId, NaiveDate)> = roster
            .shifts
            .iter()
            .filter_map(|s| s.template_id.clone().map(|t| (t, s.date)))
            .collect();
        for shift in &shifts {
            if let Some(t) = &shift.template_id {
                if existing.contains(&(t.clone(), shift.date)) {
                    continue;
                }
            }
            let mut shift = shift.clone();
            if let Some(driver) = shift.driver_id.clone() {
                if conflicts::first_conflict(&shift, &roster.held_by(&driver)).is_some() {
                    shift.driver_id = None;
                    shift.status = ShiftStatus::Open;
                    released.push(shift.id.clone());
                }
            }
            roster.shifts.push(shift.clone());
            stored.push(shift);
        }
        Ok(())
    })?;

    let kept: HashSet<&ShiftId> = stored.iter().map(|s| &s.id).collect();
    report
        .assignments
        .retain(|a| kept.contains(&a.shift_id) && !released.contains(&a.shift_id));
    report.unassigned.retain(|id| kept.contains(id));
    report.unassigned.extend(released.iter().cloned());
    let generated = stored.len();
    notify_assigned(scheduler, &stored, &report);

    let week = scheduler.repo.shifts_between(week_start, week_end)?;
    let coverage = coverage::analyze(&week, &forecast, week_start, &scheduler.config.coverage);

    tracing::info!(
        %week_start,
        generated,
        assigned = report.assignments.len(),
        unassigned = report.unassigned.len(),
        score = coverage.score,
        "weekly schedule generated"
    );

    Ok(WeekPlan {
        week_start,
        generated,
        report,
        coverage,
    })
}

/// Affecte les créneaux déjà enregistrés encore ouverts entre `from` et `to`.
///
/// Chaque affectation est appliquée dans sa propre transaction : un créneau
/// pris entre-temps reste à son livreur et sort du rapport, un créneau qui
/// chevauche ce que le livreur a pris entre-temps reste ouvert.
pub(super) fn assign_open_shifts(
    scheduler: &Scheduler,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<AssignmentReport, SchedError> {
    let mut open: Vec<Shift> = scheduler
        .repo
        .shifts_between(from, to)?
        .into_iter()
        .filter(|s| s.status == ShiftStatus::Open && s.driver_id.is_none())
        .collect();
    open.sort_by_key(|s| (s.date, s.start_time));

    let proposed = assign(scheduler, &mut open)?;
    let mut report = AssignmentReport {
        rejections: proposed.rejections,
        unassigned: proposed.unassigned,
        assignments: Vec::new(),
    };

    let mut committed = Vec::new();
    for assignment in proposed.assignments {
        let mut claimed = None;
        let outcome = scheduler.repo.transaction(&mut |roster| {
            claimed = Some(lifecycle::claim(
                roster,
                &assignment.shift_id,
                &assignment.driver_id,
            )?);
            Ok(())
        });
        match outcome {
            Ok(()) => {
                if let Some(shift) = claimed {
                    committed.push(shift);
                    report.assignments.push(assignment);
                }
            }
            Err(SchedError::Constraint(Violation::TimeConflict(other))) => {
                tracing::debug!(
                    shift = %assignment.shift_id,
                    driver = %assignment.driver_id,
                    %other,
                    "driver took an overlapping shift meanwhile, left open"
                );
                report.unassigned.push(assignment.shift_id);
            }
            Err(
                SchedError::Constraint(_)
                | SchedError::InvalidState { .. }
                | SchedError::NotFound { .. },
            ) => {
                tracing::debug!(shift = %assignment.shift_id, "shift changed during assignment, skipped");
            }
            Err(err) => return Err(err),
        }
    }

    notify_assigned(scheduler, &committed, &report);
    Ok(report)
}
