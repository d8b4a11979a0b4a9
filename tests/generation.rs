#![forbid(unsafe_code)]
mod common;

use chrono::NaiveDate;
use common::{driver, fixture, friday, held_shift, interleaved_fixture, kinds_sent_to, monday};
use relais::clock::parse_hhmm;
use relais::model::{ShiftStatus, ShiftTemplate};
use relais::{DemandForecaster, Forecast, Repository, SchedError, StaticForecaster};
use std::collections::BTreeMap;

fn friday_dinner(drivers_needed: u32) -> ShiftTemplate {
    ShiftTemplate::new(
        "friday dinner",
        5,
        parse_hhmm("17:00").unwrap(),
        parse_hhmm("21:00").unwrap(),
        drivers_needed,
    )
}

fn busy_friday() -> Forecast {
    Forecast {
        hourly: BTreeMap::from([(18, 6)]),
        weekday_multiplier: BTreeMap::from([(5, 1.5)]),
    }
}

struct Down;

impl DemandForecaster for Down {
    fn forecast(&self, _: NaiveDate, _: NaiveDate) -> anyhow::Result<Forecast> {
        anyhow::bail!("forecast service timed out")
    }
}

#[test]
fn friday_multiplier_scales_headcount() {
    let f = fixture();
    f.scheduler.save_template(friday_dinner(4)).unwrap();

    let shifts = f.scheduler.generate_week(monday(), &busy_friday()).unwrap();
    assert_eq!(shifts.len(), 6);
    assert!(shifts.iter().all(|s| s.date == friday()));
    assert!(shifts
        .iter()
        .all(|s| s.status == ShiftStatus::Open && s.driver_id.is_none()));
}

#[test]
fn inactive_templates_are_skipped() {
    let f = fixture();
    let mut template = friday_dinner(2);
    template.active = false;
    f.scheduler.save_template(template).unwrap();
    let shifts = f.scheduler.generate_week(monday(), &Forecast::default()).unwrap();
    assert!(shifts.is_empty());
}

#[test]
fn planning_twice_does_not_duplicate_shifts() {
    let f = fixture();
    f.scheduler.save_template(friday_dinner(4)).unwrap();
    let forecaster = StaticForecaster::new(busy_friday());

    let first = f.scheduler.plan_week(monday(), &forecaster).unwrap();
    let second = f.scheduler.plan_week(monday(), &forecaster).unwrap();
    assert_eq!(first.generated, 6);
    assert_eq!(second.generated, 0);
    assert_eq!(f.repo.snapshot().unwrap().shifts.len(), 6);
}

#[test]
fn forecaster_outage_aborts_without_writing() {
    let f = fixture();
    f.scheduler.save_template(friday_dinner(4)).unwrap();

    let err = f.scheduler.plan_week(monday(), &Down).unwrap_err();
    match err {
        SchedError::Upstream { service, message } => {
            assert_eq!(service, "forecaster");
            assert!(message.contains("timed out"), "{message}");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert!(f.repo.snapshot().unwrap().shifts.is_empty());
}

#[test]
fn assigned_drivers_get_one_digest_each() {
    let f = fixture();
    f.scheduler.save_template(friday_dinner(2)).unwrap();
    let a = driver(&f.repo, "a", &[4.5], "16:00", "22:00");
    let b = driver(&f.repo, "b", &[4.2], "16:00", "22:00");

    let plan = f
        .scheduler
        .plan_week(monday(), &StaticForecaster::default())
        .unwrap();
    assert_eq!(plan.report.assignments.len(), 2);
    assert!(plan.report.unassigned.is_empty());

    for d in [&a, &b] {
        let digests: Vec<_> = f
            .outbox
            .sent_to(d)
            .into_iter()
            .filter(|n| n.metadata.get("kind").map(String::as_str) == Some("weekly_schedule"))
            .collect();
        assert_eq!(digests.len(), 1, "driver {d}");
        assert_eq!(digests[0].metadata["shift_count"], "1");
    }
}

#[test]
fn planned_assignment_yields_to_an_overlap_taken_meanwhile() {
    let (f, interleaved) = interleaved_fixture();
    f.scheduler.save_template(friday_dinner(1)).unwrap();
    let d = driver(&f.repo, "d", &[4.5], "16:00", "22:00");

    let taker = d.clone();
    interleaved.before_next_write(move |repo| {
        held_shift(repo, &taker, friday(), "18:00", "22:00");
    });

    let plan = f
        .scheduler
        .plan_week(monday(), &StaticForecaster::default())
        .unwrap();
    assert_eq!(plan.generated, 1);
    assert!(plan.report.assignments.is_empty());
    assert_eq!(plan.report.unassigned.len(), 1);

    let dinner = f.repo.shift(&plan.report.unassigned[0]).unwrap().unwrap();
    assert_eq!(dinner.status, ShiftStatus::Open);
    assert_eq!(dinner.driver_id, None);
    assert!(f.scheduler.detect_conflicts(friday(), friday()).unwrap().is_empty());
    assert!(!kinds_sent_to(&f.outbox, &d).contains(&"weekly_schedule".to_string()));
}
