#![forbid(unsafe_code)]
mod common;

use common::{
    driver, fixture, friday, held_shift, interleaved_fixture, kinds_sent_to, monday, open_shift,
};
use relais::clock::parse_hhmm;
use relais::model::{DriverAvailability, Requirements, Shift, ShiftStatus, ShiftTemplate};
use relais::scheduler::ConflictKind;
use relais::Repository;

#[test]
fn higher_rated_driver_wins_the_shift() {
    let f = fixture();
    let low = driver(&f.repo, "low", &[3.9], "16:00", "22:00");
    let high = driver(&f.repo, "high", &[4.8], "16:00", "22:00");
    let shift = open_shift(&f.repo, friday(), "17:00", "21:00");

    let report = f.scheduler.assign_open_shifts(friday(), friday()).unwrap();
    assert_eq!(report.driver_for(&shift), Some(&high));

    let stored = f.repo.shift(&shift).unwrap().unwrap();
    assert_eq!(stored.driver_id, Some(high.clone()));
    assert_eq!(stored.status, ShiftStatus::Assigned);
    assert!(kinds_sent_to(&f.outbox, &low).is_empty());
    assert_eq!(kinds_sent_to(&f.outbox, &high), vec!["weekly_schedule"]);
}

#[test]
fn availability_must_cover_the_whole_shift() {
    let f = fixture();
    driver(&f.repo, "early", &[5.0], "12:00", "19:00");
    let shift = open_shift(&f.repo, friday(), "17:00", "21:00");

    let report = f.scheduler.assign_open_shifts(friday(), friday()).unwrap();
    assert!(report.assignments.is_empty());
    assert_eq!(report.unassigned, vec![shift]);
}

#[test]
fn unmet_requirements_are_reported_not_fatal() {
    let f = fixture();
    let mut template = ShiftTemplate::new(
        "alcohol run",
        5,
        parse_hhmm("17:00").unwrap(),
        parse_hhmm("21:00").unwrap(),
        1,
    );
    template.requirements = Requirements {
        certifications: vec!["alcohol".into()],
        ..Requirements::default()
    };
    f.scheduler.save_template(template.clone()).unwrap();
    let shift = Shift::from_template(&template, friday());
    let shift_id = shift.id.clone();
    f.repo.insert_shifts(vec![shift]).unwrap();
    let d = driver(&f.repo, "uncertified", &[4.9], "16:00", "22:00");

    let report = f.scheduler.assign_open_shifts(monday(), friday()).unwrap();
    assert_eq!(report.unassigned, vec![shift_id]);
    assert_eq!(report.rejections.len(), 1);
    assert_eq!(report.rejections[0].driver_id, d);
    assert!(report.rejections[0].reason.contains("alcohol"));
}

#[test]
fn overlapping_holds_are_detected() {
    let f = fixture();
    let d = driver(&f.repo, "d", &[], "10:00", "23:00");
    held_shift(&f.repo, &d, friday(), "17:00", "21:00");
    held_shift(&f.repo, &d, friday(), "20:00", "23:00");

    let conflicts = f.scheduler.detect_conflicts(friday(), friday()).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictKind::Overlap);
    assert_eq!(conflicts[0].driver.as_ref(), Some(&d));
}

#[test]
fn narrowing_availability_releases_future_shifts() {
    let f = fixture();
    let d = driver(&f.repo, "d", &[], "16:00", "22:00");
    let shift = held_shift(&f.repo, &d, friday(), "17:00", "21:00");

    let saturday_only = vec![DriverAvailability::new(
        d.clone(),
        6,
        parse_hhmm("10:00").unwrap(),
        parse_hhmm("18:00").unwrap(),
    )];
    let released = f
        .scheduler
        .update_availability(&d, saturday_only, monday())
        .unwrap();
    assert_eq!(released.len(), 1);

    let stored = f.repo.shift(&shift).unwrap().unwrap();
    assert_eq!(stored.status, ShiftStatus::Open);
    assert_eq!(stored.driver_id, None);
    assert_eq!(kinds_sent_to(&f.outbox, &d), vec!["shift_released"]);
}

#[test]
fn assignment_skips_a_driver_who_took_an_overlap_meanwhile() {
    let (f, interleaved) = interleaved_fixture();
    let d = driver(&f.repo, "d", &[4.5], "16:00", "22:00");
    let shift = open_shift(&f.repo, friday(), "17:00", "21:00");

    let taker = d.clone();
    interleaved.before_next_write(move |repo| {
        held_shift(repo, &taker, friday(), "18:00", "22:00");
    });

    let report = f.scheduler.assign_open_shifts(friday(), friday()).unwrap();
    assert!(report.assignments.is_empty());
    assert_eq!(report.unassigned, vec![shift.clone()]);

    let stored = f.repo.shift(&shift).unwrap().unwrap();
    assert_eq!(stored.status, ShiftStatus::Open);
    assert!(f.scheduler.detect_conflicts(friday(), friday()).unwrap().is_empty());
}
