#![forbid(unsafe_code)]
mod common;

use chrono::NaiveDate;
use common::{at, driver, fixture, fixture_with, friday, held_shift, kinds_sent_to, open_shift};
use relais::clock::parse_hhmm;
use relais::config::DaemonConfig;
use relais::model::{Presence, ShiftTemplate, SwapId, SwapStatus};
use relais::{
    Daemon, DemandForecaster, DriverDirectory, FixedClock, Forecast, Job, JobContext, JobOutcome,
    MemoryRepository, Repository, Scheduler, SchedulerConfig, StaticForecaster,
};
use std::sync::Arc;
use std::time::Duration;

fn context(scheduler: Scheduler, now: chrono::DateTime<chrono::Utc>) -> JobContext {
    JobContext {
        scheduler: Arc::new(scheduler),
        forecaster: Arc::new(StaticForecaster::default()),
        clock: Arc::new(FixedClock::new(now)),
    }
}

#[test]
fn reminders_go_out_once() {
    let f = fixture();
    let d = driver(&f.repo, "d", &[], "16:00", "22:00");
    let shift = held_shift(&f.repo, &d, friday(), "17:00", "21:00");
    held_shift(&f.repo, &d, friday().succ_opt().unwrap(), "17:00", "21:00");
    let daemon = Daemon::new(context(f.scheduler, at(friday(), "15:30")), DaemonConfig::default());

    let first = daemon.run_job(Job::Reminders, at(friday(), "15:30")).unwrap();
    assert!(matches!(first, JobOutcome::Reminded(1)), "{first}");
    let second = daemon.run_job(Job::Reminders, at(friday(), "15:45")).unwrap();
    assert!(matches!(second, JobOutcome::Reminded(0)), "{second}");

    assert_eq!(kinds_sent_to(&f.outbox, &d), vec!["reminder"]);
    assert!(f.repo.shift(&shift).unwrap().unwrap().reminder_sent);
}

#[test]
fn reminder_states_the_configured_clock_in_lead() {
    let mut config = SchedulerConfig::default();
    config.lifecycle.clock_in_lead_minutes = 30;
    let f = fixture_with(config);
    let d = driver(&f.repo, "d", &[], "16:00", "22:00");
    held_shift(&f.repo, &d, friday(), "17:00", "21:00");
    let daemon = Daemon::new(context(f.scheduler, at(friday(), "15:30")), DaemonConfig::default());

    daemon.run_job(Job::Reminders, at(friday(), "15:30")).unwrap();
    let sent = f.outbox.sent_to(&d);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.ends_with("Clock-in opens 30 minutes before."), "{}", sent[0].body);
}

#[test]
fn coverage_sweep_targets_idle_drivers() {
    let f = fixture();
    let idle = driver(&f.repo, "idle", &[], "16:00", "22:00");
    let busy = driver(&f.repo, "busy", &[], "16:00", "22:00");
    let busy_shift = held_shift(&f.repo, &busy, friday(), "12:00", "16:00");
    f.repo
        .set_presence(
            &busy,
            Presence {
                is_online: true,
                on_break: false,
                current_shift_id: Some(busy_shift),
            },
        )
        .unwrap();
    open_shift(&f.repo, friday(), "17:00", "21:00");
    let daemon = Daemon::new(context(f.scheduler, at(friday(), "13:00")), DaemonConfig::default());

    let outcome = daemon.run_job(Job::CoverageSweep, at(friday(), "13:00")).unwrap();
    assert!(matches!(outcome, JobOutcome::Incentivised(1)), "{outcome}");
    assert_eq!(kinds_sent_to(&f.outbox, &idle), vec!["coverage_incentive"]);
    assert!(kinds_sent_to(&f.outbox, &busy).is_empty());
}

#[test]
fn weekly_generation_targets_next_monday_once() {
    let f = fixture();
    f.scheduler
        .save_template(ShiftTemplate::new(
            "friday dinner",
            5,
            parse_hhmm("17:00").unwrap(),
            parse_hhmm("21:00").unwrap(),
            3,
        ))
        .unwrap();
    let wednesday = NaiveDate::from_ymd_opt(2025, 10, 29).unwrap();
    let daemon = Daemon::new(context(f.scheduler, at(wednesday, "03:00")), DaemonConfig::default());

    match daemon.run_job(Job::WeeklyGeneration, at(wednesday, "03:00")).unwrap() {
        JobOutcome::Planned(plan) => {
            assert_eq!(plan.week_start, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap());
            assert_eq!(plan.generated, 3);
        }
        other => panic!("unexpected outcome {other}"),
    }
    match daemon.run_job(Job::WeeklyGeneration, at(wednesday, "04:00")).unwrap() {
        JobOutcome::Planned(plan) => assert_eq!(plan.generated, 0),
        other => panic!("unexpected outcome {other}"),
    }
}

#[test]
fn job_names_parse_back() {
    for job in Job::ALL {
        assert_eq!(job.name().parse::<Job>().unwrap(), job);
    }
    assert!("nightly".parse::<Job>().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn started_daemon_expires_swaps_until_shutdown() {
    let f = fixture();
    let requester = driver(&f.repo, "requester", &[], "16:00", "22:00");
    let shift = held_shift(&f.repo, &requester, friday(), "17:00", "21:00");
    let request = f
        .scheduler
        .request_swap(&requester, &shift, "sick", at(friday(), "09:00"))
        .unwrap();

    let config = DaemonConfig {
        swap_expiry_secs: 1,
        ..DaemonConfig::default()
    };
    let mut daemon = Daemon::new(context(f.scheduler, at(friday(), "16:00")), config);
    daemon.start();
    assert!(daemon.is_running());

    let mut status = SwapStatus::Pending;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        status = f.repo.swap_request(&request.id).unwrap().unwrap().status;
        if status != SwapStatus::Pending {
            break;
        }
    }
    daemon.shutdown();

    assert_eq!(status, SwapStatus::Cancelled);
    assert!(!daemon.is_running());
    assert!(kinds_sent_to(&f.outbox, &requester).contains(&"swap_expired".to_string()));
}

struct Unreachable;

impl DemandForecaster for Unreachable {
    fn forecast(&self, _: NaiveDate, _: NaiveDate) -> anyhow::Result<Forecast> {
        anyhow::bail!("forecast service unreachable")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_generation_does_not_stop_swap_expiry() {
    let f = fixture();
    f.scheduler
        .save_template(ShiftTemplate::new(
            "friday dinner",
            5,
            parse_hhmm("17:00").unwrap(),
            parse_hhmm("21:00").unwrap(),
            1,
        ))
        .unwrap();
    let requester = driver(&f.repo, "requester", &[], "16:00", "22:00");
    let shift = held_shift(&f.repo, &requester, friday(), "17:00", "21:00");
    let request = f
        .scheduler
        .request_swap(&requester, &shift, "sick", at(friday(), "09:00"))
        .unwrap();

    let scheduler = Arc::new(f.scheduler);
    let ctx = JobContext {
        scheduler: scheduler.clone(),
        forecaster: Arc::new(Unreachable),
        clock: Arc::new(FixedClock::new(at(friday(), "16:00"))),
    };
    assert!(ctx.run(Job::WeeklyGeneration, at(friday(), "16:00")).is_err());

    let config = DaemonConfig {
        weekly_generation_secs: 1,
        swap_expiry_secs: 1,
        ..DaemonConfig::default()
    };
    let mut daemon = Daemon::new(ctx, config);
    daemon.start();
    assert!(wait_until_resolved(&f.repo, &request.id).await);

    // la génération a échoué à chaque tick, l'expiration tourne toujours
    let later = held_shift(&f.repo, &requester, friday(), "11:00", "14:00");
    let second = scheduler
        .request_swap(&requester, &later, "still sick", at(friday(), "08:00"))
        .unwrap();
    let resolved = wait_until_resolved(&f.repo, &second.id).await;
    daemon.shutdown();

    assert!(resolved);
    assert_eq!(
        f.repo.swap_request(&second.id).unwrap().unwrap().status,
        SwapStatus::Cancelled
    );
    assert!(f.repo.snapshot().unwrap().shifts.iter().all(|s| s.template_id.is_none()));
}

async fn wait_until_resolved(repo: &MemoryRepository, id: &SwapId) -> bool {
    for _ in 0..80 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if repo.swap_request(id).unwrap().unwrap().status != SwapStatus::Pending {
            return true;
        }
    }
    false
}
