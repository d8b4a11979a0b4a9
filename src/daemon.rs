//! Tâches de fond du planificateur.
//!
//! Chaque job tourne sur sa propre tâche tokio, cadencée par un
//! `tokio::time::interval`. Le corps du job est synchrone (verrous du dépôt)
//! et s'exécute sur le pool bloquant. Un tick en échec est journalisé, le
//! suivant part normalement.

use crate::clock::{self, Clock};
use crate::config::DaemonConfig;
use crate::error::SchedError;
use crate::forecast::DemandForecaster;
use crate::scheduler::{Scheduler, WeekPlan};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    WeeklyGeneration,
    Reminders,
    CoverageSweep,
    SwapExpiry,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::WeeklyGeneration,
        Job::Reminders,
        Job::CoverageSweep,
        Job::SwapExpiry,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Job::WeeklyGeneration => "weekly-generation",
            Job::Reminders => "reminders",
            Job::CoverageSweep => "coverage-sweep",
            Job::SwapExpiry => "swap-expiry",
        }
    }

    pub fn period(self, cfg: &DaemonConfig) -> Duration {
        DaemonConfig::period(match self {
            Job::WeeklyGeneration => cfg.weekly_generation_secs,
            Job::Reminders => cfg.reminders_secs,
            Job::CoverageSweep => cfg.coverage_sweep_secs,
            Job::SwapExpiry => cfg.swap_expiry_secs,
        })
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Job {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Job::ALL
            .into_iter()
            .find(|job| job.name() == s.trim())
            .ok_or_else(|| format!("unknown job: {s}"))
    }
}

/// Résultat d'une exécution de job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Planned(WeekPlan),
    Reminded(usize),
    Incentivised(usize),
    Expired(usize),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Planned(plan) => write!(
                f,
                "week of {}: {} shift(s) generated, {} assigned, {} unassigned, coverage {:.0}",
                plan.week_start,
                plan.generated,
                plan.report.assignments.len(),
                plan.report.unassigned.len(),
                plan.coverage.score
            ),
            JobOutcome::Reminded(n) => write!(f, "{n} reminder(s) sent"),
            JobOutcome::Incentivised(n) => write!(f, "{n} idle driver(s) notified"),
            JobOutcome::Expired(n) => write!(f, "{n} swap request(s) expired"),
        }
    }
}

/// Ce dont un job a besoin pour tourner.
#[derive(Clone)]
pub struct JobContext {
    pub scheduler: Arc<Scheduler>,
    pub forecaster: Arc<dyn DemandForecaster>,
    pub clock: Arc<dyn Clock>,
}

impl JobContext {
    pub fn run(&self, job: Job, now: DateTime<Utc>) -> Result<JobOutcome, SchedError> {
        let s = &self.scheduler;
        Ok(match job {
            Job::WeeklyGeneration => {
                let week_start = clock::next_week_start(now.date_naive());
                JobOutcome::Planned(s.plan_week(week_start, self.forecaster.as_ref())?)
            }
            Job::Reminders => JobOutcome::Reminded(s.send_reminders(now)?),
            Job::CoverageSweep => JobOutcome::Incentivised(s.coverage_sweep(now)?),
            Job::SwapExpiry => JobOutcome::Expired(s.expire_swaps(now)?),
        })
    }
}

/// Propriétaire des minuteries : rien ne tourne avant `start`.
pub struct Daemon {
    ctx: JobContext,
    config: DaemonConfig,
    handles: Vec<JoinHandle<()>>,
}

impl Daemon {
    pub fn new(ctx: JobContext, config: DaemonConfig) -> Self {
        Self {
            ctx,
            config,
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Lance un job une fois, hors minuterie.
    pub fn run_job(&self, job: Job, now: DateTime<Utc>) -> Result<JobOutcome, SchedError> {
        self.ctx.run(job, now)
    }

    /// Démarre une tâche par job. Doit être appelé depuis un runtime tokio.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.handles.clear();
        for job in Job::ALL {
            let period = job.period(&self.config);
            let ctx = self.ctx.clone();
            self.handles.push(tokio::spawn(run_every(job, period, ctx)));
            tracing::info!(job = %job, period_secs = period.as_secs(), "job scheduled");
        }
    }

    /// Arrête toutes les minuteries ; un tick en cours sur le pool bloquant se termine seul.
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        tracing::info!("daemon stopped");
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn run_every(job: Job, period: Duration, ctx: JobContext) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let tick_ctx = ctx.clone();
        let result = tokio::task::spawn_blocking(move || {
            let now = tick_ctx.clock.now();
            tick_ctx.run(job, now)
        })
        .await;
        match result {
            Ok(Ok(outcome)) => tracing::info!(job = %job, "{outcome}"),
            Ok(Err(err)) => tracing::warn!(job = %job, error = %err, "job failed"),
            Err(err) => tracing::error!(job = %job, error = %err, "job panicked"),
        }
    }
}
