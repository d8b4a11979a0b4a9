#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use relais::{
    clock::{self, SystemClock},
    daemon::{Daemon, Job, JobContext},
    forecast, io,
    model::{DriverAvailability, DriverId, GeoPoint, ShiftId, SwapId},
    notification::Outbox,
    scheduler::ConflictKind,
    storage::{JsonStorage, Storage},
    MemoryRepository, Repository, Scheduler, SchedulerConfig, StaticForecaster,
};
use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// Planification des équipes de livreurs
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Fichier JSON du planning
    #[arg(long, global = true, default_value = "roster.json")]
    roster: String,

    /// Configuration JSON (valeurs par défaut sinon)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Prévision de demande JSON (demande nulle, multiplicateur 1 sinon)
    #[arg(long, global = true)]
    forecast: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Importer des templates de créneaux depuis un CSV
    ImportTemplates {
        #[arg(long)]
        csv: String,
    },

    /// Importer des disponibilités (remplace celles des livreurs présents dans le CSV)
    ImportAvailability {
        #[arg(long)]
        csv: String,
        /// Date de référence pour la libération des créneaux futurs
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Importer des fiches livreurs depuis un CSV
    ImportDrivers {
        #[arg(long)]
        csv: String,
    },

    /// Générer les créneaux d'une semaine (lundi suivant par défaut)
    Generate {
        #[arg(long)]
        week: Option<NaiveDate>,
        /// Affecter et prévenir les livreurs dans la foulée
        #[arg(long)]
        assign: bool,
    },

    /// Affecter les créneaux encore ouverts d'une semaine
    Assign {
        #[arg(long)]
        week: Option<NaiveDate>,
    },

    /// Rapport de couverture d'une semaine
    Coverage {
        #[arg(long)]
        week: Option<NaiveDate>,
    },

    /// Demander un créneau ouvert
    RequestShift {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        shift: String,
    },

    /// Pointer l'arrivée
    ClockIn {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        shift: String,
        /// Instant RFC3339 (maintenant par défaut)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },

    /// Pointer le départ et afficher le bilan
    ClockOut {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        shift: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },

    /// Proposer son créneau à l'échange
    RequestSwap {
        #[arg(long)]
        driver: String,
        #[arg(long)]
        shift: String,
        #[arg(long, default_value = "")]
        reason: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Reprendre le créneau d'une demande d'échange
    AcceptSwap {
        #[arg(long)]
        swap: String,
        #[arg(long)]
        driver: String,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Lancer un job de fond une seule fois
    Sweep {
        /// weekly-generation | reminders | coverage-sweep | swap-expiry
        #[arg(long)]
        job: Job,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Lister et optionnellement exporter
    List {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        out_json: Option<String>,
        #[arg(long)]
        out_csv: Option<String>,
    },

    /// Vérifier les conflits
    Check {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Export CSV des conflits (optionnel)
        #[arg(long)]
        report: Option<String>,
    },

    /// Lancer les jobs de fond jusqu'à Ctrl-C
    Daemon {
        /// Sauvegarde périodique du planning, en secondes
        #[arg(long, default_value_t = 300)]
        checkpoint_secs: u64,
    },
}

fn location(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    Some(GeoPoint {
        lat: lat?,
        lng: lng?,
    })
}

fn save(storage: &JsonStorage, repo: &MemoryRepository) -> Result<()> {
    storage.save(&repo.snapshot()?)
}

fn print_outbox(outbox: &Outbox) {
    for n in outbox.sent() {
        eprintln!("notify {}: {}", n.driver_id, n.title);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };
    let forecaster = match &cli.forecast {
        Some(path) => StaticForecaster::from_json_file(path)?,
        None => StaticForecaster::default(),
    };

    let storage = JsonStorage::open(&cli.roster);
    let repo = Arc::new(MemoryRepository::from_roster(storage.load_or_default()?));
    let outbox = Arc::new(Outbox::new());
    let scheduler =
        Scheduler::in_memory(repo.clone(), outbox.clone()).with_config(config.clone());
    let today = Utc::now().date_naive();
    let next_week = clock::next_week_start(today);

    let code = match cli.cmd {
        Commands::ImportTemplates { csv } => {
            let templates = io::import_templates_csv(&csv)?;
            let count = templates.len();
            for template in templates {
                scheduler.save_template(template)?;
            }
            save(&storage, &repo)?;
            println!("{count} template(s) imported");
            0
        }
        Commands::ImportAvailability { csv, today: at } => {
            let rows = io::import_availability_csv(&csv)?;
            let mut per_driver: BTreeMap<DriverId, Vec<DriverAvailability>> = BTreeMap::new();
            for row in rows {
                per_driver.entry(row.driver_id.clone()).or_default().push(row);
            }
            let mut released = 0;
            for (driver, rows) in per_driver {
                released += scheduler
                    .update_availability(&driver, rows, at.unwrap_or(today))?
                    .len();
            }
            save(&storage, &repo)?;
            println!("availability imported, {released} shift(s) released");
            0
        }
        Commands::ImportDrivers { csv } => {
            let drivers = io::import_drivers_csv(&csv)?;
            let count = drivers.len();
            for profile in drivers {
                repo.upsert_driver(profile)?;
            }
            save(&storage, &repo)?;
            println!("{count} driver(s) imported");
            0
        }
        Commands::Generate { week, assign } => {
            let week_start = week.unwrap_or(next_week);
            if assign {
                let plan = scheduler.plan_week(week_start, &forecaster)?;
                println!(
                    "{} shift(s) generated, {} assigned, {} unassigned, coverage {:.0}",
                    plan.generated,
                    plan.report.assignments.len(),
                    plan.report.unassigned.len(),
                    plan.coverage.score
                );
            } else {
                let forecast =
                    forecast::fetch(&forecaster, week_start, week_start + Duration::days(6))?;
                let shifts = scheduler.generate_week(week_start, &forecast)?;
                let count = shifts.len();
                repo.insert_shifts(shifts)?;
                println!("{count} shift(s) generated for week of {week_start}");
            }
            save(&storage, &repo)?;
            0
        }
        Commands::Assign { week } => {
            let week_start = week.unwrap_or(next_week);
            let report =
                scheduler.assign_open_shifts(week_start, week_start + Duration::days(6))?;
            save(&storage, &repo)?;
            for rejection in &report.rejections {
                eprintln!(
                    "skip {} for {}: {}",
                    rejection.driver_id, rejection.shift_id, rejection.reason
                );
            }
            println!(
                "{} assigned, {} unassigned",
                report.assignments.len(),
                report.unassigned.len()
            );
            if report.unassigned.is_empty() {
                0
            } else {
                2
            }
        }
        Commands::Coverage { week } => {
            let week_start = week.unwrap_or(next_week);
            let forecast =
                forecast::fetch(&forecaster, week_start, week_start + Duration::days(6))?;
            let report = scheduler.coverage(week_start, &forecast)?;
            for hour in report.hours.iter().filter(|h| h.shortage > 0) {
                println!(
                    "{} {:02}:00 required {} scheduled {} short {}",
                    hour.date, hour.hour, hour.required, hour.scheduled, hour.shortage
                );
            }
            println!("score {:.1}", report.score);
            for line in &report.recommendations {
                println!("- {line}");
            }
            0
        }
        Commands::RequestShift { driver, shift } => {
            let shift = scheduler.request_shift(&DriverId::new(driver), &ShiftId::new(shift))?;
            save(&storage, &repo)?;
            println!("{} {}", shift.label(), shift.status);
            0
        }
        Commands::ClockIn {
            driver,
            shift,
            at,
            lat,
            lng,
        } => {
            let shift = scheduler.clock_in(
                &DriverId::new(driver),
                &ShiftId::new(shift),
                location(lat, lng),
                at.unwrap_or_else(Utc::now),
            )?;
            save(&storage, &repo)?;
            println!("{} {}", shift.label(), shift.status);
            0
        }
        Commands::ClockOut {
            driver,
            shift,
            at,
            lat,
            lng,
        } => {
            let summary = scheduler.clock_out(
                &DriverId::new(driver),
                &ShiftId::new(shift),
                location(lat, lng),
                at.unwrap_or_else(Utc::now),
            )?;
            save(&storage, &repo)?;
            println!("{summary}");
            0
        }
        Commands::RequestSwap {
            driver,
            shift,
            reason,
            at,
        } => {
            let request = scheduler.request_swap(
                &DriverId::new(driver),
                &ShiftId::new(shift),
                &reason,
                at.unwrap_or_else(Utc::now),
            )?;
            save(&storage, &repo)?;
            println!("{} expires {}", request.id, request.expires_at.to_rfc3339());
            0
        }
        Commands::AcceptSwap { swap, driver, at } => {
            let request = scheduler.accept_swap(
                &SwapId::new(swap),
                &DriverId::new(driver),
                at.unwrap_or_else(Utc::now),
            )?;
            save(&storage, &repo)?;
            println!("{} {}", request.id, request.status);
            0
        }
        Commands::Sweep { job, at } => {
            let ctx = JobContext {
                scheduler: Arc::new(scheduler),
                forecaster: Arc::new(forecaster),
                clock: Arc::new(SystemClock),
            };
            let outcome = Daemon::new(ctx, config.daemon.clone())
                .run_job(job, at.unwrap_or_else(Utc::now))?;
            save(&storage, &repo)?;
            println!("{job}: {outcome}");
            0
        }
        Commands::List {
            from,
            to,
            out_json,
            out_csv,
        } => {
            let roster = repo.snapshot()?;
            if let Some(path) = out_json {
                io::export_roster_json(path, &roster)?;
            }
            if let Some(path) = out_csv {
                io::export_shifts_csv(path, &roster)?;
            }
            let mut shifts: Vec<_> = roster
                .shifts
                .iter()
                .filter(|s| from.map_or(true, |f| s.date >= f) && to.map_or(true, |t| s.date <= t))
                .collect();
            shifts.sort_by_key(|s| (s.date, s.start_time));
            // impression compacte
            for s in shifts {
                let driver = s
                    .driver_id
                    .as_ref()
                    .and_then(|d| roster.find_driver(d))
                    .map(|p| p.name.as_str())
                    .unwrap_or("-");
                println!(
                    "{} | {} | {} | {}",
                    s.id.as_str(),
                    s.label(),
                    s.status,
                    driver
                );
            }
            0
        }
        Commands::Check { from, to, report } => {
            let roster = repo.snapshot()?;
            let first = roster.shifts.iter().map(|s| s.date).min().unwrap_or(today);
            let last = roster.shifts.iter().map(|s| s.date).max().unwrap_or(today);
            let conflicts =
                scheduler.detect_conflicts(from.unwrap_or(first), to.unwrap_or(last))?;
            if conflicts.is_empty() {
                println!("OK: no conflicts");
                0
            } else {
                eprintln!("Found {} conflict(s)", conflicts.len());
                if let Some(path) = report {
                    let mut w = csv::Writer::from_path(path)?;
                    w.write_record(["driver_id", "shift_a", "shift_b", "kind"])?;
                    for c in &conflicts {
                        w.write_record([
                            c.driver.as_ref().map(|d| d.as_str()).unwrap_or(""),
                            c.shift_a.as_str(),
                            c.shift_b.as_ref().map(|s| s.as_str()).unwrap_or(""),
                            match c.kind {
                                ConflictKind::Overlap => "overlap",
                                ConflictKind::StatusMismatch => "status",
                            },
                        ])?;
                    }
                    w.flush()?;
                }
                // Code 2 = WARNING/INCOMPLETE
                2
            }
        }
        Commands::Daemon { checkpoint_secs } => {
            let ctx = JobContext {
                scheduler: Arc::new(scheduler),
                forecaster: Arc::new(forecaster),
                clock: Arc::new(SystemClock),
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting tokio runtime")?;
            let checkpoint_repo = repo.clone();
            let checkpoint_path = storage.path().to_path_buf();
            runtime.block_on(async move {
                let mut daemon = Daemon::new(ctx, config.daemon.clone());
                daemon.start();
                let checkpoint = tokio::spawn(async move {
                    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                        checkpoint_secs.max(1),
                    ));
                    loop {
                        interval.tick().await;
                        let repo = checkpoint_repo.clone();
                        let path = checkpoint_path.clone();
                        let saved = tokio::task::spawn_blocking(move || {
                            save(&JsonStorage::open(path), &repo)
                        })
                        .await;
                        match saved {
                            Ok(Ok(())) => tracing::debug!("roster checkpoint saved"),
                            Ok(Err(err)) => tracing::warn!(error = %err, "checkpoint failed"),
                            Err(err) => tracing::error!(error = %err, "checkpoint panicked"),
                        }
                    }
                });
                tokio::signal::ctrl_c()
                    .await
                    .context("waiting for ctrl-c")?;
                checkpoint.abort();
                daemon.shutdown();
                Ok::<_, anyhow::Error>(())
            })?;
            save(&storage, &repo)?;
            0
        }
    };

    print_outbox(&outbox);
    std::process::exit(code);
}
