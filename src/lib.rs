#![forbid(unsafe_code)]
//! Relais : planification des équipes de livreurs.
//!
//! - Templates hebdomadaires et génération pilotée par la demande prévue.
//! - Affectation gloutonne notée (fiabilité, zone, expérience, complétion).
//! - Cycle de vie des créneaux, pointage, pauses, échanges entre livreurs.
//! - Jobs de fond (génération, rappels, couverture, expiration) sur tokio.
//! - Tout en UTC ; mutations concurrentes par mises à jour conditionnelles.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod directory;
pub mod error;
pub mod forecast;
pub mod io;
pub mod model;
pub mod notification;
pub mod repository;
pub mod scheduler;
pub mod storage;
pub mod template;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SchedulerConfig;
pub use daemon::{Daemon, Job, JobContext, JobOutcome};
pub use directory::DriverDirectory;
pub use error::{SchedError, Violation};
pub use forecast::{DemandForecaster, Forecast, StaticForecaster};
pub use model::{
    DriverAvailability, DriverId, DriverProfile, Roster, Shift, ShiftId, ShiftStatus,
    ShiftSwapRequest, ShiftTemplate, ShiftType, SwapId, SwapStatus,
};
pub use notification::{LogNotifier, Notification, Notifier, Outbox};
pub use repository::{MemoryRepository, Repository};
pub use scheduler::{AssignmentReport, CoverageReport, Scheduler, ShiftSummary, WeekPlan};
pub use storage::{JsonStorage, Storage};
