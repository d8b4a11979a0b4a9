use chrono::{DateTime, Utc};
use thiserror::Error;

/// Règle métier violée par une opération.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    #[error("requirement not met: {0}")]
    RequirementNotMet(String),
    #[error("overlaps shift {0} already held by the driver")]
    TimeConflict(String),
    #[error("clock-in opens at {opens_at}")]
    TooEarly { opens_at: DateTime<Utc> },
    #[error("shift {0} was taken by another driver")]
    AlreadyTaken(String),
    #[error("a pending swap already exists for shift {0}")]
    DuplicatePendingSwap(String),
    #[error("requester cannot cover their own swap")]
    SelfSwap,
    #[error("swaps close at {closes_at}")]
    SwapWindowClosed { closes_at: DateTime<Utc> },
    #[error("a break is already open on shift {0}")]
    BreakAlreadyOpen(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} is {found}, expected {expected}")]
    InvalidState {
        entity: &'static str,
        id: String,
        expected: String,
        found: String,
    },
    #[error("driver {driver} is not allowed to act on {resource}")]
    Unauthorized { driver: String, resource: String },
    #[error("constraint violated: {0}")]
    Constraint(#[from] Violation),
    #[error("{service} unavailable: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SchedError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        id: impl ToString,
        expected: impl Into<String>,
        found: impl ToString,
    ) -> Self {
        SchedError::InvalidState {
            entity,
            id: id.to_string(),
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    pub fn unauthorized(driver: impl ToString, resource: impl Into<String>) -> Self {
        SchedError::Unauthorized {
            driver: driver.to_string(),
            resource: resource.into(),
        }
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            SchedError::Constraint(v) => Some(v),
            _ => None,
        }
    }
}
