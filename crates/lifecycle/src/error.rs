//! Lifecycle error types

use thiserror::Error;

/// Errors from the trial and subscription lifecycle engine
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Organisation not found: {0}")]
    OrgNotFound(String),

    #[error("No admin user for organisation: {0}")]
    NoAdminUser(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("A downgrade to {pending} is already scheduled for {effective_at}")]
    PendingDowngradeConflict {
        pending: String,
        effective_at: String,
    },

    #[error("Cannot remove {requested} seat(s): capacity would drop to {new_capacity} with {active_users} active user(s)")]
    SeatCapacityBelowUsage {
        requested: u32,
        new_capacity: u32,
        active_users: i64,
    },

    #[error("Confirmation text did not match the organisation name")]
    ConfirmationMismatch,

    #[error("Invalid subscription state: cannot {action} while {state}")]
    InvalidTransition { action: String, state: String },

    #[error("Email transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for LifecycleError {
    fn from(err: sqlx::Error) -> Self {
        LifecycleError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for LifecycleError {
    fn from(err: reqwest::Error) -> Self {
        LifecycleError::Transport(err.to_string())
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
