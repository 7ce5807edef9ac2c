use rentwell_common::ReferenceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RentalError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Cannot {operation} a rental in state {status}")]
    InvalidState { operation: String, status: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Extension limit reached: rental already extended {limit} times")]
    ExtensionLimit { limit: u32 },

    #[error(
        "Insufficient availability for item {item_id} at {location_id}: requested {requested}"
    )]
    InsufficientAvailability {
        item_id: String,
        location_id: String,
        requested: u32,
    },

    #[error("Rental not found: {id}")]
    RentalNotFound { id: String },

    #[error("Rental {id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification { id: String, expected_version: i64 },

    #[error("Database error during {operation}: {source}")]
    DatabaseError {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RentalError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Amount arithmetic left the representable decimal range
    pub fn amount_overflow(what: &str) -> Self {
        Self::validation(format!("{what} exceeds the supported amount range"))
    }

    pub fn invalid_state(operation: &str, status: impl ToString) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            status: status.to_string(),
        }
    }
}

impl From<ReferenceError> for RentalError {
    fn from(err: ReferenceError) -> Self {
        Self::validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RentalError>;
