//! Core shared types, configuration loading and logging for Rentwell

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::ConfigLoader;
pub use error::ConfigurationError;
pub use types::{CustomerId, ItemId, LocationId, ReferenceError};
