pub mod config;
pub mod domain;
pub mod error;
pub mod simulation;
pub mod storage;

pub use config::RentalsConfig;
pub use error::{RentalError, Result};
