pub mod memory;
pub mod rentals;

pub use memory::InMemoryRentalRepository;
pub use rentals::{RentalRepository, SqlRentalRepository};
