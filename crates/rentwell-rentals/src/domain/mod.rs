pub mod availability;
pub mod clock;
pub mod engine;
pub mod fees;
pub mod pricing;
pub mod rentals;
pub mod types;

pub use availability::{ensure_available, AvailabilityService, InMemoryStockLedger};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{RentalLifecycle, RentalLifecycleEngine};
pub use fees::{DamageAssessment, DepositSettlement};
pub use pricing::{LineRates, NewLineItem, Quote, QuoteRequest};
pub use rentals::{NewRental, Rental, RentalLineItem, ReturnLine, ReturnResult};
pub use types::{DamageCategory, LineItemId, Money, PeriodUnit, RentalId, RentalStatus};
