//! Stock availability checks performed before a rental is created

use crate::domain::types::RentalId;
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentwell_common::{ItemId, LocationId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait AvailabilityService: Send + Sync {
    /// Whether `quantity` units are free at `location_id` for the whole window
    async fn check_availability(
        &self,
        item_id: &ItemId,
        location_id: &LocationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        quantity: u32,
    ) -> Result<bool>;
}

/// Fail with `InsufficientAvailability` unless the units are free
pub async fn ensure_available(
    service: &dyn AvailabilityService,
    item_id: &ItemId,
    location_id: &LocationId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    quantity: u32,
) -> Result<()> {
    if service
        .check_availability(item_id, location_id, start, end, quantity)
        .await?
    {
        Ok(())
    } else {
        Err(RentalError::InsufficientAvailability {
            item_id: item_id.to_string(),
            location_id: location_id.to_string(),
            requested: quantity,
        })
    }
}

#[derive(Debug, Clone)]
struct Hold {
    rental_id: RentalId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    quantity: u32,
}

impl Hold {
    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

type StockKey = (ItemId, LocationId);

#[derive(Debug, Default)]
struct Ledger {
    stock: HashMap<StockKey, u32>,
    holds: HashMap<StockKey, Vec<Hold>>,
}

impl Ledger {
    /// Units not held in `[start, end)`, ignoring holds owned by `exclude`
    fn free_units(
        &self,
        key: &StockKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<RentalId>,
    ) -> u32 {
        let stock = self.stock.get(key).copied().unwrap_or(0);
        let held: u32 = self
            .holds
            .get(key)
            .map(|holds| {
                holds
                    .iter()
                    .filter(|hold| Some(hold.rental_id) != exclude)
                    .filter(|hold| hold.overlaps(start, end))
                    .map(|hold| hold.quantity)
                    .sum()
            })
            .unwrap_or(0);
        stock.saturating_sub(held)
    }

    fn holds_of(&self, rental_id: RentalId) -> impl Iterator<Item = (&StockKey, &Hold)> {
        self.holds.iter().flat_map(move |(key, holds)| {
            holds
                .iter()
                .filter(move |hold| hold.rental_id == rental_id)
                .map(move |hold| (key, hold))
        })
    }
}

/// Stock counts per item and location with time-windowed holds owned by rentals
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    ledger: RwLock<Ledger>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_stock(&self, item_id: ItemId, location_id: LocationId, units: u32) {
        let mut ledger = self.ledger.write().await;
        ledger.stock.insert((item_id, location_id), units);
    }

    /// Hold units for a rental's window, failing if they are not free
    pub async fn reserve(
        &self,
        rental_id: RentalId,
        item_id: &ItemId,
        location_id: &LocationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        quantity: u32,
    ) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        let key = (item_id.clone(), location_id.clone());
        if ledger.free_units(&key, start, end, None) < quantity {
            return Err(RentalError::InsufficientAvailability {
                item_id: item_id.to_string(),
                location_id: location_id.to_string(),
                requested: quantity,
            });
        }
        ledger.holds.entry(key).or_default().push(Hold {
            rental_id,
            start,
            end,
            quantity,
        });
        debug!(%rental_id, %item_id, %location_id, quantity, "Placed stock hold");
        Ok(())
    }

    /// Drop every hold owned by the rental. Returns the number of units freed.
    pub async fn release(&self, rental_id: RentalId) -> u32 {
        let mut ledger = self.ledger.write().await;
        let mut freed = 0;
        for holds in ledger.holds.values_mut() {
            holds.retain(|hold| {
                if hold.rental_id == rental_id {
                    freed += hold.quantity;
                    false
                } else {
                    true
                }
            });
        }
        ledger.holds.retain(|_, holds| !holds.is_empty());
        debug!(%rental_id, freed, "Released stock holds");
        freed
    }

    /// Move the end of every hold owned by the rental to `new_end`.
    ///
    /// Growing a hold requires the added window to be free for all of the
    /// rental's items; nothing changes when any of them is short.
    pub async fn resize(&self, rental_id: RentalId, new_end: DateTime<Utc>) -> Result<()> {
        let mut ledger = self.ledger.write().await;

        for (key, hold) in ledger.holds_of(rental_id) {
            if new_end > hold.end
                && ledger.free_units(key, hold.end, new_end, Some(rental_id)) < hold.quantity
            {
                return Err(RentalError::InsufficientAvailability {
                    item_id: key.0.to_string(),
                    location_id: key.1.to_string(),
                    requested: hold.quantity,
                });
            }
        }

        for holds in ledger.holds.values_mut() {
            for hold in holds.iter_mut().filter(|hold| hold.rental_id == rental_id) {
                hold.end = new_end.max(hold.start);
            }
        }
        debug!(%rental_id, %new_end, "Resized stock holds");
        Ok(())
    }

    /// Shrink the rental's hold on `item_id` by units that came back early
    pub async fn return_units(&self, rental_id: RentalId, item_id: &ItemId, units: u32) {
        let mut ledger = self.ledger.write().await;
        let mut remaining = units;
        for (key, holds) in ledger.holds.iter_mut() {
            if key.0 != *item_id {
                continue;
            }
            for hold in holds.iter_mut().filter(|hold| hold.rental_id == rental_id) {
                let taken = remaining.min(hold.quantity);
                hold.quantity -= taken;
                remaining -= taken;
            }
            holds.retain(|hold| hold.quantity > 0);
        }
        ledger.holds.retain(|_, holds| !holds.is_empty());
    }
}

#[async_trait]
impl AvailabilityService for InMemoryStockLedger {
    async fn check_availability(
        &self,
        item_id: &ItemId,
        location_id: &LocationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        quantity: u32,
    ) -> Result<bool> {
        let ledger = self.ledger.read().await;
        let free = ledger.free_units(&(item_id.clone(), location_id.clone()), start, end, None);
        debug!(%item_id, %location_id, free, quantity, "Checked availability");
        Ok(free >= quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()
    }

    async fn stocked(item: &ItemId, location: &LocationId, units: u32) -> InMemoryStockLedger {
        let ledger = InMemoryStockLedger::new();
        ledger.set_stock(item.clone(), location.clone(), units).await;
        ledger
    }

    #[tokio::test]
    async fn test_holds_reduce_availability_in_overlapping_windows() {
        let item = ItemId::new("ladder").unwrap();
        let location = LocationId::new("depot-1").unwrap();
        let ledger = stocked(&item, &location, 3).await;

        ledger
            .reserve(RentalId::new(), &item, &location, at(1), at(5), 2)
            .await
            .unwrap();

        assert!(ledger
            .check_availability(&item, &location, at(3), at(4), 1)
            .await
            .unwrap());
        assert!(!ledger
            .check_availability(&item, &location, at(3), at(4), 2)
            .await
            .unwrap());
        // window starting exactly when the hold ends does not overlap
        assert!(ledger
            .check_availability(&item, &location, at(5), at(5) + Duration::days(2), 3)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ensure_available_surfaces_error() {
        let ledger = InMemoryStockLedger::new();
        let item = ItemId::new("ladder").unwrap();
        let location = LocationId::new("depot-1").unwrap();

        let result = ensure_available(&ledger, &item, &location, at(1), at(2), 1).await;
        assert!(matches!(
            result,
            Err(RentalError::InsufficientAvailability { requested: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_reserve_rejects_overbooking() {
        let item = ItemId::new("scaffold").unwrap();
        let location = LocationId::new("depot-2").unwrap();
        let ledger = stocked(&item, &location, 1).await;

        ledger
            .reserve(RentalId::new(), &item, &location, at(1), at(3), 1)
            .await
            .unwrap();
        assert!(ledger
            .reserve(RentalId::new(), &item, &location, at(2), at(4), 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_release_frees_only_that_rentals_units() {
        let item = ItemId::new("scaffold").unwrap();
        let location = LocationId::new("depot-2").unwrap();
        let ledger = stocked(&item, &location, 2).await;
        let first = RentalId::new();
        let second = RentalId::new();

        ledger.reserve(first, &item, &location, at(1), at(3), 1).await.unwrap();
        ledger.reserve(second, &item, &location, at(1), at(3), 1).await.unwrap();
        assert!(!ledger
            .check_availability(&item, &location, at(1), at(2), 1)
            .await
            .unwrap());

        assert_eq!(ledger.release(first).await, 1);
        assert!(ledger
            .check_availability(&item, &location, at(1), at(2), 1)
            .await
            .unwrap());
        assert!(!ledger
            .check_availability(&item, &location, at(1), at(2), 2)
            .await
            .unwrap());
        assert_eq!(ledger.release(first).await, 0);
    }

    #[tokio::test]
    async fn test_resize_checks_added_window() {
        let item = ItemId::new("mixer").unwrap();
        let location = LocationId::new("depot-3").unwrap();
        let ledger = stocked(&item, &location, 1).await;
        let extended = RentalId::new();
        let later = RentalId::new();

        ledger.reserve(extended, &item, &location, at(1), at(3), 1).await.unwrap();
        ledger.reserve(later, &item, &location, at(5), at(7), 1).await.unwrap();

        // growing into the later booking fails and leaves the hold as it was
        assert!(matches!(
            ledger.resize(extended, at(6)).await,
            Err(RentalError::InsufficientAvailability { .. })
        ));
        assert!(ledger
            .check_availability(&item, &location, at(3), at(5), 1)
            .await
            .unwrap());

        ledger.resize(extended, at(5)).await.unwrap();
        assert!(!ledger
            .check_availability(&item, &location, at(4), at(5), 1)
            .await
            .unwrap());

        // shrinking always succeeds
        ledger.resize(extended, at(2)).await.unwrap();
        assert!(ledger
            .check_availability(&item, &location, at(2), at(5), 1)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_returned_units_shrink_hold() {
        let item = ItemId::new("pump").unwrap();
        let location = LocationId::new("depot-4").unwrap();
        let ledger = stocked(&item, &location, 3).await;
        let rental = RentalId::new();

        ledger.reserve(rental, &item, &location, at(1), at(9), 3).await.unwrap();
        ledger.return_units(rental, &item, 2).await;
        assert!(ledger
            .check_availability(&item, &location, at(2), at(3), 2)
            .await
            .unwrap());
        assert_eq!(ledger.release(rental).await, 1);
    }
}
