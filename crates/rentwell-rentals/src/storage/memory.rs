use crate::domain::rentals::Rental;
use crate::domain::types::{RentalId, RentalStatus};
use crate::error::{RentalError, Result};
use crate::storage::rentals::RentalRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repository for development, tests and scenario replays
#[derive(Debug, Default, Clone)]
pub struct InMemoryRentalRepository {
    rentals: Arc<RwLock<HashMap<RentalId, Rental>>>,
}

impl InMemoryRentalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RentalRepository for InMemoryRentalRepository {
    async fn create_rental(&self, rental: &Rental) -> Result<()> {
        let mut rentals = self.rentals.write().await;
        if rentals.contains_key(&rental.id) {
            return Err(RentalError::DatabaseError {
                operation: "create_rental".to_string(),
                source: format!("rental {} already exists", rental.id).into(),
            });
        }
        rentals.insert(rental.id, rental.clone());
        Ok(())
    }

    async fn get_rental(&self, id: &RentalId) -> Result<Option<Rental>> {
        let rentals = self.rentals.read().await;
        Ok(rentals.get(id).cloned())
    }

    async fn update_rental(&self, rental: &Rental, expected_version: i64) -> Result<()> {
        let mut rentals = self.rentals.write().await;
        let stored = rentals
            .get_mut(&rental.id)
            .ok_or_else(|| RentalError::RentalNotFound {
                id: rental.id.to_string(),
            })?;

        if stored.version != expected_version {
            return Err(RentalError::ConcurrentModification {
                id: rental.id.to_string(),
                expected_version,
            });
        }

        *stored = rental.clone();
        Ok(())
    }

    async fn get_rentals_by_status(&self, status: RentalStatus) -> Result<Vec<Rental>> {
        let rentals = self.rentals.read().await;
        let mut matching: Vec<Rental> = rentals
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }
}
