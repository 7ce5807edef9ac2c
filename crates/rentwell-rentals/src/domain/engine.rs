use crate::config::RentalPolicy;
use crate::domain::availability::{ensure_available, AvailabilityService};
use crate::domain::clock::Clock;
use crate::domain::pricing::{self, Quote, QuoteRequest};
use crate::domain::rentals::{NewRental, Rental, ReturnLine, ReturnResult};
use crate::domain::types::{RentalId, RentalStatus};
use crate::error::{RentalError, Result};
use crate::storage::RentalRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentwell_common::{ItemId, LocationId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rental lifecycle operations
#[async_trait]
pub trait RentalLifecycle: Send + Sync {
    async fn create_rental(&self, request: NewRental) -> Result<Rental>;

    /// Like `create_rental`, but every item must first be available at `location_id`
    async fn create_rental_checked(
        &self,
        availability: &dyn AvailabilityService,
        location_id: &LocationId,
        request: NewRental,
    ) -> Result<Rental>;

    async fn process_pickup(&self, rental_id: &RentalId) -> Result<Rental>;

    async fn process_return(
        &self,
        rental_id: &RentalId,
        returned: &[ReturnLine],
    ) -> Result<ReturnResult>;

    async fn extend_rental(&self, rental_id: &RentalId, additional_duration: u32)
        -> Result<Rental>;

    async fn cancel_rental(&self, rental_id: &RentalId, reason: &str) -> Result<Rental>;

    async fn mark_overdue(&self, rental_id: &RentalId) -> Result<Rental>;

    /// Mark every past-due active rental overdue, returning the ids that changed
    async fn sweep_overdue(&self) -> Result<Vec<RentalId>>;

    async fn get_rental(&self, rental_id: &RentalId) -> Result<Rental>;

    fn quote(&self, request: &QuoteRequest) -> Result<Quote>;
}

pub struct RentalLifecycleEngine {
    policy: RentalPolicy,
    repository: Arc<dyn RentalRepository>,
    clock: Arc<dyn Clock>,
}

impl RentalLifecycleEngine {
    pub fn new(
        policy: RentalPolicy,
        repository: Arc<dyn RentalRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            repository,
            clock,
        }
    }

    pub fn policy(&self) -> &RentalPolicy {
        &self.policy
    }

    async fn load(&self, rental_id: &RentalId) -> Result<Rental> {
        self.repository
            .get_rental(rental_id)
            .await?
            .ok_or_else(|| RentalError::RentalNotFound {
                id: rental_id.to_string(),
            })
    }

    /// Load, apply `change` to a copy and persist it against the loaded version.
    /// A rejected change leaves the stored rental as it was.
    async fn modify<T, F>(
        &self,
        rental_id: &RentalId,
        operation: &str,
        change: F,
    ) -> Result<(Rental, T)>
    where
        T: Send,
        F: FnOnce(&mut Rental, &RentalPolicy, DateTime<Utc>) -> Result<T> + Send,
    {
        let current = self.load(rental_id).await?;
        let expected_version = current.version;
        let mut updated = current.clone();

        let output = match change(&mut updated, &self.policy, self.clock.now()) {
            Ok(output) => output,
            Err(e) => {
                warn!(%rental_id, status = %current.status, "Rejected {}: {}", operation, e);
                return Err(e);
            }
        };

        updated.version = expected_version + 1;
        self.repository
            .update_rental(&updated, expected_version)
            .await?;

        if updated.status != current.status {
            info!(
                %rental_id,
                from = %current.status,
                to = %updated.status,
                "Rental transitioned during {}", operation
            );
        }

        Ok((updated, output))
    }
}

/// Total requested units per item, in first-seen order
fn units_per_item(request: &NewRental) -> Vec<(ItemId, u32)> {
    let mut totals: Vec<(ItemId, u32)> = Vec::new();
    for line in &request.line_items {
        match totals.iter_mut().find(|(item, _)| *item == line.item_id) {
            Some((_, units)) => *units = units.saturating_add(line.quantity),
            None => totals.push((line.item_id.clone(), line.quantity)),
        }
    }
    totals
}

#[async_trait]
impl RentalLifecycle for RentalLifecycleEngine {
    async fn create_rental(&self, request: NewRental) -> Result<Rental> {
        let customer_id = request.customer_id.clone();
        let rental = Rental::open(request, &self.policy, self.clock.now()).map_err(|e| {
            warn!(%customer_id, "Rejected rental request: {}", e);
            e
        })?;

        debug!(
            rental_id = %rental.id,
            charge = %rental.rental_charge,
            deposit = %rental.security_deposit,
            "Priced new rental"
        );

        self.repository.create_rental(&rental).await?;

        info!(
            rental_id = %rental.id,
            %customer_id,
            lines = rental.line_items.len(),
            "Created rental"
        );
        Ok(rental)
    }

    async fn create_rental_checked(
        &self,
        availability: &dyn AvailabilityService,
        location_id: &LocationId,
        request: NewRental,
    ) -> Result<Rental> {
        for (item_id, units) in units_per_item(&request) {
            ensure_available(
                availability,
                &item_id,
                location_id,
                request.start_date,
                request.end_date,
                units,
            )
            .await
            .map_err(|e| {
                warn!(%item_id, %location_id, units, "Availability check failed: {}", e);
                e
            })?;
        }

        self.create_rental(request).await
    }

    async fn process_pickup(&self, rental_id: &RentalId) -> Result<Rental> {
        let (rental, ()) = self
            .modify(rental_id, "pickup", |rental, _, now| rental.pick_up(now))
            .await?;
        Ok(rental)
    }

    async fn process_return(
        &self,
        rental_id: &RentalId,
        returned: &[ReturnLine],
    ) -> Result<ReturnResult> {
        let (_, result) = self
            .modify(rental_id, "return", |rental, policy, now| {
                rental.process_return(returned, policy, now)
            })
            .await?;

        debug!(
            %rental_id,
            days_late = result.days_late,
            late_fees = %result.late_fee_total,
            damage = %result.damage_charge_total,
            "Processed return"
        );
        if result.settlement.is_final {
            info!(
                %rental_id,
                refund = %result.settlement.refund,
                owed = %result.settlement.amount_owed,
                "Settled security deposit"
            );
        }
        Ok(result)
    }

    async fn extend_rental(
        &self,
        rental_id: &RentalId,
        additional_duration: u32,
    ) -> Result<Rental> {
        let (rental, delta) = self
            .modify(rental_id, "extend", |rental, policy, now| {
                rental.extend(additional_duration, policy, now)
            })
            .await?;

        info!(
            %rental_id,
            additional_duration,
            %delta,
            end_date = %rental.end_date,
            extensions = rental.extension_count,
            "Extended rental"
        );
        Ok(rental)
    }

    async fn cancel_rental(&self, rental_id: &RentalId, reason: &str) -> Result<Rental> {
        let (rental, ()) = self
            .modify(rental_id, "cancel", |rental, _, now| rental.cancel(reason, now))
            .await?;
        Ok(rental)
    }

    async fn mark_overdue(&self, rental_id: &RentalId) -> Result<Rental> {
        let current = self.load(rental_id).await?;
        let mut candidate = current.clone();
        if !candidate.mark_overdue(self.clock.now())? {
            debug!(%rental_id, end_date = %current.end_date, "Rental not yet past due");
            return Ok(current);
        }

        let (rental, _) = self
            .modify(rental_id, "mark overdue", |rental, _, now| {
                rental.mark_overdue(now)
            })
            .await?;
        Ok(rental)
    }

    async fn sweep_overdue(&self) -> Result<Vec<RentalId>> {
        let now = self.clock.now();
        let active = self
            .repository
            .get_rentals_by_status(RentalStatus::Active)
            .await?;

        let mut marked = Vec::new();
        for rental in active.iter().filter(|r| r.is_past_due(now)) {
            match self
                .modify(&rental.id, "mark overdue", |stored, _, now| {
                    stored.mark_overdue(now)
                })
                .await
            {
                Ok((_, true)) => marked.push(rental.id),
                Ok((_, false)) => {}
                Err(RentalError::ConcurrentModification { .. })
                | Err(RentalError::InvalidState { .. }) => {
                    debug!(rental_id = %rental.id, "Skipped rental changed during sweep");
                }
                Err(e) => return Err(e),
            }
        }

        info!(checked = active.len(), marked = marked.len(), "Overdue sweep finished");
        Ok(marked)
    }

    async fn get_rental(&self, rental_id: &RentalId) -> Result<Rental> {
        self.load(rental_id).await
    }

    fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let quote = pricing::quote(request, &self.policy)?;
        debug!(
            lines = quote.lines.len(),
            charge = %quote.rental_charge,
            deposit = %quote.security_deposit,
            "Quoted rental"
        );
        Ok(quote)
    }
}
