use crate::config::RentalPolicy;
use crate::domain::fees::{self, DamageAssessment, DepositSettlement};
use crate::domain::pricing::{self, LineRates, NewLineItem};
use crate::domain::types::{
    DamageCategory, LineItemId, Money, PeriodUnit, RentalId, RentalStatus,
};
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use rentwell_common::{CustomerId, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalLineItem {
    pub id: LineItemId,
    pub line_number: u32,
    pub item_id: ItemId,
    pub quantity: u32,
    pub quantity_returned: u32,
    pub rates: LineRates,
    pub replacement_value: Money,
    /// Charge for this line at the rental's current total duration
    pub rental_charge: Money,
}

impl RentalLineItem {
    pub fn outstanding(&self) -> u32 {
        self.quantity - self.quantity_returned
    }
}

/// Request to open a rental
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRental {
    pub customer_id: CustomerId,
    pub line_items: Vec<NewLineItem>,
    pub period_unit: PeriodUnit,
    pub duration: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// One line of a return request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub line_id: LineItemId,
    pub quantity_returned: u32,
    #[serde(default)]
    pub damage: Option<DamageAssessment>,
}

impl ReturnLine {
    pub fn new(line_id: LineItemId, quantity_returned: u32) -> Self {
        Self {
            line_id,
            quantity_returned,
            damage: None,
        }
    }

    pub fn with_damage(mut self, damage: DamageAssessment) -> Self {
        self.damage = Some(damage);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnLineOutcome {
    pub line_id: LineItemId,
    pub item_id: ItemId,
    pub quantity_returned: u32,
    pub late_fee: Money,
    pub damage_category: Option<DamageCategory>,
    pub damage_charge: Money,
}

/// Charges produced by one return event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnResult {
    pub rental_id: RentalId,
    pub status: RentalStatus,
    pub days_late: i64,
    pub lines: Vec<ReturnLineOutcome>,
    pub late_fee_total: Money,
    pub damage_charge_total: Money,
    pub settlement: DepositSettlement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub customer_id: CustomerId,
    pub line_items: Vec<RentalLineItem>,
    pub period_unit: PeriodUnit,
    pub duration: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: RentalStatus,
    pub security_deposit: Money,
    pub rental_charge: Money,
    pub extension_count: u32,
    pub late_fee_accrued: Money,
    pub damage_charges: Money,
    pub deposit_refunded: Money,
    pub amount_owed: Money,
    pub cancellation_reason: Option<String>,
    /// Incremented on every persisted change
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Rental {
    /// Validate the request and price it. The rental starts in `PendingPickup`.
    pub fn open(request: NewRental, policy: &RentalPolicy, now: DateTime<Utc>) -> Result<Self> {
        pricing::validate_terms(
            &request.line_items,
            request.period_unit,
            request.duration,
            policy,
        )?;

        let expected_end = request
            .period_unit
            .advance(request.start_date, request.duration)
            .ok_or_else(|| RentalError::validation("end date is out of range"))?;
        if request.end_date != expected_end {
            return Err(RentalError::validation(format!(
                "end date {} does not match {} {} periods from {}",
                request.end_date, request.duration, request.period_unit, request.start_date
            )));
        }

        let mut line_items = Vec::with_capacity(request.line_items.len());
        for (index, item) in request.line_items.into_iter().enumerate() {
            let line_number = index as u32 + 1;
            let rental_charge = pricing::line_charge(
                &item.rates,
                item.quantity,
                request.period_unit,
                request.duration,
                policy,
            )?
            .ok_or_else(|| {
                RentalError::validation(format!("line {line_number}: no rate resolvable"))
            })?;

            line_items.push(RentalLineItem {
                id: LineItemId::new(),
                line_number,
                item_id: item.item_id,
                quantity: item.quantity,
                quantity_returned: 0,
                rates: item.rates,
                replacement_value: item.replacement_value,
                rental_charge,
            });
        }

        let rental_charge = Money::checked_sum(line_items.iter().map(|line| line.rental_charge))
            .ok_or_else(|| RentalError::amount_overflow("rental charge"))?;
        let security_deposit = pricing::security_deposit(
            line_items
                .iter()
                .map(|line| (line.replacement_value, line.quantity)),
            policy,
        )?;

        Ok(Self {
            id: RentalId::new(),
            customer_id: request.customer_id,
            line_items,
            period_unit: request.period_unit,
            duration: request.duration,
            start_date: request.start_date,
            end_date: request.end_date,
            status: RentalStatus::PendingPickup,
            security_deposit,
            rental_charge,
            extension_count: 0,
            late_fee_accrued: Money::zero(),
            damage_charges: Money::zero(),
            deposit_refunded: Money::zero(),
            amount_owed: Money::zero(),
            cancellation_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
            picked_up_at: None,
            completed_at: None,
            cancelled_at: None,
        })
    }

    pub fn line(&self, id: &LineItemId) -> Option<&RentalLineItem> {
        self.line_items.iter().find(|line| line.id == *id)
    }

    pub fn outstanding_quantity(&self) -> u32 {
        self.line_items.iter().map(RentalLineItem::outstanding).sum()
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        now > self.end_date
    }

    pub fn transition_to(&mut self, next: RentalStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RentalError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        self.updated_at = now;
        match next {
            RentalStatus::Completed => self.completed_at = Some(now),
            RentalStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        Ok(())
    }

    pub fn pick_up(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != RentalStatus::PendingPickup {
            return Err(RentalError::invalid_state("pick up", self.status));
        }
        self.transition_to(RentalStatus::Active, now)?;
        self.picked_up_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(RentalStatus::Cancelled) {
            return Err(RentalError::invalid_state("cancel", self.status));
        }
        self.transition_to(RentalStatus::Cancelled, now)?;
        self.cancellation_reason = Some(reason.to_string());
        Ok(())
    }

    /// Move a past-due active rental to `Overdue`. Returns whether the status changed.
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if self.status != RentalStatus::Active {
            return Err(RentalError::invalid_state("mark overdue", self.status));
        }
        if !self.is_past_due(now) {
            return Ok(false);
        }
        self.transition_to(RentalStatus::Overdue, now)?;
        Ok(true)
    }

    /// Extend by `additional` periods, charging only the increase over what was already charged
    pub fn extend(
        &mut self,
        additional: u32,
        policy: &RentalPolicy,
        now: DateTime<Utc>,
    ) -> Result<Money> {
        if self.status != RentalStatus::Active {
            return Err(RentalError::invalid_state("extend", self.status));
        }
        if self.extension_count >= policy.max_extensions {
            return Err(RentalError::ExtensionLimit {
                limit: policy.max_extensions,
            });
        }
        if additional == 0 {
            return Err(RentalError::validation("extension must add at least one period"));
        }

        let new_duration = self
            .duration
            .checked_add(additional)
            .ok_or_else(|| RentalError::validation("extended duration is too large"))?;
        let new_end = self
            .period_unit
            .advance(self.end_date, additional)
            .ok_or_else(|| RentalError::validation("extended end date is out of range"))?;

        let mut repriced = Vec::with_capacity(self.line_items.len());
        for line in &self.line_items {
            let charge = pricing::line_charge(
                &line.rates,
                line.quantity,
                self.period_unit,
                new_duration,
                policy,
            )?
            .ok_or_else(|| {
                RentalError::validation(format!("line {}: no rate resolvable", line.line_number))
            })?;
            repriced.push(charge);
        }

        let overflow = || RentalError::amount_overflow("extended rental charge");
        let mut line_charges = Vec::with_capacity(repriced.len());
        let mut delta_total = Money::zero();
        for (line, charge) in self.line_items.iter().zip(repriced) {
            let delta = charge.saturating_sub(line.rental_charge);
            line_charges.push(line.rental_charge.checked_add(delta).ok_or_else(overflow)?);
            delta_total = delta_total.checked_add(delta).ok_or_else(overflow)?;
        }
        let rental_charge = self
            .rental_charge
            .checked_add(delta_total)
            .ok_or_else(overflow)?;

        for (line, charge) in self.line_items.iter_mut().zip(line_charges) {
            line.rental_charge = charge;
        }
        self.rental_charge = rental_charge;
        self.duration = new_duration;
        self.end_date = new_end;
        self.extension_count += 1;
        self.updated_at = now;

        Ok(delta_total)
    }

    /// Apply a return event. Nothing is modified when the request is rejected.
    pub fn process_return(
        &mut self,
        returned: &[ReturnLine],
        policy: &RentalPolicy,
        now: DateTime<Utc>,
    ) -> Result<ReturnResult> {
        if !self.status.is_out() {
            return Err(RentalError::invalid_state("return", self.status));
        }
        if returned.is_empty() {
            return Err(RentalError::validation("return must contain at least one line"));
        }

        let mut requested: HashMap<LineItemId, u32> = HashMap::new();
        for entry in returned {
            if entry.quantity_returned == 0 {
                return Err(RentalError::validation(format!(
                    "line {}: returned quantity must be positive",
                    entry.line_id
                )));
            }
            if let Some(cost) = entry.damage.as_ref().and_then(|d| d.repair_cost) {
                if cost.is_negative() {
                    return Err(RentalError::validation(format!(
                        "line {}: repair cost must not be negative",
                        entry.line_id
                    )));
                }
            }
            let total = requested.entry(entry.line_id).or_insert(0);
            *total = total.saturating_add(entry.quantity_returned);
        }

        for (line_id, quantity) in &requested {
            let line = self.line(line_id).ok_or_else(|| {
                RentalError::validation(format!(
                    "line {line_id} does not belong to rental {}",
                    self.id
                ))
            })?;
            if *quantity > line.outstanding() {
                return Err(RentalError::validation(format!(
                    "line {}: returning {} but only {} outstanding",
                    line.line_number,
                    quantity,
                    line.outstanding()
                )));
            }
        }

        let days_late = fees::days_late(self.end_date, now);
        let mut outcomes = Vec::with_capacity(returned.len());
        for entry in returned {
            let Some(line) = self.line(&entry.line_id) else {
                continue;
            };
            let late_fee = fees::late_fee(
                &line.rates,
                line.replacement_value,
                entry.quantity_returned,
                days_late,
                policy,
            )?;
            let damage_charge = entry
                .damage
                .as_ref()
                .map(|assessment| {
                    fees::damage_charge(
                        assessment,
                        line.replacement_value,
                        entry.quantity_returned,
                        policy,
                    )
                })
                .transpose()?
                .unwrap_or_else(Money::zero);

            outcomes.push(ReturnLineOutcome {
                line_id: line.id,
                item_id: line.item_id.clone(),
                quantity_returned: entry.quantity_returned,
                late_fee,
                damage_category: entry.damage.as_ref().map(|d| d.category),
                damage_charge,
            });
        }

        let late_fee_total = Money::checked_sum(outcomes.iter().map(|o| o.late_fee))
            .ok_or_else(|| RentalError::amount_overflow("late fee total"))?;
        let damage_charge_total = Money::checked_sum(outcomes.iter().map(|o| o.damage_charge))
            .ok_or_else(|| RentalError::amount_overflow("damage charge total"))?;
        let late_fee_accrued = self
            .late_fee_accrued
            .checked_add(late_fee_total)
            .ok_or_else(|| RentalError::amount_overflow("accrued late fees"))?;
        let damage_charges = self
            .damage_charges
            .checked_add(damage_charge_total)
            .ok_or_else(|| RentalError::amount_overflow("accrued damage charges"))?;

        for line in &mut self.line_items {
            if let Some(quantity) = requested.get(&line.id) {
                line.quantity_returned += quantity;
            }
        }
        self.late_fee_accrued = late_fee_accrued;
        self.damage_charges = damage_charges;

        let next = if self.outstanding_quantity() == 0 {
            RentalStatus::Completed
        } else {
            RentalStatus::PartialReturn
        };
        self.transition_to(next, now)?;

        let settlement = DepositSettlement::compute(
            self.security_deposit,
            self.late_fee_accrued,
            self.damage_charges,
            next == RentalStatus::Completed,
        );
        self.amount_owed = settlement.amount_owed;
        self.deposit_refunded = settlement.refund;

        Ok(ReturnResult {
            rental_id: self.id,
            status: self.status,
            days_late,
            lines: outcomes,
            late_fee_total,
            damage_charge_total,
            settlement,
        })
    }
}
