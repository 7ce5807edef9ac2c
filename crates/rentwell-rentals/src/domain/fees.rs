//! Late fees, damage charges and deposit settlement

use crate::config::RentalPolicy;
use crate::domain::pricing::{daily_equivalent_rate, deposit_share, LineRates};
use crate::domain::types::{DamageCategory, Money};
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Condition report for returned units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageAssessment {
    pub category: DamageCategory,
    #[serde(default)]
    pub repair_cost: Option<Money>,
}

impl DamageAssessment {
    pub fn new(category: DamageCategory) -> Self {
        Self {
            category,
            repair_cost: None,
        }
    }

    pub fn with_repair_cost(mut self, cost: Money) -> Self {
        self.repair_cost = Some(cost);
        self
    }
}

/// Whole days elapsed since `end_date`, never negative
pub fn days_late(end_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - end_date).num_days().max(0)
}

/// Late fee for `units` returned `days_late` days after the due date.
///
/// Zero inside the grace period; otherwise
/// `days_late × daily_equivalent_rate × multiplier × units`, capped at the
/// deposit share of those units. A fee too large to represent is the cap.
pub fn late_fee(
    rates: &LineRates,
    replacement_value: Money,
    units: u32,
    days_late: i64,
    policy: &RentalPolicy,
) -> Result<Money> {
    if days_late <= policy.grace_period_days {
        return Ok(Money::zero());
    }

    let Some(daily) = daily_equivalent_rate(rates, policy)? else {
        return Ok(Money::zero());
    };

    let cap = deposit_share(replacement_value, units, policy)?;
    let fee = Decimal::from(days_late)
        .checked_mul(daily)
        .and_then(|fee| fee.checked_mul(policy.late_fee_multiplier))
        .and_then(|fee| fee.checked_mul(Decimal::from(units)));
    Ok(match fee {
        Some(fee) => Money::from_decimal(fee).min(cap),
        None => cap,
    })
}

/// Charge for damage to `units` of an item.
///
/// | Category | Charge |
/// |---|---|
/// | A | 0 |
/// | B | deposit share × `damage.category_b` |
/// | C | deposit share × `damage.category_c` |
/// | D | deposit share × `damage.category_d` |
/// | E | full replacement value |
///
/// A repair cost raises the charge to at least that cost; the result never
/// exceeds the replacement value of the units.
pub fn damage_charge(
    assessment: &DamageAssessment,
    replacement_value: Money,
    units: u32,
    policy: &RentalPolicy,
) -> Result<Money> {
    let replacement = replacement_value
        .checked_mul(Decimal::from(units))
        .ok_or_else(|| RentalError::amount_overflow("replacement value"))?;
    let share = deposit_share(replacement_value, units, policy)?;

    let fraction = match assessment.category {
        DamageCategory::A => Decimal::ZERO,
        DamageCategory::B => policy.damage.category_b,
        DamageCategory::C => policy.damage.category_c,
        DamageCategory::D => policy.damage.category_d,
        DamageCategory::E => return Ok(replacement),
    };
    let category_charge = share
        .checked_mul(fraction)
        .ok_or_else(|| RentalError::amount_overflow("damage charge"))?;

    Ok(category_charge.max(repair_floor(assessment)).min(replacement))
}

fn repair_floor(assessment: &DamageAssessment) -> Money {
    assessment.repair_cost.unwrap_or_else(Money::zero)
}

/// Outcome of settling charges against the security deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositSettlement {
    pub security_deposit: Money,
    pub late_fees: Money,
    pub damage_charges: Money,
    /// Amount handed back; only non-zero once the rental is final
    pub refund: Money,
    /// Charges in excess of the deposit, owed by the customer
    pub amount_owed: Money,
    pub is_final: bool,
}

impl DepositSettlement {
    pub fn compute(
        security_deposit: Money,
        late_fees: Money,
        damage_charges: Money,
        is_final: bool,
    ) -> Self {
        let charges = late_fees.saturating_add(damage_charges);
        let refund = if is_final {
            security_deposit.saturating_sub(charges)
        } else {
            Money::zero()
        };

        Self {
            security_deposit,
            late_fees,
            damage_charges,
            refund,
            amount_owed: charges.saturating_sub(security_deposit),
            is_final,
        }
    }

    /// Deposit not yet consumed by charges
    pub fn deposit_remaining(&self) -> Money {
        self.security_deposit
            .saturating_sub(self.late_fees.saturating_add(self.damage_charges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn money(amount: Decimal) -> Money {
        Money::from_decimal(amount)
    }

    #[test]
    fn test_days_late_counts_whole_days() {
        let due = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(days_late(due, due - Duration::days(2)), 0);
        assert_eq!(days_late(due, due), 0);
        assert_eq!(days_late(due, due + Duration::hours(23)), 0);
        assert_eq!(days_late(due, due + Duration::hours(49)), 2);
    }

    #[test]
    fn test_late_fee_grace_period() {
        let policy = RentalPolicy::default();
        let rates = LineRates::daily(dec!(100));
        for days in [0, 1] {
            let fee = late_fee(&rates, money(dec!(5000)), 1, days, &policy).unwrap();
            assert_eq!(fee, Money::zero());
        }
    }

    #[test]
    fn test_late_fee_three_days() {
        let policy = RentalPolicy::default();
        let rates = LineRates::daily(dec!(100));
        let fee = late_fee(&rates, money(dec!(5000)), 1, 3, &policy).unwrap();
        assert_eq!(fee.as_decimal(), dec!(450));
    }

    #[test]
    fn test_late_fee_capped_at_deposit_share() {
        let policy = RentalPolicy::default();
        let rates = LineRates::daily(dec!(100));
        // share = 500 × 0.2 = 100
        let fee = late_fee(&rates, money(dec!(500)), 1, 3, &policy).unwrap();
        assert_eq!(fee.as_decimal(), dec!(100));

        // two units double both the fee and the cap
        let fee = late_fee(&rates, money(dec!(2000)), 2, 2, &policy).unwrap();
        assert_eq!(fee.as_decimal(), dec!(600));
    }

    #[test]
    fn test_late_fee_uses_daily_equivalent() {
        let policy = RentalPolicy::default();
        let rates = LineRates {
            weekly_rate: Some(dec!(350)),
            ..LineRates::default()
        };
        // 50/day × 1.5 × 4 days
        let fee = late_fee(&rates, money(dec!(10000)), 1, 4, &policy).unwrap();
        assert_eq!(fee.as_decimal(), dec!(300));
    }

    #[test]
    fn test_enormous_lateness_hits_cap() {
        let policy = RentalPolicy::default();
        let rates = LineRates::daily(dec!(9000000000000000000000000));
        let fee = late_fee(&rates, money(dec!(500)), 1, i64::MAX, &policy).unwrap();
        assert_eq!(fee.as_decimal(), dec!(100));
    }

    #[test]
    fn test_damage_overflow_is_an_error() {
        let policy = RentalPolicy::default();
        let huge = money(Decimal::MAX / dec!(100));
        let assessment = DamageAssessment::new(DamageCategory::E);
        assert!(matches!(
            damage_charge(&assessment, huge, 1000, &policy),
            Err(RentalError::Validation { .. })
        ));
    }

    #[test]
    fn test_damage_categories() {
        let policy = RentalPolicy::default();
        let value = money(dec!(500));
        let charge = |category| {
            damage_charge(&DamageAssessment::new(category), value, 1, &policy).unwrap()
        };

        assert_eq!(charge(DamageCategory::A), Money::zero());
        assert_eq!(charge(DamageCategory::B).as_decimal(), dec!(10));
        assert_eq!(charge(DamageCategory::C).as_decimal(), dec!(50));
        assert_eq!(charge(DamageCategory::D).as_decimal(), dec!(100));
        assert_eq!(charge(DamageCategory::E).as_decimal(), dec!(500));
    }

    #[test]
    fn test_category_e_charges_full_replacement() {
        let policy = RentalPolicy::default();
        let assessment = DamageAssessment::new(DamageCategory::E).with_repair_cost(money(dec!(50)));
        let charge = damage_charge(&assessment, money(dec!(800)), 3, &policy).unwrap();
        assert_eq!(charge.as_decimal(), dec!(2400));
    }

    #[test]
    fn test_repair_cost_raises_charge_up_to_replacement() {
        let policy = RentalPolicy::default();
        let value = money(dec!(500));

        let repair = DamageAssessment::new(DamageCategory::B).with_repair_cost(money(dec!(75)));
        assert_eq!(damage_charge(&repair, value, 1, &policy).unwrap().as_decimal(), dec!(75));

        let cheap = DamageAssessment::new(DamageCategory::C).with_repair_cost(money(dec!(5)));
        assert_eq!(damage_charge(&cheap, value, 1, &policy).unwrap().as_decimal(), dec!(50));

        let expensive =
            DamageAssessment::new(DamageCategory::D).with_repair_cost(money(dec!(900)));
        assert_eq!(
            damage_charge(&expensive, value, 1, &policy).unwrap().as_decimal(),
            dec!(500)
        );

        let zero = DamageAssessment::new(DamageCategory::B).with_repair_cost(Money::zero());
        assert_eq!(damage_charge(&zero, value, 1, &policy).unwrap().as_decimal(), dec!(10));
    }

    #[test]
    fn test_settlement_refund_and_owed() {
        let deposit = money(dec!(100));

        let settled = DepositSettlement::compute(deposit, money(dec!(100)), money(dec!(10)), true);
        assert_eq!(settled.refund, Money::zero());
        assert_eq!(settled.amount_owed.as_decimal(), dec!(10));
        assert_eq!(settled.deposit_remaining(), Money::zero());

        let partial = DepositSettlement::compute(deposit, money(dec!(20)), money(dec!(5)), true);
        assert_eq!(partial.refund.as_decimal(), dec!(75));
        assert_eq!(partial.amount_owed, Money::zero());
    }

    #[test]
    fn test_settlement_holds_deposit_until_final() {
        let deposit = money(dec!(100));
        let provisional = DepositSettlement::compute(deposit, money(dec!(20)), Money::zero(), false);
        assert_eq!(provisional.refund, Money::zero());
        assert_eq!(provisional.amount_owed, Money::zero());
        assert_eq!(provisional.deposit_remaining().as_decimal(), dec!(80));
    }
}
