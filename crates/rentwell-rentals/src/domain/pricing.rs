//! Rate resolution, duration discounts and deposit computation.
//!
//! Everything here is a pure function of the line's rates and the
//! [`RentalPolicy`]; the lifecycle engine and quotes share these functions so
//! a quoted price always equals the price charged at creation.

use crate::config::RentalPolicy;
use crate::domain::types::{Money, PeriodUnit};
use crate::error::{RentalError, Result};
use rentwell_common::ItemId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rate card of a catalog item, as resolved by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineRates {
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    #[serde(default)]
    pub daily_rate: Option<Decimal>,
    #[serde(default)]
    pub weekly_rate: Option<Decimal>,
    #[serde(default)]
    pub monthly_rate: Option<Decimal>,
}

impl LineRates {
    pub fn daily(rate: Decimal) -> Self {
        Self {
            daily_rate: Some(rate),
            ..Self::default()
        }
    }

    fn all(&self) -> [(&'static str, Option<Decimal>); 4] {
        [
            ("hourly_rate", self.hourly_rate),
            ("daily_rate", self.daily_rate),
            ("weekly_rate", self.weekly_rate),
            ("monthly_rate", self.monthly_rate),
        ]
    }

    fn for_unit(&self, unit: PeriodUnit) -> Option<Decimal> {
        match unit {
            PeriodUnit::Hour => self.hourly_rate,
            PeriodUnit::Day => self.daily_rate,
            PeriodUnit::Week => self.weekly_rate,
            PeriodUnit::Month => self.monthly_rate,
        }
    }
}

/// Line of a rental or quote request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub item_id: ItemId,
    pub quantity: u32,
    pub rates: LineRates,
    pub replacement_value: Money,
}

fn checked(value: Option<Decimal>, what: &str) -> Result<Decimal> {
    value.ok_or_else(|| RentalError::amount_overflow(what))
}

/// The rate of a line normalised to one day.
///
/// Daily rate if present, otherwise weekly / days_per_week, monthly /
/// days_per_month, hourly × hours_per_day, in that order. `Ok(None)` when the
/// line carries no rate at all.
pub fn daily_equivalent_rate(rates: &LineRates, policy: &RentalPolicy) -> Result<Option<Decimal>> {
    let daily = if let Some(daily) = rates.daily_rate {
        daily
    } else if let Some(weekly) = rates.weekly_rate {
        checked(weekly.checked_div(policy.days_per_week), "daily rate")?
    } else if let Some(monthly) = rates.monthly_rate {
        checked(monthly.checked_div(policy.days_per_month), "daily rate")?
    } else if let Some(hourly) = rates.hourly_rate {
        checked(hourly.checked_mul(policy.hours_per_day), "daily rate")?
    } else {
        return Ok(None);
    };
    Ok(Some(daily))
}

/// Rate for one period of `unit`: the matching rate field, or the
/// daily-equivalent rate scaled to the period.
pub fn base_rate(
    rates: &LineRates,
    unit: PeriodUnit,
    policy: &RentalPolicy,
) -> Result<Option<Decimal>> {
    if let Some(rate) = rates.for_unit(unit) {
        return Ok(Some(rate));
    }

    let Some(daily) = daily_equivalent_rate(rates, policy)? else {
        return Ok(None);
    };
    let scaled = match unit {
        PeriodUnit::Hour => daily.checked_div(policy.hours_per_day),
        PeriodUnit::Day => Some(daily),
        PeriodUnit::Week => daily.checked_mul(policy.days_per_week),
        PeriodUnit::Month => daily.checked_mul(policy.days_per_month),
    };
    checked(scaled, "base rate").map(Some)
}

/// Multiplier from the longest discount tier the duration reaches; 1 when none applies
pub fn discount_multiplier(unit: PeriodUnit, duration: u32, policy: &RentalPolicy) -> Decimal {
    if unit != PeriodUnit::Day {
        return Decimal::ONE;
    }

    policy
        .daily_discount_tiers
        .iter()
        .filter(|tier| duration >= tier.min_duration)
        .max_by_key(|tier| tier.min_duration)
        .map(|tier| tier.multiplier)
        .unwrap_or(Decimal::ONE)
}

/// `base_rate × duration × quantity × discount`, or `Ok(None)` when no rate resolves
pub fn line_charge(
    rates: &LineRates,
    quantity: u32,
    unit: PeriodUnit,
    duration: u32,
    policy: &RentalPolicy,
) -> Result<Option<Money>> {
    let Some(rate) = base_rate(rates, unit, policy)? else {
        return Ok(None);
    };
    let multiplier = discount_multiplier(unit, duration, policy);
    let charge = rate
        .checked_mul(Decimal::from(duration))
        .and_then(|c| c.checked_mul(Decimal::from(quantity)))
        .and_then(|c| c.checked_mul(multiplier));
    Ok(Some(Money::from_decimal(checked(charge, "rental charge")?)))
}

/// Deposit held against `units` of an item
pub fn deposit_share(replacement_value: Money, units: u32, policy: &RentalPolicy) -> Result<Money> {
    let share = replacement_value
        .as_decimal()
        .checked_mul(Decimal::from(units))
        .and_then(|value| value.checked_mul(policy.deposit_rate));
    checked(share, "deposit share").map(Money::from_decimal)
}

/// `deposit_rate × Σ(replacement_value × quantity)`
pub fn security_deposit<I>(lines: I, policy: &RentalPolicy) -> Result<Money>
where
    I: IntoIterator<Item = (Money, u32)>,
{
    let total_value = lines
        .into_iter()
        .try_fold(Decimal::ZERO, |total, (value, quantity)| {
            value
                .as_decimal()
                .checked_mul(Decimal::from(quantity))
                .and_then(|line_value| total.checked_add(line_value))
        });
    let deposit = checked(total_value, "replacement value")?.checked_mul(policy.deposit_rate);
    checked(deposit, "security deposit").map(Money::from_decimal)
}

/// Reject terms that no rental may be created with
pub fn validate_terms(
    line_items: &[NewLineItem],
    unit: PeriodUnit,
    duration: u32,
    policy: &RentalPolicy,
) -> Result<()> {
    if line_items.is_empty() {
        return Err(RentalError::validation("rental must contain at least one line item"));
    }

    if duration == 0 {
        return Err(RentalError::validation("duration must be positive"));
    }

    if unit == PeriodUnit::Hour && duration < policy.minimum_hourly_duration {
        return Err(RentalError::validation(format!(
            "hourly rentals require at least {} hours, got {}",
            policy.minimum_hourly_duration, duration
        )));
    }

    for (index, line) in line_items.iter().enumerate() {
        let line_number = index + 1;

        if line.quantity == 0 {
            return Err(RentalError::validation(format!(
                "line {line_number}: quantity must be positive"
            )));
        }

        if line.replacement_value.is_negative() {
            return Err(RentalError::validation(format!(
                "line {line_number}: replacement value must not be negative"
            )));
        }

        for (field, rate) in line.rates.all() {
            if rate.is_some_and(|r| r.is_sign_negative() && !r.is_zero()) {
                return Err(RentalError::validation(format!(
                    "line {line_number}: {field} must not be negative"
                )));
            }
        }

        if base_rate(&line.rates, unit, policy)?.is_none() {
            return Err(RentalError::validation(format!(
                "line {line_number}: no rate resolvable for {unit} rentals"
            )));
        }
    }

    Ok(())
}

/// Price request that is not persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub period_unit: PeriodUnit,
    pub duration: u32,
    pub line_items: Vec<NewLineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub line_number: u32,
    pub item_id: ItemId,
    pub quantity: u32,
    pub base_rate: Decimal,
    pub discount_multiplier: Decimal,
    pub charge: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub period_unit: PeriodUnit,
    pub duration: u32,
    pub lines: Vec<QuoteLine>,
    pub rental_charge: Money,
    pub security_deposit: Money,
}

pub fn quote(request: &QuoteRequest, policy: &RentalPolicy) -> Result<Quote> {
    validate_terms(&request.line_items, request.period_unit, request.duration, policy)?;

    let multiplier = discount_multiplier(request.period_unit, request.duration, policy);
    let mut lines = Vec::with_capacity(request.line_items.len());
    for (index, item) in request.line_items.iter().enumerate() {
        let line_number = index as u32 + 1;
        let unresolved = || {
            RentalError::validation(format!("line {line_number}: no rate resolvable"))
        };
        let rate = base_rate(&item.rates, request.period_unit, policy)?.ok_or_else(unresolved)?;
        let charge = line_charge(
            &item.rates,
            item.quantity,
            request.period_unit,
            request.duration,
            policy,
        )?
        .ok_or_else(unresolved)?;

        lines.push(QuoteLine {
            line_number,
            item_id: item.item_id.clone(),
            quantity: item.quantity,
            base_rate: rate,
            discount_multiplier: multiplier,
            charge,
        });
    }

    let rental_charge = Money::checked_sum(lines.iter().map(|line| line.charge))
        .ok_or_else(|| RentalError::amount_overflow("rental charge"))?;
    let security_deposit = security_deposit(
        request
            .line_items
            .iter()
            .map(|item| (item.replacement_value, item.quantity)),
        policy,
    )?;

    Ok(Quote {
        period_unit: request.period_unit,
        duration: request.duration,
        lines,
        rental_charge,
        security_deposit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(daily: Decimal, replacement: Decimal, quantity: u32) -> NewLineItem {
        NewLineItem {
            item_id: ItemId::new("drill-01").unwrap(),
            quantity,
            rates: LineRates::daily(daily),
            replacement_value: Money::from_decimal(replacement),
        }
    }

    #[test]
    fn test_daily_discount_boundaries() {
        let policy = RentalPolicy::default();
        let cases = [
            (1, dec!(1)),
            (6, dec!(1)),
            (7, dec!(0.9)),
            (29, dec!(0.9)),
            (30, dec!(0.8)),
            (90, dec!(0.8)),
        ];
        for (duration, expected) in cases {
            assert_eq!(
                discount_multiplier(PeriodUnit::Day, duration, &policy),
                expected,
                "duration {duration}"
            );
        }
    }

    #[test]
    fn test_discount_only_for_daily_rentals() {
        let policy = RentalPolicy::default();
        assert_eq!(discount_multiplier(PeriodUnit::Week, 40, &policy), Decimal::ONE);
        assert_eq!(discount_multiplier(PeriodUnit::Hour, 48, &policy), Decimal::ONE);
        assert_eq!(discount_multiplier(PeriodUnit::Month, 12, &policy), Decimal::ONE);
    }

    #[test]
    fn test_discount_tiers_order_independent() {
        let mut policy = RentalPolicy::default();
        policy.daily_discount_tiers.reverse();
        assert_eq!(discount_multiplier(PeriodUnit::Day, 31, &policy), dec!(0.8));
        assert_eq!(discount_multiplier(PeriodUnit::Day, 8, &policy), dec!(0.9));
    }

    #[test]
    fn test_daily_equivalent_rate_fallbacks() {
        let policy = RentalPolicy::default();

        let weekly = LineRates {
            weekly_rate: Some(dec!(700)),
            monthly_rate: Some(dec!(3000)),
            ..LineRates::default()
        };
        assert_eq!(daily_equivalent_rate(&weekly, &policy).unwrap(), Some(dec!(100)));

        let monthly = LineRates {
            monthly_rate: Some(dec!(3000)),
            ..LineRates::default()
        };
        assert_eq!(daily_equivalent_rate(&monthly, &policy).unwrap(), Some(dec!(100)));

        let hourly = LineRates {
            hourly_rate: Some(dec!(5)),
            ..LineRates::default()
        };
        assert_eq!(daily_equivalent_rate(&hourly, &policy).unwrap(), Some(dec!(120)));

        assert_eq!(daily_equivalent_rate(&LineRates::default(), &policy).unwrap(), None);
    }

    #[test]
    fn test_base_rate_prefers_matching_field() {
        let policy = RentalPolicy::default();
        let rates = LineRates {
            daily_rate: Some(dec!(100)),
            weekly_rate: Some(dec!(550)),
            ..LineRates::default()
        };
        assert_eq!(base_rate(&rates, PeriodUnit::Week, &policy).unwrap(), Some(dec!(550)));
        assert_eq!(base_rate(&rates, PeriodUnit::Month, &policy).unwrap(), Some(dec!(3000)));
        assert_eq!(
            base_rate(&rates, PeriodUnit::Hour, &policy)
                .unwrap()
                .map(|r| r.round_dp(4)),
            Some(dec!(4.1667))
        );
    }

    #[test]
    fn test_line_charge_applies_quantity_and_discount() {
        let policy = RentalPolicy::default();
        let rates = LineRates::daily(dec!(100));
        assert_eq!(
            line_charge(&rates, 1, PeriodUnit::Day, 10, &policy)
                .unwrap()
                .unwrap()
                .as_decimal(),
            dec!(900)
        );
        assert_eq!(
            line_charge(&rates, 2, PeriodUnit::Day, 30, &policy)
                .unwrap()
                .unwrap()
                .as_decimal(),
            dec!(4800)
        );
        assert_eq!(
            line_charge(&rates, 3, PeriodUnit::Day, 6, &policy)
                .unwrap()
                .unwrap()
                .as_decimal(),
            dec!(1800)
        );
    }

    #[test]
    fn test_security_deposit_is_twenty_percent() {
        let policy = RentalPolicy::default();
        let deposit = security_deposit(
            [
                (Money::from_decimal(dec!(500)), 1),
                (Money::from_decimal(dec!(250)), 4),
            ],
            &policy,
        )
        .unwrap();
        assert_eq!(deposit.as_decimal(), dec!(300));
    }

    #[test]
    fn test_validate_terms_rejections() {
        let policy = RentalPolicy::default();
        let lines = vec![item(dec!(100), dec!(500), 1)];

        assert!(matches!(
            validate_terms(&[], PeriodUnit::Day, 3, &policy),
            Err(RentalError::Validation { .. })
        ));
        assert!(validate_terms(&lines, PeriodUnit::Day, 0, &policy).is_err());
        assert!(validate_terms(&lines, PeriodUnit::Hour, 3, &policy).is_err());
        assert!(validate_terms(&lines, PeriodUnit::Hour, 4, &policy).is_ok());

        let zero_quantity = vec![item(dec!(100), dec!(500), 0)];
        assert!(validate_terms(&zero_quantity, PeriodUnit::Day, 3, &policy).is_err());

        let negative_rate = vec![item(dec!(-1), dec!(500), 1)];
        assert!(validate_terms(&negative_rate, PeriodUnit::Day, 3, &policy).is_err());

        let unpriced = vec![NewLineItem {
            rates: LineRates::default(),
            ..item(dec!(1), dec!(500), 1)
        }];
        assert!(validate_terms(&unpriced, PeriodUnit::Day, 3, &policy).is_err());
    }

    #[test]
    fn test_quote_totals() {
        let policy = RentalPolicy::default();
        let request = QuoteRequest {
            period_unit: PeriodUnit::Day,
            duration: 10,
            line_items: vec![item(dec!(100), dec!(500), 1), item(dec!(40), dec!(200), 2)],
        };

        let quote = quote(&request, &policy).unwrap();
        assert_eq!(quote.lines.len(), 2);
        assert_eq!(quote.lines[0].line_number, 1);
        assert_eq!(quote.lines[1].discount_multiplier, dec!(0.9));
        assert_eq!(quote.lines[1].charge.as_decimal(), dec!(720));
        assert_eq!(quote.rental_charge.as_decimal(), dec!(1620));
        assert_eq!(quote.security_deposit.as_decimal(), dec!(180));
    }

    #[test]
    fn test_oversized_amounts_rejected_not_panicking() {
        let policy = RentalPolicy::default();
        let request = QuoteRequest {
            period_unit: PeriodUnit::Day,
            duration: 1000,
            line_items: vec![item(dec!(10000000000000000000000000000), dec!(500), 1)],
        };
        assert!(matches!(
            quote(&request, &policy),
            Err(RentalError::Validation { .. })
        ));

        let rates = LineRates {
            hourly_rate: Some(Decimal::MAX),
            ..LineRates::default()
        };
        assert!(base_rate(&rates, PeriodUnit::Month, &policy).is_err());

        let huge = Money::from_decimal(Decimal::MAX / dec!(100));
        assert!(deposit_share(huge, 1000, &policy).is_err());
        assert!(security_deposit([(huge, 400), (huge, 400)], &policy).is_err());
    }
}
