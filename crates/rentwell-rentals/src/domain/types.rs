use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Rental identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RentalId(Uuid);

impl RentalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RentalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RentalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RentalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of one line within a rental
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemId(Uuid);

impl LineItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LineItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LineItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monetary amount, kept at cent precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const SCALE: u32 = 2;

    pub fn zero() -> Self {
        Self::from_decimal(Decimal::ZERO)
    }

    pub fn from_decimal(amount: Decimal) -> Self {
        let mut rounded =
            amount.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(Self::SCALE);
        Self(rounded)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Self::from_decimal)
    }

    /// Sum that saturates at the largest representable amount
    pub fn saturating_add(&self, other: Money) -> Self {
        Self::from_decimal(self.0.saturating_add(other.0))
    }

    pub fn subtract(&self, other: Money) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self::from_decimal(self.0 - other.0))
        } else {
            None
        }
    }

    /// Difference clamped at zero
    pub fn saturating_sub(&self, other: Money) -> Self {
        self.subtract(other).unwrap_or_else(Money::zero)
    }

    pub fn checked_mul(&self, factor: Decimal) -> Option<Self> {
        self.0.checked_mul(factor).map(Self::from_decimal)
    }

    /// Total of `amounts`, or `None` if it leaves the representable range
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |total, amount| total.checked_add(amount))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::from_decimal(amount)
    }
}

impl From<Money> for Decimal {
    fn from(amount: Money) -> Self {
        amount.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit in which a rental's duration is counted and priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl PeriodUnit {
    /// Move `start` forward by `count` periods. Months are calendar months.
    pub fn advance(&self, start: DateTime<Utc>, count: u32) -> Option<DateTime<Utc>> {
        match self {
            PeriodUnit::Hour => start.checked_add_signed(Duration::hours(i64::from(count))),
            PeriodUnit::Day => start.checked_add_signed(Duration::days(i64::from(count))),
            PeriodUnit::Week => start.checked_add_signed(Duration::weeks(i64::from(count))),
            PeriodUnit::Month => start.checked_add_months(Months::new(count)),
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodUnit::Hour => write!(f, "hour"),
            PeriodUnit::Day => write!(f, "day"),
            PeriodUnit::Week => write!(f, "week"),
            PeriodUnit::Month => write!(f, "month"),
        }
    }
}

impl FromStr for PeriodUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(PeriodUnit::Hour),
            "day" => Ok(PeriodUnit::Day),
            "week" => Ok(PeriodUnit::Week),
            "month" => Ok(PeriodUnit::Month),
            other => Err(format!("unknown period unit: {other}")),
        }
    }
}

/// Rental lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    PendingPickup,
    Active,
    Overdue,
    PartialReturn,
    Completed,
    Cancelled,
}

impl RentalStatus {
    pub const ALL: [RentalStatus; 6] = [
        RentalStatus::PendingPickup,
        RentalStatus::Active,
        RentalStatus::Overdue,
        RentalStatus::PartialReturn,
        RentalStatus::Completed,
        RentalStatus::Cancelled,
    ];

    /// States reachable from this one in a single operation
    pub fn allowed_transitions(&self) -> &'static [RentalStatus] {
        use RentalStatus::*;
        match self {
            PendingPickup => &[Active, Cancelled],
            Active => &[Overdue, PartialReturn, Completed, Cancelled],
            Overdue => &[PartialReturn, Completed],
            PartialReturn => &[PartialReturn, Completed],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: RentalStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Whether equipment is out with the customer
    pub fn is_out(&self) -> bool {
        matches!(
            self,
            RentalStatus::Active | RentalStatus::Overdue | RentalStatus::PartialReturn
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::PendingPickup => "pending_pickup",
            RentalStatus::Active => "active",
            RentalStatus::Overdue => "overdue",
            RentalStatus::PartialReturn => "partial_return",
            RentalStatus::Completed => "completed",
            RentalStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RentalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RentalStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown rental status: {s}"))
    }
}

/// Condition of returned equipment, from like-new (A) to total loss (E)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DamageCategory {
    A,
    B,
    C,
    D,
    E,
}

impl fmt::Display for DamageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DamageCategory::A => "A",
            DamageCategory::B => "B",
            DamageCategory::C => "C",
            DamageCategory::D => "D",
            DamageCategory::E => "E",
        };
        f.write_str(label)
    }
}
