use crate::domain::rentals::{Rental, RentalLineItem};
use crate::domain::types::{Money, PeriodUnit, RentalId, RentalStatus};
use crate::error::{RentalError, Result};
use async_trait::async_trait;
use rentwell_common::CustomerId;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};

/// Persistence for rental aggregates.
///
/// `update_rental` is a compare-and-swap on `version`: it succeeds only if the
/// stored rental still carries `expected_version`, so two callers racing on
/// the same rental cannot both win.
#[async_trait]
pub trait RentalRepository: Send + Sync {
    async fn create_rental(&self, rental: &Rental) -> Result<()>;
    async fn get_rental(&self, id: &RentalId) -> Result<Option<Rental>>;
    async fn update_rental(&self, rental: &Rental, expected_version: i64) -> Result<()>;
    async fn get_rentals_by_status(&self, status: RentalStatus) -> Result<Vec<Rental>>;
}

pub struct SqlRentalRepository {
    pool: PgPool,
}

impl SqlRentalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RentalError::DatabaseError {
                operation: "run_migrations".to_string(),
                source: Box::new(e),
            })
    }

    fn db_error(operation: &str, e: sqlx::Error) -> RentalError {
        RentalError::DatabaseError {
            operation: operation.to_string(),
            source: Box::new(e),
        }
    }

    fn decode_error(column: &str, details: impl ToString) -> RentalError {
        RentalError::DatabaseError {
            operation: format!("decode {column}"),
            source: details.to_string().into(),
        }
    }

    fn column<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        row.try_get(column)
            .map_err(|e| Self::db_error(&format!("read {column}"), e))
    }

    fn money(row: &PgRow, column: &str) -> Result<Money> {
        Self::column::<Decimal>(row, column).map(Money::from_decimal)
    }

    fn rental_from_row(row: &PgRow) -> Result<Rental> {
        let customer_id: String = Self::column(row, "customer_id")?;
        let status: String = Self::column(row, "status")?;
        let period_unit: String = Self::column(row, "period_unit")?;
        let duration: i32 = Self::column(row, "duration")?;
        let extension_count: i32 = Self::column(row, "extension_count")?;
        let line_items: serde_json::Value = Self::column(row, "line_items")?;

        Ok(Rental {
            id: RentalId::from_uuid(Self::column(row, "rental_id")?),
            customer_id: CustomerId::new(customer_id)
                .map_err(|e| Self::decode_error("customer_id", e))?,
            line_items: serde_json::from_value::<Vec<RentalLineItem>>(line_items)?,
            period_unit: period_unit
                .parse::<PeriodUnit>()
                .map_err(|e| Self::decode_error("period_unit", e))?,
            duration: u32::try_from(duration).map_err(|e| Self::decode_error("duration", e))?,
            start_date: Self::column(row, "start_date")?,
            end_date: Self::column(row, "end_date")?,
            status: status
                .parse::<RentalStatus>()
                .map_err(|e| Self::decode_error("status", e))?,
            security_deposit: Self::money(row, "security_deposit")?,
            rental_charge: Self::money(row, "rental_charge")?,
            extension_count: u32::try_from(extension_count)
                .map_err(|e| Self::decode_error("extension_count", e))?,
            late_fee_accrued: Self::money(row, "late_fee_accrued")?,
            damage_charges: Self::money(row, "damage_charges")?,
            deposit_refunded: Self::money(row, "deposit_refunded")?,
            amount_owed: Self::money(row, "amount_owed")?,
            cancellation_reason: Self::column(row, "cancellation_reason")?,
            version: Self::column(row, "version")?,
            created_at: Self::column(row, "created_at")?,
            updated_at: Self::column(row, "updated_at")?,
            picked_up_at: Self::column(row, "picked_up_at")?,
            completed_at: Self::column(row, "completed_at")?,
            cancelled_at: Self::column(row, "cancelled_at")?,
        })
    }

    fn count(value: u32, column: &str) -> Result<i32> {
        i32::try_from(value).map_err(|e| Self::decode_error(column, e))
    }
}

#[async_trait]
impl RentalRepository for SqlRentalRepository {
    async fn create_rental(&self, rental: &Rental) -> Result<()> {
        let line_items = serde_json::to_value(&rental.line_items)?;

        sqlx::query(
            r#"
            INSERT INTO rentwell.rentals
            (rental_id, customer_id, status, period_unit, duration, start_date, end_date,
             security_deposit, rental_charge, extension_count, late_fee_accrued,
             damage_charges, deposit_refunded, amount_owed, line_items, cancellation_reason,
             version, created_at, updated_at, picked_up_at, completed_at, cancelled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(rental.id.as_uuid())
        .bind(rental.customer_id.as_str())
        .bind(rental.status.as_str())
        .bind(rental.period_unit.to_string())
        .bind(Self::count(rental.duration, "duration")?)
        .bind(rental.start_date)
        .bind(rental.end_date)
        .bind(rental.security_deposit.as_decimal())
        .bind(rental.rental_charge.as_decimal())
        .bind(Self::count(rental.extension_count, "extension_count")?)
        .bind(rental.late_fee_accrued.as_decimal())
        .bind(rental.damage_charges.as_decimal())
        .bind(rental.deposit_refunded.as_decimal())
        .bind(rental.amount_owed.as_decimal())
        .bind(line_items)
        .bind(rental.cancellation_reason.as_deref())
        .bind(rental.version)
        .bind(rental.created_at)
        .bind(rental.updated_at)
        .bind(rental.picked_up_at)
        .bind(rental.completed_at)
        .bind(rental.cancelled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("create_rental", e))?;

        Ok(())
    }

    async fn get_rental(&self, id: &RentalId) -> Result<Option<Rental>> {
        let row = sqlx::query(
            r#"
            SELECT rental_id, customer_id, status, period_unit, duration, start_date, end_date,
                   security_deposit, rental_charge, extension_count, late_fee_accrued,
                   damage_charges, deposit_refunded, amount_owed, line_items,
                   cancellation_reason, version, created_at, updated_at, picked_up_at,
                   completed_at, cancelled_at
            FROM rentwell.rentals
            WHERE rental_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::db_error("get_rental", e))?;

        row.as_ref().map(Self::rental_from_row).transpose()
    }

    async fn update_rental(&self, rental: &Rental, expected_version: i64) -> Result<()> {
        let line_items = serde_json::to_value(&rental.line_items)?;

        let result = sqlx::query(
            r#"
            UPDATE rentwell.rentals
            SET status = $3, duration = $4, end_date = $5, rental_charge = $6,
                extension_count = $7, late_fee_accrued = $8, damage_charges = $9,
                deposit_refunded = $10, amount_owed = $11, line_items = $12,
                cancellation_reason = $13, version = $14, updated_at = $15,
                picked_up_at = $16, completed_at = $17, cancelled_at = $18
            WHERE rental_id = $1 AND version = $2
            "#,
        )
        .bind(rental.id.as_uuid())
        .bind(expected_version)
        .bind(rental.status.as_str())
        .bind(Self::count(rental.duration, "duration")?)
        .bind(rental.end_date)
        .bind(rental.rental_charge.as_decimal())
        .bind(Self::count(rental.extension_count, "extension_count")?)
        .bind(rental.late_fee_accrued.as_decimal())
        .bind(rental.damage_charges.as_decimal())
        .bind(rental.deposit_refunded.as_decimal())
        .bind(rental.amount_owed.as_decimal())
        .bind(line_items)
        .bind(rental.cancellation_reason.as_deref())
        .bind(rental.version)
        .bind(rental.updated_at)
        .bind(rental.picked_up_at)
        .bind(rental.completed_at)
        .bind(rental.cancelled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_error("update_rental", e))?;

        if result.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM rentwell.rentals WHERE rental_id = $1)",
            )
            .bind(rental.id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::db_error("update_rental", e))?;

            return Err(if exists {
                RentalError::ConcurrentModification {
                    id: rental.id.to_string(),
                    expected_version,
                }
            } else {
                RentalError::RentalNotFound {
                    id: rental.id.to_string(),
                }
            });
        }

        Ok(())
    }

    async fn get_rentals_by_status(&self, status: RentalStatus) -> Result<Vec<Rental>> {
        let rows = sqlx::query(
            r#"
            SELECT rental_id, customer_id, status, period_unit, duration, start_date, end_date,
                   security_deposit, rental_charge, extension_count, late_fee_accrued,
                   damage_charges, deposit_refunded, amount_owed, line_items,
                   cancellation_reason, version, created_at, updated_at, picked_up_at,
                   completed_at, cancelled_at
            FROM rentwell.rentals
            WHERE status = $1
            ORDER BY created_at
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_error("get_rentals_by_status", e))?;

        rows.iter().map(Self::rental_from_row).collect()
    }
}
