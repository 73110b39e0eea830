//! Postgres-backed stock ledger implementation.
//!
//! The conditional primitives are single-row atomic `UPDATE` statements, so
//! the check-and-decrement is indivisible at the database level and the
//! running quantity can never be observed negative:
//!
//! ```sql
//! UPDATE stock_records
//!    SET quantity = quantity - $2, version = version + 1
//!  WHERE product_id = $1 AND quantity >= $2 [AND version = $3]
//! RETURNING quantity, version
//! ```
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE stock_records (
//!     product_id      UUID PRIMARY KEY,
//!     quantity        BIGINT NOT NULL CHECK (quantity >= 0),
//!     version         BIGINT NOT NULL,
//!     provisioned_at  TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! ## Thread Safety
//!
//! `PostgresStockLedger` is `Send + Sync`; all operations go through the SQLx
//! connection pool.

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;

use stockgate_core::{ExpectedVersion, ProductId};
use stockgate_stock::StockSnapshot;

use super::r#trait::{LedgerError, StockLedger};

/// Postgres-backed stock ledger.
///
/// The `StockLedger` trait is synchronous; Postgres operations require async.
/// Trait methods bridge through `tokio::runtime::Handle`, which works when
/// called from within a tokio runtime (e.g. from axum handlers).
#[derive(Debug, Clone)]
pub struct PostgresStockLedger {
    pool: Arc<PgPool>,
}

impl PostgresStockLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(product_id = %product_id.as_uuid()), err)]
    pub async fn provision_async(
        &self,
        product_id: ProductId,
        initial_quantity: u64,
    ) -> Result<StockSnapshot, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_records (product_id, quantity, version)
            VALUES ($1, $2, 1)
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(initial_quantity as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("provision", e))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyExists(product_id));
        }

        Ok(StockSnapshot {
            product_id,
            quantity: initial_quantity,
            version: 1,
        })
    }

    #[instrument(skip(self), fields(product_id = %product_id.as_uuid()), err)]
    pub async fn get_async(&self, product_id: ProductId) -> Result<StockSnapshot, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT quantity, version
            FROM stock_records
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?
        .ok_or(LedgerError::NotFound)?;

        snapshot_from_row(product_id, &row)
    }

    #[instrument(skip(self), fields(product_id = %product_id.as_uuid(), qty), err)]
    pub async fn debit_async(
        &self,
        product_id: ProductId,
        qty: u64,
        expected: ExpectedVersion,
    ) -> Result<StockSnapshot, LedgerError> {
        let row = match expected {
            ExpectedVersion::Any => {
                sqlx::query(
                    r#"
                    UPDATE stock_records
                    SET quantity = quantity - $2, version = version + 1
                    WHERE product_id = $1 AND quantity >= $2
                    RETURNING quantity, version
                    "#,
                )
                .bind(product_id.as_uuid())
                .bind(qty as i64)
                .fetch_optional(&*self.pool)
                .await
            }
            ExpectedVersion::Exact(v) => {
                sqlx::query(
                    r#"
                    UPDATE stock_records
                    SET quantity = quantity - $2, version = version + 1
                    WHERE product_id = $1 AND quantity >= $2 AND version = $3
                    RETURNING quantity, version
                    "#,
                )
                .bind(product_id.as_uuid())
                .bind(qty as i64)
                .bind(v as i64)
                .fetch_optional(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("debit", e))?;

        match row {
            Some(row) => snapshot_from_row(product_id, &row),
            // The update matched no row: read back to tell the caller which
            // precondition failed.
            None => {
                let current = self.get_async(product_id).await?;
                if current.quantity < qty {
                    Err(LedgerError::Insufficient {
                        available: current.quantity,
                        requested: qty,
                    })
                } else {
                    Err(LedgerError::Conflict(format!(
                        "expected {expected:?}, found {}",
                        current.version
                    )))
                }
            }
        }
    }

    #[instrument(skip(self), fields(product_id = %product_id.as_uuid(), qty), err)]
    pub async fn release_async(
        &self,
        product_id: ProductId,
        qty: u64,
    ) -> Result<StockSnapshot, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE stock_records
            SET quantity = quantity + $2, version = version + 1
            WHERE product_id = $1
            RETURNING quantity, version
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(qty as i64)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("release", e))?
        .ok_or(LedgerError::NotFound)?;

        snapshot_from_row(product_id, &row)
    }

    fn runtime_handle() -> Result<tokio::runtime::Handle, LedgerError> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            LedgerError::Storage(
                "PostgresStockLedger requires an async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
            )
        })
    }
}

impl StockLedger for PostgresStockLedger {
    fn provision(
        &self,
        product_id: ProductId,
        initial_quantity: u64,
    ) -> Result<StockSnapshot, LedgerError> {
        let handle = Self::runtime_handle()?;
        handle.block_on(self.provision_async(product_id, initial_quantity))
    }

    fn get(&self, product_id: ProductId) -> Result<StockSnapshot, LedgerError> {
        let handle = Self::runtime_handle()?;
        handle.block_on(self.get_async(product_id))
    }

    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        let handle = Self::runtime_handle()?;
        handle.block_on(self.debit_async(product_id, qty, ExpectedVersion::Any))
    }

    fn debit_if_version(
        &self,
        product_id: ProductId,
        qty: u64,
        expected: ExpectedVersion,
    ) -> Result<StockSnapshot, LedgerError> {
        let handle = Self::runtime_handle()?;
        handle.block_on(self.debit_async(product_id, qty, expected))
    }

    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        let handle = Self::runtime_handle()?;
        handle.block_on(self.release_async(product_id, qty))
    }
}

fn snapshot_from_row(
    product_id: ProductId,
    row: &sqlx::postgres::PgRow,
) -> Result<StockSnapshot, LedgerError> {
    let quantity: i64 = row
        .try_get("quantity")
        .map_err(|e| LedgerError::Storage(format!("failed to read quantity column: {e}")))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| LedgerError::Storage(format!("failed to read version column: {e}")))?;

    Ok(StockSnapshot {
        product_id,
        quantity: quantity.max(0) as u64,
        version: version.max(0) as u64,
    })
}

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(format!("{operation} failed: {e}"))
}
