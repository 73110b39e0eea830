use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockgate_core::{DomainError, ProductId};

/// Hard ceiling on provisioned stock, carried over from the provisioning
/// collaborator's business rules.
pub const MAX_PROVISIONED_STOCK: u64 = 1_000_000;

/// Authoritative per-product stock record.
///
/// `quantity` can never be observed negative; `version` increases by exactly
/// one on every successful mutation. The record itself is pure data — all
/// concurrency control lives in the ledger that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    product_id: ProductId,
    quantity: u64,
    version: u64,
    provisioned_at: DateTime<Utc>,
}

/// Point-in-time read of a record's mutable state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product_id: ProductId,
    pub quantity: u64,
    pub version: u64,
}

impl StockRecord {
    /// Provision a new record at version 1.
    pub fn provision(
        product_id: ProductId,
        initial_quantity: u64,
        provisioned_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if initial_quantity > MAX_PROVISIONED_STOCK {
            return Err(DomainError::validation_field(
                format!("stock quantity exceeds maximum allowed ({MAX_PROVISIONED_STOCK})"),
                "initial_stock",
            ));
        }

        Ok(Self {
            product_id,
            quantity: initial_quantity,
            version: 1,
            provisioned_at,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn provisioned_at(&self) -> DateTime<Utc> {
        self.provisioned_at
    }

    pub fn snapshot(&self) -> StockSnapshot {
        StockSnapshot {
            product_id: self.product_id,
            quantity: self.quantity,
            version: self.version,
        }
    }

    /// Compute the successor record after reserving `qty` units.
    ///
    /// Pure check-then-decrement: does not mutate `self`. The caller (the
    /// ledger) is responsible for making the read-compute-store cycle atomic.
    pub fn debit(&self, qty: u64) -> Result<StockRecord, DomainError> {
        if qty == 0 {
            return Err(DomainError::validation_field(
                "quantity must be greater than 0",
                "quantity",
            ));
        }
        if self.quantity < qty {
            return Err(DomainError::insufficient_stock(self.quantity, qty));
        }

        Ok(StockRecord {
            quantity: self.quantity - qty,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Compute the successor record after releasing `qty` units back.
    ///
    /// Compensating operation: unconditional except for overflow, which is
    /// clamped at the provisioning ceiling's type bound.
    pub fn credit(&self, qty: u64) -> StockRecord {
        StockRecord {
            quantity: self.quantity.saturating_add(qty),
            version: self.version + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_record(quantity: u64) -> StockRecord {
        StockRecord::provision(ProductId::new(), quantity, Utc::now()).unwrap()
    }

    #[test]
    fn provision_starts_at_version_one() {
        let rec = test_record(10);
        assert_eq!(rec.quantity(), 10);
        assert_eq!(rec.version(), 1);
    }

    #[test]
    fn provision_rejects_excessive_stock() {
        let err =
            StockRecord::provision(ProductId::new(), MAX_PROVISIONED_STOCK + 1, Utc::now())
                .unwrap_err();
        match err {
            DomainError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("initial_stock"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn debit_decrements_and_bumps_version() {
        let rec = test_record(10);
        let next = rec.debit(3).unwrap();
        assert_eq!(next.quantity(), 7);
        assert_eq!(next.version(), 2);
        // Original is untouched.
        assert_eq!(rec.quantity(), 10);
        assert_eq!(rec.version(), 1);
    }

    #[test]
    fn debit_to_exactly_zero_succeeds() {
        let rec = test_record(5);
        let next = rec.debit(5).unwrap();
        assert_eq!(next.quantity(), 0);
    }

    #[test]
    fn debit_beyond_available_reports_figures() {
        let rec = test_record(3);
        let err = rec.debit(5).unwrap_err();
        match err {
            DomainError::InsufficientStock {
                available,
                requested,
            } => {
                assert_eq!(available, 3);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn debit_zero_is_a_validation_error() {
        let rec = test_record(3);
        let err = rec.debit(0).unwrap_err();
        match err {
            DomainError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("quantity"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn credit_increments_and_bumps_version() {
        let rec = test_record(2);
        let next = rec.credit(4);
        assert_eq!(next.quantity(), 6);
        assert_eq!(next.version(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: debit-then-credit of the same quantity restores the
        /// starting quantity exactly, and each step bumps the version by one.
        #[test]
        fn debit_credit_round_trip(start in 1u64..1_000_000, qty in 1u64..1_000) {
            prop_assume!(qty <= start);
            let rec = test_record(start);
            let debited = rec.debit(qty).unwrap();
            let restored = debited.credit(qty);
            prop_assert_eq!(restored.quantity(), start);
            prop_assert_eq!(restored.version(), rec.version() + 2);
        }

        /// Property: a failed debit never exists — either it succeeds with
        /// quantity reduced by exactly qty, or the record is unchanged.
        #[test]
        fn debit_is_all_or_nothing(start in 0u64..1_000, qty in 1u64..2_000) {
            let rec = test_record(start);
            match rec.debit(qty) {
                Ok(next) => {
                    prop_assert!(qty <= start);
                    prop_assert_eq!(next.quantity(), start - qty);
                }
                Err(_) => {
                    prop_assert_eq!(rec.quantity(), start);
                    prop_assert_eq!(rec.version(), 1);
                }
            }
        }
    }
}
