use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use stockgate_core::{DomainError, ExpectedVersion, ProductId};
use stockgate_stock::{StockRecord, StockSnapshot};

use super::r#trait::{LedgerError, StockLedger};

/// In-memory stock ledger.
///
/// Intended for tests/dev. Mutations take the write lock, which makes every
/// conditional primitive indivisible with respect to concurrent callers.
#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    records: RwLock<HashMap<ProductId, StockRecord>>,
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn map_domain(e: DomainError) -> LedgerError {
        match e {
            DomainError::InsufficientStock {
                available,
                requested,
            } => LedgerError::Insufficient {
                available,
                requested,
            },
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
            DomainError::NotFound => LedgerError::NotFound,
            other => LedgerError::Storage(other.to_string()),
        }
    }
}

impl StockLedger for InMemoryStockLedger {
    fn provision(
        &self,
        product_id: ProductId,
        initial_quantity: u64,
    ) -> Result<StockSnapshot, LedgerError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        if records.contains_key(&product_id) {
            return Err(LedgerError::AlreadyExists(product_id));
        }

        let record = StockRecord::provision(product_id, initial_quantity, Utc::now())
            .map_err(Self::map_domain)?;
        let snapshot = record.snapshot();
        records.insert(product_id, record);
        Ok(snapshot)
    }

    fn get(&self, product_id: ProductId) -> Result<StockSnapshot, LedgerError> {
        let records = self
            .records
            .read()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        records
            .get(&product_id)
            .map(StockRecord::snapshot)
            .ok_or(LedgerError::NotFound)
    }

    fn try_reserve(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        self.debit_if_version(product_id, qty, ExpectedVersion::Any)
    }

    fn debit_if_version(
        &self,
        product_id: ProductId,
        qty: u64,
        expected: ExpectedVersion,
    ) -> Result<StockSnapshot, LedgerError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        let record = records.get_mut(&product_id).ok_or(LedgerError::NotFound)?;

        if !expected.matches(record.version()) {
            return Err(LedgerError::Conflict(format!(
                "expected {expected:?}, found {}",
                record.version()
            )));
        }

        // Check and decrement under the write lock; a failed debit leaves the
        // stored record untouched.
        let next = record.debit(qty).map_err(Self::map_domain)?;
        let snapshot = next.snapshot();
        *record = next;
        Ok(snapshot)
    }

    fn release(&self, product_id: ProductId, qty: u64) -> Result<StockSnapshot, LedgerError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LedgerError::Storage("lock poisoned".to_string()))?;

        let record = records.get_mut(&product_id).ok_or(LedgerError::NotFound)?;
        let next = record.credit(qty);
        let snapshot = next.snapshot();
        *record = next;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(quantity: u64) -> (InMemoryStockLedger, ProductId) {
        let ledger = InMemoryStockLedger::new();
        let product_id = ProductId::new();
        ledger.provision(product_id, quantity).unwrap();
        (ledger, product_id)
    }

    #[test]
    fn provision_then_get() {
        let (ledger, product_id) = ledger_with(10);
        let snap = ledger.get(product_id).unwrap();
        assert_eq!(snap.quantity, 10);
        assert_eq!(snap.version, 1);
    }

    #[test]
    fn double_provision_is_rejected() {
        let (ledger, product_id) = ledger_with(10);
        let err = ledger.provision(product_id, 5).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists(_)));
    }

    #[test]
    fn try_reserve_decrements() {
        let (ledger, product_id) = ledger_with(10);
        let snap = ledger.try_reserve(product_id, 4).unwrap();
        assert_eq!(snap.quantity, 6);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn try_reserve_shortage_leaves_record_unchanged() {
        let (ledger, product_id) = ledger_with(3);
        let before = ledger.get(product_id).unwrap();

        let err = ledger.try_reserve(product_id, 5).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Insufficient {
                available: 3,
                requested: 5
            }
        ));

        let after = ledger.get(product_id).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn unknown_product_is_not_found() {
        let ledger = InMemoryStockLedger::new();
        assert!(matches!(
            ledger.try_reserve(ProductId::new(), 1),
            Err(LedgerError::NotFound)
        ));
        assert!(matches!(
            ledger.release(ProductId::new(), 1),
            Err(LedgerError::NotFound)
        ));
    }

    #[test]
    fn debit_if_version_conflicts_on_stale_version() {
        let (ledger, product_id) = ledger_with(10);

        // Bump the version out from under the stale expectation.
        ledger.try_reserve(product_id, 1).unwrap();

        let err = ledger
            .debit_if_version(product_id, 1, ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        // The conflicting attempt must not have touched the record.
        let snap = ledger.get(product_id).unwrap();
        assert_eq!(snap.quantity, 9);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn debit_if_version_applies_on_matching_version() {
        let (ledger, product_id) = ledger_with(10);
        let snap = ledger
            .debit_if_version(product_id, 2, ExpectedVersion::Exact(1))
            .unwrap();
        assert_eq!(snap.quantity, 8);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn release_round_trip_restores_quantity() {
        let (ledger, product_id) = ledger_with(10);
        ledger.try_reserve(product_id, 7).unwrap();
        let snap = ledger.release(product_id, 7).unwrap();
        assert_eq!(snap.quantity, 10);
        // Two mutations, two version bumps.
        assert_eq!(snap.version, 3);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            /// Property: any sequence of successful reserve/release pairs
            /// restores the starting quantity exactly, and the version counts
            /// every successful mutation.
            #[test]
            fn reserve_release_pairs_round_trip(
                start in 100u64..10_000,
                quantities in prop::collection::vec(1u64..100, 1..20)
            ) {
                let (ledger, product_id) = ledger_with(start);
                let mut mutations = 0u64;

                for qty in &quantities {
                    ledger.try_reserve(product_id, *qty).unwrap();
                    ledger.release(product_id, *qty).unwrap();
                    mutations += 2;
                }

                let snap = ledger.get(product_id).unwrap();
                prop_assert_eq!(snap.quantity, start);
                prop_assert_eq!(snap.version, 1 + mutations);
            }

            /// Property: interleaved failures never perturb the record.
            #[test]
            fn failed_reserves_are_invisible(
                start in 1u64..50,
                attempts in prop::collection::vec(1u64..100, 1..20)
            ) {
                let (ledger, product_id) = ledger_with(start);
                let mut expected = start;
                let mut version = 1u64;

                for qty in attempts {
                    match ledger.try_reserve(product_id, qty) {
                        Ok(snap) => {
                            expected -= qty;
                            version += 1;
                            prop_assert_eq!(snap.quantity, expected);
                        }
                        Err(_) => {
                            let snap = ledger.get(product_id).unwrap();
                            prop_assert_eq!(snap.quantity, expected);
                            prop_assert_eq!(snap.version, version);
                        }
                    }
                }
            }
        }
    }
}
