//! Order intake coordination (application-level orchestration).
//!
//! This module ties a stock reservation to an order's lifecycle:
//!
//! ```text
//! create_order: validate → strategy.try_reserve → persist PENDING order
//!                                 │                        │
//!                                 │                        └─ on failure: compensating release
//!                                 └─ on failure: classified error, nothing persisted
//!
//! cancel_order: load → guard transition → release stock → record CANCELLED
//!                                              └─ on failure: audit discrepancy, still CANCELLED
//! ```
//!
//! The coordinator is the only component that mutates order status, and it
//! never touches a product's `(quantity, version)` pair except through the
//! active strategy's `{try_reserve, release}` capability. An order and a
//! debited stock count never exist without each other.

use chrono::Utc;
use tracing::{debug, instrument, warn};

use stockgate_core::{DomainError, OrderId, ProductId};
use stockgate_orders::{Order, OrderStatus, MAX_ORDER_QUANTITY};

use crate::audit::{AuditSink, StockDiscrepancy};
use crate::order_store::{OrderFilter, OrderStore, OrderStoreError};
use crate::stock_ledger::LedgerError;
use crate::strategy::ReservationStrategy;

/// Classified intake failure.
///
/// Every failure the ledger or a strategy can surface maps onto exactly one
/// of these, and `kind()` yields the stable wire name — callers cannot tell
/// which concurrency strategy produced the underlying cause.
#[derive(Debug)]
pub enum IntakeError {
    /// Bad input; never reaches the ledger.
    Validation {
        message: String,
        field: Option<String>,
    },
    /// Unknown product or order.
    NotFound { message: String },
    /// Requested quantity exceeds available stock. Terminal, not retried.
    InsufficientStock { available: u64, requested: u64 },
    /// Contention outlived the bounded retry limit. Terminal once surfaced.
    ConcurrentConflict { message: String },
    /// Infrastructure failure (storage, pool, poisoned lock).
    Internal { message: String },
}

/// Stable wire names for the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeErrorKind {
    Validation,
    NotFound,
    InsufficientStock,
    ConcurrentConflict,
    Internal,
}

impl IntakeErrorKind {
    pub fn type_name(self) -> &'static str {
        match self {
            IntakeErrorKind::Validation => "ValidationError",
            IntakeErrorKind::NotFound => "NotFound",
            IntakeErrorKind::InsufficientStock => "InsufficientStock",
            IntakeErrorKind::ConcurrentConflict => "ConcurrentConflict",
            IntakeErrorKind::Internal => "InternalError",
        }
    }
}

impl IntakeError {
    pub fn kind(&self) -> IntakeErrorKind {
        match self {
            IntakeError::Validation { .. } => IntakeErrorKind::Validation,
            IntakeError::NotFound { .. } => IntakeErrorKind::NotFound,
            IntakeError::InsufficientStock { .. } => IntakeErrorKind::InsufficientStock,
            IntakeError::ConcurrentConflict { .. } => IntakeErrorKind::ConcurrentConflict,
            IntakeError::Internal { .. } => IntakeErrorKind::Internal,
        }
    }

    /// Human-readable message for the wire payload.
    pub fn message(&self) -> String {
        match self {
            IntakeError::Validation { message, .. } => message.clone(),
            IntakeError::NotFound { message } => message.clone(),
            IntakeError::InsufficientStock {
                available,
                requested,
            } => format!("Insufficient stock. Available: {available}, Requested: {requested}"),
            IntakeError::ConcurrentConflict { message } => format!(
                "Unable to complete the operation due to concurrent modifications: {message}"
            ),
            IntakeError::Internal { message } => message.clone(),
        }
    }

    /// Offending input field, when one can be named.
    pub fn field(&self) -> Option<&str> {
        match self {
            IntakeError::Validation { field, .. } => field.as_deref(),
            IntakeError::InsufficientStock { .. } => Some("quantity"),
            _ => None,
        }
    }

    pub fn product_not_found(product_id: ProductId) -> Self {
        IntakeError::NotFound {
            message: format!("Product with ID {product_id} not found"),
        }
    }

    pub fn order_not_found(order_id: OrderId) -> Self {
        IntakeError::NotFound {
            message: format!("Order with ID {order_id} not found"),
        }
    }

    /// Classify a ledger/strategy failure against a known product.
    pub fn from_ledger(product_id: ProductId, e: LedgerError) -> Self {
        classify_ledger(product_id, e)
    }
}

impl core::fmt::Display for IntakeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.kind().type_name(), self.message())
    }
}

impl std::error::Error for IntakeError {}

/// Classify a ledger/strategy failure for a given product.
fn classify_ledger(product_id: ProductId, e: LedgerError) -> IntakeError {
    match e {
        LedgerError::NotFound => IntakeError::product_not_found(product_id),
        LedgerError::Insufficient {
            available,
            requested,
        } => IntakeError::InsufficientStock {
            available,
            requested,
        },
        LedgerError::Conflict(message) => IntakeError::ConcurrentConflict { message },
        LedgerError::AlreadyExists(_) | LedgerError::Storage(_) => IntakeError::Internal {
            message: e.to_string(),
        },
    }
}

impl From<DomainError> for IntakeError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation { message, field } => IntakeError::Validation { message, field },
            DomainError::InvariantViolation(message) => IntakeError::Validation {
                message,
                field: None,
            },
            DomainError::InvalidId(message) => IntakeError::Validation {
                message,
                field: Some("id".to_string()),
            },
            DomainError::NotFound => IntakeError::NotFound {
                message: "not found".to_string(),
            },
            DomainError::InsufficientStock {
                available,
                requested,
            } => IntakeError::InsufficientStock {
                available,
                requested,
            },
            DomainError::Conflict(message) => IntakeError::ConcurrentConflict { message },
        }
    }
}

impl From<OrderStoreError> for IntakeError {
    fn from(value: OrderStoreError) -> Self {
        match value {
            OrderStoreError::NotFound => IntakeError::NotFound {
                message: "order not found".to_string(),
            },
            other => IntakeError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Order intake coordinator.
///
/// Generic over the active concurrency strategy, the order store, and the
/// audit sink so tests can wire in-memory implementations and production can
/// swap backends without touching the orchestration.
#[derive(Debug)]
pub struct OrderIntake<S, O, A> {
    strategy: S,
    orders: O,
    audit: A,
}

impl<S, O, A> OrderIntake<S, O, A>
where
    S: ReservationStrategy,
    O: OrderStore,
    A: AuditSink,
{
    pub fn new(strategy: S, orders: O, audit: A) -> Self {
        Self {
            strategy,
            orders,
            audit,
        }
    }

    /// Reserve stock and create a PENDING order bound to the reservation.
    #[instrument(skip(self), fields(product_id = %product_id, quantity))]
    pub fn create_order(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<Order, IntakeError> {
        if quantity == 0 {
            return Err(IntakeError::Validation {
                message: "quantity must be greater than 0".to_string(),
                field: Some("quantity".to_string()),
            });
        }
        if quantity > MAX_ORDER_QUANTITY {
            return Err(IntakeError::Validation {
                message: format!("order quantity exceeds maximum allowed ({MAX_ORDER_QUANTITY})"),
                field: Some("quantity".to_string()),
            });
        }

        let snapshot = self
            .strategy
            .try_reserve(product_id, quantity)
            .map_err(|e| classify_ledger(product_id, e))?;

        let order = Order::new_pending(OrderId::new(), product_id, quantity, Utc::now());

        if let Err(e) = self.orders.insert(order.clone()) {
            // The reservation must not outlive a failed order write.
            warn!(order_id = %order.id(), error = %e, "order persist failed; releasing reservation");
            if let Err(release_err) = self.strategy.release(product_id, quantity) {
                self.audit.record(StockDiscrepancy::release_failed(
                    product_id,
                    order.id(),
                    quantity,
                    release_err.to_string(),
                ));
            }
            return Err(e.into());
        }

        debug!(order_id = %order.id(), remaining = snapshot.quantity, "order created");
        Ok(order)
    }

    /// Cancel an order and release its reservation.
    ///
    /// Valid from PENDING or PAID. If the compensating release fails, the
    /// cancellation still stands and the discrepancy goes to the audit sink.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn cancel_order(&self, order_id: OrderId) -> Result<Order, IntakeError> {
        let order = self
            .orders
            .get(order_id)?
            .ok_or_else(|| IntakeError::order_not_found(order_id))?;

        if order.status() == OrderStatus::Cancelled {
            // Already cancelled; the reservation was released the first time.
            return Ok(order);
        }
        let cancelled = order.cancel(Utc::now())?;

        if let Err(e) = self.strategy.release(order.product_id(), order.quantity()) {
            warn!(
                order_id = %order_id,
                product_id = %order.product_id(),
                error = %e,
                "compensating release failed; recording discrepancy"
            );
            self.audit.record(StockDiscrepancy::release_failed(
                order.product_id(),
                order_id,
                order.quantity(),
                e.to_string(),
            ));
        }

        self.orders.update(cancelled.clone())?;
        Ok(cancelled)
    }

    /// `PENDING → PAID`. Pure status transition; the ledger is not involved.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn pay_order(&self, order_id: OrderId) -> Result<Order, IntakeError> {
        self.transition(order_id, |o| o.pay(Utc::now()))
    }

    /// `PAID → SHIPPED`. Pure status transition; the ledger is not involved.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn ship_order(&self, order_id: OrderId) -> Result<Order, IntakeError> {
        self.transition(order_id, |o| o.ship(Utc::now()))
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, IntakeError> {
        Ok(self.orders.get(order_id)?)
    }

    pub fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, IntakeError> {
        Ok(self.orders.list(filter)?)
    }

    fn transition(
        &self,
        order_id: OrderId,
        apply: impl FnOnce(&Order) -> Result<Order, DomainError>,
    ) -> Result<Order, IntakeError> {
        let order = self
            .orders
            .get(order_id)?
            .ok_or_else(|| IntakeError::order_not_found(order_id))?;

        let next = apply(&order)?;
        self.orders.update(next.clone())?;
        Ok(next)
    }
}
