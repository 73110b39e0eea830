use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockgate_core::{DomainError, OrderId, ProductId};

/// Ceiling on a single order's quantity, carried over from the intake
/// collaborator's business rules.
pub const MAX_ORDER_QUANTITY: u64 = 10_000;

/// Order status lifecycle.
///
/// `Pending → Paid → Shipped` (terminal), `Pending | Paid → Cancelled`
/// (terminal, compensating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Cancelled)
    }

    /// Whether an order in this status still holds its stock reservation.
    pub fn holds_reservation(self) -> bool {
        !matches!(self, OrderStatus::Cancelled)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// An order bound to a successful stock reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    product_id: ProductId,
    quantity: u64,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in `Pending`, bound to an already-reserved quantity.
    pub fn new_pending(
        id: OrderId,
        product_id: ProductId,
        quantity: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id,
            quantity,
            status: OrderStatus::Pending,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// `Pending → Paid`.
    pub fn pay(&self, occurred_at: DateTime<Utc>) -> Result<Order, DomainError> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::invariant(format!(
                "cannot mark order as paid from status {}",
                self.status
            )));
        }
        Ok(self.with_status(OrderStatus::Paid, occurred_at))
    }

    /// `Paid → Shipped`.
    pub fn ship(&self, occurred_at: DateTime<Utc>) -> Result<Order, DomainError> {
        if self.status != OrderStatus::Paid {
            return Err(DomainError::invariant(format!(
                "cannot ship order from status {}",
                self.status
            )));
        }
        Ok(self.with_status(OrderStatus::Shipped, occurred_at))
    }

    /// `Pending | Paid → Cancelled`.
    ///
    /// Cancelling an already-cancelled order is a no-op success; cancelling a
    /// shipped order is rejected. The caller is responsible for the
    /// compensating stock release.
    pub fn cancel(&self, occurred_at: DateTime<Utc>) -> Result<Order, DomainError> {
        match self.status {
            OrderStatus::Cancelled => Ok(self.clone()),
            OrderStatus::Shipped => Err(DomainError::invariant("cannot cancel a shipped order")),
            OrderStatus::Pending | OrderStatus::Paid => {
                Ok(self.with_status(OrderStatus::Cancelled, occurred_at))
            }
        }
    }

    fn with_status(&self, status: OrderStatus, occurred_at: DateTime<Utc>) -> Order {
        Order {
            status,
            updated_at: occurred_at,
            ..self.clone()
        }
    }
}
