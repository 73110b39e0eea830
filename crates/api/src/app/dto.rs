use serde::Deserialize;

use stockgate_orders::Order;
use stockgate_stock::{ProductInfo, StockSnapshot};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub initial_stock: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: String,
    pub quantity: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub product_id: Option<String>,
    pub limit: Option<usize>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn order_to_json(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "id": order.id().to_string(),
        "product_id": order.product_id().to_string(),
        "quantity": order.quantity(),
        "status": order.status().to_string(),
        "created_at": order.created_at().to_rfc3339(),
        "updated_at": order.updated_at().to_rfc3339(),
    })
}

pub fn product_to_json(info: &ProductInfo, snapshot: &StockSnapshot) -> serde_json::Value {
    serde_json::json!({
        "id": info.product_id.to_string(),
        "sku": info.sku,
        "name": info.name,
        "quantity": snapshot.quantity,
    })
}

pub fn stock_to_json(snapshot: &StockSnapshot) -> serde_json::Value {
    serde_json::json!({
        "product_id": snapshot.product_id.to_string(),
        "quantity": snapshot.quantity,
        "version": snapshot.version,
    })
}
