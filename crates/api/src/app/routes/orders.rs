use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockgate_core::{OrderId, ProductId};
use stockgate_infra::order_store::OrderFilter;
use stockgate_orders::OrderStatus;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/pay", post(pay_order))
        .route("/:id/ship", post(ship_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match body.product_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::validation_error("invalid product id", "product_id"),
    };

    match services.create_order(product_id, body.quantity) {
        Ok(order) => (StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::intake_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::validation_error("invalid order id", "order_id"),
    };

    match services.get_order(order_id) {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::intake_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match parse_order_status(raw) {
            Ok(s) => Some(s),
            Err(resp) => return resp,
        },
    };

    let product_id = match query.product_id.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<ProductId>() {
            Ok(p) => Some(p),
            Err(_) => return errors::validation_error("invalid product id", "product_id"),
        },
    };

    let filter = OrderFilter {
        status,
        product_id,
        limit: query.limit,
    };

    match services.list_orders(filter) {
        Ok(orders) => {
            let items: Vec<_> = orders.iter().map(dto::order_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "orders": items, "count": items.len() })),
            )
                .into_response()
        }
        Err(e) => errors::intake_error_to_response(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(services, &id, AppServices::cancel_order)
}

pub async fn pay_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(services, &id, AppServices::pay_order)
}

pub async fn ship_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    transition(services, &id, AppServices::ship_order)
}

fn transition(
    services: Arc<AppServices>,
    raw_id: &str,
    apply: impl FnOnce(
        &AppServices,
        OrderId,
    ) -> Result<stockgate_orders::Order, stockgate_infra::intake::IntakeError>,
) -> axum::response::Response {
    let order_id: OrderId = match raw_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::validation_error("invalid order id", "order_id"),
    };

    match apply(&services, order_id) {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::intake_error_to_response(e),
    }
}

fn parse_order_status(s: &str) -> Result<OrderStatus, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "paid" => Ok(OrderStatus::Paid),
        "shipped" => Ok(OrderStatus::Shipped),
        "cancelled" => Ok(OrderStatus::Cancelled),
        _ => Err(errors::validation_error(
            "status must be one of: pending, paid, shipped, cancelled",
            "status",
        )),
    }
}
