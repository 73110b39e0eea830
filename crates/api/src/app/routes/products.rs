use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockgate_core::ProductId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product))
        .route("/:id/stock", get(get_stock))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let (info, snapshot) =
        match services.provision_product(body.sku, body.name, body.initial_stock) {
            Ok(v) => v,
            Err(e) => return errors::intake_error_to_response(e),
        };

    (
        StatusCode::CREATED,
        Json(dto::product_to_json(&info, &snapshot)),
    )
        .into_response()
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::validation_error("invalid product id", "product_id"),
    };

    match services.stock(product_id) {
        Ok(snapshot) => (StatusCode::OK, Json(dto::stock_to_json(&snapshot))).into_response(),
        Err(e) => errors::intake_error_to_response(e),
    }
}
