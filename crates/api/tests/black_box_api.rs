use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = stockgate_api::app::build_app().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create_product(
    client: &reqwest::Client,
    base_url: &str,
    sku: &str,
    initial_stock: u64,
) -> serde_json::Value {
    let res = client
        .post(format!("{}/products", base_url))
        .json(&json!({ "sku": sku, "name": "Widget", "initial_stock": initial_stock }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn stock_quantity(client: &reqwest::Client, base_url: &str, product_id: &str) -> u64 {
    let res = client
        .get(format!("{}/products/{}/stock", base_url, product_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    body["quantity"].as_u64().unwrap()
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn provision_then_query_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-1", 25).await;
    assert_eq!(product["sku"], "SKU-1");
    assert_eq!(product["quantity"], 25);

    let qty = stock_quantity(&client, &srv.base_url, product["id"].as_str().unwrap()).await;
    assert_eq!(qty, 25);
}

#[tokio::test]
async fn order_lifecycle_create_pay_ship() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-2", 10).await;
    let product_id = product["id"].as_str().unwrap();

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({ "product_id": product_id, "quantity": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(order["status"], "pending");
    assert_eq!(order["quantity"], 4);

    // The reservation is visible immediately.
    assert_eq!(stock_quantity(&client, &srv.base_url, product_id).await, 6);

    let order_id = order["id"].as_str().unwrap();
    let res = client
        .post(format!("{}/orders/{}/pay", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let paid: serde_json::Value = res.json().await.unwrap();
    assert_eq!(paid["status"], "paid");

    let res = client
        .post(format!("{}/orders/{}/ship", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let shipped: serde_json::Value = res.json().await.unwrap();
    assert_eq!(shipped["status"], "shipped");

    // Paying/shipping never touched the ledger.
    assert_eq!(stock_quantity(&client, &srv.base_url, product_id).await, 6);
}

#[tokio::test]
async fn cancel_restores_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-3", 10).await;
    let product_id = product["id"].as_str().unwrap();

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({ "product_id": product_id, "quantity": 7 }))
        .send()
        .await
        .unwrap();
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock_quantity(&client, &srv.base_url, product_id).await, 3);

    let res = client
        .post(format!(
            "{}/orders/{}/cancel",
            srv.base_url,
            order["id"].as_str().unwrap()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cancelled: serde_json::Value = res.json().await.unwrap();
    assert_eq!(cancelled["status"], "cancelled");

    assert_eq!(stock_quantity(&client, &srv.base_url, product_id).await, 10);
}

#[tokio::test]
async fn insufficient_stock_yields_conflict_payload() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-4", 3).await;
    let product_id = product["id"].as_str().unwrap();

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({ "product_id": product_id, "quantity": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "InsufficientStock");
    assert_eq!(body["details"][0]["type"], "InsufficientStock");
    assert_eq!(
        body["details"][0]["message"],
        "Insufficient stock. Available: 3, Requested: 5"
    );
    assert_eq!(body["details"][0]["field"], "quantity");
    assert!(body["timestamp"].is_string());

    // A refused attempt leaves the stock untouched.
    assert_eq!(stock_quantity(&client, &srv.base_url, product_id).await, 3);
}

#[tokio::test]
async fn unknown_product_yields_not_found_payload() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "product_id": uuid::Uuid::now_v7().to_string(),
            "quantity": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "NotFound");
    assert_eq!(body["details"][0]["type"], "NotFound");
}

#[tokio::test]
async fn zero_quantity_yields_validation_payload() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-5", 3).await;

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "product_id": product["id"].as_str().unwrap(),
            "quantity": 0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ValidationError");
    assert_eq!(body["details"][0]["field"], "quantity");
}

#[tokio::test]
async fn cancel_of_shipped_order_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-6", 5).await;
    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "product_id": product["id"].as_str().unwrap(),
            "quantity": 1
        }))
        .send()
        .await
        .unwrap();
    let order: serde_json::Value = res.json().await.unwrap();
    let order_id = order["id"].as_str().unwrap();

    client
        .post(format!("{}/orders/{}/pay", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/orders/{}/ship", srv.base_url, order_id))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{}/orders/{}/cancel", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn concurrent_orders_sell_out_exactly() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-7", 5).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        let base_url = srv.base_url.clone();
        let product_id = product_id.clone();
        tasks.push(tokio::spawn(async move {
            let res = client
                .post(format!("{}/orders", base_url))
                .json(&json!({ "product_id": product_id, "quantity": 1 }))
                .send()
                .await
                .unwrap();
            res.status()
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for task in tasks {
        let status = task.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else if status == StatusCode::CONFLICT {
            conflicts += 1;
        } else {
            panic!("unexpected status {status}");
        }
    }

    assert_eq!(created, 5);
    assert_eq!(conflicts, 15);
    assert_eq!(stock_quantity(&client, &srv.base_url, &product_id).await, 0);
}

#[tokio::test]
async fn list_orders_filters_by_status() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = create_product(&client, &srv.base_url, "sku-8", 10).await;
    let product_id = product["id"].as_str().unwrap();

    for _ in 0..3 {
        client
            .post(format!("{}/orders", srv.base_url))
            .json(&json!({ "product_id": product_id, "quantity": 1 }))
            .send()
            .await
            .unwrap();
    }

    let res = client
        .get(format!("{}/orders?status=pending", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["count"], 3);

    let res = client
        .get(format!("{}/orders?status=bogus", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
