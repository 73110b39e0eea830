use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stockgate_core::{OrderId, ProductId};
use stockgate_infra::audit::LogAuditSink;
use stockgate_infra::intake::{IntakeError, OrderIntake};
use stockgate_infra::order_store::{InMemoryOrderStore, OrderFilter};
use stockgate_infra::retry::RetryPolicy;
use stockgate_infra::stock_ledger::{InMemoryStockLedger, StockLedger};
use stockgate_infra::strategy::{
    distributed::{DistributedConfig, Reconciler},
    DistributedStrategy, InMemoryLeaseProvider, LeaseProvider, OptimisticStrategy,
    PessimisticStrategy, ReconcilerHandle, ReservationStrategy, StrategyKind,
};
use stockgate_orders::Order;
use stockgate_stock::{ProductInfo, StockSnapshot, MAX_PROVISIONED_STOCK};

#[cfg(feature = "redis")]
use stockgate_infra::strategy::RedisLeaseProvider;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub strategy: StrategyKind,
    pub retry: RetryPolicy,
    pub lock_wait: Duration,
    pub distributed: DistributedConfig,
    pub use_persistent: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let strategy = match std::env::var("STRATEGY") {
            Ok(raw) => raw.parse::<StrategyKind>().unwrap_or_else(|e| {
                tracing::warn!("invalid STRATEGY: {e}; falling back to pessimistic");
                StrategyKind::Pessimistic
            }),
            Err(_) => StrategyKind::default(),
        };

        let retry = RetryPolicy {
            max_attempts: env_u32("RETRY_MAX_ATTEMPTS", 3),
            base_delay: env_ms("RETRY_BASE_DELAY_MS", 10),
            max_delay: env_ms("RETRY_MAX_DELAY_MS", 250),
            ..Default::default()
        };

        Self {
            strategy,
            retry,
            lock_wait: env_ms("LOCK_WAIT_MS", 2000),
            distributed: DistributedConfig {
                lease_ttl: env_ms("LEASE_TTL_MS", 5000),
                lease_wait: env_ms("LOCK_WAIT_MS", 2000),
                reconcile_interval: env_ms("RECONCILE_INTERVAL_MS", 100),
            },
            use_persistent: std::env::var("USE_PERSISTENT_STORES")
                .unwrap_or_else(|_| "false".to_string())
                .parse::<bool>()
                .unwrap_or(false),
        }
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("invalid {name}={raw}; falling back to {default}");
            default
        }),
        Err(_) => default,
    }
}

fn env_ms(name: &str, default_ms: u64) -> Duration {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                tracing::warn!("invalid {name}={raw}; falling back to {default_ms}ms");
                Duration::from_millis(default_ms)
            }
        },
        Err(_) => Duration::from_millis(default_ms),
    }
}

type ApiIntake =
    OrderIntake<Arc<dyn ReservationStrategy>, Arc<InMemoryOrderStore>, Arc<LogAuditSink>>;

/// Wired application services: ledger backend, active strategy, and the
/// intake coordinator, all chosen from configuration.
pub struct AppServices {
    ledger: Arc<dyn StockLedger>,
    intake: ApiIntake,
    products: Mutex<HashMap<ProductId, ProductInfo>>,
    // Keeps the distributed strategy's reconciler alive for the process
    // lifetime; dropping the handle would detach, not stop, the worker.
    _reconciler: Option<ReconcilerHandle>,
}

pub async fn build_services() -> AppServices {
    let config = AppConfig::from_env();

    let ledger: Arc<dyn StockLedger> = if config.use_persistent {
        build_postgres_ledger().await
    } else {
        Arc::new(InMemoryStockLedger::new())
    };

    build_services_with(ledger, config)
}

async fn build_postgres_ledger() -> Arc<dyn StockLedger> {
    use stockgate_infra::stock_ledger::PostgresStockLedger;

    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    Arc::new(PostgresStockLedger::new(pool))
}

pub fn build_services_with(ledger: Arc<dyn StockLedger>, config: AppConfig) -> AppServices {
    let audit = Arc::new(LogAuditSink);
    let mut reconciler = None;

    let strategy: Arc<dyn ReservationStrategy> = match config.strategy {
        StrategyKind::Pessimistic => Arc::new(PessimisticStrategy::new(
            ledger.clone(),
            config.lock_wait,
        )),
        StrategyKind::Optimistic => {
            Arc::new(OptimisticStrategy::new(ledger.clone(), config.retry.clone()))
        }
        StrategyKind::Distributed => {
            let leases = build_lease_provider();
            let strategy = Arc::new(DistributedStrategy::new(
                ledger.clone(),
                leases,
                config.distributed.clone(),
            ));
            reconciler = Some(Reconciler::spawn(
                "stock-reconciler",
                ledger.clone(),
                strategy.shared(),
                audit.clone(),
                config.distributed.reconcile_interval,
            ));
            strategy
        }
    };

    tracing::info!(strategy = ?config.strategy, "order intake wired");

    AppServices {
        ledger,
        intake: OrderIntake::new(strategy, Arc::new(InMemoryOrderStore::new()), audit),
        products: Mutex::new(HashMap::new()),
        _reconciler: reconciler,
    }
}

fn build_lease_provider() -> Arc<dyn LeaseProvider> {
    #[cfg(feature = "redis")]
    if let Ok(redis_url) = std::env::var("REDIS_URL") {
        match RedisLeaseProvider::new(&redis_url) {
            Ok(provider) => return Arc::new(provider),
            Err(e) => {
                tracing::warn!("failed to build redis lease provider: {e}; using in-memory")
            }
        }
    }

    Arc::new(InMemoryLeaseProvider::new())
}

impl AppServices {
    /// Provision a product with descriptive data and initial stock.
    pub fn provision_product(
        &self,
        sku: String,
        name: String,
        initial_stock: u64,
    ) -> Result<(ProductInfo, StockSnapshot), IntakeError> {
        if initial_stock > MAX_PROVISIONED_STOCK {
            return Err(IntakeError::Validation {
                message: format!(
                    "stock quantity exceeds maximum allowed ({MAX_PROVISIONED_STOCK})"
                ),
                field: Some("initial_stock".to_string()),
            });
        }

        let info = ProductInfo::new(ProductId::new(), sku, name)?;
        let snapshot = self
            .ledger
            .provision(info.product_id, initial_stock)
            .map_err(|e| IntakeError::from_ledger(info.product_id, e))?;

        if let Ok(mut products) = self.products.lock() {
            products.insert(info.product_id, info.clone());
        }

        Ok((info, snapshot))
    }

    pub fn product_info(&self, product_id: ProductId) -> Option<ProductInfo> {
        self.products
            .lock()
            .ok()
            .and_then(|p| p.get(&product_id).cloned())
    }

    pub fn stock(&self, product_id: ProductId) -> Result<StockSnapshot, IntakeError> {
        self.ledger
            .get(product_id)
            .map_err(|e| IntakeError::from_ledger(product_id, e))
    }

    pub fn create_order(&self, product_id: ProductId, quantity: u64) -> Result<Order, IntakeError> {
        self.intake.create_order(product_id, quantity)
    }

    pub fn cancel_order(&self, order_id: OrderId) -> Result<Order, IntakeError> {
        self.intake.cancel_order(order_id)
    }

    pub fn pay_order(&self, order_id: OrderId) -> Result<Order, IntakeError> {
        self.intake.pay_order(order_id)
    }

    pub fn ship_order(&self, order_id: OrderId) -> Result<Order, IntakeError> {
        self.intake.ship_order(order_id)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order, IntakeError> {
        self.intake
            .get_order(order_id)?
            .ok_or_else(|| IntakeError::order_not_found(order_id))
    }

    pub fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, IntakeError> {
        self.intake.list_orders(filter)
    }
}
