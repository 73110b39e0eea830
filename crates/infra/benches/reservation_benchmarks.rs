use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stockgate_core::ProductId;
use stockgate_infra::retry::RetryPolicy;
use stockgate_infra::stock_ledger::{InMemoryStockLedger, StockLedger};
use stockgate_infra::strategy::{
    distributed::DistributedConfig, DistributedStrategy, InMemoryLeaseProvider,
    OptimisticStrategy, PessimisticStrategy, ReservationStrategy,
};

fn provisioned(stock: u64) -> (Arc<InMemoryStockLedger>, ProductId) {
    let ledger = Arc::new(InMemoryStockLedger::new());
    let product_id = ProductId::new();
    ledger.provision(product_id, stock).unwrap();
    (ledger, product_id)
}

fn build_strategy(name: &str, ledger: Arc<InMemoryStockLedger>) -> Arc<dyn ReservationStrategy> {
    match name {
        "pessimistic" => Arc::new(PessimisticStrategy::new(ledger, Duration::from_millis(500))),
        "optimistic" => Arc::new(OptimisticStrategy::new(
            ledger,
            RetryPolicy::fixed(10, Duration::from_micros(50)),
        )),
        _ => Arc::new(DistributedStrategy::new(
            ledger,
            Arc::new(InMemoryLeaseProvider::new()),
            DistributedConfig::default(),
        )),
    }
}

/// Uncontended reserve/release pairs: the normal-path latency each strategy
/// adds over the bare ledger.
fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release_uncontended");
    group.throughput(Throughput::Elements(1));

    for name in ["pessimistic", "optimistic", "distributed"] {
        let (ledger, product_id) = provisioned(1_000_000);
        let strategy = build_strategy(name, ledger);

        group.bench_with_input(BenchmarkId::from_parameter(name), &strategy, |b, s| {
            b.iter(|| {
                let snap = s.try_reserve(black_box(product_id), black_box(1)).unwrap();
                black_box(snap.quantity);
                s.release(product_id, 1).unwrap();
            })
        });
    }

    group.finish();
}

/// Many threads hammering one product: contention-window behavior.
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_contended_8_threads");
    group.sample_size(20);

    for name in ["pessimistic", "optimistic", "distributed"] {
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let (ledger, product_id) = provisioned(10_000);
                let strategy = build_strategy(name, ledger);

                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let strategy = strategy.clone();
                        thread::spawn(move || {
                            for _ in 0..50 {
                                let _ = black_box(strategy.try_reserve(product_id, 1));
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

/// Bare ledger primitive, for a baseline.
fn bench_ledger_primitive(c: &mut Criterion) {
    let (ledger, product_id) = provisioned(1_000_000);

    c.bench_function("ledger_try_reserve_baseline", |b| {
        b.iter(|| {
            ledger.try_reserve(black_box(product_id), 1).unwrap();
            ledger.release(product_id, 1).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_uncontended,
    bench_contended,
    bench_ledger_primitive
);
criterion_main!(benches);
