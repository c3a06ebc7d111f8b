use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use depot_core::Money;
use depot_infra::event_store::InMemoryEventStore;
use depot_infra::stock_ledger::StockLedger;
use depot_inventory::{CostPolicy, ItemDetails, ItemId};

type Ledger = StockLedger<Arc<InMemoryEventStore>>;

fn stocked_ledger(policy: CostPolicy, lots: u64, lot_size: u64) -> (Ledger, ItemId) {
    let ledger = StockLedger::new(Arc::new(InMemoryEventStore::new()), policy);
    let item = ledger
        .create_item(
            ItemDetails {
                code: 23,
                name: "Salmon 6-7".to_string(),
                retail_price: Money::from_minor(131150),
            },
            Utc::now(),
        )
        .unwrap();
    for i in 0..lots {
        ledger
            .restock(item, lot_size, Money::from_minor(100 + i as i64), Utc::now())
            .unwrap();
    }
    (ledger, item)
}

fn bench_reserve_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_release");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_item", |b| {
        let (ledger, item) = stocked_ledger(CostPolicy::Fifo, 1, 1_000);
        b.iter(|| {
            let token = ledger.reserve(item, black_box(5)).unwrap();
            ledger.release(&token).unwrap();
        });
    });

    group.finish();
}

fn bench_reserve_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_consume");
    group.throughput(Throughput::Elements(1));

    for policy in [CostPolicy::Fifo, CostPolicy::WeightedAverage] {
        group.bench_with_input(BenchmarkId::new("one_unit", policy), &policy, |b, &policy| {
            let (ledger, item) = stocked_ledger(policy, 100, 100_000);
            b.iter(|| {
                let token = ledger.reserve(item, 1).unwrap();
                black_box(ledger.consume(&token, Utc::now()).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_replay");

    for lots in [10u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("open", lots), &lots, |b, &lots| {
            let store = Arc::new(InMemoryEventStore::new());
            let ledger = StockLedger::new(store.clone(), CostPolicy::Fifo);
            let item = ledger
                .create_item(
                    ItemDetails {
                        code: 40,
                        name: "Trout".to_string(),
                        retail_price: Money::ZERO,
                    },
                    Utc::now(),
                )
                .unwrap();
            for _ in 0..lots {
                ledger.restock(item, 10, Money::from_minor(250), Utc::now()).unwrap();
                let token = ledger.reserve(item, 3).unwrap();
                ledger.consume(&token, Utc::now()).unwrap();
            }

            b.iter(|| {
                black_box(StockLedger::open(store.clone(), CostPolicy::Fifo).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reserve_release, bench_reserve_consume, bench_replay);
criterion_main!(benches);
