use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use lob_engine::clock::SystemClock;
use lob_engine::orderbook::OrderBook;
use lob_engine::orders::{IncomingOrder, Side};
use std::sync::Arc;

fn setup_order_book(depth: u64, orders_per_level: u64) -> OrderBook {
    let mut ob = OrderBook::new(Arc::new(SystemClock::new()));
    // asks above the bids so nothing crosses while building
    for level in 1..=depth {
        for i in 0..orders_per_level {
            ob.process_order(&IncomingOrder::limit(
                level * 1_000 + i,
                Side::Ask,
                depth + level,
                1,
            ))
            .unwrap();
            ob.process_order(&IncomingOrder::limit(
                (depth + level) * 1_000 + i,
                Side::Bid,
                level,
                1,
            ))
            .unwrap();
        }
    }
    ob
}

fn bench_process_order(c: &mut Criterion) {
    let depth = 100;
    let orders_per_level = 10;

    c.bench_function("match 1 market order", |b| {
        b.iter_batched(
            || setup_order_book(depth, orders_per_level),
            |mut ob| {
                let market_bid = IncomingOrder::market(0, Side::Bid, depth * orders_per_level / 2);
                ob.process_order(&market_bid).unwrap()
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("match 1 limit crossing order", |b| {
        b.iter_batched(
            || setup_order_book(depth, orders_per_level),
            |mut ob| {
                let limit_ask =
                    IncomingOrder::limit(1, Side::Ask, depth / 2, depth * orders_per_level);
                ob.process_order(&limit_ask).unwrap()
            },
            BatchSize::LargeInput,
        )
    });

    let mut ob = setup_order_book(depth, orders_per_level);
    let mut id = 1_000_000;
    c.bench_function("rest 1 limit order", |b| {
        b.iter(|| {
            id += 1;
            ob.process_order(&IncomingOrder::limit(id, Side::Bid, depth / 2, 1))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_process_order);
criterion_main!(benches);
