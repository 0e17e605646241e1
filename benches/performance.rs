use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

use fairshare::models::{best_route, is_reciprocal, RouteCandidate};
use fairshare::money;

fn benchmark_gini_computation(c: &mut Criterion) {
    let mut group = c.benchmark_group("gini");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("pairwise", size), size, |b, &size| {
            let balances: Vec<Decimal> = (0..size)
                .map(|i| Decimal::from((i % 977) as i64 + 10))
                .collect();
            let mean: Decimal =
                balances.iter().copied().sum::<Decimal>() / Decimal::from(balances.len());

            b.iter(|| {
                let mut diff_sum = Decimal::ZERO;
                for a in &balances {
                    for b in &balances {
                        diff_sum += (*a - *b).abs();
                    }
                }
                let n = Decimal::from(balances.len() * balances.len());
                black_box(diff_sum / (Decimal::TWO * n * mean))
            });
        });
    }

    group.finish();
}

fn benchmark_route_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("best_route", size), size, |b, &size| {
            let candidates: Vec<RouteCandidate> = (0..size)
                .map(|i| RouteCandidate {
                    position_id: Uuid::new_v4(),
                    paired_position_id: Uuid::new_v4(),
                    balance: Decimal::from(1000),
                    counterpart_balance: Decimal::from(1000),
                    rate: Decimal::new((i % 500) as i64 + 50, 2),
                })
                .collect();

            b.iter(|| black_box(best_route(black_box(&candidates))));
        });
    }

    group.finish();
}

fn benchmark_money_helpers(c: &mut Criterion) {
    let mut group = c.benchmark_group("money");

    group.bench_function("round2", |b| {
        b.iter(|| black_box(money::round2(black_box(Decimal::new(1234567, 4)))));
    });

    group.bench_function("fee_for", |b| {
        b.iter(|| {
            black_box(money::fee_for(
                black_box(Decimal::from(1234)),
                black_box(Decimal::from(5)),
            ))
        });
    });

    group.bench_function("is_reciprocal", |b| {
        b.iter(|| {
            black_box(is_reciprocal(
                black_box(Decimal::TWO),
                black_box(Decimal::new(5, 1)),
            ))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_gini_computation,
    benchmark_route_selection,
    benchmark_money_helpers
);
criterion_main!(benches);
