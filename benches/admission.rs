use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scenario_governor::config::{QuotaConfig, ThrottleLimits};
use scenario_governor::quota::{InMemoryQuotaStore, QuotaLedger, UserQuota};
use scenario_governor::selector::{
    pick_with_rng, Catalog, DiseaseEntry, Rarity, RaritySelection, RecentHistory,
};
use scenario_governor::throttle::{OperationClass, RequestThrottle};
use std::time::Duration;

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    for domain in ["Cardiology", "Neurology", "Nephrology", "Pulmonology"] {
        let diseases = (0..40).map(|i| {
            let rarity = Rarity::ALL[i % Rarity::ALL.len()];
            DiseaseEntry::new(format!("{domain}-{i}"), rarity)
        });
        catalog.insert(domain, diseases);
    }
    catalog
}

fn throttle_check_hot_identity(c: &mut Criterion) {
    let throttle = RequestThrottle::new(ThrottleLimits::default());

    c.bench_function("throttle_check_hot_identity", |b| {
        b.iter(|| {
            // Unbounded max so the window never fills during the run.
            black_box(throttle.check_limit(
                black_box("user-1"),
                OperationClass::ChatReply,
                Duration::from_secs(60),
                u32::MAX,
            ))
        });
    });
}

fn throttle_check_many_identities(c: &mut Criterion) {
    let throttle = RequestThrottle::new(ThrottleLimits::default());
    let identities: Vec<String> = (0..1024).map(|i| format!("user-{i}")).collect();
    let mut next = 0usize;

    c.bench_function("throttle_check_1k_identities", |b| {
        b.iter(|| {
            next = (next + 1) % identities.len();
            black_box(throttle.check(black_box(&identities[next]), OperationClass::Guidance))
        });
    });
}

fn selector_any_rarity(c: &mut Criterion) {
    let catalog = catalog();
    let mut rng = StdRng::seed_from_u64(42);
    let mut history = RecentHistory::new();

    c.bench_function("selector_pick_any", |b| {
        b.iter(|| {
            black_box(pick_with_rng(
                &catalog,
                Some("General"),
                RaritySelection::Any,
                &mut history,
                &mut rng,
            ))
        });
    });
}

fn ledger_admit_and_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryQuotaStore::new();
    store.insert("user-1", UserQuota::free(u32::MAX, chrono::Utc::now()));
    let ledger = QuotaLedger::new(store, &QuotaConfig::default());

    c.bench_function("ledger_admit_commit", |b| {
        b.to_async(&rt).iter(|| async {
            let permit = ledger.admit(black_box("user-1")).await.unwrap();
            black_box(permit.commit().await.unwrap());
        });
    });
}

criterion_group!(
    benches,
    throttle_check_hot_identity,
    throttle_check_many_identities,
    selector_any_rarity,
    ledger_admit_and_commit
);
criterion_main!(benches);
