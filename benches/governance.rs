use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lingua_gate::domain::session::render_context_hint;
use lingua_gate::{
    AdmissionController, CacheFingerprint, ClientIdentity, Clock, ContextLimits, Exchange,
    FixedWindow, GatewayMetrics, KeyValueStore, LocalStore, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Benchmark fingerprint computation speed
fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for len in [32usize, 512, 5000] {
        let text: String = "Hello   World ".chars().cycle().take(len).collect();
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &text, |b, text| {
            b.iter(|| {
                CacheFingerprint::compute(
                    black_box(text),
                    black_box("auto"),
                    black_box("es"),
                    black_box("general"),
                    black_box("Previous: hi -> hola"),
                )
            })
        });
    }

    group.finish();
}

/// Benchmark context hint rendering
fn bench_context_hint(c: &mut Criterion) {
    let exchanges: Vec<Exchange> = (0..10)
        .map(|i| Exchange::new(format!("source sentence {}", i), format!("frase {}", i), i))
        .collect();

    c.bench_function("context_hint", |b| {
        b.iter(|| render_context_hint(black_box(&exchanges), ContextLimits::default()))
    });
}

/// Benchmark local admission throughput
fn bench_local_admission(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("local_admission");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let store: Arc<dyn KeyValueStore> = Arc::new(LocalStore::new(clock.clone()));
    let admission = AdmissionController::new(
        store,
        clock,
        FixedWindow::new(u64::MAX, Duration::from_secs(60)).unwrap(),
        "bench:",
        GatewayMetrics::new(),
    );

    group.throughput(Throughput::Elements(1));
    group.bench_function("single_identity", |b| {
        let identity = ClientIdentity::new("hot");
        b.iter(|| rt.block_on(admission.admit(black_box(&identity))))
    });

    let identities: Vec<ClientIdentity> = (0..1000)
        .map(|i| ClientIdentity::new(format!("10.0.{}.{}", i / 256, i % 256)))
        .collect();
    group.bench_function("many_identities", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % identities.len();
            rt.block_on(admission.admit(black_box(&identities[i])))
        })
    });

    group.throughput(Throughput::Elements(8 * 100));
    group.bench_function("concurrent_8x100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let handles: Vec<_> = (0..8)
                    .map(|t| {
                        let admission = admission.clone();
                        tokio::spawn(async move {
                            let identity = ClientIdentity::new(format!("worker{}", t));
                            for _ in 0..100 {
                                admission.admit(&identity).await;
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.await.unwrap();
                }
            })
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_fingerprint,
    bench_context_hint,
    bench_local_admission
);
criterion_main!(benches);
