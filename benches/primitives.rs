use std::time::Instant;

use criterion::{BenchmarkId, Criterion};
use futures::future::try_join_all;
use polyprep::{
    bench_reexports::shared_rng,
    channel::SimpleChannel,
    config::PrepConfig,
    context::{CryptoContext, Ctx},
};
use tokio::runtime::Runtime;

pub fn primitives_benchmark(c: &mut Criterion) {
    // Default runtime for "full" feature is multi-threaded
    let rt = Runtime::new().unwrap();

    let mut g = c.benchmark_group("primitives");
    for parties in [2, 3, 5] {
        let bench_id = BenchmarkId::new("coin tossing", parties);
        g.bench_function(bench_id, |b| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let crypto = CryptoContext::new(&PrepConfig::default()).expect("default config");
                let ctxs: Vec<_> = SimpleChannel::channels(parties)
                    .into_iter()
                    .enumerate()
                    .map(|(i, ch)| Ctx::new(ch, i, parties, crypto.clone()).expect("valid party"))
                    .collect();
                let now = Instant::now();
                for _ in 0..iters {
                    try_join_all(ctxs.iter().map(shared_rng))
                        .await
                        .expect("coin tossing failed");
                }
                now.elapsed()
            })
        });
    }
}
