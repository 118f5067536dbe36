use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput};
use polyprep::{
    channel::SimpleChannel,
    config::PrepConfig,
    context::{CryptoContext, Ctx},
    domain::Mersenne61,
    generator::{InsecureDealer, RawGenerator},
    items::Triple,
    open::Opener,
    sacrifice::{ShuffleSacrifice, TripleShuffleSacrifice},
    share::{Share, Spdz},
};
use tokio::runtime::Runtime;

type S = Spdz<Mersenne61>;

async fn deal(ctx: &Ctx<SimpleChannel>, n: usize) -> (Vec<Triple<S>>, <S as Share>::Opener) {
    let mut dealer = InsecureDealer::<S>::new([0; 32], ctx.id(), ctx.parties(), n)
        .expect("valid party");
    let mut triples = vec![];
    dealer
        .buffer_triples(ctx, &mut triples)
        .await
        .expect("dealing never fails");
    let opener = <S as Share>::Opener::new(dealer.role());
    (triples, opener)
}

/// Benchmark the shuffle sacrifice of Spdz triples between two parties.
pub fn sacrifice_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut g = c.benchmark_group("sacrifice");
    for (n, threads) in [(1_000, 1), (10_000, 1), (10_000, 4)] {
        g.throughput(Throughput::Elements(n as u64));
        let bench_id = BenchmarkId::new(format!("triples/{threads} threads"), n);
        g.bench_function(bench_id, |b| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let config = PrepConfig {
                    threads,
                    ..PrepConfig::default()
                };
                let crypto = CryptoContext::new(&config).expect("valid config");
                let sacrifice =
                    TripleShuffleSacrifice(ShuffleSacrifice::from_config(&config).expect("valid"));
                let candidates = sacrifice.0.minimum_n_inputs(n);
                let mut elapsed = Duration::default();
                for _ in 0..iters {
                    let [ch0, ch1] = SimpleChannel::channels(2)
                        .try_into()
                        .expect("parties is 2");
                    let ctx0 = Ctx::new(ch0, 0, 2, crypto.clone()).expect("valid party");
                    let ctx1 = Ctx::new(ch1, 1, 2, crypto.clone()).expect("valid party");
                    let (raw0, mut opener0) = deal(&ctx0, candidates).await;
                    let (raw1, mut opener1) = deal(&ctx1, candidates).await;

                    let now = Instant::now();
                    tokio::try_join!(
                        sacrifice.sacrifice(&ctx0, &mut opener0, raw0, n),
                        sacrifice.sacrifice(&ctx1, &mut opener1, raw1, n),
                    )
                    .expect("sacrifice failed");
                    elapsed += now.elapsed();
                }
                elapsed
            })
        });
    }
}
