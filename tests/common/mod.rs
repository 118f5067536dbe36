#![allow(dead_code)]

use futures::future::try_join_all;
use polyprep::{
    channel::SimpleChannel,
    config::PrepConfig,
    context::{CryptoContext, Ctx},
    domain::{Field, ShareDomain},
    error::PrepError,
    share::{Additive, Spdz},
};
use tracing_subscriber::EnvFilter;

pub const SEED: [u8; 32] = [42; 32];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Runs `party` for every party concurrently, each with its own context.
pub async fn run_parties<T>(
    parties: usize,
    config: &PrepConfig,
    party: impl AsyncFn(Ctx<SimpleChannel>) -> Result<T, PrepError>,
) -> Result<Vec<T>, PrepError> {
    init_tracing();
    let crypto = CryptoContext::new(config)?;
    try_join_all(
        SimpleChannel::channels(parties)
            .into_iter()
            .enumerate()
            .map(async |(id, channel)| {
                let ctx = Ctx::new(channel, id, parties, crypto.clone())?;
                party(ctx).await
            }),
    )
    .await
}

/// Reconstructs a value from the additive shares of all parties.
pub fn open_additive<T: ShareDomain>(shares: impl IntoIterator<Item = Additive<T>>) -> T {
    shares.into_iter().fold(T::zero(), |acc, s| acc + s.0)
}

/// Reconstructs a value from the SPDZ shares of all parties (ignoring the MACs).
pub fn open_spdz<F: Field>(shares: impl IntoIterator<Item = Spdz<F>>) -> F {
    shares.into_iter().fold(F::zero(), |acc, s| acc + s.value())
}
