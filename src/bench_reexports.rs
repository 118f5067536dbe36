//! Reexports of private internals for benchmarking - DO NOT USE!
//!
//! This module requires the internal `__bench` feature to be enabled.
//! We use it to reexport some otherwise private functions as public,
//! in order to benchmark them with criterion. Criterion can currently
//! only benchmark public functions, as it is used from a `benches/` file
//! which are compiled as separate crates.
//!
//! If you're a user of polyprep, do not enable the `__bench` feature or use
//! these APIs exposed here.
#![allow(missing_docs)]

use rand_chacha::ChaCha20Rng;

use crate::{channel::Channel, coins, context::Ctx, error::PrepError};

pub async fn shared_rng<C: Channel>(ctx: &Ctx<C>) -> Result<ChaCha20Rng, PrepError> {
    coins::shared_rng(ctx).await
}
