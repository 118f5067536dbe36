use tracing::{Level, instrument};

use super::failed;
use crate::{
    beaver::{Beaver, TripleSource},
    channel::Channel,
    context::Ctx,
    domain::ShareDomain,
    error::{Check, PrepError},
    items::Triple,
    open::Opener,
    share::{Role, Share},
};

/// Verifies that every value is a bit by requiring `x·x - x` to open to zero.
///
/// Only `x = 0` and `x = 1` solve `x·x = x` in a field as well as in `Z/2^k`.
pub async fn check_bits<S: Share, C: Channel, T: TripleSource<S>>(
    ctx: &Ctx<C>,
    role: &Role<S::MacKey>,
    opener: &mut S::Opener,
    values: &[S],
    triples: &mut T,
) -> Result<(), PrepError> {
    let pairs: Vec<(S, S)> = values.iter().map(|x| (x.clone(), x.clone())).collect();
    let squares = Beaver::new(role.clone())
        .multiply(ctx, opener, triples, &pairs)
        .await?;
    let zeros: Vec<S> = squares
        .into_iter()
        .zip(values)
        .map(|(sq, x)| sq - x.clone())
        .collect();
    opener
        .check_for(ctx, S::Clear::zero(), &zeros)
        .await
        .map_err(failed(Check::BitSquare))
}

/// Certifies raw random bits, using up one certified triple per bit.
///
/// Bits of a binary domain are bits by construction and are returned unchecked.
#[instrument(level = Level::DEBUG, skip_all, fields(n = bits.len()), err)]
pub async fn certify_bits<S: Share, C: Channel>(
    ctx: &Ctx<C>,
    role: &Role<S::MacKey>,
    opener: &mut S::Opener,
    bits: Vec<S>,
    mut triples: Vec<Triple<S>>,
) -> Result<Vec<S>, PrepError> {
    if S::Clear::BITS == 1 {
        return Ok(bits);
    }
    if triples.len() != bits.len() {
        return Err(PrepError::SizeMismatch {
            expected: bits.len(),
            actual: triples.len(),
        });
    }
    check_bits(ctx, role, opener, &bits, &mut triples).await?;
    Ok(bits)
}
