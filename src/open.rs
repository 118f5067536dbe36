//! Opening of shares and verification of the opened values.

use std::{fmt::Debug, future::Future, marker::PhantomData};

use subtle::ConstantTimeEq;
use tracing::{debug, error};

use crate::{
    channel::{Channel, scatter, unverified_broadcast},
    coins::{commit_and_open, shared_rng},
    context::Ctx,
    data_types::{AuthBit, Delta},
    domain::{Field, Gf2, ShareDomain},
    error::PrepError,
    share::{Additive, Role, Share, Spdz},
};

/// The opening sub-protocol of a sharing scheme.
///
/// Openings are not necessarily verified when they return: a malicious party may have lied about
/// its share. [`Opener::check`] verifies all values opened so far at once. Every opened value must
/// be checked before anything depending on it is revealed to the outside.
pub trait Opener<S: Share>: Debug + Send + Sync + Sized {
    /// Creates the opener of the party with the given role.
    fn new(role: &Role<S::MacKey>) -> Self;

    /// Opens a batch of shares in a single round (`POpen`).
    fn open<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        shares: &[S],
    ) -> impl Future<Output = Result<Vec<S::Clear>, PrepError>> + Send;

    /// Verifies all values opened since the last check. Returns immediately if nothing is
    /// pending, so calling it twice is harmless.
    fn check<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
    ) -> impl Future<Output = Result<(), PrepError>> + Send;

    /// Opens the shares, requires every one of them to open to `expected` (`CheckFor`) and then
    /// verifies the openings.
    fn check_for<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        expected: S::Clear,
        shares: &[S],
    ) -> impl Future<Output = Result<(), PrepError>> + Send {
        async move {
            let opened = self.open(ctx, shares).await?;
            if let Some(index) = opened.iter().position(|x| *x != expected) {
                error!(index, len = shares.len(), "share did not open to expected value");
                return Err(PrepError::Consistency { index });
            }
            self.check(ctx).await
        }
    }
}

fn sum_columns<T: ShareDomain>(rows: &[Vec<T>], len: usize) -> Vec<T> {
    let mut sums = vec![T::zero(); len];
    for row in rows {
        for (sum, x) in sums.iter_mut().zip(row) {
            *sum += *x;
        }
    }
    sums
}

/// Opens additive shares by broadcasting them. Without MACs there is nothing to check.
#[derive(Debug)]
pub struct PlainOpener<T>(PhantomData<fn() -> T>);

impl<T: ShareDomain> Opener<Additive<T>> for PlainOpener<T> {
    fn new(_role: &Role<()>) -> Self {
        PlainOpener(PhantomData)
    }

    async fn open<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        shares: &[Additive<T>],
    ) -> Result<Vec<T>, PrepError> {
        let values: Vec<T> = shares.iter().map(|s| s.0).collect();
        let all =
            unverified_broadcast(ctx.channel(), ctx.id(), ctx.parties(), "open", &values).await?;
        Ok(sum_columns(&all, values.len()))
    }

    async fn check<C: Channel>(&mut self, _ctx: &Ctx<C>) -> Result<(), PrepError> {
        Ok(())
    }
}

/// Opens SPDZ shares and checks their MACs in a batched, randomized MAC check.
#[derive(Debug)]
pub struct MacCheckOpener<F> {
    alpha: F,
    pending: Vec<(F, F)>,
}

impl<F: Field> Opener<Spdz<F>> for MacCheckOpener<F> {
    fn new(role: &Role<F>) -> Self {
        MacCheckOpener {
            alpha: role.key,
            pending: vec![],
        }
    }

    async fn open<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        shares: &[Spdz<F>],
    ) -> Result<Vec<F>, PrepError> {
        let values: Vec<F> = shares.iter().map(|s| s.value).collect();
        let all =
            unverified_broadcast(ctx.channel(), ctx.id(), ctx.parties(), "open", &values).await?;
        let opened = sum_columns(&all, values.len());
        self.pending
            .extend(opened.iter().zip(shares).map(|(x, s)| (*x, s.mac)));
        Ok(opened)
    }

    async fn check<C: Channel>(&mut self, ctx: &Ctx<C>) -> Result<(), PrepError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut rng = shared_rng(ctx).await?;
        let mut x = F::zero();
        let mut m = F::zero();
        for (opened, mac) in &self.pending {
            let r = F::random(&mut rng);
            x += r * *opened;
            m += r * *mac;
        }
        let sigma = m - self.alpha * x;
        let checked = self.pending.len();
        self.pending.clear();
        let sigmas =
            commit_and_open(ctx.channel(), ctx.id(), ctx.parties(), "MAC check", &[sigma]).await?;
        let total = sigmas
            .iter()
            .flatten()
            .fold(F::zero(), |acc, s| acc + *s);
        if !total.is_zero() {
            error!(checked, "MAC check failed");
            return Err(PrepError::MacFail);
        }
        debug!(checked, "MAC check passed");
        Ok(())
    }
}

/// Opens pairwise-authenticated bits: every party sends its bit and the MAC on it to every other
/// party, which verifies the MAC under its key before accepting the bit.
#[derive(Debug)]
pub struct AuthBitOpener {
    delta: Delta,
}

impl Opener<AuthBit> for AuthBitOpener {
    fn new(role: &Role<Delta>) -> Self {
        AuthBitOpener { delta: role.key }
    }

    async fn open<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        shares: &[AuthBit],
    ) -> Result<Vec<Gf2>, PrepError> {
        let (i, n) = (ctx.id(), ctx.parties());
        let msgs: Vec<Vec<_>> = (0..n)
            .map(|k| {
                if k == i {
                    vec![]
                } else {
                    shares.iter().map(|s| (s.bit(), s.mac_for(k))).collect()
                }
            })
            .collect();
        let received = scatter(ctx.channel(), i, "open bits", &msgs).await?;
        let mut opened: Vec<Gf2> = shares.iter().map(|s| Gf2(s.bit())).collect();
        for k in (0..n).filter(|k| *k != i) {
            for (j, ((bit, mac), share)) in received[k].iter().zip(shares).enumerate() {
                let expected = share.key_for(k) ^ (*bit & self.delta);
                if !bool::from(mac.0.to_le_bytes().ct_eq(&expected.0.to_le_bytes())) {
                    error!(party = k, index = j, "wrong MAC on opened bit");
                    return Err(PrepError::MacFail);
                }
                opened[j].0 ^= *bit;
            }
        }
        Ok(opened)
    }

    async fn check<C: Channel>(&mut self, _ctx: &Ctx<C>) -> Result<(), PrepError> {
        Ok(())
    }
}
