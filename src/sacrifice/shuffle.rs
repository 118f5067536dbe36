use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use tracing::{Level, debug, instrument};

use super::{abort, failed};
use crate::{
    channel::Channel,
    coins::shared_rng,
    config::PrepConfig,
    context::Ctx,
    domain::ShareDomain,
    error::{Check, PrepError},
    items::{Square, Triple},
    open::Opener,
    share::Share,
};

/// Bucket cut-and-choose: `B·N + C` candidates are shuffled with public coins, `C` canaries are
/// opened completely and the rest is cut into `N` buckets of `B` items. The first item of every
/// bucket is kept, the other `B - 1` are used up to check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuffleSacrifice {
    bucket_size: usize,
    canaries: usize,
}

/// Shuffled candidates, split up for checking.
pub(crate) struct Buckets<T> {
    pub(crate) canaries: Vec<T>,
    pub(crate) kept: Vec<T>,
    /// Every check item together with the index of the kept item it checks.
    pub(crate) checks: Vec<(usize, T)>,
}

impl ShuffleSacrifice {
    /// Creates a sacrifice with `bucket_size` items per bucket and `canaries` opened items.
    pub fn new(bucket_size: usize, canaries: usize) -> Result<Self, PrepError> {
        if bucket_size < 2 {
            return Err(PrepError::Configuration(format!(
                "bucket size {bucket_size} leaves nothing to sacrifice"
            )));
        }
        Ok(ShuffleSacrifice {
            bucket_size,
            canaries,
        })
    }

    /// Uses the bucket size and number of canaries of the config.
    pub fn from_config(config: &PrepConfig) -> Result<Self, PrepError> {
        Self::new(config.bucket_size, config.canaries)
    }

    /// The number of candidates needed for `n` certified items.
    pub fn minimum_n_inputs(&self, n: usize) -> usize {
        self.bucket_size * n + self.canaries
    }

    /// The number of items per bucket.
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Shuffles the candidates with fresh public coins and splits them into canaries and buckets.
    ///
    /// The returned rng continues the public coins and can be used for further challenges.
    pub(crate) async fn shuffle<T, C: Channel>(
        &self,
        ctx: &Ctx<C>,
        mut items: Vec<T>,
        n: usize,
    ) -> Result<(Buckets<T>, ChaCha20Rng), PrepError> {
        let expected = self.minimum_n_inputs(n);
        if items.len() != expected {
            return Err(PrepError::SizeMismatch {
                expected,
                actual: items.len(),
            });
        }
        let mut rng = shared_rng(ctx).await?;
        items.shuffle(&mut rng);

        let rest = items.split_off(self.canaries);
        let mut kept = Vec::with_capacity(n);
        let mut checks = Vec::with_capacity(n * (self.bucket_size - 1));
        for (i, item) in rest.into_iter().enumerate() {
            if i % self.bucket_size == 0 {
                kept.push(item);
            } else {
                checks.push((i / self.bucket_size, item));
            }
        }
        debug!(
            n,
            bucket_size = self.bucket_size,
            canaries = self.canaries,
            "shuffled candidates into buckets"
        );
        Ok((
            Buckets {
                canaries: items,
                kept,
                checks,
            },
            rng,
        ))
    }
}

/// Certifies multiplication triples.
///
/// For a kept triple `(a, b, c)`, a check triple `(f, g, h)` and a public coefficient `t`, the
/// parties open `ρ = t·a - f` and `σ = b - g` and require `t·c - h - b·ρ - f·σ` to open to zero.
#[derive(Debug, Clone, Copy)]
pub struct TripleShuffleSacrifice(pub ShuffleSacrifice);

impl TripleShuffleSacrifice {
    /// Turns exactly `B·n + C` candidates into `n` certified triples.
    #[instrument(level = Level::DEBUG, skip_all, fields(n = n), err)]
    pub async fn sacrifice<S: Share, C: Channel>(
        &self,
        ctx: &Ctx<C>,
        opener: &mut S::Opener,
        candidates: Vec<Triple<S>>,
        n: usize,
    ) -> Result<Vec<Triple<S>>, PrepError> {
        let (buckets, mut rng) = self.0.shuffle(ctx, candidates, n).await?;

        let mut canaries = Vec::with_capacity(3 * buckets.canaries.len());
        for t in &buckets.canaries {
            canaries.extend([t.a.clone(), t.b.clone(), t.c.clone()]);
        }
        let opened = opener.open(ctx, &canaries).await?;
        if let Some(index) = opened.chunks_exact(3).position(|x| x[0] * x[1] != x[2]) {
            return Err(abort(Check::Canary, index));
        }

        let t = S::Clear::random_coefficient(&mut rng);
        let workers = ctx.crypto().workers();
        let kept = &buckets.kept;
        let masked = workers.map(&buckets.checks, |(k, check)| {
            let keep = &kept[*k];
            (
                keep.a.clone().scale(t) - check.a.clone(),
                keep.b.clone() - check.b.clone(),
            )
        });
        let (rhos, sigmas): (Vec<S>, Vec<S>) = masked.into_iter().unzip();
        let m = rhos.len();
        let mut to_open = rhos;
        to_open.extend(sigmas);
        let opened = opener.open(ctx, &to_open).await?;
        let (rhos, sigmas) = opened.split_at(m);

        let checks: Vec<_> = buckets.checks.iter().zip(rhos).zip(sigmas).collect();
        let zeros = workers.map(&checks, |(((k, check), rho), sigma)| {
            let keep = &kept[*k];
            keep.c.clone().scale(t)
                - check.c.clone()
                - keep.b.clone().scale(**rho)
                - check.a.clone().scale(**sigma)
        });
        opener
            .check_for(ctx, S::Clear::zero(), &zeros)
            .await
            .map_err(failed(Check::Bucket))?;
        Ok(buckets.kept)
    }
}

/// Certifies square pairs.
///
/// For a kept pair `(a, b)`, a check pair `(f, h)` and a public coefficient `t`, the parties open
/// `ρ = t·a - f` and require `t²·b - h - ρ·(t·a + f)` to open to zero.
#[derive(Debug, Clone, Copy)]
pub struct SquareShuffleSacrifice(pub ShuffleSacrifice);

impl SquareShuffleSacrifice {
    /// Turns exactly `B·n + C` candidates into `n` certified square pairs.
    #[instrument(level = Level::DEBUG, skip_all, fields(n = n), err)]
    pub async fn sacrifice<S: Share, C: Channel>(
        &self,
        ctx: &Ctx<C>,
        opener: &mut S::Opener,
        candidates: Vec<Square<S>>,
        n: usize,
    ) -> Result<Vec<Square<S>>, PrepError> {
        let (buckets, mut rng) = self.0.shuffle(ctx, candidates, n).await?;

        let mut canaries = Vec::with_capacity(2 * buckets.canaries.len());
        for s in &buckets.canaries {
            canaries.extend([s.a.clone(), s.b.clone()]);
        }
        let opened = opener.open(ctx, &canaries).await?;
        if let Some(index) = opened.chunks_exact(2).position(|x| x[0] * x[0] != x[1]) {
            return Err(abort(Check::Canary, index));
        }

        let t = S::Clear::random_coefficient(&mut rng);
        let workers = ctx.crypto().workers();
        let kept = &buckets.kept;
        let rhos = workers.map(&buckets.checks, |(k, check)| {
            kept[*k].a.clone().scale(t) - check.a.clone()
        });
        let rhos = opener.open(ctx, &rhos).await?;

        let checks: Vec<_> = buckets.checks.iter().zip(&rhos).collect();
        let zeros = workers.map(&checks, |((k, check), rho)| {
            let keep = &kept[*k];
            keep.b.clone().scale(t * t)
                - check.b.clone()
                - (keep.a.clone().scale(t) + check.a.clone()).scale(**rho)
        });
        opener
            .check_for(ctx, S::Clear::zero(), &zeros)
            .await
            .map_err(failed(Check::Bucket))?;
        Ok(buckets.kept)
    }
}
