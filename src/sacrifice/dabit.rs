use rand::Rng;
use tracing::{Level, debug, instrument};

use super::{ShuffleSacrifice, abort, check_bits, failed};
use crate::{
    channel::Channel,
    coins::shared_rng,
    context::Ctx,
    domain::{Gf2, ShareDomain},
    error::{Check, PrepError},
    items::{DaBit, Triple},
    open::Opener,
    share::{Role, Share},
};

/// Certifies daBits by bucket cut-and-choose, for domains too small for [`DabitSacrifice`].
///
/// For a kept daBit `(a_k, b_k)` and a check daBit `(a_j, b_j)`, the parties open
/// `c = b_k ⊕ b_j` and require `a_k - a_j` (if `c = 0`) or `a_k + a_j - 1` (if `c = 1`) to open
/// to zero.
#[derive(Debug, Clone, Copy)]
pub struct DabitShuffleSacrifice(pub ShuffleSacrifice);

impl DabitShuffleSacrifice {
    /// Turns exactly `B·n + C` candidates into `n` certified daBits.
    #[instrument(level = Level::DEBUG, skip_all, fields(n = n), err)]
    pub async fn sacrifice<A: Share, B: Share<Clear = Gf2>, C: Channel>(
        &self,
        ctx: &Ctx<C>,
        arith_role: &Role<A::MacKey>,
        arith: &mut A::Opener,
        binary: &mut B::Opener,
        candidates: Vec<DaBit<A, B>>,
        n: usize,
    ) -> Result<Vec<DaBit<A, B>>, PrepError> {
        let (buckets, _) = self.0.shuffle(ctx, candidates, n).await?;

        let canary_a: Vec<A> = buckets.canaries.iter().map(|d| d.arith.clone()).collect();
        let canary_b: Vec<B> = buckets.canaries.iter().map(|d| d.bit.clone()).collect();
        let opened_a = arith.open(ctx, &canary_a).await?;
        let opened_b = binary.open(ctx, &canary_b).await?;
        let workers = ctx.crypto().workers();
        let canaries: Vec<_> = opened_a.iter().zip(&opened_b).collect();
        let matches = workers.map(&canaries, |(a, b)| **a == A::Clear::from_u64(b.0 as u64));
        if let Some(index) = matches.iter().position(|ok| !ok) {
            return Err(abort(Check::Canary, index));
        }

        let kept = &buckets.kept;
        let xors = workers.map(&buckets.checks, |(k, check)| {
            kept[*k].bit.clone() + check.bit.clone()
        });
        let xors = binary.open(ctx, &xors).await?;
        binary.check(ctx).await?;

        let one = A::constant(A::Clear::one(), arith_role);
        let checks: Vec<_> = buckets.checks.iter().zip(&xors).collect();
        let zeros = workers.map(&checks, |((k, check), c)| {
            let keep = kept[*k].arith.clone();
            if c.0 {
                keep + check.arith.clone() - one.clone()
            } else {
                keep - check.arith.clone()
            }
        });
        arith
            .check_for(ctx, A::Clear::zero(), &zeros)
            .await
            .map_err(failed(Check::Bucket))?;
        Ok(buckets.kept)
    }
}

/// Certifies daBits over a large ring with random subset parity checks.
///
/// Each of the `S` checks sums a random public subset of the `n` daBits plus one dedicated extra
/// daBit in both domains. The arithmetic sum is multiplied by `2^(k-1)` before opening, which
/// reveals only its parity, and the parity must equal the XOR opened in the binary domain. The
/// extra daBits mask the parities and are discarded.
#[derive(Debug, Clone, Copy)]
pub struct DabitSacrifice {
    checks: usize,
    square_check: bool,
}

impl DabitSacrifice {
    /// Creates a sacrifice with `checks` parity checks, optionally also requiring `a·a == a`.
    pub fn new(checks: usize, square_check: bool) -> Self {
        DabitSacrifice {
            checks,
            square_check,
        }
    }

    /// The number of candidates needed for `n` certified daBits.
    pub fn minimum_n_inputs(&self, n: usize) -> usize {
        n + self.checks
    }

    /// Whether the sacrifice needs one arithmetic triple per daBit for the square check.
    pub fn needs_triples(&self) -> bool {
        self.square_check
    }

    /// Turns exactly `n + S` candidates into `n` certified daBits. If the square check is enabled,
    /// `triples` must hold (at least) `n` certified arithmetic triples.
    #[instrument(level = Level::DEBUG, skip_all, fields(n = n), err)]
    #[allow(clippy::too_many_arguments)]
    pub async fn sacrifice<A: Share, B: Share<Clear = Gf2>, C: Channel>(
        &self,
        ctx: &Ctx<C>,
        arith_role: &Role<A::MacKey>,
        arith: &mut A::Opener,
        binary: &mut B::Opener,
        mut candidates: Vec<DaBit<A, B>>,
        n: usize,
        mut triples: Vec<Triple<A>>,
    ) -> Result<Vec<DaBit<A, B>>, PrepError> {
        if !A::Clear::IS_RING {
            return Err(PrepError::Configuration(format!(
                "no direct dabit sacrifice over {}",
                A::Clear::NAME
            )));
        }
        let expected = self.minimum_n_inputs(n);
        if candidates.len() != expected {
            return Err(PrepError::SizeMismatch {
                expected,
                actual: candidates.len(),
            });
        }
        let mut rng = shared_rng(ctx).await?;
        let subsets: Vec<Vec<bool>> = (0..self.checks)
            .map(|_| (0..n).map(|_| rng.random()).collect())
            .collect();

        let dabits = &candidates;
        let shift = A::Clear::power_of_two(A::Clear::BITS - 1);
        let indexed: Vec<(usize, &Vec<bool>)> = subsets.iter().enumerate().collect();
        let sums = ctx.crypto().workers().map(&indexed, |(j, subset)| {
            let mut a = dabits[n + j].arith.clone();
            let mut b = dabits[n + j].bit.clone();
            for (d, _) in dabits.iter().zip(subset.iter()).filter(|(_, selected)| **selected) {
                a = a + d.arith.clone();
                b = b + d.bit.clone();
            }
            (a.scale(shift), b)
        });
        let (sums_a, sums_b): (Vec<A>, Vec<B>) = sums.into_iter().unzip();
        let parities_a = arith.open(ctx, &sums_a).await?;
        let parities_b = binary.open(ctx, &sums_b).await?;
        for (index, (a, b)) in parities_a.iter().zip(&parities_b).enumerate() {
            if !a.is_zero() != b.0 {
                return Err(abort(Check::DabitParity, index));
            }
        }
        arith.check(ctx).await?;
        binary.check(ctx).await?;
        debug!(checks = self.checks, "dabit parities match");

        candidates.truncate(n);
        if self.square_check {
            let values: Vec<A> = candidates.iter().map(|d| d.arith.clone()).collect();
            check_bits(ctx, arith_role, arith, &values, &mut triples).await?;
        }
        Ok(candidates)
    }
}
