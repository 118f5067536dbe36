use tracing::{Level, debug, instrument};

use super::{ShuffleSacrifice, abort, failed};
use crate::{
    beaver::Beaver,
    channel::Channel,
    context::Ctx,
    domain::{Gf2, ShareDomain},
    error::{Check, PrepError},
    items::{DaBit, EdaBit, Triple},
    open::Opener,
    share::{Role, Share},
};

fn low_bits(n_bits: usize) -> u64 {
    if n_bits >= 64 {
        u64::MAX
    } else {
        (1 << n_bits) - 1
    }
}

fn compose(bits: &[Gf2]) -> u64 {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (i, b)| acc | ((b.0 as u64) << i))
}

/// Certifies edaBits of `n_bits` bits by bucket cut-and-choose.
///
/// For a kept edaBit `(s_k, x)` and a check edaBit `(s_j, y)` the parties add `x + y mod 2^n`
/// with a ripple-carry adder on the bit shares (one AND per position, all buckets in parallel),
/// open the (uniformly random) sum `z` and require `2^(k-n)·(s_k + s_j - z)` to open to zero.
#[derive(Debug, Clone, Copy)]
pub struct EdabitShuffleSacrifice(pub ShuffleSacrifice);

impl EdabitShuffleSacrifice {
    /// The number of AND triples needed to certify `n` edaBits of `n_bits` bits.
    pub fn and_triples_needed(&self, n: usize, n_bits: usize) -> usize {
        n * (self.0.bucket_size() - 1) * n_bits.saturating_sub(1)
    }

    /// Turns exactly `B·n + C` candidates into `n` certified (loose) edaBits.
    #[instrument(level = Level::DEBUG, skip_all, fields(n = n, n_bits = n_bits), err)]
    #[allow(clippy::too_many_arguments)]
    pub async fn sacrifice<A: Share, B: Share<Clear = Gf2>, C: Channel>(
        &self,
        ctx: &Ctx<C>,
        (arith_role, arith): (&Role<A::MacKey>, &mut A::Opener),
        (bit_role, binary): (&Role<B::MacKey>, &mut B::Opener),
        candidates: Vec<EdaBit<A, B>>,
        n: usize,
        n_bits: usize,
        mut and_triples: Vec<Triple<B>>,
    ) -> Result<Vec<EdaBit<A, B>>, PrepError> {
        if !A::Clear::IS_RING {
            return Err(PrepError::Configuration("no edabits".into()));
        }
        if n_bits == 0 || n_bits > A::Clear::BITS as usize {
            return Err(PrepError::Configuration(format!(
                "edabits of {n_bits} bits in {}",
                A::Clear::NAME
            )));
        }
        if let Some(e) = candidates.iter().find(|e| e.bits.len() != n_bits) {
            return Err(PrepError::SizeMismatch {
                expected: n_bits,
                actual: e.bits.len(),
            });
        }
        let needed = self.and_triples_needed(n, n_bits);
        if and_triples.len() < needed {
            return Err(PrepError::SizeMismatch {
                expected: needed,
                actual: and_triples.len(),
            });
        }
        let (buckets, _) = self.0.shuffle(ctx, candidates, n).await?;
        let mask = low_bits(n_bits);

        let sums: Vec<A> = buckets.canaries.iter().map(|e| e.sum.clone()).collect();
        let bits: Vec<B> = buckets
            .canaries
            .iter()
            .flat_map(|e| e.bits.iter().cloned())
            .collect();
        let opened_sums = arith.open(ctx, &sums).await?;
        let opened_bits = binary.open(ctx, &bits).await?;
        let workers = ctx.crypto().workers();
        let canaries: Vec<_> = opened_sums
            .iter()
            .zip(opened_bits.chunks_exact(n_bits))
            .collect();
        let matches = workers.map(&canaries, |(sum, bits)| sum.to_u64() & mask == compose(bits));
        if let Some(index) = matches.iter().position(|ok| !ok) {
            return Err(abort(Check::Canary, index));
        }

        let kept = &buckets.kept;
        let pairs: Vec<(&EdaBit<A, B>, &EdaBit<A, B>)> = buckets
            .checks
            .iter()
            .map(|(k, check)| (&kept[*k], check))
            .collect();
        let zero = B::constant(Gf2(false), bit_role);
        let mut carries = vec![zero; pairs.len()];
        let mut digits = vec![vec![]; pairs.len()];
        let mut beaver = Beaver::new(bit_role.clone());
        for i in 0..n_bits {
            let rows = pairs.iter().zip(&carries).zip(digits.iter_mut());
            for (((x, y), carry), digit) in rows {
                digit.push(x.bits[i].clone() + y.bits[i].clone() + carry.clone());
            }
            if i + 1 == n_bits {
                break;
            }
            // carry' = carry ⊕ ((x ⊕ carry) ∧ (y ⊕ carry))
            let rows: Vec<_> = pairs.iter().zip(&carries).collect();
            let factors = workers.map(&rows, |((x, y), carry)| {
                (
                    x.bits[i].clone() + B::clone(carry),
                    y.bits[i].clone() + B::clone(carry),
                )
            });
            let ands = beaver
                .multiply(ctx, binary, &mut and_triples, &factors)
                .await?;
            for (carry, and) in carries.iter_mut().zip(ands) {
                *carry = carry.clone() + and;
            }
        }
        let flat: Vec<B> = digits.into_iter().flatten().collect();
        let opened = binary.open(ctx, &flat).await?;
        binary.check(ctx).await?;
        debug!(pairs = pairs.len(), "added bucket pairs in the binary domain");

        let shift = A::Clear::power_of_two(A::Clear::BITS - n_bits as u32);
        let sums: Vec<_> = pairs.iter().zip(opened.chunks_exact(n_bits)).collect();
        let zeros = workers.map(&sums, |((x, y), z)| {
            let z = A::constant(A::Clear::from_u64(compose(z)), arith_role);
            (x.sum.clone() + y.sum.clone() - z).scale(shift)
        });
        arith
            .check_for(ctx, A::Clear::zero(), &zeros)
            .await
            .map_err(failed(Check::Bucket))?;
        Ok(buckets.kept)
    }
}

/// Forces an exact bit decomposition: every bit is converted into the arithmetic domain with a
/// certified daBit `(r_a, r_b)` by opening `c = bit ⊕ r_b`, and the arithmetic value is replaced by
/// `Σ 2^i·bit_i`. Needs `n_bits` daBits per edaBit.
#[instrument(level = Level::DEBUG, skip_all, fields(n = edabits.len()), err)]
pub async fn sanitize_edabits<A: Share, B: Share<Clear = Gf2>, C: Channel>(
    ctx: &Ctx<C>,
    arith_role: &Role<A::MacKey>,
    binary: &mut B::Opener,
    edabits: Vec<EdaBit<A, B>>,
    dabits: Vec<DaBit<A, B>>,
) -> Result<Vec<EdaBit<A, B>>, PrepError> {
    let needed: usize = edabits.iter().map(|e| e.bits.len()).sum();
    if dabits.len() != needed {
        return Err(PrepError::SizeMismatch {
            expected: needed,
            actual: dabits.len(),
        });
    }
    let workers = ctx.crypto().workers();
    let pairs: Vec<(&B, &DaBit<A, B>)> = edabits
        .iter()
        .flat_map(|e| e.bits.iter())
        .zip(&dabits)
        .collect();
    let masked = workers.map(&pairs, |(bit, r)| B::clone(bit) + r.bit.clone());
    let opened = binary.open(ctx, &masked).await?;
    binary.check(ctx).await?;
    if opened.len() != needed {
        return Err(PrepError::InvalidState("ran out of masks while sanitizing"));
    }

    let zero = A::constant(A::Clear::zero(), arith_role);
    let one = A::constant(A::Clear::one(), arith_role);
    let mut start = 0;
    let spans: Vec<(usize, usize)> = edabits
        .iter()
        .map(|e| {
            let span = (start, e.bits.len());
            start += e.bits.len();
            span
        })
        .collect();
    let sums = workers.map(&spans, |(start, len)| {
        (0..*len).fold(zero.clone(), |sum, i| {
            let r = dabits[start + i].arith.clone();
            let bit = if opened[start + i].0 { one.clone() - r } else { r };
            sum + bit.scale(A::Clear::power_of_two(i as u32))
        })
    });
    Ok(edabits
        .into_iter()
        .zip(sums)
        .map(|(EdaBit { bits, .. }, sum)| EdaBit { sum, bits })
        .collect())
}
