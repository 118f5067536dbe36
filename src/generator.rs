//! Sources of raw (unverified) correlated randomness.

use std::{collections::BTreeMap, future::Future};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::{
    channel::Channel,
    context::Ctx,
    data_types::{Auth, AuthBit, Delta, Key, Mac},
    domain::{Field, Gf2, ShareDomain},
    error::PrepError,
    items::{DaBit, EdaBit, InputTuple, Kind, Square, Triple},
    share::{Additive, Role, Share, Spdz},
};

/// A scheme-specific producer of unverified items of a single share type.
///
/// Every `buffer_*` call appends one batch to `out`. Kinds that the generator cannot produce fail
/// with [`PrepError::NotImplemented`].
pub trait RawGenerator<S: Share>: Send {
    /// The role (and MAC key) of the party the generated shares belong to.
    fn role(&self) -> &Role<S::MacKey>;

    /// Appends a batch of multiplication triples.
    fn buffer_triples<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        _out: &mut Vec<Triple<S>>,
    ) -> impl Future<Output = Result<(), PrepError>> + Send {
        async { Err(PrepError::NotImplemented(Kind::Triple)) }
    }

    /// Appends a batch of square pairs.
    fn buffer_squares<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        _out: &mut Vec<Square<S>>,
    ) -> impl Future<Output = Result<(), PrepError>> + Send {
        async { Err(PrepError::NotImplemented(Kind::Square)) }
    }

    /// Appends a batch of random bits.
    fn buffer_bits<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        _out: &mut Vec<S>,
    ) -> impl Future<Output = Result<(), PrepError>> + Send {
        async { Err(PrepError::NotImplemented(Kind::Bit)) }
    }

    /// Appends a batch of input masks for inputs of `player`.
    fn buffer_inputs<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        _player: usize,
        _out: &mut Vec<InputTuple<S>>,
    ) -> impl Future<Output = Result<(), PrepError>> + Send {
        async { Err(PrepError::NotImplemented(Kind::Input)) }
    }
}

/// A producer of unverified items that span the arithmetic share type `A` and the bit share type
/// `B`.
pub trait MixedGenerator<A: Share, B: Share<Clear = Gf2>>: Send {
    /// Appends a batch of daBits.
    fn buffer_dabits<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        _out: &mut Vec<DaBit<A, B>>,
    ) -> impl Future<Output = Result<(), PrepError>> + Send {
        async { Err(PrepError::NotImplemented(Kind::DaBit)) }
    }

    /// Appends a batch of edaBits of `n_bits` bits. `strict` asks for an exact decomposition. A
    /// generator may ignore it: strict edaBits are always sanitized with daBits before use.
    fn buffer_edabits<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        _strict: bool,
        _n_bits: usize,
        _out: &mut Vec<EdaBit<A, B>>,
    ) -> impl Future<Output = Result<(), PrepError>> + Send {
        async { Err(PrepError::NotImplemented(Kind::EdaBit)) }
    }
}

/// Sharing schemes whose shares can be produced by a dealer that knows the keys of all parties.
pub trait DealShare: Share {
    /// Samples the MAC keys of all parties.
    fn deal_keys<R: Rng>(rng: &mut R, parties: usize) -> Vec<Self::MacKey>;

    /// Shares `value` among all parties, returning the share of every party.
    fn deal<R: Rng>(rng: &mut R, value: Self::Clear, keys: &[Self::MacKey]) -> Vec<Self>;
}

fn additive_split<T: ShareDomain, R: Rng>(rng: &mut R, value: T, parties: usize) -> Vec<T> {
    let mut shares: Vec<T> = (1..parties).map(|_| T::random(rng)).collect();
    let rest = shares.iter().fold(value, |acc, s| acc - *s);
    shares.push(rest);
    shares
}

impl<T: ShareDomain> DealShare for Additive<T> {
    fn deal_keys<R: Rng>(_rng: &mut R, parties: usize) -> Vec<()> {
        vec![(); parties]
    }

    fn deal<R: Rng>(rng: &mut R, value: T, keys: &[()]) -> Vec<Self> {
        additive_split(rng, value, keys.len())
            .into_iter()
            .map(Additive)
            .collect()
    }
}

impl<F: Field> DealShare for Spdz<F> {
    fn deal_keys<R: Rng>(rng: &mut R, parties: usize) -> Vec<F> {
        (0..parties).map(|_| F::random(rng)).collect()
    }

    fn deal<R: Rng>(rng: &mut R, value: F, keys: &[F]) -> Vec<Self> {
        let alpha = keys.iter().fold(F::zero(), |acc, k| acc + *k);
        let values = additive_split(rng, value, keys.len());
        let macs = additive_split(rng, alpha * value, keys.len());
        values
            .into_iter()
            .zip(macs)
            .map(|(value, mac)| Spdz { value, mac })
            .collect()
    }
}

impl DealShare for AuthBit {
    fn deal_keys<R: Rng>(rng: &mut R, parties: usize) -> Vec<Delta> {
        (0..parties).map(|_| Delta(rng.random())).collect()
    }

    fn deal<R: Rng>(rng: &mut R, value: Gf2, deltas: &[Delta]) -> Vec<Self> {
        let parties = deltas.len();
        let mut bits: Vec<bool> = (1..parties).map(|_| rng.random()).collect();
        let rest = bits.iter().fold(value.0, |acc, b| acc ^ b);
        bits.push(rest);
        let mut keys = vec![];
        for i in 0..parties {
            keys.push(vec![Key::default(); parties]);
            for (j, key) in keys[i].iter_mut().enumerate() {
                if i != j {
                    *key = Key(rng.random());
                }
            }
        }
        (0..parties)
            .map(|i| {
                let mut mac_and_key = vec![(Mac::default(), Key::default()); parties];
                for j in (0..parties).filter(|j| *j != i) {
                    let mac = keys[j][i] ^ (bits[i] & deltas[j]);
                    mac_and_key[j] = (mac, keys[i][j]);
                }
                AuthBit(bits[i], Auth(mac_and_key))
            })
            .collect()
    }
}

/// A deliberate corruption of one dealt item, used to test that sacrifices catch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// The kind of item to corrupt.
    pub kind: Kind,
    /// The index of the item among all items of this kind dealt so far.
    pub index: usize,
    /// The value added to the relation-carrying component (e.g. `c` of a triple).
    pub offset: u64,
}

/// A simulated trusted dealer, run locally by every party from a common seed.
///
/// All parties derive the same random stream and the same MAC keys, deal every item in full and
/// keep only their own share. This is insecure (every party knows all keys) and only meant for
/// tests and benchmarks, where it stands in for a real generator.
#[derive(Debug)]
pub struct InsecureDealer<S: DealShare> {
    seed: [u8; 32],
    role: Role<S::MacKey>,
    keys: Vec<S::MacKey>,
    rng: ChaCha20Rng,
    batch_size: usize,
    faults: Vec<Fault>,
    dealt: BTreeMap<Kind, usize>,
}

fn derive_rng(seed: &[u8; 32], scheme: &str, label: &str) -> ChaCha20Rng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed);
    hasher.update(b"/");
    hasher.update(scheme.as_bytes());
    hasher.update(b"/");
    hasher.update(label.as_bytes());
    ChaCha20Rng::from_seed(*hasher.finalize().as_bytes())
}

/// The MAC keys of all parties, as dealt by an [`InsecureDealer`] with the given seed.
pub fn dealt_keys<S: DealShare>(seed: &[u8; 32], parties: usize) -> Vec<S::MacKey> {
    S::deal_keys(&mut derive_rng(seed, S::SCHEME, "mac keys"), parties)
}

impl<S: DealShare> InsecureDealer<S> {
    /// Creates the dealer of party `id`. Dealers of different parties must use the same seed.
    pub fn new(
        seed: [u8; 32],
        id: usize,
        parties: usize,
        batch_size: usize,
    ) -> Result<Self, PrepError> {
        let keys = dealt_keys::<S>(&seed, parties);
        let key = keys.get(id).cloned().ok_or_else(|| {
            PrepError::Configuration(format!("party {id} is not one of {parties} parties"))
        })?;
        Ok(InsecureDealer {
            seed,
            role: Role { id, parties, key },
            keys,
            rng: derive_rng(&seed, S::SCHEME, "items"),
            batch_size,
            faults: vec![],
            dealt: BTreeMap::new(),
        })
    }

    /// Corrupts a single item (identically for all parties).
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    fn offset(&mut self, kind: Kind) -> S::Clear {
        let counter = self.dealt.entry(kind).or_default();
        let index = *counter;
        *counter += 1;
        match self.faults.iter().find(|f| f.kind == kind && f.index == index) {
            Some(fault) => {
                debug!(%kind, index, offset = fault.offset, "dealing corrupted item");
                S::Clear::from_u64(fault.offset)
            }
            None => S::Clear::zero(),
        }
    }

    fn share(&mut self, value: S::Clear) -> Result<S, PrepError> {
        own_share(S::deal(&mut self.rng, value, &self.keys), self.role.id)
    }
}

fn own_share<T>(shares: Vec<T>, id: usize) -> Result<T, PrepError> {
    shares
        .into_iter()
        .nth(id)
        .ok_or(PrepError::InvalidState("party index outside of the dealt shares"))
}

impl<S: DealShare> RawGenerator<S> for InsecureDealer<S> {
    fn role(&self) -> &Role<S::MacKey> {
        &self.role
    }

    async fn buffer_triples<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        out: &mut Vec<Triple<S>>,
    ) -> Result<(), PrepError> {
        for _ in 0..self.batch_size {
            let a = S::Clear::random(&mut self.rng);
            let b = S::Clear::random(&mut self.rng);
            let c = a * b + self.offset(Kind::Triple);
            out.push(Triple {
                a: self.share(a)?,
                b: self.share(b)?,
                c: self.share(c)?,
            });
        }
        Ok(())
    }

    async fn buffer_squares<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        out: &mut Vec<Square<S>>,
    ) -> Result<(), PrepError> {
        for _ in 0..self.batch_size {
            let a = S::Clear::random(&mut self.rng);
            let b = a * a + self.offset(Kind::Square);
            out.push(Square {
                a: self.share(a)?,
                b: self.share(b)?,
            });
        }
        Ok(())
    }

    async fn buffer_bits<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        out: &mut Vec<S>,
    ) -> Result<(), PrepError> {
        for _ in 0..self.batch_size {
            let bit = S::Clear::from_u64(self.rng.random::<bool>() as u64);
            let bit = bit + self.offset(Kind::Bit);
            out.push(self.share(bit)?);
        }
        Ok(())
    }

    async fn buffer_inputs<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        player: usize,
        out: &mut Vec<InputTuple<S>>,
    ) -> Result<(), PrepError> {
        for _ in 0..self.batch_size {
            let r = S::Clear::random(&mut self.rng);
            let share = self.share(r)?;
            let value = (player == self.role.id).then_some(r);
            out.push(InputTuple { share, value });
        }
        Ok(())
    }
}

impl<A: DealShare, B: DealShare<Clear = Gf2>> MixedGenerator<A, B> for InsecureDealer<A> {
    async fn buffer_dabits<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        out: &mut Vec<DaBit<A, B>>,
    ) -> Result<(), PrepError> {
        let bit_keys = dealt_keys::<B>(&self.seed, self.role.parties);
        for _ in 0..self.batch_size {
            let bit: bool = self.rng.random();
            let arith = A::Clear::from_u64(bit as u64) + self.offset(Kind::DaBit);
            out.push(DaBit {
                arith: self.share(arith)?,
                bit: own_share(B::deal(&mut self.rng, Gf2(bit), &bit_keys), self.role.id)?,
            });
        }
        Ok(())
    }

    async fn buffer_edabits<C: Channel>(
        &mut self,
        _ctx: &Ctx<C>,
        _strict: bool,
        n_bits: usize,
        out: &mut Vec<EdaBit<A, B>>,
    ) -> Result<(), PrepError> {
        if n_bits == 0 || n_bits > A::Clear::BITS as usize {
            return Err(PrepError::Configuration(format!(
                "edabits of {n_bits} bits in {}",
                A::Clear::NAME
            )));
        }
        let bit_keys = dealt_keys::<B>(&self.seed, self.role.parties);
        let mask = if n_bits == 64 {
            u64::MAX
        } else {
            (1u64 << n_bits) - 1
        };
        for _ in 0..self.batch_size {
            let r = self.rng.random::<u64>() & mask;
            let sum = A::Clear::from_u64(r) + self.offset(Kind::EdaBit);
            let mut bits = Vec::with_capacity(n_bits);
            for i in 0..n_bits {
                let bit = Gf2((r >> i) & 1 == 1);
                bits.push(own_share(B::deal(&mut self.rng, bit, &bit_keys), self.role.id)?);
            }
            out.push(EdaBit {
                sum: self.share(sum)?,
                bits,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::SimpleChannel, config::PrepConfig, context::CryptoContext, domain::Z64};

    #[tokio::test]
    async fn dealers_with_same_seed_share_consistent_triples() -> Result<(), PrepError> {
        let parties = 3;
        let crypto = CryptoContext::new(&PrepConfig::default())?;
        let mut channels = SimpleChannel::channels(parties);
        let ctx = Ctx::new(channels.remove(0), 0, parties, crypto)?;
        let fault = Fault {
            kind: Kind::Triple,
            index: 2,
            offset: 5,
        };
        let mut triples = vec![];
        for id in 0..parties {
            let mut dealer =
                InsecureDealer::<Additive<Z64>>::new([1; 32], id, parties, 4)?.with_fault(fault);
            let mut out = vec![];
            dealer.buffer_triples(&ctx, &mut out).await?;
            triples.push(out);
        }
        for t in 0..4 {
            let open = |f: fn(&Triple<Additive<Z64>>) -> Z64| {
                (0..parties).fold(Z64(0), |acc, p| acc + f(&triples[p][t]))
            };
            let (a, b, c) = (open(|x| x.a.0), open(|x| x.b.0), open(|x| x.c.0));
            if t == 2 {
                assert_eq!(c, a * b + Z64(5));
            } else {
                assert_eq!(c, a * b);
            }
        }
        Ok(())
    }

    #[test]
    fn dealt_auth_bits_carry_valid_macs() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let deltas = AuthBit::deal_keys(&mut rng, 3);
        let shares = AuthBit::deal(&mut rng, Gf2(true), &deltas);
        assert!(shares.iter().fold(false, |acc, s| acc ^ s.bit()));
        for (i, share) in shares.iter().enumerate() {
            for (j, other) in shares.iter().enumerate().filter(|(j, _)| *j != i) {
                assert_eq!(
                    share.mac_for(j),
                    other.key_for(i) ^ (share.bit() & deltas[j])
                );
            }
        }
    }
}
