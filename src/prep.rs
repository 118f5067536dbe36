//! Pools of preprocessed items, refilled batch by batch and handed out one at a time.

use std::collections::BTreeMap;

use tracing::{Level, debug, instrument};

use crate::{
    beaver::{Beaver, TripleSource},
    channel::Channel,
    config::{DabitMethod, EdabitMethod, PrepConfig, PrepStrategy},
    context::Ctx,
    domain::ShareDomain,
    error::PrepError,
    generator::{MixedGenerator, RawGenerator},
    items::{DaBit, EdaBit, InputTuple, Kind, Square, Triple},
    open::Opener,
    sacrifice::{
        DabitSacrifice, DabitShuffleSacrifice, EdabitShuffleSacrifice, ShuffleSacrifice,
        SquareShuffleSacrifice, TripleShuffleSacrifice, certify_bits, sanitize_edabits,
    },
    share::{Role, Share, Suite},
};

fn no(kind: Kind) -> PrepError {
    PrepError::Configuration(format!("no {kind}"))
}

/// A generator that cannot produce a kind makes the kind unavailable for the whole computation.
fn unsupported(e: PrepError) -> PrepError {
    match e {
        PrepError::NotImplemented(kind) => no(kind),
        e => e,
    }
}

fn pop<T>(
    pool: &mut Vec<T>,
    usage: &mut BTreeMap<Kind, usize>,
    kind: Kind,
) -> Result<T, PrepError> {
    let item = pool.pop().ok_or(PrepError::ExhaustedSupply {
        kind,
        requested: 1,
        available: 0,
    })?;
    *usage.entry(kind).or_default() += 1;
    Ok(item)
}

fn no_progress(kind: Kind, requested: usize, available: usize) -> PrepError {
    PrepError::ExhaustedSupply {
        kind,
        requested,
        available,
    }
}

/// The pools of a single share type, refilled from a raw generator (and certified if required).
#[derive(Debug)]
pub struct DomainPrep<S: Share, G> {
    pub(crate) role: Role<S::MacKey>,
    pub(crate) opener: S::Opener,
    pub(crate) generator: G,
    certify: bool,
    shuffle: ShuffleSacrifice,
    buffer_size: usize,
    triples: Vec<Triple<S>>,
    squares: Vec<Square<S>>,
    bits: Vec<S>,
    inverses: Vec<(S, S)>,
    inputs: BTreeMap<usize, Vec<InputTuple<S>>>,
    usage: BTreeMap<Kind, usize>,
}

impl<S: Share, G: RawGenerator<S>> DomainPrep<S, G> {
    /// Creates empty pools that are refilled from `generator`, certifying every batch if
    /// `certify` is set.
    pub fn new(generator: G, config: &PrepConfig, certify: bool) -> Result<Self, PrepError> {
        config.validate()?;
        let role = generator.role().clone();
        Ok(DomainPrep {
            opener: S::Opener::new(&role),
            role,
            generator,
            certify,
            shuffle: ShuffleSacrifice::from_config(config)?,
            buffer_size: config.buffer_size,
            triples: vec![],
            squares: vec![],
            bits: vec![],
            inverses: vec![],
            inputs: BTreeMap::new(),
            usage: BTreeMap::new(),
        })
    }

    /// The role of this party.
    pub fn role(&self) -> &Role<S::MacKey> {
        &self.role
    }

    /// The opener of this share type, used to open values derived from the handed out items.
    pub fn opener(&mut self) -> &mut S::Opener {
        &mut self.opener
    }

    /// The number of items taken from the pools so far, per kind. This includes the triples used up
    /// internally to certify bits, derive inverses and multiply.
    pub fn usage(&self) -> &BTreeMap<Kind, usize> {
        &self.usage
    }

    /// Returns a triple. Only [`Kind::Triple`] is handed out as three shares.
    pub async fn get_three<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        kind: Kind,
    ) -> Result<Triple<S>, PrepError> {
        if kind != Kind::Triple {
            return Err(no(kind));
        }
        if self.triples.is_empty() {
            self.buffer_triples(ctx).await?;
        }
        pop(&mut self.triples, &mut self.usage, kind)
    }

    /// Returns a square pair `(a, a·a)` for [`Kind::Square`] or an inverse pair `(a, a^-1)` for
    /// [`Kind::Inverse`].
    pub async fn get_two<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        kind: Kind,
    ) -> Result<(S, S), PrepError> {
        match kind {
            Kind::Square => {
                if self.squares.is_empty() {
                    self.buffer_squares(ctx).await?;
                }
                let Square { a, b } = pop(&mut self.squares, &mut self.usage, kind)?;
                Ok((a, b))
            }
            Kind::Inverse => {
                if self.inverses.is_empty() {
                    self.buffer_inverses(ctx).await?;
                }
                pop(&mut self.inverses, &mut self.usage, kind)
            }
            kind => Err(no(kind)),
        }
    }

    /// Returns a shared random bit. Only [`Kind::Bit`] is handed out as a single share.
    pub async fn get_one<C: Channel>(&mut self, ctx: &Ctx<C>, kind: Kind) -> Result<S, PrepError> {
        if kind != Kind::Bit {
            return Err(no(kind));
        }
        if self.bits.is_empty() {
            self.buffer_bits(ctx).await?;
        }
        pop(&mut self.bits, &mut self.usage, kind)
    }

    /// Returns an input mask for an input of `player`. The clear mask is only known to `player`.
    pub async fn get_input<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        player: usize,
    ) -> Result<InputTuple<S>, PrepError> {
        if player >= self.role.parties {
            return Err(PrepError::Configuration(format!(
                "no inputs for party {player} of {}",
                self.role.parties
            )));
        }
        let pool = self.inputs.entry(player).or_default();
        if pool.is_empty() {
            self.generator
                .buffer_inputs(ctx, player, pool)
                .await
                .map_err(unsupported)?;
            debug!(scheme = S::SCHEME, player, n = pool.len(), "buffered inputs");
        }
        pop(pool, &mut self.usage, Kind::Input)
    }

    /// Takes `n` triples out of the pool, refilling it as often as necessary.
    pub(crate) async fn take_triples<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        n: usize,
    ) -> Result<Vec<Triple<S>>, PrepError> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if self.triples.is_empty() {
                self.buffer_triples(ctx).await?;
            }
            let k = (n - out.len()).min(self.triples.len());
            let at = self.triples.len() - k;
            out.extend(self.triples.drain(at..));
        }
        *self.usage.entry(Kind::Triple).or_default() += n;
        Ok(out)
    }

    /// Multiplies all pairs with Beaver's protocol, using up one triple of the pool per pair.
    pub async fn multiply<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        pairs: &[(S, S)],
    ) -> Result<Vec<S>, PrepError> {
        let mut triples = self.take_triples(ctx, pairs.len()).await?;
        Beaver::new(self.role.clone())
            .multiply(ctx, &mut self.opener, &mut triples, pairs)
            .await
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(scheme = S::SCHEME), err)]
    async fn buffer_triples<C: Channel>(&mut self, ctx: &Ctx<C>) -> Result<(), PrepError> {
        let n = self.buffer_size;
        if !self.certify {
            self.generator
                .buffer_triples(ctx, &mut self.triples)
                .await
                .map_err(unsupported)?;
            if self.triples.is_empty() {
                return Err(no_progress(Kind::Triple, n, 0));
            }
            return Ok(());
        }
        let needed = self.shuffle.minimum_n_inputs(n);
        let mut raw = Vec::with_capacity(needed);
        while raw.len() < needed {
            let before = raw.len();
            self.generator
                .buffer_triples(ctx, &mut raw)
                .await
                .map_err(unsupported)?;
            if raw.len() == before {
                return Err(no_progress(Kind::Triple, needed, before));
            }
        }
        raw.truncate(needed);
        let certified = TripleShuffleSacrifice(self.shuffle)
            .sacrifice(ctx, &mut self.opener, raw, n)
            .await?;
        debug!(n = certified.len(), "certified triples");
        self.triples.extend(certified);
        Ok(())
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(scheme = S::SCHEME), err)]
    async fn buffer_squares<C: Channel>(&mut self, ctx: &Ctx<C>) -> Result<(), PrepError> {
        let n = self.buffer_size;
        if !self.certify {
            self.generator
                .buffer_squares(ctx, &mut self.squares)
                .await
                .map_err(unsupported)?;
            if self.squares.is_empty() {
                return Err(no_progress(Kind::Square, n, 0));
            }
            return Ok(());
        }
        let needed = self.shuffle.minimum_n_inputs(n);
        let mut raw = Vec::with_capacity(needed);
        while raw.len() < needed {
            let before = raw.len();
            self.generator
                .buffer_squares(ctx, &mut raw)
                .await
                .map_err(unsupported)?;
            if raw.len() == before {
                return Err(no_progress(Kind::Square, needed, before));
            }
        }
        raw.truncate(needed);
        let certified = SquareShuffleSacrifice(self.shuffle)
            .sacrifice(ctx, &mut self.opener, raw, n)
            .await?;
        debug!(n = certified.len(), "certified squares");
        self.squares.extend(certified);
        Ok(())
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(scheme = S::SCHEME), err)]
    async fn buffer_bits<C: Channel>(&mut self, ctx: &Ctx<C>) -> Result<(), PrepError> {
        let n = self.buffer_size;
        let mut raw = Vec::with_capacity(n);
        while raw.len() < n {
            let before = raw.len();
            self.generator
                .buffer_bits(ctx, &mut raw)
                .await
                .map_err(unsupported)?;
            if raw.len() == before {
                return Err(no_progress(Kind::Bit, n, before));
            }
        }
        if !self.certify {
            self.bits.extend(raw);
            return Ok(());
        }
        raw.truncate(n);
        let triples = if S::Clear::BITS == 1 {
            vec![]
        } else {
            self.take_triples(ctx, n).await?
        };
        let certified = certify_bits(ctx, &self.role, &mut self.opener, raw, triples).await?;
        debug!(n = certified.len(), "certified bits");
        self.bits.extend(certified);
        Ok(())
    }

    /// Derives inverse pairs from triples: `c = a·b` is opened and, if it is a unit,
    /// `(a, b·c^-1)` is a pair of a value and its inverse.
    #[instrument(level = Level::DEBUG, skip_all, fields(scheme = S::SCHEME), err)]
    async fn buffer_inverses<C: Channel>(&mut self, ctx: &Ctx<C>) -> Result<(), PrepError> {
        let triples = self.take_triples(ctx, self.buffer_size).await?;
        let cs: Vec<S> = triples.iter().map(|t| t.c.clone()).collect();
        let opened = self.opener.open(ctx, &cs).await?;
        self.opener.check(ctx).await?;
        let before = self.inverses.len();
        for (t, c) in triples.into_iter().zip(opened) {
            if let Some(inv) = c.inverse() {
                self.inverses.push((t.a, t.b.scale(inv)));
            }
        }
        let derived = self.inverses.len() - before;
        if derived == 0 {
            return Err(PrepError::OutOfTriples);
        }
        debug!(derived, discarded = self.buffer_size - derived, "derived inverses");
        Ok(())
    }
}

impl<S: Share, G: RawGenerator<S>> TripleSource<S> for DomainPrep<S, G> {
    async fn next_triple<C: Channel>(&mut self, ctx: &Ctx<C>) -> Result<Triple<S>, PrepError> {
        self.get_three(ctx, Kind::Triple).await
    }
}

type Arith<P> = <P as Suite>::Arith;
type Bit<P> = <P as Suite>::Bit;

/// All preprocessing of a suite: an arithmetic and a binary [`DomainPrep`] plus the pools of
/// items that span both domains.
pub struct BufferPrep<P: Suite, GA, GB> {
    arith: DomainPrep<Arith<P>, GA>,
    binary: DomainPrep<Bit<P>, GB>,
    strategy: PrepStrategy,
    config: PrepConfig,
    dabits: Vec<DaBit<Arith<P>, Bit<P>>>,
    edabits: BTreeMap<(bool, usize), Vec<EdaBit<Arith<P>, Bit<P>>>>,
    usage: BTreeMap<Kind, usize>,
}

impl<P: Suite, GA, GB> Drop for BufferPrep<P, GA, GB> {
    fn drop(&mut self) {
        debug!(
            arith = ?self.arith.usage,
            binary = ?self.binary.usage,
            mixed = ?self.usage,
            "preprocessing usage"
        );
    }
}

impl<P, GA, GB> BufferPrep<P, GA, GB>
where
    P: Suite,
    GA: RawGenerator<Arith<P>> + MixedGenerator<Arith<P>, Bit<P>>,
    GB: RawGenerator<Bit<P>>,
{
    /// Creates the preprocessing of a party from its arithmetic and binary generators.
    pub fn new(config: PrepConfig, arith: GA, binary: GB) -> Result<Self, PrepError> {
        let strategy = PrepStrategy::select::<P>(&config);
        debug!(?strategy, "selected preprocessing strategy");
        Ok(BufferPrep {
            arith: DomainPrep::new(arith, &config, strategy.certify)?,
            binary: DomainPrep::new(binary, &config, strategy.certify)?,
            strategy,
            config,
            dabits: vec![],
            edabits: BTreeMap::new(),
            usage: BTreeMap::new(),
        })
    }

    /// The strategy used to certify items.
    pub fn strategy(&self) -> PrepStrategy {
        self.strategy
    }

    /// The arithmetic pools.
    pub fn arith(&mut self) -> &mut DomainPrep<Arith<P>, GA> {
        &mut self.arith
    }

    /// The binary pools, which also provide the AND triples.
    pub fn binary(&mut self) -> &mut DomainPrep<Bit<P>, GB> {
        &mut self.binary
    }

    /// The number of arithmetic items, daBits and edaBits taken from the pools so far. daBits used
    /// up to sanitize strict edaBits are included.
    pub fn usage(&self) -> BTreeMap<Kind, usize> {
        let mut usage = self.arith.usage().clone();
        for (kind, n) in &self.usage {
            *usage.entry(*kind).or_default() += n;
        }
        usage
    }

    /// See [`DomainPrep::get_three`].
    pub async fn get_three<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        kind: Kind,
    ) -> Result<Triple<Arith<P>>, PrepError> {
        self.arith.get_three(ctx, kind).await
    }

    /// See [`DomainPrep::get_two`].
    pub async fn get_two<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        kind: Kind,
    ) -> Result<(Arith<P>, Arith<P>), PrepError> {
        self.arith.get_two(ctx, kind).await
    }

    /// See [`DomainPrep::get_one`].
    pub async fn get_one<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        kind: Kind,
    ) -> Result<Arith<P>, PrepError> {
        self.arith.get_one(ctx, kind).await
    }

    /// See [`DomainPrep::get_input`].
    pub async fn get_input<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        player: usize,
    ) -> Result<InputTuple<Arith<P>>, PrepError> {
        self.arith.get_input(ctx, player).await
    }

    /// Returns a daBit.
    pub async fn get_dabit<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
    ) -> Result<DaBit<Arith<P>, Bit<P>>, PrepError> {
        if self.dabits.is_empty() {
            self.buffer_dabits(ctx).await?;
        }
        pop(&mut self.dabits, &mut self.usage, Kind::DaBit)
    }

    /// Returns `count` edaBits of `n_bits` bits. Strict edaBits have an exact bit decomposition.
    pub async fn get_edabits<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        strict: bool,
        n_bits: usize,
        count: usize,
    ) -> Result<Vec<EdaBit<Arith<P>, Bit<P>>>, PrepError> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let available = self.edabits.get(&(strict, n_bits)).map_or(0, Vec::len);
            if available == 0 {
                self.buffer_edabits(ctx, strict, n_bits).await?;
            }
            let pool = self.edabits.entry((strict, n_bits)).or_default();
            let k = (count - out.len()).min(pool.len());
            let at = pool.len() - k;
            out.extend(pool.drain(at..));
        }
        *self.usage.entry(Kind::EdaBit).or_default() += count;
        Ok(out)
    }

    async fn raw_dabits<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        needed: usize,
    ) -> Result<Vec<DaBit<Arith<P>, Bit<P>>>, PrepError> {
        let mut raw = Vec::with_capacity(needed);
        while raw.len() < needed {
            let before = raw.len();
            self.arith
                .generator
                .buffer_dabits(ctx, &mut raw)
                .await
                .map_err(unsupported)?;
            if raw.len() == before {
                return Err(no_progress(Kind::DaBit, needed, before));
            }
        }
        raw.truncate(needed);
        Ok(raw)
    }

    #[instrument(level = Level::DEBUG, skip_all, err)]
    async fn buffer_dabits<C: Channel>(&mut self, ctx: &Ctx<C>) -> Result<(), PrepError> {
        let n = self.config.buffer_size;
        let certified = match self.strategy.dabits {
            DabitMethod::Raw => self.raw_dabits(ctx, n).await?,
            DabitMethod::Direct => {
                let sacrifice =
                    DabitSacrifice::new(ctx.crypto().security(), self.config.dabit_square_check);
                let raw = self.raw_dabits(ctx, sacrifice.minimum_n_inputs(n)).await?;
                let triples = if sacrifice.needs_triples() {
                    self.arith.take_triples(ctx, n).await?
                } else {
                    vec![]
                };
                sacrifice
                    .sacrifice(
                        ctx,
                        &self.arith.role,
                        &mut self.arith.opener,
                        &mut self.binary.opener,
                        raw,
                        n,
                        triples,
                    )
                    .await?
            }
            DabitMethod::Shuffle => {
                let shuffle = ShuffleSacrifice::from_config(&self.config)?;
                let raw = self.raw_dabits(ctx, shuffle.minimum_n_inputs(n)).await?;
                DabitShuffleSacrifice(shuffle)
                    .sacrifice(
                        ctx,
                        &self.arith.role,
                        &mut self.arith.opener,
                        &mut self.binary.opener,
                        raw,
                        n,
                    )
                    .await?
            }
        };
        debug!(n = certified.len(), method = ?self.strategy.dabits, "buffered dabits");
        self.dabits.extend(certified);
        Ok(())
    }

    async fn raw_edabits<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        strict: bool,
        n_bits: usize,
        needed: usize,
    ) -> Result<Vec<EdaBit<Arith<P>, Bit<P>>>, PrepError> {
        let mut raw = Vec::with_capacity(needed);
        while raw.len() < needed {
            let before = raw.len();
            self.arith
                .generator
                .buffer_edabits(ctx, strict, n_bits, &mut raw)
                .await
                .map_err(unsupported)?;
            if raw.len() == before {
                return Err(no_progress(Kind::EdaBit, needed, before));
            }
        }
        raw.truncate(needed);
        Ok(raw)
    }

    #[instrument(level = Level::DEBUG, skip_all, fields(strict = strict, n_bits = n_bits), err)]
    async fn buffer_edabits<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        strict: bool,
        n_bits: usize,
    ) -> Result<(), PrepError> {
        let n = self.config.buffer_size;
        let edabits = match self.strategy.edabits {
            EdabitMethod::Raw => self.raw_edabits(ctx, strict, n_bits, n).await?,
            EdabitMethod::Unsupported => return Err(no(Kind::EdaBit)),
            EdabitMethod::Shuffle => {
                let sacrifice = EdabitShuffleSacrifice(ShuffleSacrifice::from_config(&self.config)?);
                let raw = self
                    .raw_edabits(ctx, strict, n_bits, sacrifice.0.minimum_n_inputs(n))
                    .await?;
                let and_triples = self
                    .binary
                    .take_triples(ctx, sacrifice.and_triples_needed(n, n_bits))
                    .await?;
                sacrifice
                    .sacrifice(
                        ctx,
                        (&self.arith.role, &mut self.arith.opener),
                        (&self.binary.role, &mut self.binary.opener),
                        raw,
                        n,
                        n_bits,
                        and_triples,
                    )
                    .await?
            }
        };
        let certified = if strict {
            let mut dabits = Vec::with_capacity(edabits.len() * n_bits);
            for _ in 0..edabits.len() * n_bits {
                dabits.push(self.get_dabit(ctx).await?);
            }
            sanitize_edabits(
                ctx,
                &self.arith.role,
                &mut self.binary.opener,
                edabits,
                dabits,
            )
            .await?
        } else {
            edabits
        };
        debug!(n = certified.len(), method = ?self.strategy.edabits, "buffered edabits");
        self.edabits
            .entry((strict, n_bits))
            .or_default()
            .extend(certified);
        Ok(())
    }
}
