//! Beaver multiplication of shared values, consuming one triple per product.

use std::{collections::VecDeque, future::Future};

use tracing::{Level, debug, instrument};

use crate::{
    channel::Channel,
    context::Ctx,
    error::PrepError,
    items::Triple,
    open::Opener,
    share::{Role, Share},
};

/// Anything that can hand out multiplication triples one at a time.
pub trait TripleSource<S: Share>: Send {
    /// Returns an unused triple, regenerating the supply if necessary.
    fn next_triple<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
    ) -> impl Future<Output = Result<Triple<S>, PrepError>> + Send;
}

impl<S: Share> TripleSource<S> for Vec<Triple<S>> {
    async fn next_triple<C: Channel>(&mut self, _ctx: &Ctx<C>) -> Result<Triple<S>, PrepError> {
        self.pop().ok_or(PrepError::OutOfTriples)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Accumulating,
    Opened,
}

/// The Beaver multiplication protocol for a batch of products.
///
/// A batch goes through [`Beaver::init_mul`], any number of [`Beaver::prepare_mul`] calls (local),
/// a single [`Beaver::exchange`] (one round of communication for the whole batch) and then one
/// [`Beaver::finalize_mul`] per product, in the order of the `prepare_mul` calls. Calls in any
/// other order fail with [`PrepError::InvalidState`].
#[derive(Debug)]
pub struct Beaver<S: Share> {
    role: Role<S::MacKey>,
    state: State,
    pending: Vec<(S, S, Triple<S>)>,
    opened: VecDeque<(S::Clear, S::Clear, Triple<S>)>,
}

impl<S: Share> Beaver<S> {
    /// Creates the protocol for the party with the given role.
    pub fn new(role: Role<S::MacKey>) -> Self {
        Beaver {
            role,
            state: State::Idle,
            pending: vec![],
            opened: VecDeque::new(),
        }
    }

    /// Starts a new batch.
    pub fn init_mul(&mut self) -> Result<(), PrepError> {
        if self.state != State::Idle {
            return Err(PrepError::InvalidState("init_mul while a batch is in progress"));
        }
        self.state = State::Accumulating;
        Ok(())
    }

    /// Queues the product `x·y`, taking a triple from `source`.
    pub async fn prepare_mul<C: Channel, T: TripleSource<S>>(
        &mut self,
        ctx: &Ctx<C>,
        x: &S,
        y: &S,
        source: &mut T,
    ) -> Result<(), PrepError> {
        if self.state != State::Accumulating {
            return Err(PrepError::InvalidState("prepare_mul without init_mul"));
        }
        let triple = source.next_triple(ctx).await?;
        self.prepare_mul_with(x, y, triple)
    }

    /// Queues the product `x·y` using the given triple.
    pub fn prepare_mul_with(&mut self, x: &S, y: &S, triple: Triple<S>) -> Result<(), PrepError> {
        if self.state != State::Accumulating {
            return Err(PrepError::InvalidState("prepare_mul without init_mul"));
        }
        let d = x.clone() - triple.a.clone();
        let e = y.clone() - triple.b.clone();
        self.pending.push((d, e, triple));
        Ok(())
    }

    /// Opens `x - a` and `y - b` of all queued products in a single round.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn exchange<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        opener: &mut S::Opener,
    ) -> Result<(), PrepError> {
        if self.state != State::Accumulating {
            return Err(PrepError::InvalidState("exchange without init_mul"));
        }
        let k = self.pending.len();
        let mut masked = Vec::with_capacity(2 * k);
        masked.extend(self.pending.iter().map(|(d, _, _)| d.clone()));
        masked.extend(self.pending.iter().map(|(_, e, _)| e.clone()));
        let opened = opener.open(ctx, &masked).await?;
        if opened.len() != 2 * k {
            return Err(PrepError::SizeMismatch {
                expected: 2 * k,
                actual: opened.len(),
            });
        }
        debug!(products = k, "exchanged masked factors");
        let (ds, es) = opened.split_at(k);
        for (((_, _, triple), d), e) in self.pending.drain(..).zip(ds).zip(es) {
            self.opened.push_back((*d, *e, triple));
        }
        self.state = if self.opened.is_empty() {
            State::Idle
        } else {
            State::Opened
        };
        Ok(())
    }

    /// Returns the share of the next product, in `prepare_mul` order.
    pub fn finalize_mul(&mut self) -> Result<S, PrepError> {
        if self.state != State::Opened {
            return Err(PrepError::InvalidState("finalize_mul before exchange"));
        }
        let Some((d, e, triple)) = self.opened.pop_front() else {
            return Err(PrepError::InvalidState("no product left to finalize"));
        };
        if self.opened.is_empty() {
            self.state = State::Idle;
        }
        let Triple { a, b, c } = triple;
        Ok(S::constant(d * e, &self.role) + b.scale(d) + a.scale(e) + c)
    }

    /// Multiplies all pairs in one batch.
    pub async fn multiply<C: Channel, T: TripleSource<S>>(
        &mut self,
        ctx: &Ctx<C>,
        opener: &mut S::Opener,
        source: &mut T,
        pairs: &[(S, S)],
    ) -> Result<Vec<S>, PrepError> {
        self.init_mul()?;
        for (x, y) in pairs {
            self.prepare_mul(ctx, x, y, source).await?;
        }
        self.exchange(ctx, opener).await?;
        (0..pairs.len()).map(|_| self.finalize_mul()).collect()
    }
}
