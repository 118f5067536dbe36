//! The per-party execution context passed into every protocol.

use std::sync::Arc;

use tracing::debug;

use crate::{channel::Channel, config::PrepConfig, error::PrepError, threads::Workers};

/// Process-wide setup shared by all protocols of a party, read-only after creation.
#[derive(Debug)]
pub struct CryptoContext {
    workers: Workers,
    security: usize,
}

impl CryptoContext {
    /// Sets up the worker pool and statistical parameters described by `config`.
    pub fn new(config: &PrepConfig) -> Result<Arc<Self>, PrepError> {
        config.validate()?;
        let workers = Workers::new(config.threads)?;
        debug!(
            threads = workers.threads(),
            security = config.security,
            "set up crypto context"
        );
        Ok(Arc::new(CryptoContext {
            workers,
            security: config.security,
        }))
    }

    /// The worker pool for local batch computations.
    pub fn workers(&self) -> &Workers {
        &self.workers
    }

    /// The statistical security parameter.
    pub fn security(&self) -> usize {
        self.security
    }
}

/// A party's view of the computation: its index, the channel to all other parties and the shared
/// setup.
#[derive(Debug)]
pub struct Ctx<C> {
    channel: C,
    id: usize,
    parties: usize,
    crypto: Arc<CryptoContext>,
}

impl<C: Channel> Ctx<C> {
    /// Creates the context of party `id` out of `parties`.
    pub fn new(
        channel: C,
        id: usize,
        parties: usize,
        crypto: Arc<CryptoContext>,
    ) -> Result<Self, PrepError> {
        if parties < 2 || id >= parties {
            return Err(PrepError::Configuration(format!(
                "party {id} is not one of {parties} parties"
            )));
        }
        Ok(Ctx {
            channel,
            id,
            parties,
            crypto,
        })
    }

    /// The channel to the other parties.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The index of this party.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The number of parties.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// The shared setup.
    pub fn crypto(&self) -> &CryptoContext {
        &self.crypto
    }
}
