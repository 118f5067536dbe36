//! Errors raised by the preprocessing engine.

use std::fmt;

use crate::{channel, items::Kind};

/// The verification step of a sacrifice protocol that detected a malformed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// A fully opened canary item did not satisfy its defining relation.
    Canary,
    /// The cross-check of a kept item against another item of its bucket was not zero.
    Bucket,
    /// The parity of a random subset of daBits differed between the two domains.
    DabitParity,
    /// A value that should be a bit did not satisfy `x·x == x`.
    BitSquare,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Check::Canary => "canary",
            Check::Bucket => "bucket",
            Check::DabitParity => "dabit parity",
            Check::BitSquare => "bit square",
        })
    }
}

/// Errors occurring while generating, certifying or consuming preprocessed material.
///
/// [`PrepError::SacrificeCheckFailed`], [`PrepError::Consistency`] and [`PrepError::MacFail`]
/// signal an active attack or a corrupted generator and are fatal for the whole run: they are
/// never retried.
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    /// The active scheme cannot provide the requested kind of item.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The raw generator does not implement the requested kind of item.
    #[error("the generator does not implement {0}")]
    NotImplemented(Kind),
    /// A sacrifice check failed.
    #[error("sacrifice check failed: {0}")]
    SacrificeCheckFailed(Check),
    /// An opened value did not match the value it was expected to open to.
    #[error("share {index} did not open to the expected value")]
    Consistency {
        /// Position of the first mismatching share in the checked batch.
        index: usize,
    },
    /// The MAC check of the opened values failed.
    #[error("MAC check failed")]
    MacFail,
    /// A file-backed generator ran out of pre-generated material.
    #[error("ran out of {kind}: requested {requested}, available {available}")]
    ExhaustedSupply {
        /// The kind of item that was requested.
        kind: Kind,
        /// The number of items that were requested.
        requested: usize,
        /// The number of items that were still available.
        available: usize,
    },
    /// A batch did not have the expected size.
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// The expected number of elements.
        expected: usize,
        /// The number of elements actually present.
        actual: usize,
    },
    /// A whole batch of triples yielded no invertible element.
    #[error("ran out of usable triples")]
    OutOfTriples,
    /// A protocol method was called in the wrong state.
    #[error("invalid protocol state: {0}")]
    InvalidState(&'static str),
    /// A commitment could not be opened.
    #[error("a commitment could not be opened")]
    CommitmentCouldNotBeOpened,
    /// Different parties received different values in a broadcast.
    #[error("broadcast not consistent")]
    InconsistentBroadcast,
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// Persisted preprocessing data could not be read or written.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted preprocessing data could not be (de-)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] bincode::Error),
}

impl PrepError {
    /// Returns `true` if the error signals cheating (or a corrupted generator).
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            PrepError::SacrificeCheckFailed(_)
                | PrepError::Consistency { .. }
                | PrepError::MacFail
                | PrepError::CommitmentCouldNotBeOpened
                | PrepError::InconsistentBroadcast
        )
    }
}
