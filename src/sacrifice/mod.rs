//! Certification of raw items by sacrificing part of them.
//!
//! Every protocol here takes more candidates than it returns, draws public coins only after all
//! candidates are fixed and aborts the whole run (with [`PrepError::SacrificeCheckFailed`]) as
//! soon as a single check fails. Failed checks are never retried.

mod bits;
mod dabit;
mod edabit;
mod shuffle;

use tracing::error;

pub use bits::{certify_bits, check_bits};
pub use dabit::{DabitSacrifice, DabitShuffleSacrifice};
pub use edabit::{EdabitShuffleSacrifice, sanitize_edabits};
pub use shuffle::{ShuffleSacrifice, SquareShuffleSacrifice, TripleShuffleSacrifice};

use crate::error::{Check, PrepError};

/// Turns an opening that did not match its expected value into a failure of `check`.
pub(crate) fn failed(check: Check) -> impl FnOnce(PrepError) -> PrepError {
    move |e| match e {
        PrepError::Consistency { index } => {
            error!(%check, index, "sacrifice check failed");
            PrepError::SacrificeCheckFailed(check)
        }
        e => e,
    }
}

/// Reports a check that failed on opened values.
pub(crate) fn abort(check: Check, index: usize) -> PrepError {
    error!(%check, index, "sacrifice check failed");
    PrepError::SacrificeCheckFailed(check)
}
