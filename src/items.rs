//! The kinds of correlated randomness handed out by the preprocessing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::share::Share;

/// The kind of a preprocessed item, used for dispatch, error reporting and usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    /// Multiplication triples `(a, b, a·b)`.
    Triple,
    /// Square pairs `(a, a·a)`.
    Square,
    /// Shared random bits.
    Bit,
    /// Inverse pairs `(a, a^-1)`.
    Inverse,
    /// Input masks `(r, r)` where `r` is known in the clear to one party.
    Input,
    /// A random bit shared in the arithmetic and the binary domain.
    DaBit,
    /// A random value shared arithmetically together with its bit decomposition.
    EdaBit,
}

impl Kind {
    /// All kinds, in the order of their tags.
    pub const ALL: [Kind; 7] = [
        Kind::Triple,
        Kind::Square,
        Kind::Bit,
        Kind::Inverse,
        Kind::Input,
        Kind::DaBit,
        Kind::EdaBit,
    ];

    /// The one-byte tag of the kind in persisted preprocessing files.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Looks up a kind by its tag.
    pub fn from_tag(tag: u8) -> Option<Kind> {
        Kind::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Triple => "triples",
            Kind::Square => "squares",
            Kind::Bit => "bits",
            Kind::Inverse => "inverses",
            Kind::Input => "inputs",
            Kind::DaBit => "dabits",
            Kind::EdaBit => "edabits",
        })
    }
}

/// A multiplication triple `(a, b, c)` with `c = a·b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple<S> {
    /// The first factor.
    pub a: S,
    /// The second factor.
    pub b: S,
    /// The product.
    pub c: S,
}

/// A square pair `(a, b)` with `b = a·a`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Square<S> {
    /// The random value.
    pub a: S,
    /// Its square.
    pub b: S,
}

/// A shared input mask. Only the party providing the input knows the clear value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "S: Share")]
pub struct InputTuple<S: Share> {
    /// The sharing of the mask.
    pub share: S,
    /// The clear mask, `Some` only for the input party.
    pub value: Option<S::Clear>,
}

/// A doubly-authenticated bit: the same random bit shared in the arithmetic and the binary domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaBit<A, B> {
    /// The bit as an element of the arithmetic domain.
    pub arith: A,
    /// The bit in the binary domain.
    pub bit: B,
}

/// An extended daBit: a random value `r` together with its bit decomposition.
///
/// In strict mode `sum == Σ 2^i·bits[i]` holds exactly. Otherwise `sum` may additionally contain
/// multiples of `2^bits.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdaBit<A, B> {
    /// The arithmetic sharing of the value.
    pub sum: A,
    /// The binary sharings of the low bits of the value, least significant first.
    pub bits: Vec<B>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_round_trip() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(Kind::from_tag(7), None);
        assert_eq!(Kind::Square.to_string(), "squares");
    }
}
