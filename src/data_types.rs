//! MAC material for pairwise-authenticated bits.

use std::ops::{BitAnd, BitXor};

use serde::{Deserialize, Serialize};

/// The global key known only to a single party that is used to authenticate bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta(pub(crate) u128);

impl BitAnd<Delta> for bool {
    type Output = Delta;

    fn bitand(self, rhs: Delta) -> Self::Output {
        if self { rhs } else { Delta(0) }
    }
}

/// A message authentication code held by a party together with an authenticated bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mac(pub(crate) u128);

impl BitXor for Mac {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Mac(self.0 ^ rhs.0)
    }
}

/// A key used to authenticate (together with the [Delta] global key) a bit for the other party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key(pub(crate) u128);

impl BitXor<Delta> for Key {
    type Output = Mac;

    fn bitxor(self, rhs: Delta) -> Self::Output {
        Mac(self.0 ^ rhs.0)
    }
}

impl BitXor for Key {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Key(self.0 ^ rhs.0)
    }
}

/// The MACs a party holds on its own bit share and the keys it holds on the other parties' bit
/// shares, indexed by party. The entry for the own index is unused and kept at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Auth(pub(crate) Vec<(Mac, Key)>);

impl BitXor for &Auth {
    type Output = Auth;

    fn bitxor(self, rhs: Self) -> Self::Output {
        let Auth(auth0) = self;
        let Auth(auth1) = rhs;
        let mut xor = Vec::with_capacity(auth0.len());
        for ((mac1, key1), (mac2, key2)) in auth0.iter().zip(auth1.iter()) {
            xor.push((*mac1 ^ *mac2, *key1 ^ *key2));
        }
        Auth(xor)
    }
}

impl Auth {
    pub(crate) fn zero(parties: usize) -> Self {
        Auth(vec![(Mac::default(), Key::default()); parties])
    }

    /// Flips the bit of party `i` from the point of view of the key holder.
    pub(crate) fn xor_key(mut self, i: usize, delta: Delta) -> Auth {
        if let Some((_, key)) = self.0.get_mut(i) {
            key.0 ^= delta.0;
        }
        self
    }
}

/// One party's share of a bit that is XOR-shared among all parties.
///
/// Party `i` holds the bit `x_i`, a MAC `M_i[j] = K_j[i] ^ (x_i & Delta_j)` for every other party
/// `j`, and the keys `K_i[j]` authenticating the bits of all other parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBit(pub(crate) bool, pub(crate) Auth);

impl BitXor for &AuthBit {
    type Output = AuthBit;

    fn bitxor(self, rhs: Self) -> Self::Output {
        let AuthBit(bit0, auth0) = self;
        let AuthBit(bit1, auth1) = rhs;
        AuthBit(bit0 ^ bit1, auth0 ^ auth1)
    }
}

impl AuthBit {
    /// The local bit share.
    pub fn bit(&self) -> bool {
        self.0
    }

    /// The MAC held on the own bit towards party `k`.
    pub(crate) fn mac_for(&self, k: usize) -> Mac {
        self.1.0.get(k).map(|(mac, _)| *mac).unwrap_or_default()
    }

    /// The key held on the bit of party `k`.
    pub(crate) fn key_for(&self, k: usize) -> Key {
        self.1.0.get(k).map(|(_, key)| *key).unwrap_or_default()
    }

    pub(crate) fn parties(&self) -> usize {
        self.1.0.len()
    }
}
