//! Secret-sharing schemes: how a party holds its part of a shared value.

use std::{
    fmt::Debug,
    marker::PhantomData,
    ops::{Add, Mul, Neg, Sub},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    config::Security,
    data_types::{Auth, AuthBit, Delta},
    domain::{Field, Gf2, ShareDomain},
    open::{AuthBitOpener, MacCheckOpener, Opener, PlainOpener},
};

/// The position of a party in the computation, together with its secret MAC key (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role<K> {
    /// The index of this party.
    pub id: usize,
    /// The number of parties.
    pub parties: usize,
    /// The MAC key of this party, `()` for unauthenticated schemes.
    pub key: K,
}

/// One party's share of a secret value.
///
/// Shares are linear: adding shares or multiplying them with public values ([`Share::scale`]) is
/// local. Adding a public constant needs [`Share::constant`], which knows how the scheme
/// distributes constants.
pub trait Share:
    Clone
    + Debug
    + PartialEq
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// The domain of the shared values.
    type Clear: ShareDomain;
    /// The per-party secret MAC key.
    type MacKey: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static;
    /// The protocol used to open shares of this scheme.
    type Opener: Opener<Self>;

    /// Short name of the scheme, used in log output and to separate dealer streams.
    const SCHEME: &'static str;

    /// This party's share of the public constant `c`.
    fn constant(c: Self::Clear, role: &Role<Self::MacKey>) -> Self;

    /// Multiplies the shared value with a public value.
    fn scale(self, c: Self::Clear) -> Self;
}

/// Plain additive sharing without MACs, for semi-honest security.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Additive<T>(pub T);

impl<T: ShareDomain> Add for Additive<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Additive(self.0 + rhs.0)
    }
}

impl<T: ShareDomain> Sub for Additive<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Additive(self.0 - rhs.0)
    }
}

impl<T: ShareDomain> Neg for Additive<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Additive(-self.0)
    }
}

impl<T: ShareDomain> Mul<T> for Additive<T> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self {
        Additive(self.0 * rhs)
    }
}

impl<T: ShareDomain> Share for Additive<T> {
    type Clear = T;
    type MacKey = ();
    type Opener = PlainOpener<T>;

    const SCHEME: &'static str = "additive";

    fn constant(c: T, role: &Role<()>) -> Self {
        if role.id == 0 {
            Additive(c)
        } else {
            Additive(T::zero())
        }
    }

    fn scale(self, c: T) -> Self {
        self * c
    }
}

/// SPDZ-style sharing: an additive share of `x` and an additive share of the MAC `α·x`, where the
/// global key `α` is itself additively shared among the parties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spdz<F> {
    pub(crate) value: F,
    pub(crate) mac: F,
}

impl<F: Field> Spdz<F> {
    /// The local share of the value.
    pub fn value(&self) -> F {
        self.value
    }
}

impl<F: Field> Add for Spdz<F> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Spdz {
            value: self.value + rhs.value,
            mac: self.mac + rhs.mac,
        }
    }
}

impl<F: Field> Sub for Spdz<F> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Spdz {
            value: self.value - rhs.value,
            mac: self.mac - rhs.mac,
        }
    }
}

impl<F: Field> Neg for Spdz<F> {
    type Output = Self;

    fn neg(self) -> Self {
        Spdz {
            value: -self.value,
            mac: -self.mac,
        }
    }
}

impl<F: Field> Mul<F> for Spdz<F> {
    type Output = Self;

    fn mul(self, rhs: F) -> Self {
        Spdz {
            value: self.value * rhs,
            mac: self.mac * rhs,
        }
    }
}

impl<F: Field> Share for Spdz<F> {
    type Clear = F;
    type MacKey = F;
    type Opener = MacCheckOpener<F>;

    const SCHEME: &'static str = "spdz";

    fn constant(c: F, role: &Role<F>) -> Self {
        let value = if role.id == 0 { c } else { F::zero() };
        Spdz {
            value,
            mac: role.key * c,
        }
    }

    fn scale(self, c: F) -> Self {
        self * c
    }
}

impl Add for AuthBit {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        &self ^ &rhs
    }
}

impl Sub for AuthBit {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        &self ^ &rhs
    }
}

impl Neg for AuthBit {
    type Output = Self;

    fn neg(self) -> Self {
        self
    }
}

impl Mul<Gf2> for AuthBit {
    type Output = Self;

    fn mul(self, rhs: Gf2) -> Self {
        if rhs.0 {
            self
        } else {
            let parties = self.parties();
            AuthBit(false, Auth::zero(parties))
        }
    }
}

impl Share for AuthBit {
    type Clear = Gf2;
    type MacKey = Delta;
    type Opener = AuthBitOpener;

    const SCHEME: &'static str = "authbit";

    fn constant(c: Gf2, role: &Role<Delta>) -> Self {
        let auth = Auth::zero(role.parties);
        if !c.0 {
            AuthBit(false, auth)
        } else if role.id == 0 {
            AuthBit(true, auth)
        } else {
            // party 0 holds the bit without a MAC, so its key is shifted instead
            AuthBit(false, auth.xor_key(0, role.key))
        }
    }

    fn scale(self, c: Gf2) -> Self {
        self * c
    }
}

/// The combination of an arithmetic and a binary sharing scheme used together in one computation.
pub trait Suite: Send + Sync + 'static {
    /// Sharing of values in the arithmetic domain.
    type Arith: Share;
    /// Sharing of bits.
    type Bit: Share<Clear = Gf2>;

    /// The adversary the suite protects against.
    const SECURITY: Security;
}

/// Semi-honest (honest majority) suite using plain additive sharing in both domains.
pub struct SemiHonest<T>(PhantomData<fn() -> T>);

impl<T: ShareDomain> Suite for SemiHonest<T> {
    type Arith = Additive<T>;
    type Bit = Additive<Gf2>;

    const SECURITY: Security = Security::SemiHonest;
}

/// Dishonest-majority suite using MAC-authenticated sharing in both domains.
pub struct Malicious<F>(PhantomData<fn() -> F>);

impl<F: Field> Suite for Malicious<F> {
    type Arith = Spdz<F>;
    type Bit = AuthBit;

    const SECURITY: Security = Security::Malicious;
}
