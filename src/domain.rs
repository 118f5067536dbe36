//! Clear-text domains (rings and fields) over which values are secret-shared.

use std::{
    fmt::Debug,
    ops::{Add, AddAssign, Mul, Neg, Sub},
};

use rand::Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A ring or field whose elements can be secret-shared.
///
/// Every domain fits into 64 bits. Rings are always of the form Z/2^[`ShareDomain::BITS`].
pub trait ShareDomain:
    Copy
    + Debug
    + Default
    + PartialEq
    + Eq
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Bit width of the domain.
    const BITS: u32;
    /// Whether the domain is the ring Z/2^BITS.
    const IS_RING: bool;
    /// Short name used in log output.
    const NAME: &'static str;

    /// The multiplicative identity.
    fn one() -> Self;

    /// Maps an integer into the domain (reducing it if necessary).
    fn from_u64(v: u64) -> Self;

    /// The canonical integer representative.
    fn to_u64(self) -> u64;

    /// Samples a uniformly random element.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// Returns the multiplicative inverse, or `None` if the element is not a unit.
    fn inverse(self) -> Option<Self>;

    /// The additive identity.
    fn zero() -> Self {
        Self::default()
    }

    /// Whether the element is the additive identity.
    fn is_zero(self) -> bool {
        self == Self::zero()
    }

    /// Bit `i` of the canonical representative.
    fn bit(self, i: u32) -> bool {
        i < 64 && (self.to_u64() >> i) & 1 == 1
    }

    /// `2^i`, reduced into the domain.
    fn power_of_two(i: u32) -> Self {
        if i >= 64 {
            Self::zero()
        } else {
            Self::from_u64(1 << i)
        }
    }

    /// Samples a random coefficient for a linear combination in a sacrifice check.
    ///
    /// For a field this is any non-zero element. For a ring the coefficient is odd, so that
    /// `t·e != 0` holds for every `e != 0`.
    fn random_coefficient<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let t = Self::random(rng);
            if Self::IS_RING {
                if t.bit(0) {
                    return t;
                }
            } else if !t.is_zero() {
                return t;
            }
        }
    }
}

/// Marker for domains that are prime fields, required by MAC-authenticated sharing.
pub trait Field: ShareDomain {}

/// The ring of integers modulo 2^64.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Z64(pub u64);

impl Add for Z64 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Z64(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Z64 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for Z64 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Z64(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for Z64 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Z64(self.0.wrapping_mul(rhs.0))
    }
}

impl Neg for Z64 {
    type Output = Self;

    fn neg(self) -> Self {
        Z64(self.0.wrapping_neg())
    }
}

impl ShareDomain for Z64 {
    const BITS: u32 = 64;
    const IS_RING: bool = true;
    const NAME: &'static str = "Z2^64";

    fn one() -> Self {
        Z64(1)
    }

    fn from_u64(v: u64) -> Self {
        Z64(v)
    }

    fn to_u64(self) -> u64 {
        self.0
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Z64(rng.random())
    }

    fn inverse(self) -> Option<Self> {
        if self.0 & 1 == 0 {
            return None;
        }
        // Newton iteration, every step doubles the number of correct low bits.
        let mut x = self.0;
        for _ in 0..6 {
            x = x.wrapping_mul(2u64.wrapping_sub(self.0.wrapping_mul(x)));
        }
        Some(Z64(x))
    }
}

/// The prime field modulo the Mersenne prime 2^61 - 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mersenne61(u64);

impl Mersenne61 {
    /// The field modulus.
    pub const MODULUS: u64 = (1 << 61) - 1;

    fn reduce(v: u128) -> Self {
        let p = Self::MODULUS as u128;
        let folded = (v & p) + (v >> 61);
        let folded = (folded & p) + (folded >> 61);
        let v = folded as u64;
        Mersenne61(if v >= Self::MODULUS {
            v - Self::MODULUS
        } else {
            v
        })
    }

    fn pow(self, mut e: u64) -> Self {
        let mut base = self;
        let mut acc = Self::one();
        while e > 0 {
            if e & 1 == 1 {
                acc = acc * base;
            }
            base = base * base;
            e >>= 1;
        }
        acc
    }
}

impl Add for Mersenne61 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let v = self.0 + rhs.0;
        Mersenne61(if v >= Self::MODULUS {
            v - Self::MODULUS
        } else {
            v
        })
    }
}

impl AddAssign for Mersenne61 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Mersenne61 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Mul for Mersenne61 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::reduce(self.0 as u128 * rhs.0 as u128)
    }
}

impl Neg for Mersenne61 {
    type Output = Self;

    fn neg(self) -> Self {
        if self.0 == 0 {
            self
        } else {
            Mersenne61(Self::MODULUS - self.0)
        }
    }
}

impl ShareDomain for Mersenne61 {
    const BITS: u32 = 61;
    const IS_RING: bool = false;
    const NAME: &'static str = "F(2^61-1)";

    fn one() -> Self {
        Mersenne61(1)
    }

    fn from_u64(v: u64) -> Self {
        Self::reduce(v as u128)
    }

    fn to_u64(self) -> u64 {
        self.0
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let v = rng.random::<u64>() & Self::MODULUS;
            if v < Self::MODULUS {
                return Mersenne61(v);
            }
        }
    }

    fn inverse(self) -> Option<Self> {
        if self.0 == 0 {
            None
        } else {
            Some(self.pow(Self::MODULUS - 2))
        }
    }
}

impl Field for Mersenne61 {}

/// The binary field, used for the bit-domain half of daBits and edaBits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gf2(pub bool);

impl Add for Gf2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Gf2(self.0 ^ rhs.0)
    }
}

impl AddAssign for Gf2 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl Sub for Gf2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Gf2(self.0 ^ rhs.0)
    }
}

impl Mul for Gf2 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Gf2(self.0 & rhs.0)
    }
}

impl Neg for Gf2 {
    type Output = Self;

    fn neg(self) -> Self {
        self
    }
}

impl ShareDomain for Gf2 {
    const BITS: u32 = 1;
    const IS_RING: bool = true;
    const NAME: &'static str = "GF(2)";

    fn one() -> Self {
        Gf2(true)
    }

    fn from_u64(v: u64) -> Self {
        Gf2(v & 1 == 1)
    }

    fn to_u64(self) -> u64 {
        self.0 as u64
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Gf2(rng.random())
    }

    fn inverse(self) -> Option<Self> {
        self.0.then_some(self)
    }
}

impl Field for Gf2 {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    proptest! {
        #[test]
        fn z64_odd_elements_are_invertible(v in any::<u64>()) {
            let x = Z64(v | 1);
            let inv = x.inverse().expect("odd elements are units");
            prop_assert_eq!(x * inv, Z64::one());
        }

        #[test]
        fn z64_even_elements_are_not_invertible(v in any::<u64>()) {
            prop_assert!(Z64(v << 1).inverse().is_none());
        }

        #[test]
        fn mersenne_inverse(v in 1..Mersenne61::MODULUS) {
            let x = Mersenne61::from_u64(v);
            let inv = x.inverse().expect("non-zero field element");
            prop_assert_eq!(x * inv, Mersenne61::one());
        }

        #[test]
        fn mersenne_ring_laws(a in any::<u64>(), b in any::<u64>(), c in any::<u64>()) {
            let (a, b, c) = (
                Mersenne61::from_u64(a),
                Mersenne61::from_u64(b),
                Mersenne61::from_u64(c),
            );
            prop_assert_eq!(a * (b + c), a * b + a * c);
            prop_assert_eq!(a - b + b, a);
            prop_assert_eq!(a + (-a), Mersenne61::zero());
            prop_assert!(a.to_u64() < Mersenne61::MODULUS);
        }
    }

    #[test]
    fn mersenne_reduces_large_products() {
        let max = Mersenne61::from_u64(Mersenne61::MODULUS - 1);
        // (-1) * (-1) = 1
        assert_eq!(max * max, Mersenne61::one());
        assert_eq!(Mersenne61::from_u64(Mersenne61::MODULUS), Mersenne61::zero());
    }

    #[test]
    fn ring_coefficients_are_odd() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(Z64::random_coefficient(&mut rng).bit(0));
            assert!(!Mersenne61::random_coefficient(&mut rng).is_zero());
        }
        assert_eq!(Gf2::random_coefficient(&mut rng), Gf2::one());
    }

    #[test]
    fn power_of_two_wraps_into_domain() {
        assert_eq!(Z64::power_of_two(63), Z64(1 << 63));
        assert_eq!(Mersenne61::power_of_two(61), Mersenne61::one());
        assert_eq!(Gf2::power_of_two(0), Gf2::one());
        assert_eq!(Gf2::power_of_two(1), Gf2::zero());
    }
}
