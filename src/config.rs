//! Tunable parameters of the preprocessing and the strategy derived from them.

use serde::{Deserialize, Serialize};

use crate::{
    domain::ShareDomain,
    error::PrepError,
    share::{Share, Suite},
};

/// Parameters controlling batch sizes, sacrifice soundness and parallelism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    /// Number of certified items produced per regeneration.
    pub buffer_size: usize,
    /// Number of candidates per bucket in shuffle sacrifices (`B`).
    pub bucket_size: usize,
    /// Number of fully opened candidates per shuffle sacrifice (`C`).
    pub canaries: usize,
    /// Number of worker threads for local batch computations.
    pub threads: usize,
    /// Statistical security parameter, also the number of checks of the direct daBit sacrifice.
    pub security: usize,
    /// Minimum bit width of a ring for which daBits are certified by the direct method.
    pub dabit_direct_min_bits: u32,
    /// Whether the direct daBit sacrifice additionally verifies `a == a·a`.
    pub dabit_square_check: bool,
    /// Whether a file-backed generator may fall back to live generation once exhausted.
    pub live_prep: bool,
    /// Forces certification on (or off) regardless of the security of the suite.
    pub certify: Option<bool>,
}

impl Default for PrepConfig {
    fn default() -> Self {
        let buffer_size = 1000;
        let bucket_size = recommended_bucket_size(buffer_size);
        PrepConfig {
            buffer_size,
            bucket_size,
            canaries: bucket_size,
            threads: 1,
            security: 40,
            dabit_direct_min_bits: 60,
            dabit_square_check: true,
            live_prep: true,
            certify: None,
        }
    }
}

impl PrepConfig {
    /// Rejects parameters for which no sacrifice can be run.
    pub fn validate(&self) -> Result<(), PrepError> {
        if self.buffer_size == 0 {
            return Err(PrepError::Configuration("buffer size must be positive".into()));
        }
        if self.bucket_size < 2 {
            return Err(PrepError::Configuration(format!(
                "bucket size {} leaves nothing to sacrifice",
                self.bucket_size
            )));
        }
        if self.security == 0 {
            return Err(PrepError::Configuration(
                "statistical security must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Calculates the bucket size according to WRK17a, Table 4 for statistical security ρ = 40.
pub fn recommended_bucket_size(batch_size: usize) -> usize {
    match batch_size {
        n if n >= 280_000 => 3,
        n if n >= 3_100 => 4,
        _ => 5,
    }
}

/// The adversary a suite protects against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Security {
    /// Parties follow the protocol, an honest majority is assumed.
    SemiHonest,
    /// Parties may deviate arbitrarily, a dishonest majority is tolerated.
    Malicious,
}

/// How daBits are certified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DabitMethod {
    /// Raw daBits are used as they are.
    Raw,
    /// Random subset parity checks, for large rings.
    Direct,
    /// Bucket cut-and-choose.
    Shuffle,
}

/// How edaBits are certified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdabitMethod {
    /// Raw edaBits are used as they are.
    Raw,
    /// Bucket cut-and-choose with a binary adder per bucket pair.
    Shuffle,
    /// The arithmetic domain cannot certify edaBits.
    Unsupported,
}

/// The certification used for every kind of item, selected by security level and domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepStrategy {
    /// Whether triples, squares and bits are certified by sacrifice.
    pub certify: bool,
    /// How daBits are certified.
    pub dabits: DabitMethod,
    /// How edaBits are certified.
    pub edabits: EdabitMethod,
}

impl PrepStrategy {
    /// Selects the strategy for the suite `P`.
    pub fn select<P: Suite>(config: &PrepConfig) -> Self {
        type Clear<P> = <<P as Suite>::Arith as Share>::Clear;
        let certify = config.certify.unwrap_or(P::SECURITY == Security::Malicious);
        if !certify {
            return PrepStrategy {
                certify,
                dabits: DabitMethod::Raw,
                edabits: EdabitMethod::Raw,
            };
        }
        let ring = Clear::<P>::IS_RING;
        let dabits = if ring && Clear::<P>::BITS >= config.dabit_direct_min_bits {
            DabitMethod::Direct
        } else {
            DabitMethod::Shuffle
        };
        let edabits = if ring {
            EdabitMethod::Shuffle
        } else {
            EdabitMethod::Unsupported
        };
        PrepStrategy {
            certify,
            dabits,
            edabits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Mersenne61, Z64},
        share::{Malicious, SemiHonest},
    };

    #[test]
    fn strategy_depends_on_security_and_domain() {
        let config = PrepConfig::default();
        let semi = PrepStrategy::select::<SemiHonest<Z64>>(&config);
        assert!(!semi.certify);
        assert_eq!(semi.dabits, DabitMethod::Raw);

        let malicious = PrepStrategy::select::<Malicious<Mersenne61>>(&config);
        assert!(malicious.certify);
        assert_eq!(malicious.dabits, DabitMethod::Shuffle);
        assert_eq!(malicious.edabits, EdabitMethod::Unsupported);

        let forced = PrepConfig {
            certify: Some(true),
            ..PrepConfig::default()
        };
        let ring = PrepStrategy::select::<SemiHonest<Z64>>(&forced);
        assert_eq!(ring.dabits, DabitMethod::Direct);
        assert_eq!(ring.edabits, EdabitMethod::Shuffle);

        let small_threshold = PrepConfig {
            dabit_direct_min_bits: 65,
            ..forced
        };
        let ring = PrepStrategy::select::<SemiHonest<Z64>>(&small_threshold);
        assert_eq!(ring.dabits, DabitMethod::Shuffle);
    }

    #[test]
    fn bucket_size_table() {
        assert_eq!(recommended_bucket_size(300_000), 3);
        assert_eq!(recommended_bucket_size(3_100), 4);
        assert_eq!(recommended_bucket_size(100), 5);
        assert!(PrepConfig::default().validate().is_ok());
        let broken = PrepConfig {
            bucket_size: 1,
            ..PrepConfig::default()
        };
        assert!(matches!(broken.validate(), Err(PrepError::Configuration(_))));
    }
}
