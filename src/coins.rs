//! Commitments, broadcast with abort and jointly generated public coins.

use rand::{SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use subtle::ConstantTimeEq;
use tracing::error;

use crate::{
    channel::{Channel, scatter, unverified_broadcast},
    context::Ctx,
    error::PrepError,
};

/// A BLAKE3 hash committing to a high-entropy value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub(crate) struct Commitment(pub(crate) [u8; 32]);

/// Commits to a value using the BLAKE3 cryptographic hash function.
/// This is not a general-purpose commitment scheme, the input value is assumed to have high entropy.
pub(crate) fn commit(value: &[u8]) -> Commitment {
    Commitment(blake3::hash(value).into())
}

/// Verifies if a given value matches a previously generated commitment.
pub(crate) fn open_commitment(commitment: &Commitment, value: &[u8]) -> bool {
    blake3::hash(value).as_bytes().ct_eq(&commitment.0).into()
}

/// Appends a fresh 256-bit nonce and the party index to `value`, so that the commitment hides
/// low-entropy values and commitments of different parties never collide.
pub(crate) fn salted(value: &[u8], nonce: &[u8; 32], party: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(value.len() + 34);
    buf.extend_from_slice(value);
    buf.extend_from_slice(nonce);
    buf.extend_from_slice(&(party as u16).to_be_bytes());
    buf
}

/// Hashes a slice using blake3 and truncates the hash to 128 bits.
///
/// The truncation reduces the guarantees to 64-bit collision resistance, which is sufficient for
/// statistical security parameters up to 64.
pub(crate) fn hash_vec<T: Serialize>(data: &[T]) -> Result<u128, PrepError> {
    let serialized = bincode::serialize(data)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serialized);
    let mut buf = [0u8; 16];
    hasher.finalize_xof().fill(&mut buf);
    Ok(u128::from_le_bytes(buf))
}

/// Implements the verification step of broadcast with abort based on Goldwasser and Lindell's
/// protocol: every party echoes the hashes of the vectors it received from all third parties.
pub(crate) async fn broadcast_verification<T: Serialize>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    vec: &[Vec<T>],
) -> Result<(), PrepError> {
    if n == 2 {
        return Ok(());
    }
    let mut hashes = vec![0u128; n];
    for k in (0..n).filter(|k| *k != i) {
        hashes[k] = hash_vec(&vec[k])?;
    }
    let mut echoes = vec![vec![None; n]; n];
    for k in (0..n).filter(|k| *k != i) {
        for j in (0..n).filter(|j| *j != i && *j != k) {
            echoes[k][j] = Some(hashes[j]);
        }
    }
    let received: Vec<Vec<Option<u128>>> = scatter(channel, i, phase, &echoes).await?;
    for k in (0..n).filter(|k| *k != i) {
        for j in (0..n).filter(|j| *j != i && *j != k) {
            if received[k][j] != Some(hashes[j]) {
                error!(phase, from = k, about = j, "inconsistent broadcast");
                return Err(PrepError::InconsistentBroadcast);
            }
        }
    }
    Ok(())
}

/// Broadcast with abort: every party sends its vector to all others, the received vectors are
/// verified to be the same for everyone. The own vector is placed at index `i`.
pub(crate) async fn broadcast<T: Clone + Serialize + DeserializeOwned + Sync>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    vec: &[T],
) -> Result<Vec<Vec<T>>, PrepError> {
    let res = unverified_broadcast(channel, i, n, phase, vec).await?;
    broadcast_verification(channel, i, n, &format!("broadcast {phase}"), &res).await?;
    Ok(res)
}

/// Commits to `value`, broadcasts the commitment and then opens it, returning the verified values
/// of all parties (own value at index `i`).
pub(crate) async fn commit_and_open<T: Clone + Serialize + DeserializeOwned + Sync>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    value: &[T],
) -> Result<Vec<Vec<T>>, PrepError> {
    let nonce = random::<[u8; 32]>();
    let bytes = bincode::serialize(value)?;
    let commitment = commit(&salted(&bytes, &nonce, i));
    let commitments = broadcast(channel, i, n, &format!("{phase} comm"), &[commitment]).await?;

    let openings = unverified_broadcast(
        channel,
        i,
        n,
        &format!("{phase} open"),
        &[(value.to_vec(), nonce)],
    )
    .await?;
    let mut values = Vec::with_capacity(n);
    for (k, opening) in openings.into_iter().enumerate() {
        let Some((v, nonce)) = opening.into_iter().next() else {
            return Err(PrepError::CommitmentCouldNotBeOpened);
        };
        if k != i {
            let bytes = bincode::serialize(&v)?;
            if !open_commitment(&commitments[k][0], &salted(&bytes, &nonce, k)) {
                error!(phase, party = k, "commitment could not be opened");
                return Err(PrepError::CommitmentCouldNotBeOpened);
            }
        }
        values.push(v);
    }
    Ok(values)
}

/// Multi-party coin tossing to generate shared randomness.
///
/// Every party commits to a random 256-bit seed, the commitments are broadcast, then all seeds
/// are opened and XORed. As long as one party is honest, the resulting [`ChaCha20Rng`] is
/// unpredictable for everyone before the commitments are fixed.
pub(crate) async fn shared_rng<C: Channel>(ctx: &Ctx<C>) -> Result<ChaCha20Rng, PrepError> {
    let (i, n) = (ctx.id(), ctx.parties());
    let seed = random::<[u8; 32]>();
    let seeds = commit_and_open(ctx.channel(), i, n, "RNG", &seed).await?;

    let mut seed_xor = [0u8; 32];
    for s in seeds {
        if s.len() != 32 {
            return Err(PrepError::CommitmentCouldNotBeOpened);
        }
        seed_xor
            .iter_mut()
            .zip(&s)
            .for_each(|(acc, byte)| *acc ^= *byte);
    }
    Ok(ChaCha20Rng::from_seed(seed_xor))
}
