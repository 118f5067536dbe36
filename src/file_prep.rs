//! Preprocessing material persisted to disk and replayed by a [`FileGenerator`].
//!
//! Every file holds the items of one kind for one party: a header (magic `PPRP`, format version,
//! kind tag, record size) followed by fixed-size bincode records. Files are consumed sequentially
//! and never rewound.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    channel::Channel,
    config::PrepConfig,
    context::Ctx,
    domain::Gf2,
    error::PrepError,
    generator::{MixedGenerator, RawGenerator},
    items::{DaBit, EdaBit, InputTuple, Kind, Square, Triple},
    share::{Role, Share},
};

const MAGIC: &[u8; 4] = b"PPRP";
const VERSION: u16 = 1;
const HEADER_LEN: u64 = 4 + 2 + 1 + 4;

fn invalid(msg: String) -> PrepError {
    PrepError::Io(io::Error::new(io::ErrorKind::InvalidData, msg))
}

/// The name of the file holding the items of `kind` for party `party`. The `label` separates
/// different schemes and variants (e.g. the input player) of the same kind.
pub fn file_name(kind: Kind, label: &str, party: usize) -> String {
    format!("{kind}-{label}-p{party}.prep")
}

/// The name of the file holding the role (and MAC key) of party `party` for `scheme`.
pub fn role_file(scheme: &str, party: usize) -> String {
    format!("role-{scheme}-p{party}.prep")
}

/// Writes a batch of items of `kind` to `path`, replacing any previous content.
///
/// All items must serialize to the same number of bytes.
pub fn write_batch<T: Serialize>(path: &Path, kind: Kind, items: &[T]) -> Result<(), PrepError> {
    let records = items
        .iter()
        .map(bincode::serialize)
        .collect::<Result<Vec<_>, _>>()?;
    let record_size = records.first().map_or(0, Vec::len);
    if let Some(r) = records.iter().find(|r| r.len() != record_size) {
        return Err(PrepError::SizeMismatch {
            expected: record_size,
            actual: r.len(),
        });
    }
    let record_size_bytes = u32::try_from(record_size)
        .map_err(|_| invalid(format!("record size {record_size} does not fit the header")))?;
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&[kind.tag()])?;
    w.write_all(&record_size_bytes.to_le_bytes())?;
    for record in &records {
        w.write_all(record)?;
    }
    w.flush()?;
    debug!(%kind, n = items.len(), record_size, path = %path.display(), "wrote batch");
    Ok(())
}

/// Reads all items of `kind` stored at `path`.
pub fn read_batch<T: DeserializeOwned>(path: &Path, kind: Kind) -> Result<Vec<T>, PrepError> {
    let mut reader = PrepReader::open(path, kind)?;
    let n = reader.remaining();
    reader.read_batch(n)
}

/// Persists the role of a party, which holds its MAC key.
pub fn write_role<K: Serialize>(path: &Path, role: &Role<K>) -> Result<(), PrepError> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(MAGIC)?;
    w.write_all(&VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut w, role)?;
    w.flush()?;
    Ok(())
}

/// Reads a role written by [`write_role`].
pub fn read_role<K: DeserializeOwned>(path: &Path) -> Result<Role<K>, PrepError> {
    let mut r = BufReader::new(File::open(path)?);
    let mut header = [0u8; 6];
    r.read_exact(&mut header)?;
    check_magic(&header, path)?;
    Ok(bincode::deserialize_from(r)?)
}

fn check_magic(header: &[u8], path: &Path) -> Result<(), PrepError> {
    if &header[..4] != MAGIC {
        return Err(invalid(format!("{} is not a preprocessing file", path.display())));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(invalid(format!(
            "{} has format version {version}, expected {VERSION}",
            path.display()
        )));
    }
    Ok(())
}

/// Sequential reader of the fixed-size records of a preprocessing file.
#[derive(Debug)]
pub struct PrepReader {
    reader: BufReader<File>,
    kind: Kind,
    record_size: usize,
    remaining: usize,
}

impl PrepReader {
    /// Opens `path`, requiring it to hold items of `kind`.
    pub fn open(path: &Path, kind: Kind) -> Result<Self, PrepError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut header = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut header)?;
        check_magic(&header, path)?;
        if Kind::from_tag(header[6]) != Some(kind) {
            return Err(invalid(format!(
                "{} does not contain {kind} (tag {})",
                path.display(),
                header[6]
            )));
        }
        let record_size = [header[7], header[8], header[9], header[10]];
        let record_size = u32::from_le_bytes(record_size) as usize;
        let body = len - HEADER_LEN;
        let remaining = match record_size {
            0 => 0,
            size if body % size as u64 != 0 => {
                return Err(invalid(format!("{} ends within a record", path.display())));
            }
            size => (body / size as u64) as usize,
        };
        Ok(PrepReader {
            reader,
            kind,
            record_size,
            remaining,
        })
    }

    /// The number of records not read yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Reads the next `n` records, failing with [`PrepError::ExhaustedSupply`] if fewer are left.
    pub fn read_batch<T: DeserializeOwned>(&mut self, n: usize) -> Result<Vec<T>, PrepError> {
        if n > self.remaining {
            return Err(PrepError::ExhaustedSupply {
                kind: self.kind,
                requested: n,
                available: self.remaining,
            });
        }
        let mut buf = vec![0u8; n * self.record_size];
        self.reader.read_exact(&mut buf)?;
        self.remaining -= n;
        let items = buf
            .chunks_exact(self.record_size.max(1))
            .map(bincode::deserialize)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(items)
    }
}

/// A generator replaying items from files written by [`write_batch`], one `buffer_size` batch
/// per call.
///
/// Once a file is exhausted the generator fails with [`PrepError::ExhaustedSupply`], unless live
/// preprocessing is enabled and a fallback generator is configured, which then takes over.
#[derive(Debug)]
pub struct FileGenerator<S: Share, G> {
    role: Role<S::MacKey>,
    dir: PathBuf,
    buffer_size: usize,
    readers: BTreeMap<String, PrepReader>,
    fallback: Option<G>,
}

impl<S: Share, G> FileGenerator<S, G> {
    /// Opens the files of party `party` in `dir`, reading its role from the role file.
    pub fn open(
        dir: impl Into<PathBuf>,
        party: usize,
        config: &PrepConfig,
        fallback: Option<G>,
    ) -> Result<Self, PrepError> {
        let dir = dir.into();
        let role = read_role(&dir.join(role_file(S::SCHEME, party)))?;
        let fallback = if config.live_prep { fallback } else { None };
        Ok(FileGenerator {
            role,
            dir,
            buffer_size: config.buffer_size,
            readers: BTreeMap::new(),
            fallback,
        })
    }

    /// Reads the next batch of `name`, or `None` if the file is exhausted and the fallback should
    /// be used instead.
    fn next_batch<T: DeserializeOwned>(
        &mut self,
        kind: Kind,
        name: String,
    ) -> Result<Option<Vec<T>>, PrepError> {
        if !self.readers.contains_key(&name) {
            let path = self.dir.join(&name);
            if !path.exists() && self.fallback.is_some() {
                return Ok(None);
            }
            if !path.exists() {
                return Err(PrepError::ExhaustedSupply {
                    kind,
                    requested: self.buffer_size,
                    available: 0,
                });
            }
            self.readers.insert(name.clone(), PrepReader::open(&path, kind)?);
        }
        let Some(reader) = self.readers.get_mut(&name) else {
            return Err(PrepError::InvalidState("reader vanished"));
        };
        match reader.read_batch(self.buffer_size) {
            Ok(batch) => {
                debug!(%kind, file = %name, left = reader.remaining(), "read batch");
                Ok(Some(batch))
            }
            Err(PrepError::ExhaustedSupply { available, .. }) if self.fallback.is_some() => {
                warn!(%kind, file = %name, available, "file exhausted, generating live");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn live(&mut self) -> Result<&mut G, PrepError> {
        self.fallback
            .as_mut()
            .ok_or(PrepError::InvalidState("no fallback generator"))
    }
}

impl<S: Share, G: RawGenerator<S>> RawGenerator<S> for FileGenerator<S, G> {
    fn role(&self) -> &Role<S::MacKey> {
        &self.role
    }

    async fn buffer_triples<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        out: &mut Vec<Triple<S>>,
    ) -> Result<(), PrepError> {
        let name = file_name(Kind::Triple, S::SCHEME, self.role.id);
        if let Some(batch) = self.next_batch(Kind::Triple, name)? {
            out.extend(batch);
            return Ok(());
        }
        self.live()?.buffer_triples(ctx, out).await
    }

    async fn buffer_squares<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        out: &mut Vec<Square<S>>,
    ) -> Result<(), PrepError> {
        let name = file_name(Kind::Square, S::SCHEME, self.role.id);
        if let Some(batch) = self.next_batch(Kind::Square, name)? {
            out.extend(batch);
            return Ok(());
        }
        self.live()?.buffer_squares(ctx, out).await
    }

    async fn buffer_bits<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        out: &mut Vec<S>,
    ) -> Result<(), PrepError> {
        let name = file_name(Kind::Bit, S::SCHEME, self.role.id);
        if let Some(batch) = self.next_batch(Kind::Bit, name)? {
            out.extend(batch);
            return Ok(());
        }
        self.live()?.buffer_bits(ctx, out).await
    }

    async fn buffer_inputs<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        player: usize,
        out: &mut Vec<InputTuple<S>>,
    ) -> Result<(), PrepError> {
        let label = input_label(S::SCHEME, player);
        let name = file_name(Kind::Input, &label, self.role.id);
        if let Some(batch) = self.next_batch(Kind::Input, name)? {
            out.extend(batch);
            return Ok(());
        }
        self.live()?.buffer_inputs(ctx, player, out).await
    }
}

/// The file label of the input masks of `player`.
pub fn input_label(scheme: &str, player: usize) -> String {
    format!("{scheme}-of{player}")
}

/// The file label of daBits combining the schemes `arith` and `bit`.
pub fn dabit_label(arith: &str, bit: &str) -> String {
    format!("{arith}-{bit}")
}

/// The file label of edaBits of `n_bits` bits.
pub fn edabit_label(arith: &str, bit: &str, strict: bool, n_bits: usize) -> String {
    let mode = if strict { "strict" } else { "loose" };
    format!("{arith}-{bit}-{mode}{n_bits}")
}

impl<A, B, G> MixedGenerator<A, B> for FileGenerator<A, G>
where
    A: Share,
    B: Share<Clear = Gf2>,
    G: RawGenerator<A> + MixedGenerator<A, B>,
{
    async fn buffer_dabits<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        out: &mut Vec<DaBit<A, B>>,
    ) -> Result<(), PrepError> {
        let name = file_name(Kind::DaBit, &dabit_label(A::SCHEME, B::SCHEME), self.role.id);
        if let Some(batch) = self.next_batch(Kind::DaBit, name)? {
            out.extend(batch);
            return Ok(());
        }
        self.live()?.buffer_dabits(ctx, out).await
    }

    async fn buffer_edabits<C: Channel>(
        &mut self,
        ctx: &Ctx<C>,
        strict: bool,
        n_bits: usize,
        out: &mut Vec<EdaBit<A, B>>,
    ) -> Result<(), PrepError> {
        let label = edabit_label(A::SCHEME, B::SCHEME, strict, n_bits);
        let name = file_name(Kind::EdaBit, &label, self.role.id);
        if let Some(batch) = self.next_batch(Kind::EdaBit, name)? {
            out.extend(batch);
            return Ok(());
        }
        self.live()?.buffer_edabits(ctx, strict, n_bits, out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::SimpleChannel,
        context::CryptoContext,
        domain::Z64,
        generator::InsecureDealer,
        share::Additive,
    };

    type Dealer = InsecureDealer<Additive<Z64>>;

    fn triples(n: u64) -> Vec<Triple<Additive<Z64>>> {
        (0..n)
            .map(|i| Triple {
                a: Additive(Z64(i)),
                b: Additive(Z64(i + 1)),
                c: Additive(Z64(i * (i + 1))),
            })
            .collect()
    }

    #[test]
    fn batches_survive_a_round_trip() -> Result<(), PrepError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("triples");
        write_batch(&path, Kind::Triple, &triples(10))?;
        let mut reader = PrepReader::open(&path, Kind::Triple)?;
        assert_eq!(reader.remaining(), 10);
        let first: Vec<Triple<Additive<Z64>>> = reader.read_batch(4)?;
        assert_eq!(first, triples(4));
        assert!(matches!(
            reader.read_batch::<Triple<Additive<Z64>>>(7),
            Err(PrepError::ExhaustedSupply {
                requested: 7,
                available: 6,
                ..
            })
        ));
        assert!(PrepReader::open(&path, Kind::Square).is_err());
        Ok(())
    }

    #[test]
    fn truncated_files_are_rejected() -> Result<(), PrepError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("triples");
        write_batch(&path, Kind::Triple, &triples(3))?;
        let bytes = std::fs::read(&path)?;
        std::fs::write(&path, &bytes[..bytes.len() - 1])?;
        assert!(matches!(
            PrepReader::open(&path, Kind::Triple),
            Err(PrepError::Io(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_files_fall_back_to_live_generation() -> Result<(), PrepError> {
        let dir = tempfile::tempdir()?;
        let role = Role {
            id: 0,
            parties: 2,
            key: (),
        };
        write_role(&dir.path().join(role_file("additive", 0)), &role)?;
        write_batch(
            &dir.path().join(file_name(Kind::Triple, "additive", 0)),
            Kind::Triple,
            &triples(6),
        )?;
        let config = PrepConfig {
            buffer_size: 4,
            ..PrepConfig::default()
        };
        let crypto = CryptoContext::new(&config)?;
        let mut channels = SimpleChannel::channels(2);
        let ctx = Ctx::new(channels.remove(0), 0, 2, crypto)?;

        let mut strict = FileGenerator::<Additive<Z64>, Dealer>::open(
            dir.path(),
            0,
            &PrepConfig {
                live_prep: false,
                ..config.clone()
            },
            Some(Dealer::new([0; 32], 0, 2, 4)?),
        )?;
        let mut out = vec![];
        strict.buffer_triples(&ctx, &mut out).await?;
        assert_eq!(out.len(), 4);
        assert!(matches!(
            strict.buffer_triples(&ctx, &mut out).await,
            Err(PrepError::ExhaustedSupply {
                kind: Kind::Triple,
                requested: 4,
                available: 2,
            })
        ));

        let mut live = FileGenerator::<Additive<Z64>, Dealer>::open(
            dir.path(),
            0,
            &config,
            Some(Dealer::new([0; 32], 0, 2, 4)?),
        )?;
        let mut out = vec![];
        live.buffer_triples(&ctx, &mut out).await?;
        live.buffer_triples(&ctx, &mut out).await?;
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..4], &triples(4)[..]);
        Ok(())
    }
}
