//! Preprocessing for secret-sharing based multi-party computation (MPC).
//!
//! Before an MPC computation can multiply secret values, the parties need correlated randomness:
//! multiplication triples, squares, random bits, input masks and items that connect the
//! arithmetic and the binary domain (daBits and edaBits). This crate buffers such items, certifies
//! them against malicious tampering by sacrificing part of them and hands them out one at a time.
//!
//! ## Main Components
//!
//! * [`prep`]: [`prep::BufferPrep`] and [`prep::DomainPrep`], the pools behind every `get_*` call.
//! * [`sacrifice`]: bucket cut-and-choose for triples, squares, daBits and edaBits, the direct
//!   daBit sacrifice over large rings and bit certification.
//! * [`beaver`]: Beaver multiplication, consuming one triple per product.
//! * [`generator`]: the [`generator::RawGenerator`] seam for producers of raw items, and an
//!   insecure simulated dealer for tests.
//! * [`file_prep`]: replaying items persisted to disk.
//! * [`threads`]: distribution of local batch computations over worker threads.
//! * [`channel`]: communication abstractions for exchanging data between parties.
//!
//! ## Basic Usage
//!
//! Every party creates a [`context::Ctx`] around its channel and a [`prep::BufferPrep`] around its
//! generators, then requests items as they are needed. All parties must request the same items in
//! the same order, since refilling a pool is an interactive protocol.
//!
//! ```ignore
//! use polyprep::{
//!     config::PrepConfig,
//!     context::{CryptoContext, Ctx},
//!     domain::Mersenne61,
//!     generator::InsecureDealer,
//!     items::Kind,
//!     prep::BufferPrep,
//!     share::Malicious,
//! };
//!
//! # async fn example(channel: impl polyprep::channel::Channel) -> Result<(), polyprep::error::PrepError> {
//! let config = PrepConfig::default();
//! let ctx = Ctx::new(channel, 0, 2, CryptoContext::new(&config)?)?;
//! let arith = InsecureDealer::new([0; 32], 0, 2, config.buffer_size)?;
//! let binary = InsecureDealer::new([0; 32], 0, 2, config.buffer_size)?;
//! let mut prep = BufferPrep::<Malicious<Mersenne61>, _, _>::new(config, arith, binary)?;
//! let triple = prep.get_three(&ctx, Kind::Triple).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! With a malicious suite every handed out item has passed a sacrifice check with statistical
//! security of about 40 bits, and every opened value has been MAC-checked. Any failed check aborts
//! the whole preprocessing with an error, it is never retried.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod beaver;
pub mod channel;
pub mod config;
pub mod context;
pub mod data_types;
pub mod domain;
pub mod error;
pub mod file_prep;
pub mod generator;
pub mod items;
pub mod open;
pub mod prep;
pub mod sacrifice;
pub mod share;
pub mod threads;

mod coins;

#[cfg(feature = "__bench")]
pub mod bench_reexports;
