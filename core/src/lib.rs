//! virta-core - Core seam types for the VIRTA socket importer
//!
//! This crate provides the types shared between the importer and the host
//! process that embeds it:
//!
//! - [`Invocation`] - one parsed ingestion record, bound for a stored procedure
//! - [`ExecutionEngine`] trait - async interface to the backend execution engine
//! - [`StatsCollector`] trait - per-record outcome reporting
//! - [`Importer`] trait - the lifecycle contract an importer exposes to its host
//! - [`MemoryEngine`] / [`MemoryStatsCollector`] - in-memory implementations
//!   for tests and demos
//!
//! # Why this crate exists
//!
//! The importer consumes the execution engine and the stats subsystem through
//! narrow contracts, and the host consumes the importer through the lifecycle
//! contract. Keeping all three seams here means a host can wire its real
//! engine to `virta-importer` without depending on the importer's socket
//! internals, and the importer never sees anything of the engine beyond
//! `call_procedure` / `has_table`.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

mod engine;
mod error;
mod importer;
/// The parsed ingestion record and its delimited-text parser
pub mod invocation;
/// Per-record outcome reporting
pub mod stats;

pub use engine::{ExecutionEngine, InvocationContext, MemoryEngine, RecordedCall};
pub use error::{ImporterError, Result};
pub use importer::Importer;
pub use invocation::{Invocation, InvocationError};
pub use stats::{MemoryStatsCollector, StatsCollector, StatsEvent, StatsKind};
