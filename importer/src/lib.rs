//! VIRTA socket importer
//!
//! Network-facing ingestion connector: accepts concurrent client connections
//! over plain TCP, treats each line as one delimited record, and forwards it
//! as a procedure invocation to an execution engine, throttling when the
//! engine signals backpressure and reporting per-record outcome to a stats
//! collector.
//!
//! # Architecture
//!
//! ```text
//! accept loop (per endpoint) ──► ConnectionHandler (per socket)
//!                                       │ read line
//!                                       ▼
//!                                  Invocation ──► ServerAdapter ──► ExecutionEngine
//!                                                      │
//!                                                      └──► StatsCollector
//! ```
//!
//! The wire protocol is push-only: newline-delimited text, no framing or
//! acknowledgment. The destination procedure is fixed per listening port at
//! configuration time. Delivery is best effort - a record the engine refuses
//! is logged (rate limited) and counted as a failure, never retried.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod adapter;
pub mod config;
pub mod handler;
pub mod ratelimit;
pub mod server;

pub use adapter::ServerAdapter;
pub use config::{EndpointConfig, EndpointRegistry, EndpointSpec};
pub use handler::ConnectionHandler;
pub use ratelimit::RateLimitedLog;
pub use server::{SocketImporter, IMPORTER_NAME};

// Seam types, re-exported so embedders need only this crate
pub use virta_core::{
    ExecutionEngine, Importer, ImporterError, Invocation, InvocationContext, Result,
    StatsCollector,
};
