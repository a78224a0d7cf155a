//! Execution engine contract
//!
//! The [`ExecutionEngine`] trait is the importer's only view of the backend:
//! a catalog existence check and a procedure submission that either gets
//! queued or is refused by admission control. The engine's own durability and
//! scheduling are invisible here.

use async_trait::async_trait;
use crate::invocation::Invocation;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Identifies the connection on whose behalf an invocation is submitted
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Name of the importer submitting the call (for stats attribution)
    pub importer: &'static str,
    /// Peer address of the client connection, when known
    pub remote: Option<SocketAddr>,
}

/// Backend execution engine - the consumer side of every ingested record
///
/// # Implementation Requirements
///
/// - Implementations must be `Send + Sync`; many connection handlers submit
///   concurrently through one shared engine.
/// - `call_procedure` returning `false` means the engine rejected the call or
///   cannot currently accept it (admission control); the importer treats it
///   as a per-record failure, not a connection failure.
/// - `has_table` must reflect the catalog at call time; the importer never
///   caches the answer.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Returns true if a table with the given name exists in the catalog
    fn has_table(&self, name: &str) -> bool;

    /// Submit one invocation for execution
    ///
    /// Returns `true` when the call was accepted (queued), `false` when the
    /// engine refused it. The importer bounds how long it will wait for this
    /// future; implementations need not enforce their own deadline.
    async fn call_procedure(&self, ctx: &InvocationContext, invocation: &Invocation) -> bool;
}

/// One procedure call accepted by [`MemoryEngine`], for later inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Procedure the call targeted
    pub procedure: String,
    /// Fields in submission order
    pub fields: Vec<String>,
}

/// In-memory engine for tests and demos
///
/// Records every accepted call in arrival order. Can be told to reject all
/// calls (`set_reject`) or to delay each call (`set_delay`) to exercise the
/// importer's failure and timeout paths.
#[derive(Default)]
pub struct MemoryEngine {
    tables: RwLock<HashSet<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    reject: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryEngine {
    /// Create an engine with an empty catalog that accepts every call
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table to the catalog
    pub fn add_table(&self, name: impl Into<String>) {
        self.tables.write().insert(name.into());
    }

    /// When set, every subsequent call is refused
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// When set, every subsequent call sleeps for the given duration first
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Snapshot of the accepted calls, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of accepted calls so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ExecutionEngine for MemoryEngine {
    fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains(name)
    }

    async fn call_procedure(&self, _ctx: &InvocationContext, invocation: &Invocation) -> bool {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return false;
        }
        self.calls.lock().push(RecordedCall {
            procedure: invocation.procedure().to_string(),
            fields: invocation.fields().to_vec(),
        });
        true
    }
}
