//! Server adapter - the only bridge to the engine and the stats subsystem
//!
//! Connection handlers never hold the engine or the collector directly; they
//! go through one shared [`ServerAdapter`]. That keeps the two external
//! contracts in a single place and lets the adapter enforce the call
//! deadline uniformly.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;
use virta_core::{ExecutionEngine, Invocation, InvocationContext, StatsCollector};

/// Deadline applied to each engine submission
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Bridge between the ingestion core and the engine / stats collector
pub struct ServerAdapter {
    engine: Arc<dyn ExecutionEngine>,
    stats: Arc<dyn StatsCollector>,
    call_timeout: Duration,
}

impl ServerAdapter {
    /// Create an adapter over the given engine and collector
    pub fn new(engine: Arc<dyn ExecutionEngine>, stats: Arc<dyn StatsCollector>) -> Self {
        Self {
            engine,
            stats,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the per-call deadline
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Catalog existence check, delegated on every call - never cached
    pub fn has_table(&self, name: &str) -> bool {
        self.engine.has_table(name)
    }

    /// Submit one invocation to the engine
    ///
    /// Returns `false` when the engine rejects the call or the deadline
    /// elapses; an elapsed deadline is a rejection from the caller's point of
    /// view, the record is not retried.
    pub async fn call_procedure(&self, ctx: &InvocationContext, invocation: &Invocation) -> bool {
        match timeout(self.call_timeout, self.engine.call_procedure(ctx, invocation)).await {
            Ok(accepted) => accepted,
            Err(_) => {
                warn!(
                    procedure = %invocation.procedure(),
                    timeout = ?self.call_timeout,
                    "Procedure call exceeded deadline"
                );
                false
            }
        }
    }

    /// Pass-through queued notification, no control-flow effect
    pub fn report_queued(&self, importer: &str, procedure: &str) {
        self.stats.report_queued(importer, procedure);
    }

    /// Pass-through failure notification, no control-flow effect
    pub fn report_failure(&self, importer: &str, procedure: &str, decrement_pending: bool) {
        self.stats.report_failure(importer, procedure, decrement_pending);
    }
}
