//! Stats collector contract
//!
//! Reporting is purely observational: nothing in the importer's control flow
//! depends on what the collector does with an event, and implementations
//! should return quickly since the calls happen on the per-connection hot
//! path.

use parking_lot::Mutex;

/// Outcome of one submitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsKind {
    /// The record was accepted and queued by the engine
    Queued,
    /// The record was rejected, lost, or never submitted
    Failure {
        /// Whether a previously reported pending count should be decremented
        decrement_pending: bool,
    },
}

/// One per-record outcome, passed by value to the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsEvent {
    /// Importer that handled the record
    pub importer: String,
    /// Target procedure
    pub procedure: String,
    /// What happened to the record
    pub kind: StatsKind,
}

/// Per-record outcome reporting, consumed by the importer
pub trait StatsCollector: Send + Sync {
    /// Report that a record was accepted and queued for the given procedure
    fn report_queued(&self, importer: &str, procedure: &str);

    /// Report that a record failed
    ///
    /// `decrement_pending` tells collectors that track a pending count to
    /// also decrement it, for failures of records previously counted as
    /// queued.
    fn report_failure(&self, importer: &str, procedure: &str, decrement_pending: bool);
}

/// In-memory collector for tests and demos - captures every event
#[derive(Default)]
pub struct MemoryStatsCollector {
    events: Mutex<Vec<StatsEvent>>,
}

impl MemoryStatsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events, in report order
    pub fn events(&self) -> Vec<StatsEvent> {
        self.events.lock().clone()
    }

    /// Number of queued events reported for the given procedure
    pub fn queued_count(&self, procedure: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.procedure == procedure && e.kind == StatsKind::Queued)
            .count()
    }

    /// Number of failure events reported for the given procedure
    pub fn failure_count(&self, procedure: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.procedure == procedure && matches!(e.kind, StatsKind::Failure { .. }))
            .count()
    }
}

impl StatsCollector for MemoryStatsCollector {
    fn report_queued(&self, importer: &str, procedure: &str) {
        self.events.lock().push(StatsEvent {
            importer: importer.to_string(),
            procedure: procedure.to_string(),
            kind: StatsKind::Queued,
        });
    }

    fn report_failure(&self, importer: &str, procedure: &str, decrement_pending: bool) {
        self.events.lock().push(StatsEvent {
            importer: importer.to_string(),
            procedure: procedure.to_string(),
            kind: StatsKind::Failure { decrement_pending },
        });
    }
}
