//! Importer lifecycle contract
//!
//! The host framework drives an importer through this trait: configure
//! endpoints however the concrete importer defines, then `ready_for_data`
//! per resource, `set_back_pressure` as the engine's admission state changes,
//! and `stop` once at shutdown.

use async_trait::async_trait;
use crate::error::Result;

/// Lifecycle contract an importer exposes to the host framework
///
/// # Contract
///
/// - `ready_for_data` may be called once per configured resource and starts
///   accepting ingest traffic for it.
/// - `set_back_pressure(true)` must throttle all current *and future* intake
///   until `set_back_pressure(false)`; the importer remembers the latest
///   value rather than forwarding transient signals.
/// - `stop` is terminal: once invoked the importer never accepts data again.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Importer name, as reported to the stats subsystem
    fn name(&self) -> &'static str;

    /// Start accepting data for the given configured resource
    async fn ready_for_data(&self, resource_id: &str) -> Result<()>;

    /// Broadcast the engine's current backpressure state
    fn set_back_pressure(&self, flag: bool);

    /// Stop accepting data and release listening resources
    async fn stop(&self);
}
