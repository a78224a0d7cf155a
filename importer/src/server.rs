//! The socket importer: accept loops, handler lifecycle, shutdown
//!
//! One accept loop task per endpoint, one handler task per accepted
//! connection. Backpressure and stop are broadcast over `watch` channels:
//! single writer, every handler a receiver, and a receiver cloned after a
//! signal observes the latest value - so a handler constructed concurrently
//! with a broadcast cannot miss it.
//!
//! # Concurrency bounds
//!
//! Handlers are tokio tasks multiplexed over the runtime's worker threads.
//! A semaphore caps how many connections are live at once
//! ([`SocketImporter::max_connections`], default 1024); when the cap is
//! reached the accept loop holds off accepting until a handler exits, so
//! excess clients wait in the kernel backlog instead of growing the task
//! set without bound.

use async_trait::async_trait;
use crate::adapter::ServerAdapter;
use crate::config::{EndpointConfig, EndpointRegistry, EndpointSpec};
use crate::handler::ConnectionHandler;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use virta_core::{Importer, Result};

/// Name under which this importer reports to the stats subsystem
pub const IMPORTER_NAME: &str = "SocketServerImporter";

/// Default cap on concurrently live client connections
const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Line-delimited TCP ingestion into an execution engine
///
/// # Example
///
/// ```ignore
/// let adapter = ServerAdapter::new(engine, stats);
/// let importer = SocketImporter::new(adapter);
/// importer.configure("kv", EndpointSpec::new(9001, "INSERT_KV")).await?;
/// importer.ready_for_data("kv").await?;
/// // ... clients push "key,value\n" lines at port 9001 ...
/// importer.stop().await;
/// ```
pub struct SocketImporter {
    adapter: Arc<ServerAdapter>,
    registry: RwLock<EndpointRegistry>,
    backpressure_tx: watch::Sender<bool>,
    stop_tx: watch::Sender<bool>,
    admission: Arc<Semaphore>,
    accept_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SocketImporter {
    /// Importer over the given adapter, with the default connection cap
    pub fn new(adapter: ServerAdapter) -> Self {
        let (backpressure_tx, _) = watch::channel(false);
        let (stop_tx, _) = watch::channel(false);
        Self {
            adapter: Arc::new(adapter),
            registry: RwLock::new(EndpointRegistry::new()),
            backpressure_tx,
            stop_tx,
            admission: Arc::new(Semaphore::new(DEFAULT_MAX_CONNECTIONS)),
            accept_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Cap the number of concurrently live client connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.admission = Arc::new(Semaphore::new(max));
        self
    }

    /// Bind and register an ingest endpoint
    ///
    /// Must happen before `ready_for_data` for the same resource. Returns
    /// the actually bound port (useful with an ephemeral port spec).
    ///
    /// # Errors
    ///
    /// `ImporterError::Config` when the port cannot be bound or the resource
    /// id is already taken.
    pub async fn configure(&self, resource_id: &str, spec: EndpointSpec) -> Result<u16> {
        let config = EndpointConfig::bind(resource_id, spec).await?;
        let port = config.port();
        self.registry.write().insert(config)?;
        Ok(port)
    }

    /// The adapter this importer submits through
    pub fn adapter(&self) -> &ServerAdapter {
        &self.adapter
    }

    /// Start the accept loop for a configured resource
    pub async fn ready_for_data(&self, resource_id: &str) -> Result<()> {
        let (listener, resource, port, procedure) = {
            let registry = self.registry.read();
            let config = registry.get(resource_id)?;
            (
                config.listener(),
                config.resource_id().to_string(),
                config.port(),
                config.procedure().to_string(),
            )
        };

        let task = tokio::spawn(accept_loop(
            listener,
            resource,
            port,
            procedure,
            Arc::clone(&self.adapter),
            self.backpressure_tx.subscribe(),
            self.stop_tx.subscribe(),
            Arc::clone(&self.admission),
        ));
        self.accept_tasks.lock().push(task);
        Ok(())
    }

    /// Broadcast the engine's backpressure state to all handlers
    ///
    /// The latest value is remembered: handlers created after this call
    /// inherit it at construction, so an early backpressure signal still
    /// throttles a connection that arrives later.
    pub fn set_back_pressure(&self, flag: bool) {
        debug!(backpressure = flag, "Backpressure signal");
        self.backpressure_tx.send_replace(flag);
    }

    /// Stop the importer
    ///
    /// Closes every listening socket (ending the accept loops), orders all
    /// live handlers to stop, and waits for the accept loops to exit.
    /// Accepted client sockets are not forced shut - each handler winds
    /// down on its own at its next loop boundary.
    pub async fn stop(&self) {
        info!("Stopping socket importer");
        self.stop_tx.send_replace(true);
        self.registry.write().clear();

        let tasks: Vec<_> = self.accept_tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Accept loop task failed during shutdown");
            }
        }
        info!("Socket importer stopped");
    }
}

#[async_trait]
impl Importer for SocketImporter {
    fn name(&self) -> &'static str {
        IMPORTER_NAME
    }

    async fn ready_for_data(&self, resource_id: &str) -> Result<()> {
        SocketImporter::ready_for_data(self, resource_id).await
    }

    fn set_back_pressure(&self, flag: bool) {
        SocketImporter::set_back_pressure(self, flag);
    }

    async fn stop(&self) {
        SocketImporter::stop(self).await;
    }
}

/// Accept loop for one endpoint
///
/// Exits on the stop signal or on an accept failure; an accept failure is
/// fail-stop for this endpoint only and never affects sibling endpoints.
#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: Arc<TcpListener>,
    resource: String,
    port: u16,
    procedure: String,
    adapter: Arc<ServerAdapter>,
    backpressure: watch::Receiver<bool>,
    mut stop: watch::Receiver<bool>,
    admission: Arc<Semaphore>,
) {
    info!(
        resource = %resource,
        port,
        procedure = %procedure,
        "Listening for importer connections"
    );

    loop {
        // admission control: hold off accepting at the connection cap
        let permit = tokio::select! {
            permit = Arc::clone(&admission).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = stop.wait_for(|stop| *stop) => break,
        };

        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    error!(
                        resource = %resource,
                        port,
                        error = %err,
                        "Unexpected error accepting client connections"
                    );
                    break;
                }
            },
            _ = stop.wait_for(|stop| *stop) => break,
        };

        debug!(resource = %resource, peer = %peer, "Accepted importer connection");
        let handler = ConnectionHandler::new(
            socket,
            Some(peer),
            procedure.clone(),
            Arc::clone(&adapter),
            backpressure.clone(),
            stop.clone(),
        );
        tokio::spawn(async move {
            handler.run().await;
            drop(permit);
        });
    }

    debug!(resource = %resource, port, "Accept loop exited");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use virta_core::{ImporterError, MemoryEngine, MemoryStatsCollector};

    fn importer() -> (Arc<MemoryEngine>, Arc<MemoryStatsCollector>, SocketImporter) {
        let engine = Arc::new(MemoryEngine::new());
        let stats = Arc::new(MemoryStatsCollector::new());
        let adapter = ServerAdapter::new(
            Arc::clone(&engine) as Arc<dyn virta_core::ExecutionEngine>,
            Arc::clone(&stats) as Arc<dyn virta_core::StatsCollector>,
        );
        (engine, stats, SocketImporter::new(adapter))
    }

    #[tokio::test]
    async fn configure_reports_the_bound_port() {
        let (_, _, importer) = importer();
        let port = importer
            .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
            .await
            .unwrap();
        assert_ne!(port, 0);
    }

    #[tokio::test]
    async fn start_unknown_resource_fails() {
        let (_, _, importer) = importer();
        let err = importer.ready_for_data("nope").await.unwrap_err();
        assert!(matches!(err, ImporterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_resource_is_a_config_error() {
        let (_, _, importer) = importer();
        importer
            .configure("kv", EndpointSpec::new(0, "A"))
            .await
            .unwrap();
        let err = importer
            .configure("kv", EndpointSpec::new(0, "B"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImporterError::Config(_)));
    }

    #[tokio::test]
    async fn lifecycle_trait_reports_the_importer_name() {
        let (_, _, importer) = importer();
        assert_eq!(Importer::name(&importer), "SocketServerImporter");
    }

    #[tokio::test]
    async fn stop_with_no_endpoints_is_clean() {
        let (_, _, importer) = importer();
        importer.stop().await;
    }
}
