//! Endpoint configuration registry
//!
//! Each ingest endpoint binds one listening socket to one target procedure.
//! The registry is populated before any accept loop starts and read-only
//! thereafter, so lookups need no synchronization beyond the lock the
//! importer wraps it in. Dropping a config (via [`EndpointRegistry::clear`])
//! closes its listening socket.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use virta_core::{ImporterError, Result};

/// Configuration surface for one ingest endpoint
///
/// Port 0 requests an ephemeral port; the actually bound port is recorded in
/// the resulting [`EndpointConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Port to listen on
    pub port: u16,
    /// Stored procedure every record on this endpoint is dispatched to
    pub procedure: String,
    /// Address to bind, defaults to 0.0.0.0
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl EndpointSpec {
    /// Spec listening on all interfaces for the given port and procedure
    pub fn new(port: u16, procedure: impl Into<String>) -> Self {
        Self {
            port,
            procedure: procedure.into(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// A configured endpoint with its bound listening socket
///
/// Owned by the registry for its whole lifetime; the listener is shared with
/// the endpoint's accept loop via `Arc` and the socket closes once both have
/// released it.
#[derive(Debug)]
pub struct EndpointConfig {
    resource_id: String,
    port: u16,
    procedure: String,
    listener: Arc<TcpListener>,
}

impl EndpointConfig {
    /// Bind the listening socket for a resource
    ///
    /// # Errors
    ///
    /// `ImporterError::Config` when the port cannot be bound.
    pub async fn bind(resource_id: impl Into<String>, spec: EndpointSpec) -> Result<Self> {
        let resource_id = resource_id.into();
        let listener = TcpListener::bind((spec.bind_addr, spec.port))
            .await
            .map_err(|e| {
                ImporterError::Config(format!(
                    "failed to bind port {} for resource '{}': {}",
                    spec.port, resource_id, e
                ))
            })?;
        let port = listener.local_addr()?.port();

        info!(
            resource = %resource_id,
            port,
            procedure = %spec.procedure,
            "Configured ingest endpoint"
        );

        Ok(Self {
            resource_id,
            port,
            procedure: spec.procedure,
            listener: Arc::new(listener),
        })
    }

    /// Resource identifier this endpoint is registered under
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Actually bound port (differs from the spec's port when that was 0)
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Target procedure name
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Shared handle to the listening socket
    pub fn listener(&self) -> Arc<TcpListener> {
        Arc::clone(&self.listener)
    }
}

/// Registry mapping resource identifiers to endpoint configurations
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, EndpointConfig>,
}

impl EndpointRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bound endpoint under its resource identifier
    ///
    /// A resource identifier is never reassigned while active: registering a
    /// second config under the same id is a configuration error.
    pub fn insert(&mut self, config: EndpointConfig) -> Result<()> {
        if self.endpoints.contains_key(config.resource_id()) {
            return Err(ImporterError::Config(format!(
                "resource '{}' is already configured",
                config.resource_id()
            )));
        }
        self.endpoints.insert(config.resource_id().to_string(), config);
        Ok(())
    }

    /// Look up a configured endpoint
    pub fn get(&self, resource_id: &str) -> Result<&EndpointConfig> {
        self.endpoints
            .get(resource_id)
            .ok_or_else(|| ImporterError::NotFound {
                resource: resource_id.to_string(),
            })
    }

    /// All configured endpoints, in no particular order
    pub fn all(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.endpoints.values()
    }

    /// Number of configured endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when no endpoint is configured
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Drop every config, releasing the listening sockets
    pub fn clear(&mut self) {
        self.endpoints.clear();
    }
}
