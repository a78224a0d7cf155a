//! Per-connection read/dispatch loop
//!
//! One handler owns one accepted socket and drives it until the peer goes
//! away, an IO error occurs, or the importer orders a stop. Records from a
//! single connection are submitted strictly in read order; no ordering holds
//! across connections.
//!
//! # Stop semantics
//!
//! Stop is cooperative and observed at loop boundaries. A handler blocked in
//! a read only notices the stop order once the read unblocks (peer data,
//! disconnect, or error); prompt cancellation of an idle connection is not
//! guaranteed. A handler throttled on backpressure, by contrast, does
//! observe stop immediately - shutdown is never blocked by standing
//! backpressure.

use crate::adapter::ServerAdapter;
use crate::ratelimit::RateLimitedLog;
use crate::server::IMPORTER_NAME;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use virta_core::{Invocation, InvocationContext};

/// Minimum interval between failure log lines per connection
const FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Drives one client connection: read line, build invocation, submit
///
/// Generic over the stream type so tests can drive it with in-memory pipes;
/// production code hands it the accepted `TcpStream`.
pub struct ConnectionHandler<R> {
    reader: BufReader<R>,
    remote: Option<SocketAddr>,
    procedure: String,
    adapter: Arc<ServerAdapter>,
    backpressure: watch::Receiver<bool>,
    stop: watch::Receiver<bool>,
    failure_log: RateLimitedLog,
}

impl<R: AsyncRead + Unpin> ConnectionHandler<R> {
    /// Handler for an accepted connection bound to the endpoint's procedure
    ///
    /// The watch receivers are cloned from the importer's senders at
    /// construction, so a handler created after a backpressure signal starts
    /// out throttled rather than racing the broadcast.
    pub fn new(
        stream: R,
        remote: Option<SocketAddr>,
        procedure: impl Into<String>,
        adapter: Arc<ServerAdapter>,
        backpressure: watch::Receiver<bool>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reader: BufReader::new(stream),
            remote,
            procedure: procedure.into(),
            adapter,
            backpressure,
            stop,
            failure_log: RateLimitedLog::new(FAILURE_LOG_INTERVAL),
        }
    }

    /// Run the connection to completion
    ///
    /// State machine: Connected -> Reading -> (Throttled) -> Reading -> ...
    /// -> Closed. A clean EOF re-enters the read loop once for the same
    /// socket; a second consecutive EOF, an IO error, or a stop order ends
    /// the handler.
    pub async fn run(mut self) {
        let ctx = InvocationContext {
            importer: IMPORTER_NAME,
            remote: self.remote,
        };
        let mut line = String::new();
        let mut at_eof = false;

        loop {
            if *self.stop.borrow() {
                break;
            }

            // Throttle while the engine signals backpressure; stop must
            // still get through while throttled.
            tokio::select! {
                _ = self.backpressure.wait_for(|bp| !bp) => {}
                _ = self.stop.wait_for(|stop| *stop) => break,
            }

            line.clear();
            match self.reader.read_line(&mut line).await {
                Ok(0) => {
                    if at_eof {
                        break;
                    }
                    info!(remote = ?self.remote, "Client closed");
                    if *self.stop.borrow() {
                        break;
                    }
                    at_eof = true;
                }
                Ok(_) => {
                    at_eof = false;
                    // every received line is one attempted invocation, a
                    // blank line included (it parses to one empty field)
                    let record = line.trim_end_matches(['\r', '\n']);
                    self.dispatch(&ctx, record.to_string()).await;
                }
                Err(err) => {
                    error!(
                        remote = ?self.remote,
                        error = %err,
                        "IO error reading from client socket connection"
                    );
                    break;
                }
            }
        }

        debug!(remote = ?self.remote, "Connection handler exited");
    }

    /// Build the invocation for one record and submit it
    ///
    /// Failures of any kind leave the connection up: malformed records and
    /// engine rejections are logged through the rate-limited gate, reported
    /// to stats, and skipped.
    async fn dispatch(&self, ctx: &InvocationContext, record: String) {
        let invocation = match Invocation::parse(&self.procedure, record) {
            Ok(invocation) => invocation,
            Err(err) => {
                if let Some(suppressed) = self.failure_log.check() {
                    warn!(
                        remote = ?self.remote,
                        error = %err,
                        suppressed,
                        "Discarding malformed record"
                    );
                }
                self.adapter
                    .report_failure(IMPORTER_NAME, &self.procedure, false);
                return;
            }
        };

        if self.adapter.call_procedure(ctx, &invocation).await {
            self.adapter.report_queued(IMPORTER_NAME, &self.procedure);
        } else {
            if let Some(suppressed) = self.failure_log.check() {
                error!(
                    procedure = %self.procedure,
                    suppressed,
                    "Socket importer insertion failed"
                );
            }
            self.adapter
                .report_failure(IMPORTER_NAME, &self.procedure, false);
        }
    }
}
