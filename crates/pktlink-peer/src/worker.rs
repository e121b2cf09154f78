use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use pktlink_schema::SchemaError;
use pktlink_transport::Transport;
use tracing::{debug, info, warn};

use crate::config::PeerConfig;
use crate::connection::{Connection, InputEvent};
use crate::error::{PeerError, Result};
use crate::publisher::{StatusPublisher, Subscriptions};

/// Why a worker loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEnd {
    /// The peer closed the link.
    Closed,
    /// The shutdown flag was raised.
    Shutdown,
}

/// Counters reported when a worker finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub decoded: u64,
    pub unknown: u64,
    pub malformed: u64,
    pub status_sent: u64,
    /// Status publications dropped because the live values did not encode.
    pub status_skipped: u64,
    pub end: WorkerEnd,
}

/// The per-connection loop: apply inbound frames, publish status when due.
pub struct Worker<R, W> {
    connection: Connection<R, W>,
    publisher: StatusPublisher,
    config: PeerConfig,
    shutdown: Arc<AtomicBool>,
}

impl<R: Transport, W: Write> Worker<R, W> {
    pub fn new(
        connection: Connection<R, W>,
        subscriptions: Subscriptions,
        config: PeerConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let publisher = StatusPublisher::new(subscriptions, config.status_interval, Instant::now());
        Self {
            connection,
            publisher,
            config,
            shutdown,
        }
    }

    /// Run until the peer closes the link or shutdown is requested.
    ///
    /// Input waits are capped by both `poll_timeout` and the time left before
    /// the next status publication. A subscribed message whose live values
    /// fail to encode is skipped for that tick; the link stays up.
    pub fn run(mut self) -> Result<WorkerSummary> {
        let peer = self.connection.peer().to_string();
        info!(peer = %peer, "worker started");

        let mut summary = WorkerSummary {
            decoded: 0,
            unknown: 0,
            malformed: 0,
            status_sent: 0,
            status_skipped: 0,
            end: WorkerEnd::Shutdown,
        };

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                summary.end = WorkerEnd::Shutdown;
                break;
            }

            let now = Instant::now();
            for id in self.publisher.poll(now) {
                match self.connection.send(id) {
                    Ok(()) => summary.status_sent += 1,
                    Err(PeerError::Schema(err @ SchemaError::Encoding { .. })) => {
                        warn!(peer = %peer, id, error = %err, "status not encodable, skipped");
                        summary.status_skipped += 1;
                    }
                    Err(PeerError::Closed) => {
                        summary.end = WorkerEnd::Closed;
                        return Ok(self.finish(&peer, summary));
                    }
                    Err(err) => return Err(err),
                }
            }

            let wait = self
                .publisher
                .until_due(Instant::now())
                .min(self.config.poll_timeout);
            match self.connection.process_input(Some(wait)) {
                Ok(InputEvent::Decoded(_)) => summary.decoded += 1,
                Ok(InputEvent::UnknownId(_)) => summary.unknown += 1,
                Ok(InputEvent::Malformed(_)) => summary.malformed += 1,
                Ok(InputEvent::Idle) => {}
                Err(PeerError::Closed) => {
                    summary.end = WorkerEnd::Closed;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(self.finish(&peer, summary))
    }

    fn finish(&self, peer: &str, summary: WorkerSummary) -> WorkerSummary {
        debug!(peer, stats = ?self.connection.stats(), "framer stats");
        info!(
            peer,
            end = ?summary.end,
            decoded = summary.decoded,
            status_sent = summary.status_sent,
            status_skipped = summary.status_skipped,
            "worker finished"
        );
        summary
    }

    pub fn connection(&self) -> &Connection<R, W> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection<R, W> {
        &mut self.connection
    }
}
