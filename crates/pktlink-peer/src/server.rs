use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use pktlink_schema::Registry;
use pktlink_transport::{LinkStream, TcpLink, TransportError};
use tracing::{error, info, warn};

use crate::config::PeerConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::publisher::Subscriptions;
use crate::worker::{Worker, WorkerSummary};

/// Accepts TCP peers and runs one worker thread per connection.
///
/// Every worker shares the same registry and subscription list.
pub struct Server {
    listener: TcpLink,
    registry: Arc<Registry>,
    subscriptions: Subscriptions,
    config: PeerConfig,
    shutdown: Arc<AtomicBool>,
    next_peer_id: AtomicU64,
}

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    /// Raise the shutdown flag and wake a blocked `accept`.
    pub fn trigger(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // A throwaway connection unblocks accept so serve() sees the flag.
        if let Err(err) = TcpLink::connect(self.addr) {
            warn!(error = %err, "could not wake listener");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Server {
    /// Bind a listener on `addr`. Port 0 picks an ephemeral port.
    pub fn bind(addr: impl ToSocketAddrs, registry: Arc<Registry>) -> Result<Self> {
        let listener = TcpLink::bind(addr)?;
        Ok(Self {
            listener,
            registry,
            subscriptions: Subscriptions::new(),
            config: PeerConfig::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            next_peer_id: AtomicU64::new(1),
        })
    }

    /// Override per-connection behavior.
    pub fn with_config(mut self, config: PeerConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish `id` as status on every connection.
    pub fn subscribe(&self, id: u8) -> Result<bool> {
        self.subscriptions.subscribe(&self.registry, id)
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            addr: self.listener.local_addr(),
        }
    }

    /// Accept the next peer and build its worker without starting it.
    pub fn accept(&self) -> Result<Worker<LinkStream, LinkStream>> {
        let link = self.listener.accept()?;
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        let connection =
            Connection::from_link(link, Arc::clone(&self.registry), self.config.frame.clone())?
                .with_peer(format!("peer-{id}"));
        Ok(Worker::new(
            connection,
            self.subscriptions.clone(),
            self.config.clone(),
            Arc::clone(&self.shutdown),
        ))
    }

    /// Run `worker` on its own named thread.
    pub fn spawn(&self, worker: Worker<LinkStream, LinkStream>) -> Result<JoinHandle<()>> {
        let name = worker.connection().peer().to_string();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || match worker.run() {
                Ok(summary) => log_summary(&name, &summary),
                Err(err) => error!(peer = %name, error = %err, "worker failed"),
            })
            .map_err(TransportError::Io)?;
        Ok(handle)
    }

    /// Accept peers until shutdown is triggered, then wait for every worker.
    pub fn serve(&self) -> Result<()> {
        info!(addr = %self.local_addr(), "server running");
        let mut workers = Vec::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            let worker = match self.accept() {
                Ok(worker) => worker,
                Err(err) if self.shutdown.load(Ordering::SeqCst) => {
                    info!(error = %err, "accept interrupted by shutdown");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            workers.push(self.spawn(worker)?);
            workers.retain(|handle: &JoinHandle<()>| !handle.is_finished());
        }

        for handle in workers {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("server stopped");
        Ok(())
    }
}

fn log_summary(peer: &str, summary: &WorkerSummary) {
    info!(
        peer,
        decoded = summary.decoded,
        unknown = summary.unknown,
        malformed = summary.malformed,
        status_sent = summary.status_sent,
        status_skipped = summary.status_skipped,
        "peer disconnected"
    );
}
