use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use pktlink_schema::{Registry, SchemaError};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Ordered list of message ids published as status, shared across workers.
///
/// Ids keep their subscription order and appear at most once.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    ids: Arc<Mutex<Vec<u8>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the status list.
    ///
    /// Fails if `registry` has no schema for `id`. Returns `false` (and logs a
    /// warning) if it was already subscribed.
    pub fn subscribe(&self, registry: &Registry, id: u8) -> Result<bool> {
        if !registry.contains(id) {
            return Err(SchemaError::UnknownMessageId(id).into());
        }

        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if ids.contains(&id) {
            warn!(id, "already subscribed");
            return Ok(false);
        }
        ids.push(id);
        info!(id, "subscribed to status");
        Ok(true)
    }

    /// Remove `id`; returns whether it was present.
    pub fn unsubscribe(&self, id: u8) -> bool {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        let before = ids.len();
        ids.retain(|existing| *existing != id);
        ids.len() != before
    }

    /// Current ids in subscription order.
    pub fn ids(&self) -> Vec<u8> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Decides when a worker publishes its status frames.
///
/// Publication is due once `now >= next_due`; each publication pushes
/// `next_due` to `now + interval`. This promises "no earlier than due", not a
/// fixed period: a slow loop simply publishes late.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    subscriptions: Subscriptions,
    interval: Duration,
    next_due: Instant,
}

impl StatusPublisher {
    /// First publication is due one interval after `now`.
    pub fn new(subscriptions: Subscriptions, interval: Duration, now: Instant) -> Self {
        Self {
            subscriptions,
            interval,
            next_due: now + interval,
        }
    }

    /// Ids to publish at `now`, in subscription order; empty if not yet due.
    pub fn poll(&mut self, now: Instant) -> Vec<u8> {
        if now < self.next_due {
            return Vec::new();
        }
        self.next_due = now + self.interval;
        let ids = self.subscriptions.ids();
        debug!(count = ids.len(), "status due");
        ids
    }

    /// Time left until the next publication.
    pub fn until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }
}
