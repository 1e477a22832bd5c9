//! Acknowledgment tracking for reliable flooding
//!
//! In reliable mode every routing message sent to a neighbor is tracked
//! until that neighbor acknowledges it.
//!
//! ## How it works
//!
//! 1. `track` records the message under `(neighbor, key)`
//! 2. `acknowledge` clears the record when the neighbor's ACK arrives
//! 3. `poll` retransmits records older than the ack timeout
//! 4. Once a record has used its whole retry budget, the neighbor is
//!    reported unreachable and all of its records are dropped
//!
//! Only the adjacency is demoted; the node keeps running.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use linkstate_core::{LspKey, PeerIdentity, RoutingMessage};
use tracing::{debug, instrument, warn};

/// One unacknowledged send
#[derive(Debug, Clone)]
pub struct PendingDelivery<I: PeerIdentity> {
    /// Message to retransmit
    pub message: RoutingMessage<I>,
    /// Sends so far, including the first
    pub attempts: u32,
    /// When the last send happened
    pub last_sent: Instant,
}

/// Work produced by [`ReliableDelivery::poll`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome<I: PeerIdentity> {
    /// Messages to send again, as `(neighbor, message)`
    pub retransmit: Vec<(I, RoutingMessage<I>)>,
    /// Neighbors whose retry budget ran out
    pub unreachable: Vec<I>,
}

impl<I: PeerIdentity> PollOutcome<I> {
    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.retransmit.is_empty() && self.unreachable.is_empty()
    }
}

/// Tracks unacknowledged sends per neighbor
pub struct ReliableDelivery<I: PeerIdentity> {
    pending: DashMap<(I, LspKey<I>), PendingDelivery<I>>,
    ack_timeout: Duration,
    retry_budget: u32,
}

impl<I: PeerIdentity> ReliableDelivery<I> {
    /// Create a tracker
    ///
    /// # Arguments
    /// * `ack_timeout` - How long to wait for an ACK before resending
    /// * `retry_budget` - Retransmissions allowed before the neighbor is demoted
    pub fn new(ack_timeout: Duration, retry_budget: u32) -> Self {
        Self {
            pending: DashMap::new(),
            ack_timeout,
            retry_budget,
        }
    }

    /// Record a message just sent to `neighbor`
    ///
    /// Older records for the same neighbor and source are superseded.
    #[instrument(skip(self, message), fields(neighbor = %neighbor, key = %message.key()))]
    pub fn track(&self, neighbor: I, message: RoutingMessage<I>, now: Instant) {
        let key = message.key();
        self.pending.retain(|(peer, pending_key), _| {
            !(peer == &neighbor
                && pending_key.source == key.source
                && pending_key.sequence_number < key.sequence_number)
        });
        self.pending.insert(
            (neighbor, key),
            PendingDelivery {
                message,
                attempts: 1,
                last_sent: now,
            },
        );
    }

    /// Clear the record acknowledged by `neighbor`; returns whether one existed
    pub fn acknowledge(&self, neighbor: &I, key: &LspKey<I>) -> bool {
        let removed = self.pending.remove(&(neighbor.clone(), key.clone())).is_some();
        if removed {
            debug!(neighbor = %neighbor, key = %key, "acknowledged");
        }
        removed
    }

    /// Collect retransmissions and exhausted neighbors as of `now`
    pub fn poll(&self, now: Instant) -> PollOutcome<I> {
        let mut retransmit = Vec::new();
        let mut unreachable = Vec::new();

        let mut due: Vec<(I, LspKey<I>)> = self
            .pending
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.value().last_sent) >= self.ack_timeout)
            .map(|entry| entry.key().clone())
            .collect();
        due.sort();

        for (neighbor, key) in due {
            if unreachable.contains(&neighbor) {
                continue;
            }
            let Some(mut entry) = self.pending.get_mut(&(neighbor.clone(), key.clone())) else {
                continue;
            };
            let pending = entry.value_mut();
            if pending.attempts > self.retry_budget {
                warn!(neighbor = %neighbor, key = %key, attempts = pending.attempts, "retry budget exhausted");
                unreachable.push(neighbor);
                continue;
            }
            pending.attempts += 1;
            pending.last_sent = now;
            debug!(neighbor = %neighbor, key = %key, attempt = pending.attempts, "retransmitting");
            retransmit.push((neighbor, pending.message.clone()));
        }

        for neighbor in &unreachable {
            self.forget_neighbor(neighbor);
        }
        retransmit.retain(|(neighbor, _)| !unreachable.contains(neighbor));

        PollOutcome {
            retransmit,
            unreachable,
        }
    }

    /// Drop every record for `neighbor`; returns how many were dropped
    pub fn forget_neighbor(&self, neighbor: &I) -> usize {
        let before = self.pending.len();
        self.pending.retain(|(peer, _), _| peer != neighbor);
        before - self.pending.len()
    }

    /// Whether a record exists
    pub fn is_pending(&self, neighbor: &I, key: &LspKey<I>) -> bool {
        self.pending.contains_key(&(neighbor.clone(), key.clone()))
    }

    /// Number of unacknowledged sends
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Configured ack timeout
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }
}
