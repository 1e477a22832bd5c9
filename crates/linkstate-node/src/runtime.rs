//! The node event loop
//!
//! One task owns write access to the [`NodeCore`]. Timers, the receive
//! task and the public API all reach it through a single command channel,
//! which keeps the single-writer discipline without a lock held across
//! awaits. Outgoing envelopes are encoded here and handed to per-neighbor
//! send queues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use linkstate_core::{PeerIdentity, Transport, WireCodec};
use linkstate_routing::{RoutingProtocol, RoutingTable};
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tracing::{Span, debug, info, warn};

use crate::node_core::{Envelope, NodeCore};
use crate::tasks::{NeighborSender, NodeCommand};

pub(crate) struct EventLoop<I: PeerIdentity, T: Transport<I> + 'static> {
    pub core: Arc<RwLock<NodeCore<I>>>,
    pub transport: Arc<T>,
    pub commands_tx: mpsc::Sender<NodeCommand<I>>,
    pub commands_rx: mpsc::Receiver<NodeCommand<I>>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub shutdown_rx: broadcast::Receiver<()>,
    pub table_tx: watch::Sender<Arc<RoutingTable<I>>>,
    pub send_queue_capacity: usize,
    pub span: Span,
    pub senders: HashMap<I, NeighborSender>,
}

impl<I: PeerIdentity, T: Transport<I> + 'static> EventLoop<I, T> {
    /// Run until shutdown, after delivering `initial` envelopes
    pub async fn run(mut self, initial: Vec<Envelope<I>>) {
        {
            let core_lock = Arc::clone(&self.core);
            let mut core = core_lock.write().await;
            self.dispatch(&mut core, initial);
            self.publish(&core);
        }
        info!("event loop started");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                command = self.commands_rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle(command).await;
                }
            }
        }
        info!("event loop stopped");
    }

    async fn handle(&mut self, command: NodeCommand<I>) {
        let now = Instant::now();
        let core_lock = Arc::clone(&self.core);
        let mut core = core_lock.write().await;

        let envelopes = match command {
            NodeCommand::Frame { from, frame } => core.handle_frame(&from, &frame, now),
            NodeCommand::ChangeNeighbor { change, reply } => {
                let sequence = core.protocol().sequence_number();
                let (envelopes, response) = match core.change_neighbor(change, now) {
                    Ok(envelopes) => {
                        let changed = core.protocol().sequence_number() != sequence;
                        (envelopes, Ok(changed))
                    }
                    Err(e) => (Vec::new(), Err(e)),
                };
                // The caller may have stopped waiting
                let _ = reply.send(response);
                envelopes
            }
            NodeCommand::Refresh => core.refresh(now),
            NodeCommand::AgeTick => core.age_tick(1, now),
            NodeCommand::Retransmit => core.poll_retransmissions(now),
            NodeCommand::SendFailed { peer } => {
                core.record_send_failure(&peer);
                Vec::new()
            }
        };

        self.dispatch(&mut core, envelopes);
        self.prune_senders(&core);
        self.publish(&core);
    }

    /// Stop send tasks for peers that are not neighbors
    ///
    /// Dropping a sender closes its queue. Frames already queued, such as a
    /// reply to a monitoring peer, are still sent before the task exits.
    fn prune_senders(&mut self, core: &NodeCore<I>) {
        self.senders.retain(|peer, _| {
            let keep = core.neighbors().contains(peer);
            if !keep {
                debug!(peer = %peer, "stopping send task");
            }
            keep
        });
    }

    /// Encode and queue envelopes; a full queue drops the frame
    fn dispatch(&mut self, core: &mut NodeCore<I>, envelopes: Vec<Envelope<I>>) {
        for envelope in envelopes {
            let frame = match WireCodec::encode(&envelope.message) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(to = %envelope.to, error = %e, "failed to encode message");
                    core.record_send_failure(&envelope.to);
                    continue;
                }
            };

            let sender = self.senders.entry(envelope.to.clone()).or_insert_with(|| {
                debug!(peer = %envelope.to, "starting send task");
                NeighborSender::spawn(
                    envelope.to.clone(),
                    self.send_queue_capacity,
                    Arc::clone(&self.transport),
                    self.commands_tx.clone(),
                    self.shutdown_tx.subscribe(),
                    self.span.clone(),
                )
            });
            if !sender.try_send(frame) {
                warn!(to = %envelope.to, kind = envelope.message.kind(), "send queue full, dropping frame");
                core.record_send_failure(&envelope.to);
            }
        }
    }

    fn publish(&self, core: &NodeCore<I>) {
        let table = core.routing_table();
        self.table_tx.send_if_modified(|current| {
            if Arc::ptr_eq(current, &table) {
                false
            } else {
                *current = table;
                true
            }
        });
    }
}
