//! # Linkstate Node
//!
//! Protocol runtime for one simulated router.
//!
//! This crate provides [`Node`], which ties together:
//! - A hosted routing protocol (link-state or distance-vector)
//! - A [`Transport`] moving encoded frames between direct neighbors
//! - Timers for periodic refresh, ageing and retransmission
//!
//! All protocol state lives in a [`NodeCore`], mutated only by the node's
//! event loop. The same core can be driven synchronously, which is how the
//! lockstep simulator runs many nodes deterministically.
//!
//! ## Example
//!
//! ```rust,ignore
//! use linkstate_node::{Node, ProtocolConfig};
//!
//! let node = Node::new(ProtocolConfig::default(), id_a, [(id_b, 7.0), (id_i, 1.0)], transport)?;
//! node.start().await?;
//!
//! // Wait for a route to D
//! let mut tables = node.subscribe_table();
//! tables.wait_for(|table| table.get(&id_d).is_some()).await?;
//!
//! // Fail the link to B
//! node.change_neighbor(NeighborChange::remove(id_b)).await?;
//! ```

mod config;
mod error;
mod node_core;
mod runtime;
pub mod tasks;

pub use config::{DeliveryMode, ProtocolConfig};
pub use error::{NodeError, NodeResult};
pub use node_core::{Envelope, NodeCore};
pub use tasks::NodeCommand;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use linkstate_core::{LinkCost, NodeState, PeerIdentity, StatusSnapshot, Transport};
use linkstate_routing::{DatabaseEntry, NeighborChange, NeighborSet, RoutingProtocol, RoutingTable};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, info, info_span, instrument, warn};

use runtime::EventLoop;
use tasks::TimerKind;

/// One routing node driven by tokio tasks
///
/// Create with [`Node::new`], then [`start`](Node::start). Queries read a
/// consistent snapshot of node state; mutations go through the event loop.
pub struct Node<I: PeerIdentity, T: Transport<I> + 'static> {
    /// Node configuration
    config: ProtocolConfig,
    /// Our identity
    identity: I,
    /// Transport to direct neighbors
    transport: Arc<T>,
    /// Protocol state, written only by the event loop
    core: Arc<RwLock<NodeCore<I>>>,
    /// Latest routing table
    table_tx: watch::Sender<Arc<RoutingTable<I>>>,
    /// Command channel into the event loop
    commands_tx: mpsc::Sender<NodeCommand<I>>,
    /// Receiving end, taken on start
    commands_rx: Mutex<Option<mpsc::Receiver<NodeCommand<I>>>>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Whether the node is running
    started: AtomicBool,
}

impl<I: PeerIdentity, T: Transport<I> + 'static> Node<I, T> {
    /// Create a node
    ///
    /// Fails on invalid configuration, a self-loop or duplicate neighbor,
    /// or an invalid link cost. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: ProtocolConfig,
        identity: I,
        neighbors: impl IntoIterator<Item = (I, f64)>,
        transport: Arc<T>,
    ) -> NodeResult<Self> {
        config.validate()?;

        let mut set = NeighborSet::new(identity.clone());
        for (neighbor, cost) in neighbors {
            if set.contains(&neighbor) {
                return Err(NodeError::Config(format!(
                    "duplicate neighbor {} for {}",
                    neighbor, identity
                )));
            }
            set.apply(NeighborChange::add(neighbor, cost)?)?;
        }

        let core = NodeCore::new(set, &config, Instant::now());
        let (table_tx, _) = watch::channel(core.routing_table());
        let (commands_tx, commands_rx) = mpsc::channel(config.command_channel_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(node = %identity, algorithm = %config.algorithm, "node created");

        Ok(Self {
            config,
            identity,
            transport,
            core: Arc::new(RwLock::new(core)),
            table_tx,
            commands_tx,
            commands_rx: Mutex::new(Some(commands_rx)),
            shutdown_tx,
            background_tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Start the node
    ///
    /// Originates the first advertisement and spawns the event loop, the
    /// receive task and the timers. A node runs at most once.
    #[instrument(skip(self), fields(node_id = %self.identity))]
    pub async fn start(&self) -> NodeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }
        let Some(commands_rx) = self.commands_rx.lock().await.take() else {
            // Stopped nodes cannot be restarted
            self.started.store(false, Ordering::SeqCst);
            return Err(NodeError::AlreadyStarted);
        };

        let span = info_span!("node", node_id = %self.identity);
        let initial = self.core.write().await.initialize(Instant::now());

        let event_loop = EventLoop {
            core: Arc::clone(&self.core),
            transport: Arc::clone(&self.transport),
            commands_tx: self.commands_tx.clone(),
            commands_rx,
            shutdown_tx: self.shutdown_tx.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            table_tx: self.table_tx.clone(),
            send_queue_capacity: self.config.send_queue_capacity,
            span: span.clone(),
            senders: HashMap::new(),
        };

        let mut handles = self.background_tasks.lock().await;
        handles.push(tokio::spawn(event_loop.run(initial).instrument(span.clone())));
        handles.push(tasks::spawn_receiver(
            Arc::clone(&self.transport),
            self.commands_tx.clone(),
            self.shutdown_tx.subscribe(),
            span.clone(),
        ));
        handles.push(self.spawn_timer(TimerKind::Refresh, &span));
        handles.push(self.spawn_timer(TimerKind::AgeTick, &span));
        if self.config.delivery.is_reliable() {
            handles.push(self.spawn_timer(TimerKind::Retransmit, &span));
        }

        info!(tasks = handles.len(), "node started");
        Ok(())
    }

    fn spawn_timer(&self, kind: TimerKind, span: &Span) -> JoinHandle<()> {
        let period = match kind {
            TimerKind::Refresh => self.config.refresh_interval(),
            TimerKind::AgeTick => self.config.age_tick_interval(),
            // Poll at half the ack timeout
            TimerKind::Retransmit => self
                .config
                .ack_timeout()
                .map(|timeout| (timeout / 2).max(Duration::from_millis(1)))
                .unwrap_or_else(|| self.config.age_tick_interval()),
        };
        tasks::spawn_timer(
            kind,
            period,
            self.commands_tx.clone(),
            self.shutdown_tx.subscribe(),
            span.clone(),
        )
    }

    /// Stop the node
    ///
    /// Timers and send tasks stop and links are torn down. Nothing is
    /// flooded on the way out; the node's advertisement ages out elsewhere.
    #[instrument(skip(self), fields(node_id = %self.identity))]
    pub async fn shutdown(&self) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Err(NodeError::NotStarted);
        }

        // Receivers may all be gone already
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.background_tasks.lock().await.drain(..).collect();
        for task in handles {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        for peer in self.transport.connected_peers() {
            if let Err(e) = self.transport.disconnect(&peer).await {
                warn!(peer = %peer, error = %e, "disconnect failed");
            }
        }

        info!("node stopped");
        Ok(())
    }

    /// Add, remove or re-cost a neighbor
    ///
    /// Returns whether the neighbor set changed. A change regenerates and
    /// floods the self-advertisement immediately.
    pub async fn change_neighbor(&self, change: NeighborChange<I>) -> NodeResult<bool> {
        if !self.is_started() {
            return Err(NodeError::NotStarted);
        }
        let (reply, response) = oneshot::channel();
        self.commands_tx
            .send(NodeCommand::ChangeNeighbor { change, reply })
            .await?;
        response.await?
    }

    /// Our identity
    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// Node configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Transport this node sends through
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Whether the node is running
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Current routing table
    pub fn routing_table(&self) -> Arc<RoutingTable<I>> {
        Arc::clone(&self.table_tx.borrow())
    }

    /// Subscribe to routing table updates
    pub fn subscribe_table(&self) -> watch::Receiver<Arc<RoutingTable<I>>> {
        self.table_tx.subscribe()
    }

    /// Current database contents
    pub async fn database(&self) -> Vec<DatabaseEntry<I>> {
        self.core.read().await.database()
    }

    /// Status snapshot, as returned to `STATUS_REQUEST`
    pub async fn status(&self) -> StatusSnapshot<I> {
        self.core.read().await.status()
    }

    /// Protocol state
    pub async fn state(&self) -> NodeState {
        self.core.read().await.state()
    }

    /// Current adjacencies
    pub async fn neighbors(&self) -> BTreeMap<I, LinkCost> {
        self.core.read().await.neighbors().as_map().clone()
    }

    /// source -> latest sequence number held
    pub async fn sequence_numbers(&self) -> BTreeMap<I, u64> {
        self.core.read().await.protocol().sequence_numbers()
    }
}
