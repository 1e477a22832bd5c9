//! Asynchronous multi-node harness
//!
//! Spawns one [`Node`] per topology node, wired together with in-memory
//! transports. Unlike the lockstep simulator, every node runs its own
//! event loop and timers on the tokio runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use linkstate_core::{Algorithm, MockNetwork, MockTransport, PeerIdentity};
use linkstate_node::{Node, ProtocolConfig};
use linkstate_routing::{NeighborChange, RoutingTable};
use tracing::{info, warn};

use crate::error::{SimulationError, SimulationResult};
use crate::topology::Topology;

/// Interval between convergence checks
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type SimulatedNode<I> = Node<I, MockTransport<I>>;

/// Running nodes over a mock network
pub struct SimulatedNetwork<I: PeerIdentity> {
    config: ProtocolConfig,
    /// Links currently up
    topology: Topology<I>,
    transports: MockNetwork<I>,
    nodes: BTreeMap<I, Arc<SimulatedNode<I>>>,
}

impl<I: PeerIdentity> SimulatedNetwork<I> {
    /// Create and start a node for every node in `topology`
    pub async fn start(topology: Topology<I>, config: ProtocolConfig) -> SimulationResult<Self> {
        let ids = topology.nodes();
        let transports = MockNetwork::from_links(&ids, &topology.link_pairs());

        let mut nodes = BTreeMap::new();
        for id in ids {
            let transport = transports
                .get(&id)
                .ok_or_else(|| SimulationError::UnknownNode(id.to_string()))?;
            let node = Node::new(config.clone(), id.clone(), topology.neighbor_config(&id), transport)?;
            nodes.insert(id, Arc::new(node));
        }

        for node in nodes.values() {
            node.start().await?;
        }
        info!(nodes = nodes.len(), links = topology.link_count(), "simulated network started");

        Ok(Self {
            config,
            topology,
            transports,
            nodes,
        })
    }

    pub fn node(&self, id: &I) -> Option<&Arc<SimulatedNode<I>>> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&I, &Arc<SimulatedNode<I>>)> {
        self.nodes.iter()
    }

    /// Links currently up
    pub fn topology(&self) -> &Topology<I> {
        &self.topology
    }

    /// In-memory transports, for failure injection below the protocol
    pub fn transports(&self) -> &MockNetwork<I> {
        &self.transports
    }

    fn require(&self, id: &I) -> SimulationResult<&Arc<SimulatedNode<I>>> {
        self.nodes
            .get(id)
            .ok_or_else(|| SimulationError::UnknownNode(id.to_string()))
    }

    /// Cut the link `a`-`b` and tell both ends
    pub async fn fail_link(&mut self, a: &I, b: &I) -> SimulationResult<()> {
        self.topology = self.topology.without_link(a, b)?;
        self.transports.set_link_down(a, b, true);
        self.require(a)?.change_neighbor(NeighborChange::remove(b.clone())).await?;
        self.require(b)?.change_neighbor(NeighborChange::remove(a.clone())).await?;
        info!(a = %a, b = %b, "link failed");
        Ok(())
    }

    /// Bring the link `a`-`b` up with `cost` and tell both ends
    pub async fn restore_link(&mut self, a: &I, b: &I, cost: f64) -> SimulationResult<()> {
        self.topology = self.topology.with_link(a.clone(), b.clone(), cost)?;
        self.transports.add_link(a, b);
        self.transports.set_link_down(a, b, false);
        self.require(a)?.change_neighbor(NeighborChange::add(b.clone(), cost)?).await?;
        self.require(b)?.change_neighbor(NeighborChange::add(a.clone(), cost)?).await?;
        info!(a = %a, b = %b, cost, "link restored");
        Ok(())
    }

    /// Every node's current routing table
    pub fn tables(&self) -> BTreeMap<I, Arc<RoutingTable<I>>> {
        self.nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.routing_table()))
            .collect()
    }

    /// Wait until every node routes to exactly the nodes it can reach and
    /// tables held still between two checks
    ///
    /// For link-state the nodes of each connected part must also agree on
    /// every source's latest sequence number.
    pub async fn wait_converged(&self, timeout: Duration) -> SimulationResult<()> {
        let check = async {
            let mut previous = None;
            loop {
                let tables = self.tables();
                if self.covers_components(&tables).await && previous.as_ref() == Some(&tables) {
                    return;
                }
                previous = Some(tables);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, check)
            .await
            .map_err(|_| SimulationError::Timeout(timeout))
    }

    async fn covers_components(&self, tables: &BTreeMap<I, Arc<RoutingTable<I>>>) -> bool {
        for component in self.topology.components() {
            for id in &component {
                let Some(table) = tables.get(id) else { return false };
                let destinations: BTreeSet<I> = table.destinations().into_iter().collect();
                let expected = component.iter().filter(|other| *other != id).cloned().collect();
                if destinations != expected {
                    return false;
                }
            }

            if self.config.algorithm == Algorithm::LinkState {
                let mut reference = None;
                for id in &component {
                    let Some(node) = self.nodes.get(id) else { return false };
                    let sequences = node.sequence_numbers().await;
                    match &reference {
                        None => reference = Some(sequences),
                        Some(first) if *first != sequences => return false,
                        Some(_) => {}
                    }
                }
            }
        }
        true
    }

    /// Stop every node
    pub async fn shutdown(&self) -> SimulationResult<()> {
        for (id, node) in &self.nodes {
            if let Err(e) = node.shutdown().await {
                warn!(node = %id, error = %e, "shutdown failed");
            }
        }
        info!("simulated network stopped");
        Ok(())
    }
}
