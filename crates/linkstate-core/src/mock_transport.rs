//! In-memory transport for tests and simulation
//!
//! Every [`MockTransport`] owns an inbox channel; peers hold a clone of its
//! sender. Links can be marked down at runtime, in which case frames are
//! silently dropped, which is what a failed physical link looks like to the
//! protocol.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use linkstate_core::{MockNetwork, SimulationIdentity, Transport};
//!
//! let ids = SimulationIdentity::range_to('C');
//! let network = MockNetwork::from_links(&ids, &[(ids[0], ids[1]), (ids[1], ids[2])]);
//!
//! let a = network.get(&ids[0]).unwrap();
//! a.send(&ids[1], b"frame".to_vec()).await?;
//!
//! network.set_link_down(&ids[0], &ids[1], true);
//! a.send(&ids[1], b"lost".to_vec()).await?; // Ok, but never delivered
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use crate::error::TransportError;
use crate::identity::PeerIdentity;
use crate::transport::Transport;

/// Default inbox capacity
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Frame in flight between mock transports
#[derive(Debug, Clone)]
pub struct MockFrame<I> {
    /// The sending node
    pub sender: I,
    /// Encoded payload
    pub data: Vec<u8>,
}

/// In-memory transport endpoint for one node
pub struct MockTransport<I: PeerIdentity> {
    local_id: I,
    /// peer -> that peer's inbox
    outgoing: DashMap<I, mpsc::Sender<MockFrame<I>>>,
    /// Peers whose link is currently failed
    down: DashSet<I>,
    inbox_rx: Mutex<mpsc::Receiver<MockFrame<I>>>,
    inbox_tx: mpsc::Sender<MockFrame<I>>,
    dropped: AtomicU64,
}

impl<I: PeerIdentity> MockTransport<I> {
    /// Create an unconnected transport
    pub fn new(local_id: I) -> Self {
        Self::with_buffer_size(local_id, DEFAULT_BUFFER_SIZE)
    }

    /// Create an unconnected transport with a specific inbox capacity
    pub fn with_buffer_size(local_id: I, buffer_size: usize) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(buffer_size.max(1));
        Self {
            local_id,
            outgoing: DashMap::new(),
            down: DashSet::new(),
            inbox_rx: Mutex::new(inbox_rx),
            inbox_tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Our identity
    pub fn local_id(&self) -> &I {
        &self.local_id
    }

    /// Sender half of our inbox, handed to peers by [`connect_to`](Self::connect_to)
    pub fn inbox_sender(&self) -> mpsc::Sender<MockFrame<I>> {
        self.inbox_tx.clone()
    }

    /// Add a one-way path to `peer`
    pub fn connect_to(&self, peer: I, peer_inbox: mpsc::Sender<MockFrame<I>>) {
        self.down.remove(&peer);
        self.outgoing.insert(peer, peer_inbox);
    }

    /// Remove the path to `peer` entirely
    pub fn disconnect_from(&self, peer: &I) {
        self.outgoing.remove(peer);
        self.down.remove(peer);
    }

    /// Mark the link to `peer` failed or restored
    ///
    /// While down, sends report success but the frame is discarded.
    pub fn set_link_down(&self, peer: &I, down: bool) {
        if down {
            self.down.insert(peer.clone());
        } else {
            self.down.remove(peer);
        }
    }

    /// Whether the link to `peer` is currently failed
    pub fn is_link_down(&self, peer: &I) -> bool {
        self.down.contains(peer)
    }

    /// Frames discarded because their link was down
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<I: PeerIdentity> Transport<I> for MockTransport<I> {
    async fn send(&self, peer: &I, frame: Vec<u8>) -> Result<(), TransportError> {
        let sender = self
            .outgoing
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::PeerNotConnected(peer.short_id()))?;

        if self.down.contains(peer) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(from = %self.local_id, to = %peer, "link down, dropping frame");
            return Ok(());
        }

        sender
            .send(MockFrame {
                sender: self.local_id.clone(),
                data: frame,
            })
            .await
            .map_err(|_| TransportError::SendFailed("peer inbox closed".into()))
    }

    async fn recv(&self) -> Result<(I, Vec<u8>), TransportError> {
        let mut inbox = self.inbox_rx.lock().await;
        let frame = inbox.recv().await.ok_or(TransportError::ConnectionClosed)?;
        Ok((frame.sender, frame.data))
    }

    fn is_connected(&self, peer: &I) -> bool {
        self.outgoing.contains_key(peer) && !self.down.contains(peer)
    }

    fn connected_peers(&self) -> Vec<I> {
        let mut peers: Vec<I> = self
            .outgoing
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|peer| !self.down.contains(peer))
            .collect();
        peers.sort();
        peers
    }

    async fn try_recv(&self) -> Result<Option<(I, Vec<u8>)>, TransportError> {
        let mut inbox = self.inbox_rx.lock().await;
        match inbox.try_recv() {
            Ok(frame) => Ok(Some((frame.sender, frame.data))),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::ConnectionClosed),
        }
    }

    async fn disconnect(&self, peer: &I) -> Result<(), TransportError> {
        self.disconnect_from(peer);
        Ok(())
    }
}

/// Builder for sets of interconnected mock transports
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    buffer_size: usize,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the inbox capacity of every transport built
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Two transports connected to each other
    pub fn create_connected_pair<I: PeerIdentity>(
        &self,
        id_a: I,
        id_b: I,
    ) -> (MockTransport<I>, MockTransport<I>) {
        let transport_a = MockTransport::with_buffer_size(id_a.clone(), self.buffer_size);
        let transport_b = MockTransport::with_buffer_size(id_b.clone(), self.buffer_size);

        transport_a.connect_to(id_b, transport_b.inbox_sender());
        transport_b.connect_to(id_a, transport_a.inbox_sender());

        (transport_a, transport_b)
    }

    /// One transport per id, with a bidirectional path for every link
    ///
    /// Links naming an unknown id are skipped.
    pub fn create_from_links<I: PeerIdentity>(
        &self,
        ids: &[I],
        links: &[(I, I)],
    ) -> HashMap<I, MockTransport<I>> {
        let transports: HashMap<I, MockTransport<I>> = ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    MockTransport::with_buffer_size(id.clone(), self.buffer_size),
                )
            })
            .collect();

        for (a, b) in links {
            if let (Some(transport_a), Some(transport_b)) = (transports.get(a), transports.get(b)) {
                transport_a.connect_to(b.clone(), transport_b.inbox_sender());
                transport_b.connect_to(a.clone(), transport_a.inbox_sender());
            }
        }

        transports
    }
}

/// A set of mock transports wired along a topology's links
pub struct MockNetwork<I: PeerIdentity> {
    transports: HashMap<I, Arc<MockTransport<I>>>,
}

impl<I: PeerIdentity> MockNetwork<I> {
    /// Wire one transport per id along `links`
    pub fn from_links(ids: &[I], links: &[(I, I)]) -> Self {
        Self::with_builder(&MockTransportBuilder::new(), ids, links)
    }

    /// Same as [`from_links`](Self::from_links) with a custom builder
    pub fn with_builder(builder: &MockTransportBuilder, ids: &[I], links: &[(I, I)]) -> Self {
        let transports = builder
            .create_from_links(ids, links)
            .into_iter()
            .map(|(id, transport)| (id, Arc::new(transport)))
            .collect();
        Self { transports }
    }

    /// Transport for one node
    pub fn get(&self, id: &I) -> Option<Arc<MockTransport<I>>> {
        self.transports.get(id).cloned()
    }

    /// All identities, sorted
    pub fn identities(&self) -> Vec<I> {
        let mut ids: Vec<I> = self.transports.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Fail or restore the link between `a` and `b` in both directions
    pub fn set_link_down(&self, a: &I, b: &I, down: bool) {
        if let Some(transport) = self.transports.get(a) {
            transport.set_link_down(b, down);
        }
        if let Some(transport) = self.transports.get(b) {
            transport.set_link_down(a, down);
        }
    }

    /// Add a bidirectional link that did not exist at construction
    pub fn add_link(&self, a: &I, b: &I) {
        if let (Some(transport_a), Some(transport_b)) = (self.transports.get(a), self.transports.get(b)) {
            transport_a.connect_to(b.clone(), transport_b.inbox_sender());
            transport_b.connect_to(a.clone(), transport_a.inbox_sender());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SimulationIdentity;

    fn id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    #[tokio::test]
    async fn test_send_recv_pair() {
        let (transport_a, transport_b) =
            MockTransportBuilder::new().create_connected_pair(id('A'), id('B'));

        transport_a.send(&id('B'), b"hello".to_vec()).await.unwrap();
        let (sender, data) = transport_b.recv().await.unwrap();
        assert_eq!(sender, id('A'));
        assert_eq!(data, b"hello".to_vec());

        transport_b.send(&id('A'), b"back".to_vec()).await.unwrap();
        let (sender, _) = transport_a.recv().await.unwrap();
        assert_eq!(sender, id('B'));
    }

    #[tokio::test]
    async fn test_unknown_peer_rejected() {
        let transport = MockTransport::new(id('A'));
        let result = transport.send(&id('Z'), b"x".to_vec()).await;
        assert!(matches!(result, Err(TransportError::PeerNotConnected(_))));
    }

    #[tokio::test]
    async fn test_link_down_drops_silently() {
        let (transport_a, transport_b) =
            MockTransportBuilder::new().create_connected_pair(id('A'), id('B'));

        transport_a.set_link_down(&id('B'), true);
        assert!(!transport_a.is_connected(&id('B')));
        transport_a.send(&id('B'), b"lost".to_vec()).await.unwrap();
        assert_eq!(transport_a.dropped_frames(), 1);
        assert!(transport_b.try_recv().await.unwrap().is_none());

        transport_a.set_link_down(&id('B'), false);
        transport_a.send(&id('B'), b"found".to_vec()).await.unwrap();
        let (_, data) = transport_b.try_recv().await.unwrap().unwrap();
        assert_eq!(data, b"found".to_vec());
    }

    #[tokio::test]
    async fn test_network_from_links() {
        let ids = SimulationIdentity::range_to('C');
        let network = MockNetwork::from_links(&ids, &[(id('A'), id('B')), (id('B'), id('C'))]);

        let a = network.get(&id('A')).unwrap();
        let b = network.get(&id('B')).unwrap();
        assert_eq!(a.connected_peers(), vec![id('B')]);
        assert_eq!(b.connected_peers(), vec![id('A'), id('C')]);
        assert!(!a.is_connected(&id('C')));
        assert_eq!(network.identities(), ids);
    }

    #[tokio::test]
    async fn test_network_link_failure_both_directions() {
        let ids = SimulationIdentity::range_to('B');
        let network = MockNetwork::from_links(&ids, &[(id('A'), id('B'))]);
        network.set_link_down(&id('A'), &id('B'), true);

        let a = network.get(&id('A')).unwrap();
        let b = network.get(&id('B')).unwrap();
        assert!(a.is_link_down(&id('B')));
        assert!(b.is_link_down(&id('A')));

        network.set_link_down(&id('B'), &id('A'), false);
        assert!(a.is_connected(&id('B')));
        assert!(b.is_connected(&id('A')));
    }

    #[tokio::test]
    async fn test_add_link_after_construction() {
        let ids = SimulationIdentity::range_to('C');
        let network = MockNetwork::from_links(&ids, &[]);
        network.add_link(&id('A'), &id('C'));

        let a = network.get(&id('A')).unwrap();
        let c = network.get(&id('C')).unwrap();
        a.send(&id('C'), b"new".to_vec()).await.unwrap();
        let (sender, _) = c.recv().await.unwrap();
        assert_eq!(sender, id('A'));
    }
}
