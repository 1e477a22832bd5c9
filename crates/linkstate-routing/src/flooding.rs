//! Flooding with duplicate suppression
//!
//! The [`FloodingEngine`] decides who receives an installed packet. It keeps
//! a per-source seen-set so that each `(source, sequence_number)` pair is
//! flooded at most once, however many paths deliver it.
//!
//! ## Receiving from neighbor `N`
//!
//! 1. Offer the packet to the database.
//! 2. Installed: forward to every neighbor except `N`.
//! 3. Duplicate or stale: drop. Sequence numbers only grow, so this is
//!    what terminates a flood.
//! 4. Corrupt: drop and report; never forward.

use std::collections::{BTreeMap, BTreeSet};

use linkstate_core::{LinkStatePacket, LspKey, PacketError, PeerIdentity};
use tracing::{debug, instrument, warn};

use crate::lsdb::{AcceptOutcome, LinkStateDatabase, RejectReason};
use crate::neighbors::NeighborSet;

/// Where an offered packet goes next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodOutcome<I: PeerIdentity> {
    /// Installed; send to these neighbors (ascending id order)
    Forward { targets: Vec<I> },
    /// Duplicate or older than the installed entry
    Stale,
    /// Protocol violation; dropped
    Corrupt(PacketError),
    /// Installed but this key was already flooded
    AlreadyFlooded,
}

impl<I: PeerIdentity> FloodOutcome<I> {
    /// Whether the database accepted the packet
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Forward { .. } | Self::AlreadyFlooded)
    }
}

/// Per-node flood state
#[derive(Debug, Clone, Default)]
pub struct FloodingEngine<I: PeerIdentity> {
    /// source -> sequence numbers already flooded
    seen: BTreeMap<I, BTreeSet<u64>>,
}

impl<I: PeerIdentity> FloodingEngine<I> {
    /// Create an engine with an empty seen-set
    pub fn new() -> Self {
        Self {
            seen: BTreeMap::new(),
        }
    }

    /// Install our own fresh packet and flood it to every neighbor
    #[instrument(skip_all, fields(key = %packet.key()))]
    pub fn originate(
        &mut self,
        lsdb: &mut LinkStateDatabase<I>,
        packet: LinkStatePacket<I>,
        neighbors: &NeighborSet<I>,
    ) -> FloodOutcome<I> {
        let key = packet.key();
        match lsdb.accept(packet) {
            AcceptOutcome::Installed => {
                self.mark_seen(&key);
                FloodOutcome::Forward {
                    targets: neighbors.ids(),
                }
            }
            AcceptOutcome::Rejected(RejectReason::DuplicateOrStale) => {
                warn!("own packet not newer than installed entry");
                FloodOutcome::Stale
            }
            AcceptOutcome::Rejected(RejectReason::Corrupt(error)) => FloodOutcome::Corrupt(error),
        }
    }

    /// Handle a packet received from neighbor `from`
    #[instrument(skip_all, fields(key = %packet.key(), from = %from))]
    pub fn receive(
        &mut self,
        lsdb: &mut LinkStateDatabase<I>,
        packet: LinkStatePacket<I>,
        from: &I,
        neighbors: &NeighborSet<I>,
    ) -> FloodOutcome<I> {
        let key = packet.key();
        match lsdb.accept(packet) {
            AcceptOutcome::Installed => {
                if !self.mark_seen(&key) {
                    debug!("already flooded");
                    return FloodOutcome::AlreadyFlooded;
                }
                let targets = neighbors.ids_except(from);
                debug!(targets = targets.len(), "flooding");
                FloodOutcome::Forward { targets }
            }
            AcceptOutcome::Rejected(RejectReason::DuplicateOrStale) => FloodOutcome::Stale,
            AcceptOutcome::Rejected(RejectReason::Corrupt(error)) => FloodOutcome::Corrupt(error),
        }
    }

    /// Drop all seen-state for a source removed from the database
    pub fn forget(&mut self, source: &I) {
        self.seen.remove(source);
    }

    /// Whether this key has been flooded
    pub fn has_flooded(&self, key: &LspKey<I>) -> bool {
        self.seen
            .get(&key.source)
            .is_some_and(|seqs| seqs.contains(&key.sequence_number))
    }

    /// Total remembered keys
    pub fn seen_len(&self) -> usize {
        self.seen.values().map(BTreeSet::len).sum()
    }

    /// Record a key; returns `false` if it was already present
    ///
    /// Older sequence numbers of the same source are pruned: once
    /// superseded they can never be installed again.
    fn mark_seen(&mut self, key: &LspKey<I>) -> bool {
        let seqs = self.seen.entry(key.source.clone()).or_default();
        if !seqs.insert(key.sequence_number) {
            return false;
        }
        seqs.retain(|seq| *seq >= key.sequence_number);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkstate_core::{LinkCost, SimulationIdentity};

    fn make_id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    fn lsp(source: char, seq: u64, neighbors: &[(char, f64)]) -> LinkStatePacket<SimulationIdentity> {
        let neighbors = neighbors
            .iter()
            .map(|(n, c)| (make_id(*n), LinkCost::new(*c).unwrap()))
            .collect();
        LinkStatePacket::originate(make_id(source), seq, 60, neighbors)
    }

    fn neighbors_of_d() -> NeighborSet<SimulationIdentity> {
        NeighborSet::with_neighbors(
            make_id('D'),
            [('I', 6.0), ('C', 5.0), ('F', 1.0), ('E', 1.0)]
                .into_iter()
                .map(|(n, c)| (make_id(n), LinkCost::new(c).unwrap())),
        )
        .unwrap()
    }

    #[test]
    fn test_forward_excludes_sender() {
        let mut lsdb = LinkStateDatabase::new(make_id('D'));
        let mut engine = FloodingEngine::new();
        let outcome = engine.receive(&mut lsdb, lsp('A', 1, &[('I', 1.0)]), &make_id('I'), &neighbors_of_d());
        assert_eq!(
            outcome,
            FloodOutcome::Forward {
                targets: vec![make_id('C'), make_id('E'), make_id('F')]
            }
        );
    }

    #[test]
    fn test_second_copy_from_other_path_is_stale() {
        let mut lsdb = LinkStateDatabase::new(make_id('D'));
        let mut engine = FloodingEngine::new();
        let neighbors = neighbors_of_d();
        let packet = lsp('A', 1, &[('I', 1.0)]);

        assert!(engine.receive(&mut lsdb, packet.clone(), &make_id('I'), &neighbors).is_installed());
        let again = engine.receive(&mut lsdb, packet, &make_id('C'), &neighbors);
        assert_eq!(again, FloodOutcome::Stale);
        assert!(engine.has_flooded(&LspKey::new(make_id('A'), 1)));
    }

    #[test]
    fn test_corrupt_not_forwarded() {
        let mut lsdb = LinkStateDatabase::new(make_id('D'));
        let mut engine = FloodingEngine::new();
        let neighbors = neighbors_of_d();

        engine.receive(&mut lsdb, lsp('A', 5, &[('B', 7.0)]), &make_id('I'), &neighbors);
        let outcome = engine.receive(&mut lsdb, lsp('A', 5, &[('C', 7.0)]), &make_id('C'), &neighbors);
        assert!(matches!(outcome, FloodOutcome::Corrupt(PacketError::Corrupt { .. })));
    }

    #[test]
    fn test_superseded_keys_pruned() {
        let mut lsdb = LinkStateDatabase::new(make_id('D'));
        let mut engine = FloodingEngine::new();
        let neighbors = neighbors_of_d();

        for seq in 1..=5 {
            engine.receive(&mut lsdb, lsp('A', seq, &[]), &make_id('I'), &neighbors);
        }
        assert_eq!(engine.seen_len(), 1);
        assert!(engine.has_flooded(&LspKey::new(make_id('A'), 5)));
        assert!(!engine.has_flooded(&LspKey::new(make_id('A'), 4)));
    }

    #[test]
    fn test_forget_allows_reinstall_after_expiry() {
        let mut lsdb = LinkStateDatabase::new(make_id('D'));
        let mut engine = FloodingEngine::new();
        let neighbors = neighbors_of_d();
        let packet = lsp('A', 3, &[]);

        engine.receive(&mut lsdb, packet.clone(), &make_id('I'), &neighbors);
        lsdb.remove(&make_id('A'));
        engine.forget(&make_id('A'));

        let outcome = engine.receive(&mut lsdb, packet, &make_id('I'), &neighbors);
        assert!(matches!(outcome, FloodOutcome::Forward { .. }));
    }

    #[test]
    fn test_originate_targets_all_neighbors() {
        let mut lsdb = LinkStateDatabase::new(make_id('D'));
        let mut engine = FloodingEngine::new();
        let neighbors = neighbors_of_d();

        let outcome = engine.originate(&mut lsdb, lsp('D', 1, &[('I', 6.0)]), &neighbors);
        assert_eq!(
            outcome,
            FloodOutcome::Forward {
                targets: neighbors.ids()
            }
        );
        assert_eq!(lsdb.version(), 1);
    }
}
