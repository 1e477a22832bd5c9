//! Background tasks feeding the node event loop
//!
//! Handles:
//! - Periodic timers (refresh, age tick, retransmission poll)
//! - Receiving frames from the transport
//! - Per-neighbor send queues, so a slow neighbor never blocks the others
//!
//! Every task turns what it observes into a [`NodeCommand`] on the event
//! loop's channel and stops on the shutdown broadcast.

use std::sync::Arc;
use std::time::Duration;

use linkstate_core::{PeerIdentity, Transport, TransportError};
use linkstate_routing::NeighborChange;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{Instrument, Span, debug, info, warn};

use crate::error::NodeResult;

/// Work for the event loop, the single writer of node state
#[derive(Debug)]
pub enum NodeCommand<I: PeerIdentity> {
    /// A frame arrived from `from`
    Frame { from: I, frame: Vec<u8> },
    /// Operator neighbor change, answered with whether anything changed
    ChangeNeighbor {
        change: NeighborChange<I>,
        reply: oneshot::Sender<NodeResult<bool>>,
    },
    /// Periodic self-advertisement
    Refresh,
    /// One age tick elapsed
    AgeTick,
    /// Check for overdue acknowledgments
    Retransmit,
    /// A neighbor send task could not deliver a frame
    SendFailed { peer: I },
}

/// Which periodic command a timer produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Refresh,
    AgeTick,
    Retransmit,
}

impl TimerKind {
    fn command<I: PeerIdentity>(self) -> NodeCommand<I> {
        match self {
            Self::Refresh => NodeCommand::Refresh,
            Self::AgeTick => NodeCommand::AgeTick,
            Self::Retransmit => NodeCommand::Retransmit,
        }
    }
}

/// Spawn a timer that sends `kind` every `period`
///
/// The first command fires one full period after spawning.
pub fn spawn_timer<I: PeerIdentity>(
    kind: TimerKind,
    period: Duration,
    commands: mpsc::Sender<NodeCommand<I>>,
    mut shutdown_rx: broadcast::Receiver<()>,
    span: Span,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            let mut interval = interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(timer = ?kind, period_ms = period.as_millis() as u64, "timer started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        if commands.send(kind.command()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(timer = ?kind, "timer stopped");
        }
        .instrument(span),
    )
}

/// Spawn the task forwarding inbound frames to the event loop
pub fn spawn_receiver<I, T>(
    transport: Arc<T>,
    commands: mpsc::Sender<NodeCommand<I>>,
    mut shutdown_rx: broadcast::Receiver<()>,
    span: Span,
) -> JoinHandle<()>
where
    I: PeerIdentity,
    T: Transport<I> + 'static,
{
    tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    received = transport.recv() => match received {
                        Ok((from, frame)) => {
                            if commands.send(NodeCommand::Frame { from, frame }).await.is_err() {
                                break;
                            }
                        }
                        Err(TransportError::ConnectionClosed) => {
                            info!("transport closed, receiver stopping");
                            break;
                        }
                        Err(e) => warn!(error = %e, "receive failed"),
                    }
                }
            }
        }
        .instrument(span),
    )
}

/// Handle to one neighbor's send queue
pub struct NeighborSender {
    queue: mpsc::Sender<Vec<u8>>,
}

impl NeighborSender {
    /// Spawn a send task for `peer` with a queue of `capacity` frames
    pub fn spawn<I, T>(
        peer: I,
        capacity: usize,
        transport: Arc<T>,
        commands: mpsc::Sender<NodeCommand<I>>,
        mut shutdown_rx: broadcast::Receiver<()>,
        span: Span,
    ) -> Self
    where
        I: PeerIdentity,
        T: Transport<I> + 'static,
    {
        let (queue, mut frames) = mpsc::channel::<Vec<u8>>(capacity);

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        frame = frames.recv() => {
                            let Some(frame) = frame else { break };
                            if let Err(e) = transport.send(&peer, frame).await {
                                debug!(peer = %peer, error = %e, "send failed");
                                // Never block on the event loop from here
                                let _ = commands.try_send(NodeCommand::SendFailed { peer: peer.clone() });
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );

        Self { queue }
    }

    /// Queue a frame without waiting; returns false if the queue is full or closed
    pub fn try_send(&self, frame: Vec<u8>) -> bool {
        self.queue.try_send(frame).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkstate_core::{MockNetwork, SimulationIdentity};

    fn make_id(c: char) -> SimulationIdentity {
        SimulationIdentity::new(c).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_one_period_and_stops() {
        let (tx, mut rx) = mpsc::channel::<NodeCommand<SimulationIdentity>>(8);
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = spawn_timer(
            TimerKind::AgeTick,
            Duration::from_millis(100),
            tx,
            shutdown_tx.subscribe(),
            Span::none(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(rx.recv().await, Some(NodeCommand::AgeTick)));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_receiver_and_sender_move_frames() {
        let (a, b) = (make_id('A'), make_id('B'));
        let network = MockNetwork::from_links(&[a, b], &[(a, b)]);
        let (shutdown_tx, _) = broadcast::channel(1);

        let (a_tx, _a_rx) = mpsc::channel(8);
        let sender = NeighborSender::spawn(
            b,
            4,
            network.get(&a).unwrap(),
            a_tx,
            shutdown_tx.subscribe(),
            Span::none(),
        );

        let (b_tx, mut b_rx) = mpsc::channel(8);
        let receiver = spawn_receiver(network.get(&b).unwrap(), b_tx, shutdown_tx.subscribe(), Span::none());

        assert!(sender.try_send(b"frame".to_vec()));
        match b_rx.recv().await {
            Some(NodeCommand::Frame { from, frame }) => {
                assert_eq!(from, a);
                assert_eq!(frame, b"frame");
            }
            other => panic!("unexpected command: {:?}", other),
        }

        shutdown_tx.send(()).unwrap();
        receiver.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_reported_to_event_loop() {
        let (a, b) = (make_id('A'), make_id('B'));
        // No link between A and B
        let network = MockNetwork::from_links(&[a, b], &[]);
        let (shutdown_tx, _) = broadcast::channel(1);
        let (tx, mut rx) = mpsc::channel(8);

        let sender = NeighborSender::spawn(b, 4, network.get(&a).unwrap(), tx, shutdown_tx.subscribe(), Span::none());
        assert!(sender.try_send(b"frame".to_vec()));

        assert!(matches!(rx.recv().await, Some(NodeCommand::SendFailed { peer }) if peer == b));
    }
}
