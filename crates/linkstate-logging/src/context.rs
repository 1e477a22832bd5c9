//! Per-node logging context
//!
//! The lockstep simulator runs every node on one thread, so the node a log
//! line belongs to cannot come from the task. A [`NodeContextGuard`] marks
//! which node is being driven; spans opened under it carry that node.

use std::cell::RefCell;

use linkstate_core::PeerIdentity;
use tracing::{Span, info_span};
use uuid::Uuid;

/// Context recorded for the node currently being driven
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// Node identity as a short string
    pub node_id: String,
    /// Simulation run this node belongs to
    pub run_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard setting the current node for this thread
///
/// Dropping the guard restores whatever context was active before, so
/// guards nest.
///
/// ```ignore
/// let _guard = NodeContextGuard::new(&node_a, run_id);
/// tracing::info!("installing advertisement"); // spans opened here carry node A
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Enter the context of `identity` within run `run_id`
    pub fn new<I: PeerIdentity>(identity: &I, run_id: Uuid) -> Self {
        let data = NodeContextData {
            node_id: identity.short_id(),
            run_id,
        };
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Current node context, if any
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Current node id, if any
    pub fn current_node_id() -> Option<String> {
        Self::current().map(|ctx| ctx.node_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Span for work done on behalf of `identity`
///
/// Matches the span the async node runtime opens, so lockstep and
/// runtime logs filter the same way.
pub fn node_span<I: PeerIdentity>(identity: &I, run_id: Uuid) -> Span {
    info_span!("node", node_id = %identity.short_id(), run_id = %run_id)
}

/// Run `$body` with `$identity` as the current node
#[macro_export]
macro_rules! with_node_context {
    ($identity:expr, $run_id:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($identity, $run_id);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkstate_core::SimulationIdentity;

    #[test]
    fn test_guard_sets_and_clears_context() {
        assert!(NodeContextGuard::current().is_none());

        let node = SimulationIdentity::new('A').unwrap();
        let run = Uuid::new_v4();
        {
            let _guard = NodeContextGuard::new(&node, run);
            let ctx = NodeContextGuard::current().unwrap();
            assert_eq!(ctx.node_id, "A");
            assert_eq!(ctx.run_id, run);
        }

        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_guards_restore_outer_node() {
        let a = SimulationIdentity::new('A').unwrap();
        let b = SimulationIdentity::new('B').unwrap();
        let run = Uuid::new_v4();

        {
            let _outer = NodeContextGuard::new(&a, run);
            {
                let _inner = NodeContextGuard::new(&b, run);
                assert_eq!(NodeContextGuard::current_node_id().as_deref(), Some("B"));
            }
            assert_eq!(NodeContextGuard::current_node_id().as_deref(), Some("A"));
        }
        assert!(NodeContextGuard::current_node_id().is_none());
    }

    #[test]
    fn test_macro_scopes_context() {
        let node = SimulationIdentity::new('H').unwrap();
        let seen = crate::with_node_context!(&node, Uuid::nil(), {
            NodeContextGuard::current_node_id()
        });
        assert_eq!(seen.as_deref(), Some("H"));
        assert!(NodeContextGuard::current().is_none());
    }
}
