//! The experimental measurement hook (spec.md §3, §4.3): an observer the
//! Controller notifies on every lifecycle event. SPEC_FULL's Non-goals
//! exclude the measurement logic itself; this trait gives the hook a real,
//! no-op-by-default shape so the Controller's timeout path has something
//! concrete to route queries through instead of an undefined variable
//! (REDESIGN FLAGS note 3).

use crate::message::{MessageBody, Query};
use crate::node::Node;
use crate::querier::OutgoingQuery;

/// Notified of every query/response/error/timeout/stop the Controller
/// processes. Default methods are no-ops; a measurement plug-in overrides
/// whichever hooks it needs.
pub trait ExperimentalManager: Send {
    fn on_query_received(&mut self, _src: &Node, _query: &Query) -> Vec<OutgoingQuery> {
        Vec::new()
    }

    fn on_response_received(&mut self, _src: &Node, _body: &MessageBody) -> Vec<OutgoingQuery> {
        Vec::new()
    }

    fn on_error_received(&mut self, _src: &Node) -> Vec<OutgoingQuery> {
        Vec::new()
    }

    fn on_timeout(&mut self, _dst: &Node) -> Vec<OutgoingQuery> {
        Vec::new()
    }

    fn on_stop(&mut self) {}
}

/// The default manager: observes nothing, emits nothing.
pub struct NullExperimentalManager;

impl ExperimentalManager for NullExperimentalManager {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::NodeId;

    #[test]
    fn default_hooks_emit_no_queries() {
        let mut mgr = NullExperimentalManager;
        let node = Node::new("127.0.0.1:6881".parse().unwrap(), NodeId::random());
        assert!(mgr.on_query_received(&node, &Query::Ping).is_empty());
        assert!(mgr.on_error_received(&node).is_empty());
        assert!(mgr.on_timeout(&node).is_empty());
        mgr.on_stop();
    }
}
