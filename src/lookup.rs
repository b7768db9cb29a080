//! LookupManager / LookupObject: the iterative Kademlia `get_peers` lookup
//! state machine (spec.md §3 `LookupObject`, §4.3).
//!
//! The spec treats the lookup algorithm's internals as an external
//! collaborator contract; this module gives it one complete, testable
//! implementation: α parallel probes per round, converging when no closer
//! unqueried candidate remains and every in-flight query has settled.

use crate::identifier::{InfoHash, NodeId};
use crate::message::{MessageBody, Query, ResponseValues};
use crate::node::{Node, Peer};
use crate::querier::{LookupToken, OutgoingQuery};
use std::collections::HashSet;

/// Caller-supplied opaque token identifying one `get_peers` call, threaded
/// back through every callback invocation for that lookup.
pub type LookupId = i64;

/// `callback(lookup_id, peers, source_node)` — invoked zero or more times
/// with non-empty peer batches, and exactly once, last, with
/// `peers = None` to signal completion (spec.md §4.1.2, §5).
pub type LookupCallback = Box<dyn FnMut(LookupId, Option<Vec<Peer>>, Option<Node>) + Send>;

/// Reserved lookup id for routing-table-maintenance lookups. Callers of
/// `Controller::get_peers` must not use this value.
pub const MAINTENANCE_LOOKUP_ID: LookupId = LookupId::MIN;

struct Candidate {
    node: Node,
}

/// State machine of one iterative `get_peers` lookup.
pub struct LookupObject {
    pub lookup_id: LookupId,
    pub info_hash: InfoHash,
    pub callback: LookupCallback,
    bt_port: u16,
    /// Maintenance lookups refresh the routing table only; they never
    /// announce and use a no-op callback.
    is_maintenance: bool,
    local_id: NodeId,
    alpha: usize,
    k: usize,
    /// Known-but-unqueried nodes, closest-first.
    frontier: Vec<Candidate>,
    queried: HashSet<NodeId>,
    /// Nodes that answered `get_peers`, with the token to use if we later
    /// announce to them, closest-first.
    responded: Vec<(Node, Option<Vec<u8>>)>,
    in_flight: usize,
    done: bool,
}

impl LookupObject {
    #[allow(clippy::too_many_arguments)]
    fn new(
        lookup_id: LookupId,
        info_hash: InfoHash,
        callback: LookupCallback,
        bt_port: u16,
        is_maintenance: bool,
        local_id: NodeId,
        alpha: usize,
        k: usize,
    ) -> Self {
        LookupObject {
            lookup_id,
            info_hash,
            callback,
            bt_port,
            is_maintenance,
            local_id,
            alpha,
            k,
            frontier: Vec::new(),
            queried: HashSet::new(),
            responded: Vec::new(),
            in_flight: 0,
            done: false,
        }
    }

    fn offer(&mut self, node: Node) {
        if node.id == self.local_id || self.queried.contains(&node.id) {
            return;
        }
        if self.frontier.iter().any(|c| c.node.id == node.id) {
            return;
        }
        self.frontier.push(Candidate { node });
        let target = self.info_hash;
        self.frontier
            .sort_by_key(|c| target.distance(&c.node.id));
    }

    fn query_more(&mut self) -> Vec<OutgoingQuery> {
        let mut out = Vec::new();
        while self.in_flight < self.alpha && !self.frontier.is_empty() {
            let candidate = self.frontier.remove(0);
            self.queried.insert(candidate.node.id);
            self.in_flight += 1;
            out.push(OutgoingQuery {
                dst: candidate.node,
                query: Query::GetPeers { info_hash: self.info_hash },
                timeout: None,
                lookup_id: Some(self.lookup_id as LookupToken),
            });
        }
        out
    }

    fn settle(&mut self) -> bool {
        if self.in_flight == 0 && self.frontier.is_empty() {
            self.done = true;
        }
        self.done
    }

    /// Seed the lookup with the closest known nodes and issue the first
    /// round of queries. Falls back to bootstrap contacts when `seed_rnodes`
    /// is empty (spec.md §4.1.2: "If that seed is empty, the lookup falls
    /// back to the overlay bootstrapper").
    pub fn start(&mut self, seed_rnodes: Vec<Node>, bootstrap_fallback: Vec<Node>) -> Vec<OutgoingQuery> {
        let seed = if seed_rnodes.is_empty() { bootstrap_fallback } else { seed_rnodes };
        for n in seed {
            self.offer(n);
        }
        self.query_more()
    }

    /// Feed a RESPONSE for this lookup. Returns new queries to dispatch,
    /// any peers discovered in this response, the updated in-flight count,
    /// and whether the lookup is now done.
    pub fn on_response_received(
        &mut self,
        body: &ResponseValues,
        src: &Node,
    ) -> (Vec<OutgoingQuery>, Vec<Peer>, usize, bool) {
        self.in_flight = self.in_flight.saturating_sub(1);
        for n in &body.nodes {
            self.offer(n.clone());
        }
        self.responded.push((src.clone(), body.token.clone()));
        self.responded
            .sort_by_key(|(n, _)| self.info_hash.distance(&n.id));
        self.responded.truncate(self.k.max(1) * 2);

        let peers = body.values.clone();
        let queries = self.query_more();
        let done = self.settle();
        (queries, peers, self.in_flight, done)
    }

    /// Feed an ERROR for this lookup. Error responses never carry peers.
    pub fn on_error_received(&mut self, _body: &MessageBody) -> (Vec<OutgoingQuery>, usize, bool) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let queries = self.query_more();
        let done = self.settle();
        (queries, self.in_flight, done)
    }

    /// Feed a timeout against `dst`.
    pub fn on_timeout(&mut self, _dst: &Node) -> (Vec<OutgoingQuery>, usize, bool) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let queries = self.query_more();
        let done = self.settle();
        (queries, self.in_flight, done)
    }

    /// Emit `announce_peer` to the closest `k` responded nodes, carrying the
    /// local BT port. The second return value, `announce_to_myself`, is
    /// computed but intentionally not acted upon by the Controller — see
    /// SPEC_FULL.md Open Question 1.
    pub fn announce(&self) -> (Vec<OutgoingQuery>, bool) {
        if self.is_maintenance {
            return (Vec::new(), false);
        }
        let mut queries = Vec::new();
        let mut announce_to_myself = false;
        for (node, token) in self.responded.iter().take(self.k) {
            if node.id == self.local_id {
                announce_to_myself = true;
                continue;
            }
            let Some(token) = token.clone() else { continue };
            queries.push(OutgoingQuery {
                dst: node.clone(),
                query: Query::AnnouncePeer {
                    info_hash: self.info_hash,
                    port: self.bt_port,
                    token,
                    implied_port: false,
                },
                timeout: None,
                lookup_id: Some(self.lookup_id as LookupToken),
            });
        }
        (queries, announce_to_myself)
    }
}

/// Constructs `LookupObject`s bound to this node's identity and the
/// configured α/k parallelism (spec.md §4.3).
pub struct LookupManager {
    local_id: NodeId,
    alpha: usize,
    k: usize,
}

impl LookupManager {
    pub fn new(local_id: NodeId, alpha: usize, k: usize) -> Self {
        LookupManager { local_id, alpha, k }
    }

    pub fn get_peers(
        &self,
        lookup_id: LookupId,
        info_hash: InfoHash,
        callback: LookupCallback,
        bt_port: u16,
    ) -> LookupObject {
        LookupObject::new(lookup_id, info_hash, callback, bt_port, false, self.local_id, self.alpha, self.k)
    }

    /// A routing-table-maintenance-driven lookup: refreshes a sparse
    /// bucket, never announces, uses a no-op callback. Uses the reserved
    /// `i64::MIN` lookup id so the Controller can tell maintenance queries
    /// apart from caller-driven ones sharing the same correlation field.
    pub fn maintenance_lookup(&self, target: InfoHash) -> LookupObject {
        LookupObject::new(
            MAINTENANCE_LOOKUP_ID,
            target,
            Box::new(|_, _, _| {}),
            0,
            true,
            self.local_id,
            self.alpha,
            self.k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn node(port: u16) -> Node {
        Node::new(format!("127.0.0.1:{}", port).parse().unwrap(), NodeId::random())
    }

    #[test]
    fn start_with_empty_seed_falls_back_to_bootstrap_nodes() {
        let lm = LookupManager::new(NodeId::random(), 3, 8);
        let mut lo = lm.get_peers(1, NodeId::random(), Box::new(|_, _, _| {}), 6881);
        let fallback = vec![node(7001)];
        let queries = lo.start(vec![], fallback.clone());
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].dst.addr, fallback[0].addr);
    }

    #[test]
    fn response_with_peers_is_surfaced_and_lookup_completes_without_more_candidates() {
        let lm = LookupManager::new(NodeId::random(), 3, 8);
        let mut lo = lm.get_peers(2, NodeId::random(), Box::new(|_, _, _| {}), 6881);
        let seed = node(7002);
        lo.start(vec![seed.clone()], vec![]);

        let peer: Peer = "9.9.9.9:6881".parse().unwrap();
        let body = ResponseValues {
            nodes: vec![],
            values: vec![peer],
            token: Some(b"tok".to_vec()),
        };
        let (queries, peers, in_flight, done) = lo.on_response_received(&body, &seed);
        assert!(queries.is_empty());
        assert_eq!(peers, vec![peer]);
        assert_eq!(in_flight, 0);
        assert!(done);
    }

    #[test]
    fn timeout_with_no_remaining_candidates_completes_the_lookup() {
        let lm = LookupManager::new(NodeId::random(), 3, 8);
        let mut lo = lm.get_peers(3, NodeId::random(), Box::new(|_, _, _| {}), 6881);
        let seed = node(7003);
        lo.start(vec![seed.clone()], vec![]);
        let (_, in_flight, done) = lo.on_timeout(&seed);
        assert_eq!(in_flight, 0);
        assert!(done);
    }

    #[test]
    fn callback_receives_completion_exactly_once_as_last_call() {
        let log: Arc<Mutex<Vec<(LookupId, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        let callback: LookupCallback = Box::new(move |id, peers, _src| {
            log2.lock().unwrap().push((id, peers.is_none()));
        });
        let lm = LookupManager::new(NodeId::random(), 3, 8);
        let mut lo = lm.get_peers(42, NodeId::random(), callback, 6881);
        let seed = node(7004);
        lo.start(vec![seed.clone()], vec![]);
        let body = ResponseValues { nodes: vec![], values: vec![], token: None };
        let (_, _peers, _in_flight, done) = lo.on_response_received(&body, &seed);
        assert!(done);
        (lo.callback)(lo.lookup_id, None, None);

        let calls = log.lock().unwrap();
        assert_eq!(calls.last(), Some(&(42, true)));
    }

    #[test]
    fn announce_targets_closest_responded_nodes_with_their_token() {
        let lm = LookupManager::new(NodeId::random(), 3, 8);
        let mut lo = lm.get_peers(9, NodeId::random(), Box::new(|_, _, _| {}), 6881);
        let seed = node(7005);
        lo.start(vec![seed.clone()], vec![]);
        let body = ResponseValues { nodes: vec![], values: vec![], token: Some(b"abc".to_vec()) };
        lo.on_response_received(&body, &seed);

        let (queries, _announce_to_myself) = lo.announce();
        assert_eq!(queries.len(), 1);
        match &queries[0].query {
            Query::AnnouncePeer { token, .. } => assert_eq!(token, b"abc"),
            other => panic!("expected announce_peer, got {:?}", other),
        }
    }

    #[test]
    fn maintenance_lookup_never_announces() {
        let lm = LookupManager::new(NodeId::random(), 3, 8);
        let mut lo = lm.maintenance_lookup(NodeId::random());
        let seed = node(7006);
        lo.start(vec![seed.clone()], vec![]);
        let body = ResponseValues { nodes: vec![], values: vec![], token: Some(b"abc".to_vec()) };
        lo.on_response_received(&body, &seed);
        let (queries, _) = lo.announce();
        assert!(queries.is_empty());
    }
}
