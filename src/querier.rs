//! Querier: transaction-id allocation, timeout tracking, and response/error
//! correlation (spec.md §4.2).

use crate::message::{Datagram, Message, MessageBody, MessageFactory, Query};
use crate::node::Node;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// An opaque query request emitted by a collaborator, not yet addressed to
/// a transaction id.
#[derive(Debug, Clone)]
pub struct OutgoingQuery {
    pub dst: Node,
    pub query: Query,
    /// `None` uses the Querier's default timeout (spec.md §4.2: 2s default).
    pub timeout: Option<Duration>,
    /// The lookup this query is bound to, if any (opaque to the Querier).
    pub lookup_id: Option<LookupToken>,
}

/// Opaque handle correlating an `OutgoingQuery`/`OutstandingQuery` back to
/// the `LookupObject` that emitted it. The Querier never inspects this; it
/// only stores and returns it.
pub type LookupToken = u64;

/// Created when a query is dispatched; destroyed on response, error, or
/// timeout (spec.md §3 `OutstandingQuery`).
#[derive(Debug, Clone)]
pub struct OutstandingQuery {
    pub dst: Node,
    pub query: Query,
    pub tid: Vec<u8>,
    pub sent_at: Instant,
    pub deadline: Instant,
    pub lookup_id: Option<LookupToken>,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Tracks every in-flight query and correlates inbound responses/errors
/// against it.
pub struct Querier {
    msg_factory: MessageFactory,
    outstanding: HashMap<(SocketAddr, Vec<u8>), OutstandingQuery>,
    next_tid: u64,
    default_timeout: Duration,
}

impl Querier {
    pub fn new(msg_factory: MessageFactory) -> Self {
        Querier::with_timeout(msg_factory, DEFAULT_TIMEOUT)
    }

    /// Construct with a configured default per-query timeout (spec.md §4.2:
    /// "default 2 s", overridable per deployment via `Config::query_timeout`).
    pub fn with_timeout(msg_factory: MessageFactory, default_timeout: Duration) -> Self {
        Querier {
            msg_factory,
            outstanding: HashMap::new(),
            next_tid: 0,
            default_timeout,
        }
    }

    /// Allocate transaction ids, serialize, and track each query.
    ///
    /// Returns the earliest outstanding deadline and the datagrams to send,
    /// in the order the queries were supplied (spec.md §5 ordering
    /// guarantee).
    pub fn register(&mut self, now: Instant, queries: Vec<OutgoingQuery>) -> (Instant, Vec<Datagram>) {
        let mut datagrams = Vec::with_capacity(queries.len());
        for q in queries {
            let tid = self.allocate_tid(&q.dst.addr);
            let timeout = q.timeout.unwrap_or(self.default_timeout);
            let datagram = self.msg_factory.build_query(&tid, &q.query);
            let datagram = self.msg_factory.address(datagram, q.dst.addr);
            self.outstanding.insert(
                (q.dst.addr, tid.clone()),
                OutstandingQuery {
                    dst: q.dst.clone(),
                    query: q.query.clone(),
                    tid,
                    sent_at: now,
                    deadline: now + timeout,
                    lookup_id: q.lookup_id,
                },
            );
            datagrams.push(datagram);
        }
        (self.next_timeout(now), datagrams)
    }

    /// Transaction ids are unique among outstanding queries to the same
    /// destination (spec.md §3 invariant on `OutstandingQuery`).
    fn allocate_tid(&mut self, dst: &SocketAddr) -> Vec<u8> {
        loop {
            self.next_tid = self.next_tid.wrapping_add(1);
            let candidate = self.next_tid.to_be_bytes().to_vec();
            if !self.outstanding.contains_key(&(*dst, candidate.clone())) {
                return candidate;
            }
        }
    }

    /// Match a response/error by `(source address, transaction id)`. On
    /// match, remove and return the record — an expired record is never
    /// correlated because `expire` already removed it.
    pub fn correlate(&mut self, message: &Message) -> Option<OutstandingQuery> {
        debug_assert!(!matches!(message.body, MessageBody::Query(_)));
        self.outstanding
            .remove(&(message.src_node.addr, message.tid.clone()))
    }

    /// Remove and return all records whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> (Instant, Vec<OutstandingQuery>) {
        let mut expired = Vec::new();
        let keys: Vec<_> = self
            .outstanding
            .iter()
            .filter(|(_, oq)| oq.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            if let Some(oq) = self.outstanding.remove(&key) {
                expired.push(oq);
            }
        }
        (self.next_timeout(now), expired)
    }

    fn next_timeout(&self, now: Instant) -> Instant {
        self.outstanding
            .values()
            .map(|oq| oq.deadline)
            .min()
            .unwrap_or(now + Duration::from_secs(1))
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::NodeId;

    fn make_querier() -> Querier {
        Querier::new(MessageFactory::new("RS01", NodeId::random(), None))
    }

    fn node(port: u16) -> Node {
        Node::new(format!("127.0.0.1:{}", port).parse().unwrap(), NodeId::random())
    }

    #[test]
    fn register_then_correlate_round_trips() {
        let mut q = make_querier();
        let now = Instant::now();
        let dst = node(6001);
        let (_, datagrams) = q.register(
            now,
            vec![OutgoingQuery {
                dst: dst.clone(),
                query: Query::Ping,
                timeout: None,
                lookup_id: None,
            }],
        );
        assert_eq!(datagrams.len(), 1);
        assert_eq!(q.outstanding_count(), 1);

        let factory = MessageFactory::new("RS01", NodeId::random(), None);
        let response = crate::message::ResponseValues::default();
        let mut reply = factory.build_response(&datagrams[0].data_tid(), dst.addr, &response);
        reply.addr = dst.addr;
        let decoded = factory.incoming(&reply).unwrap();

        let matched = q.correlate(&decoded);
        assert!(matched.is_some());
        assert_eq!(q.outstanding_count(), 0);
    }

    #[test]
    fn unmatched_response_is_not_correlated() {
        let mut q = make_querier();
        let factory = MessageFactory::new("RS01", NodeId::random(), None);
        let response = crate::message::ResponseValues::default();
        let reply = factory.build_response(b"zz", "127.0.0.1:1234".parse().unwrap(), &response);
        let decoded = factory.incoming(&reply).unwrap();
        assert!(q.correlate(&decoded).is_none());
    }

    #[test]
    fn expired_query_is_removed_and_never_correlates_again() {
        let mut q = make_querier();
        let now = Instant::now();
        let dst = node(6002);
        q.register(
            now,
            vec![OutgoingQuery {
                dst: dst.clone(),
                query: Query::Ping,
                timeout: Some(Duration::from_millis(1)),
                lookup_id: None,
            }],
        );
        let later = now + Duration::from_secs(1);
        let (_, expired) = q.expire(later);
        assert_eq!(expired.len(), 1);
        assert_eq!(q.outstanding_count(), 0);
    }

    #[test]
    fn transaction_ids_are_not_reused_while_live() {
        let mut q = make_querier();
        let now = Instant::now();
        let dst = node(6003);
        let (_, d1) = q.register(
            now,
            vec![OutgoingQuery {
                dst: dst.clone(),
                query: Query::Ping,
                timeout: None,
                lookup_id: None,
            }],
        );
        let (_, d2) = q.register(
            now,
            vec![OutgoingQuery {
                dst,
                query: Query::Ping,
                timeout: None,
                lookup_id: None,
            }],
        );
        assert_ne!(d1[0].data_tid(), d2[0].data_tid());
    }
}
