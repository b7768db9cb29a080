//! The Controller: the single-threaded reactor-facing coordination kernel
//! (spec.md §1, §4.1). Exposes exactly two entry points driven by the
//! reactor — `tick` and `on_datagram` — plus `get_peers` for callers that
//! want to start a lookup, and `on_stop` for orderly shutdown. No internal
//! concurrency, no suspension points: every call runs to completion
//! synchronously against `&mut self`.

use crate::bootstrap::OverlayBootstrapper;
use crate::cache::PeerCache;
use crate::config::Config;
use crate::error::DhtResult;
use crate::experimental::{ExperimentalManager, NullExperimentalManager};
use crate::identifier::{InfoHash, NodeId};
use crate::lookup::{LookupCallback, LookupId, LookupManager, LookupObject, MAINTENANCE_LOOKUP_ID};
use crate::message::{Datagram, Message, MessageBody, MessageFactory, Query, ResponseValues};
use crate::node::{Node, Peer};
use crate::querier::{OutgoingQuery, OutstandingQuery, Querier};
use crate::responder::Responder;
use crate::routing::RoutingManager;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

const VERSION_LABEL: &str = "RS01";
const MAINTENANCE_TOKEN: u64 = MAINTENANCE_LOOKUP_ID as u64;

pub struct Controller {
    local_node: Node,
    msg_factory: MessageFactory,
    querier: Querier,
    routing: RoutingManager,
    responder: Responder,
    lookup_manager: LookupManager,
    bootstrapper: OverlayBootstrapper,
    experimental: Box<dyn ExperimentalManager>,
    cache: PeerCache,
    lookups: HashMap<u64, LookupObject>,
    maintenance_lookup: Option<LookupObject>,
    next_tick_ts: Instant,
    next_maintenance_at: Instant,
}

impl Controller {
    /// Construct a Controller from configuration (spec.md §4.1.1): pick or
    /// accept a local id, bind the message factory, load the bootstrap
    /// snapshot, and arm the first maintenance sweep.
    pub fn new(config: &Config, node_id: Option<NodeId>, bootstrap_mode: bool) -> DhtResult<Self> {
        let local_id = node_id.unwrap_or_else(NodeId::random);
        let local_addr: SocketAddr = format!("0.0.0.0:{}", config.network.listen_port)
            .parse()
            .expect("listen port always yields a valid socket address");
        let local_node = Node::new(local_addr, local_id);

        let msg_factory = MessageFactory::new(
            VERSION_LABEL,
            local_id,
            config.network.private_overlay_name.clone(),
        );
        let querier = Querier::with_timeout(msg_factory.clone(), config.query_timeout());
        let routing = RoutingManager::new(
            local_node.clone(),
            config.routing.bucket_size,
            std::time::Duration::from_secs(config.routing.maintenance_interval_secs),
        );
        let responder = Responder::new(local_id, bootstrap_mode);
        let lookup_manager = LookupManager::new(local_id, config.lookup.alpha, config.lookup.k);
        let bootstrapper = OverlayBootstrapper::load(config.network.bootstrap_file.clone())?;
        let cache = PeerCache::new(config.cache_window());
        let now = Instant::now();

        Ok(Controller {
            local_node,
            msg_factory,
            querier,
            routing,
            responder,
            lookup_manager,
            bootstrapper,
            experimental: Box::new(NullExperimentalManager),
            cache,
            lookups: HashMap::new(),
            maintenance_lookup: None,
            next_tick_ts: now,
            next_maintenance_at: now + std::time::Duration::from_secs(config.routing.maintenance_interval_secs),
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.local_node.id
    }

    /// Swap in a measurement plug-in. Defaults to a no-op manager.
    pub fn set_experimental_manager(&mut self, manager: Box<dyn ExperimentalManager>) {
        self.experimental = manager;
    }

    /// Start (or short-circuit) an iterative `get_peers` lookup (spec.md
    /// §4.1.2). When `use_cache` is set and a fresh cached result exists,
    /// the callback fires with the cached peers followed immediately by
    /// completion and no network traffic is generated (scenario S1).
    pub fn get_peers(
        &mut self,
        lookup_id: LookupId,
        info_hash: InfoHash,
        mut callback: LookupCallback,
        bt_port: u16,
        use_cache: bool,
    ) -> Vec<Datagram> {
        let now = Instant::now();
        if use_cache {
            if let Some(peers) = self.cache.lookup(now, info_hash) {
                tracing::debug!(lookup_id, "get_peers served from cache");
                callback(lookup_id, Some(peers), None);
                callback(lookup_id, None, None);
                return Vec::new();
            }
        }

        let mut lookup = self.lookup_manager.get_peers(lookup_id, info_hash, callback, bt_port);

        // Spec.md §4.1.2: peers already tracked locally (from inbound
        // `announce_peer`) are surfaced immediately, merged into the cache,
        // but do not by themselves signal completion — the lookup still runs.
        if let Some(known) = self.responder.tracker.get(&info_hash) {
            if !known.is_empty() {
                self.cache.insert(now, info_hash, known.clone());
                (lookup.callback)(lookup.lookup_id, Some(known), None);
            }
        }

        // A bootstrap-only node answers queries but starts no lookups of its
        // own (original_source's Responder.bootstrap_mode, carried into the
        // Controller since nothing else observes the flag — see DESIGN.md).
        if self.responder.bootstrap_mode() {
            tracing::debug!(lookup_id, "bootstrap-mode node does not start its own lookups");
            (lookup.callback)(lookup.lookup_id, None, None);
            return Vec::new();
        }

        // original_source seeds with `get_closest_rnodes(distance.log, 0, True)`
        // (the whole bucket, self included). `count = 0` is carried here for
        // the "full bucket" part, but `include_myself` is kept `false`: our
        // `get_closest_rnodes` unconditionally appends the local node when set,
        // which would make this seed non-empty even with zero known contacts
        // and silently skip the bootstrap fallback `LookupObject::start` relies
        // on an empty seed for (spec.md §4.1.2). Self is filtered back out by
        // `LookupObject::offer` regardless, so omitting it here changes nothing
        // except preserving that fallback.
        let seed = self.routing.get_closest_rnodes(
            self.local_node.id.log_distance(&info_hash),
            0,
            false,
        );
        let queries = lookup.start(seed, self.bootstrapper.fallback_contacts());
        if queries.is_empty() {
            tracing::debug!(lookup_id, "get_peers has no candidates at all, completing immediately");
            (lookup.callback)(lookup.lookup_id, None, None);
            return Vec::new();
        }
        self.lookups.insert(lookup_id as u64, lookup);
        let (_, datagrams) = self.querier.register(now, queries);
        datagrams
    }

    /// Timeout sweep plus routing-table maintenance sweep (spec.md §4.1,
    /// "tick"). Returns the next deadline the reactor should wake up at and
    /// any datagrams to send, in the order their triggering events were
    /// processed (spec.md §5 ordering guarantee).
    pub fn tick(&mut self, now: Instant) -> (Instant, Vec<Datagram>) {
        // Spec.md §4.1.3 step 1: rate-limit to once per second, floor for
        // later steps to lower.
        if now < self.next_tick_ts {
            return (self.next_tick_ts, Vec::new());
        }
        self.next_tick_ts = now + std::time::Duration::from_secs(1);

        let mut pending = Vec::new();

        let (_, expired) = self.querier.expire(now);
        for oq in expired {
            let queries = self.on_timeout(&oq);
            pending.extend(queries);
        }

        if now >= self.next_maintenance_at {
            let (interval, routing_queries, maintenance_target) = self.routing.do_maintenance();
            self.next_maintenance_at = now + interval;
            pending.extend(routing_queries);

            if let Some((target, seed)) = maintenance_target {
                let mut lookup = self.lookup_manager.maintenance_lookup(target);
                let queries = lookup.start(seed, self.bootstrapper.fallback_contacts());
                if !queries.is_empty() {
                    self.maintenance_lookup = Some(lookup);
                    pending.extend(queries);
                }
            }
        }

        let (next_deadline, datagrams) = self.querier.register(now, pending);
        self.next_tick_ts = self.next_tick_ts.min(next_deadline).min(self.next_maintenance_at);
        (self.next_tick_ts, datagrams)
    }

    /// Routes an expired `OutstandingQuery` through the same accumulator
    /// `on_datagram`'s RESPONSE/ERROR arms use, instead of referencing query
    /// state that no longer exists (REDESIGN FLAGS note 3 / SPEC_FULL Open
    /// Question 3).
    fn on_timeout(&mut self, oq: &OutstandingQuery) -> Vec<OutgoingQuery> {
        let mut out = Vec::new();
        out.extend(self.routing.on_timeout(&oq.dst));
        out.extend(self.experimental.on_timeout(&oq.dst));
        if let Some(token) = oq.lookup_id {
            out.extend(self.feed_lookup_timeout(token, &oq.dst));
        }
        out
    }

    /// Handle one inbound UDP datagram (spec.md §4.1.4–§4.1.6). Malformed
    /// datagrams, responses/errors with no matching outstanding query, and
    /// datagrams that loop back from ourselves are all dropped silently
    /// (spec.md §7, scenarios S2/S3).
    pub fn on_datagram(&mut self, datagram: Datagram) -> Vec<Datagram> {
        let now = Instant::now();
        let Some(message) = self.msg_factory.incoming(&datagram) else {
            tracing::debug!(addr = %datagram.addr, "dropping undecodable datagram");
            return Vec::new();
        };
        if message.src_node.id == self.local_node.id {
            tracing::debug!(addr = %datagram.addr, "dropping self-addressed datagram");
            return Vec::new();
        }

        match &message.body {
            MessageBody::Query(query) => self.handle_query(&message, query, now),
            MessageBody::Response(body) => self.handle_response(&message, body, now),
            MessageBody::Error { .. } => self.handle_error(&message, now),
        }
    }

    fn handle_query(&mut self, message: &Message, query: &Query, now: Instant) -> Vec<Datagram> {
        let src = &message.src_node;
        let mut pending = self.routing.on_query_received(src, now);
        pending.extend(self.experimental.on_query_received(src, query));

        let mut datagrams = Vec::new();
        if let Some(response) = self.responder.get_response(query, src, &self.routing) {
            datagrams.push(self.msg_factory.build_response(&message.tid, src.addr, &response));
        }
        let (_, extra) = self.querier.register(now, pending);
        datagrams.extend(extra);
        datagrams
    }

    fn handle_response(&mut self, message: &Message, body: &ResponseValues, now: Instant) -> Vec<Datagram> {
        let Some(oq) = self.querier.correlate(message) else {
            tracing::debug!(addr = %message.src_node.addr, "dropping unmatched response");
            return Vec::new();
        };
        let rtt = now.saturating_duration_since(oq.sent_at);
        let mut pending = self.routing.on_response_received(&message.src_node, rtt, &body.nodes, now);
        pending.extend(self.experimental.on_response_received(&message.src_node, &message.body));

        if let Some(token) = oq.lookup_id {
            pending.extend(self.feed_lookup_response(token, body, &message.src_node, now));
        }

        let (_, datagrams) = self.querier.register(now, pending);
        datagrams
    }

    fn handle_error(&mut self, message: &Message, now: Instant) -> Vec<Datagram> {
        let Some(oq) = self.querier.correlate(message) else {
            tracing::debug!(addr = %message.src_node.addr, "dropping unmatched error");
            return Vec::new();
        };
        let mut pending = self.routing.on_error_received(message.src_node.addr);
        pending.extend(self.experimental.on_error_received(&message.src_node));

        if let Some(token) = oq.lookup_id {
            pending.extend(self.feed_lookup_error(token, &message.body, &message.src_node));
        }

        let (_, datagrams) = self.querier.register(now, pending);
        datagrams
    }

    fn feed_lookup_response(
        &mut self,
        token: u64,
        body: &ResponseValues,
        src: &Node,
        now: Instant,
    ) -> Vec<OutgoingQuery> {
        if token == MAINTENANCE_TOKEN {
            let Some(lookup) = self.maintenance_lookup.as_mut() else { return Vec::new() };
            let (queries, _peers, _in_flight, done) = lookup.on_response_received(body, src);
            if done {
                self.maintenance_lookup = None;
            }
            return queries;
        }

        let Some(lookup) = self.lookups.get_mut(&token) else { return Vec::new() };
        let (queries, peers, _in_flight, done) = lookup.on_response_received(body, src);
        if !peers.is_empty() {
            self.cache.insert(now, lookup.info_hash, peers.clone());
            (lookup.callback)(lookup.lookup_id, Some(peers), Some(src.clone()));
        }
        if done {
            return self.complete_lookup(token, queries, Some(src.clone()));
        }
        queries
    }

    fn feed_lookup_error(&mut self, token: u64, body: &MessageBody, src: &Node) -> Vec<OutgoingQuery> {
        if token == MAINTENANCE_TOKEN {
            let Some(lookup) = self.maintenance_lookup.as_mut() else { return Vec::new() };
            let (queries, _in_flight, done) = lookup.on_error_received(body);
            if done {
                self.maintenance_lookup = None;
            }
            return queries;
        }

        let Some(lookup) = self.lookups.get_mut(&token) else { return Vec::new() };
        let (queries, _in_flight, done) = lookup.on_error_received(body);
        if done {
            return self.complete_lookup(token, queries, Some(src.clone()));
        }
        queries
    }

    fn feed_lookup_timeout(&mut self, token: u64, dst: &Node) -> Vec<OutgoingQuery> {
        if token == MAINTENANCE_TOKEN {
            let Some(lookup) = self.maintenance_lookup.as_mut() else { return Vec::new() };
            let (queries, _in_flight, done) = lookup.on_timeout(dst);
            if done {
                self.maintenance_lookup = None;
            }
            return queries;
        }

        let Some(lookup) = self.lookups.get_mut(&token) else { return Vec::new() };
        let (queries, _in_flight, done) = lookup.on_timeout(dst);
        if done {
            return self.complete_lookup(token, queries, None);
        }
        queries
    }

    /// A lookup has converged: fire `announce_peer` at its closest
    /// responded nodes, then deliver the final `(None, source)` callback
    /// exactly once (spec.md §4.1.2 lifecycle, SPEC_FULL Open Questions 1
    /// and 2). `src` is the node whose RESPONSE/ERROR drove the lookup to
    /// completion, or `None` when a timeout did (spec.md §4.1.4–§4.1.5).
    fn complete_lookup(&mut self, token: u64, mut queries: Vec<OutgoingQuery>, src: Option<Node>) -> Vec<OutgoingQuery> {
        if let Some(mut lookup) = self.lookups.remove(&token) {
            let (announce_queries, announce_to_myself) = lookup.announce();
            if announce_to_myself {
                // Open Question 1: computed but never acted on — see SPEC_FULL.md.
                tracing::debug!(lookup_id = lookup.lookup_id, "announce_to_myself suppressed");
            }
            queries.extend(announce_queries);
            (lookup.callback)(lookup.lookup_id, None, src);
        }
        queries
    }

    /// Orderly shutdown (spec.md §4.1, `on_stop`): persist a bootstrap
    /// snapshot of currently-known contacts and notify the measurement
    /// plug-in. Snapshot write failures are logged, not propagated.
    pub fn on_stop(&mut self) {
        let contacts = self.routing.get_closest_rnodes(None, 0, false);
        self.bootstrapper.remember(contacts);
        self.bootstrapper.save_to_file();
        self.experimental.on_stop();
    }

    pub fn outstanding_query_count(&self) -> usize {
        self.querier.outstanding_count()
    }

    pub fn active_lookup_count(&self) -> usize {
        self.lookups.len()
    }
}
