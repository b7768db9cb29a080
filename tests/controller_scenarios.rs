//! End-to-end Controller scenarios, covering spec.md §8's named cases: a
//! cache hit short-circuiting the network, a self-addressed datagram being
//! dropped, an unmatched response being dropped, a timeout driving a
//! lookup to completion, and a response carrying peers being surfaced to
//! the caller and the cache.

use dht_node::config::Config;
use dht_node::controller::Controller;
use dht_node::identifier::NodeId;
use dht_node::lookup::LookupCallback;
use dht_node::message::{Datagram, MessageFactory, Query, ResponseValues};
use dht_node::node::Peer;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn config_in(dir: &std::path::Path) -> Config {
    let mut cfg = Config::default();
    cfg.network.listen_port = 0;
    cfg.network.bootstrap_file = dir.join("bootstrap.json");
    cfg.network.query_timeout_secs = 1;
    cfg
}

fn seed_one_contact(ctl: &mut Controller, remote_id: NodeId, remote_addr: std::net::SocketAddr) {
    let remote_factory = MessageFactory::new("RS01", remote_id, None);
    let ping = remote_factory.build_query(b"pi", &Query::Ping);
    let ping = remote_factory.address(ping, remote_addr);
    let responses = ctl.on_datagram(ping);
    assert_eq!(responses.len(), 1, "controller should ack the ping");
}

/// Scenario: an info-hash with no contacts at all and no cached result
/// completes a `get_peers` call immediately, with no datagrams sent.
#[test]
fn scenario_get_peers_with_nothing_known_completes_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = Controller::new(&config_in(dir.path()), None, false).unwrap();
    let done = Arc::new(Mutex::new(false));
    let done2 = done.clone();
    let callback: LookupCallback = Box::new(move |_id, peers, _src| {
        if peers.is_none() {
            *done2.lock().unwrap() = true;
        }
    });
    let out = ctl.get_peers(1, NodeId::random(), callback, 6881, false);
    assert!(out.is_empty());
    assert!(*done.lock().unwrap());
}

/// Scenario: unmatched response is dropped without side effects.
#[test]
fn scenario_unmatched_response_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = Controller::new(&config_in(dir.path()), None, false).unwrap();
    let factory = MessageFactory::new("RS01", NodeId::random(), None);
    let values = ResponseValues::default();
    let dg = factory.build_response(b"nope", "127.0.0.1:1".parse().unwrap(), &values);

    let out = ctl.on_datagram(dg);
    assert!(out.is_empty());
    assert_eq!(ctl.outstanding_query_count(), 0);
}

/// Scenario: self-loop drop. A datagram whose claimed sender id is our own
/// is dropped rather than processed as a normal query.
#[test]
fn scenario_self_loop_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = Controller::new(&config_in(dir.path()), None, false).unwrap();
    let local_id = ctl.local_id();
    let factory = MessageFactory::new("RS01", local_id, None);
    let dg = factory.build_query(b"lp", &Query::Ping);
    let dg = factory.address(dg, "127.0.0.1:9".parse().unwrap());

    let out = ctl.on_datagram(dg);
    assert!(out.is_empty());
}

/// Scenario: a contact answers `get_peers` with values. Those values reach
/// the caller's callback, the lookup completes, and an `announce_peer`
/// carrying the node's token is queued.
#[test]
fn scenario_response_with_peers_reaches_the_caller_and_announces() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = Controller::new(&config_in(dir.path()), None, false).unwrap();

    let remote_id = NodeId::random();
    let remote_addr: std::net::SocketAddr = "127.0.0.1:7777".parse().unwrap();
    seed_one_contact(&mut ctl, remote_id, remote_addr);

    let ih = NodeId::random();
    let peers_seen: Arc<Mutex<Vec<Peer>>> = Arc::new(Mutex::new(Vec::new()));
    let peers_seen2 = peers_seen.clone();
    let done = Arc::new(Mutex::new(false));
    let done2 = done.clone();
    let callback: LookupCallback = Box::new(move |_id, peers, _src| match peers {
        Some(p) => peers_seen2.lock().unwrap().extend(p),
        None => *done2.lock().unwrap() = true,
    });

    let outgoing = ctl.get_peers(7, ih, callback, 6881, false);
    assert_eq!(outgoing.len(), 1, "lookup should query the one known contact");

    let remote_factory = MessageFactory::new("RS01", remote_id, None);
    let get_peers_datagram = Datagram { addr: remote_addr, data: outgoing[0].data.clone() };
    assert!(remote_factory.incoming(&get_peers_datagram).is_some());

    let offered_peer: Peer = "8.8.8.8:6881".parse().unwrap();
    let tid = get_peers_datagram.data_tid();
    let reply = remote_factory.build_response(
        &tid,
        remote_addr,
        &ResponseValues { nodes: vec![], values: vec![offered_peer], token: Some(b"tok".to_vec()) },
    );
    let out2 = ctl.on_datagram(Datagram { addr: remote_addr, data: reply.data });

    assert_eq!(peers_seen.lock().unwrap().as_slice(), &[offered_peer]);
    assert!(*done.lock().unwrap());
    assert_eq!(out2.len(), 1, "completion should announce to the responding node");
}

/// Scenario: cache hit. A prior lookup's result is still within the cache
/// window, so a second `get_peers` call for the same info-hash answers
/// immediately with no outbound datagrams.
#[test]
fn scenario_cache_hit_short_circuits_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = Controller::new(&config_in(dir.path()), None, false).unwrap();

    let remote_id = NodeId::random();
    let remote_addr: std::net::SocketAddr = "127.0.0.1:7778".parse().unwrap();
    seed_one_contact(&mut ctl, remote_id, remote_addr);

    let ih = NodeId::random();
    let warm_peer: Peer = "9.9.9.9:6881".parse().unwrap();
    let callback: LookupCallback = Box::new(|_id, _peers, _src| {});
    let outgoing = ctl.get_peers(21, ih, callback, 6881, false);
    assert_eq!(outgoing.len(), 1);

    let remote_factory = MessageFactory::new("RS01", remote_id, None);
    let tid = outgoing[0].data_tid();
    let reply = remote_factory.build_response(
        &tid,
        remote_addr,
        &ResponseValues { nodes: vec![], values: vec![warm_peer], token: Some(b"tok".to_vec()) },
    );
    ctl.on_datagram(Datagram { addr: remote_addr, data: reply.data });

    let done = Arc::new(Mutex::new(Vec::new()));
    let done2 = done.clone();
    let callback: LookupCallback = Box::new(move |_id, peers, _src| {
        done2.lock().unwrap().push(peers);
    });
    let out = ctl.get_peers(22, ih, callback, 6881, true);
    assert!(out.is_empty(), "a fresh cache entry must not generate network traffic");
    let calls = done.lock().unwrap();
    assert_eq!(calls[0], Some(vec![warm_peer]));
    assert_eq!(calls[1], None);
}

/// Scenario: timeout drives an otherwise-stalled lookup to completion.
#[test]
fn scenario_timeout_drives_lookup_completion() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctl = Controller::new(&config_in(dir.path()), None, false).unwrap();

    let remote_id = NodeId::random();
    seed_one_contact(&mut ctl, remote_id, "127.0.0.1:12345".parse().unwrap());

    let done = Arc::new(Mutex::new(false));
    let done2 = done.clone();
    let callback: LookupCallback = Box::new(move |_id, peers, _src| {
        if peers.is_none() {
            *done2.lock().unwrap() = true;
        }
    });
    let ih = NodeId::random();
    let out = ctl.get_peers(11, ih, callback, 6881, false);
    assert_eq!(out.len(), 1);

    ctl.tick(Instant::now() + Duration::from_secs(5));
    assert!(*done.lock().unwrap());
    assert_eq!(ctl.active_lookup_count(), 0);
}
