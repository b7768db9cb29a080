//! The `Node` data model (spec.md §3): a `(socket address, NodeId, optional
//! version tag)` triple.

use crate::identifier::NodeId;
use std::net::SocketAddr;

/// A known DHT contact.
///
/// Equality is by `(address, id)` only — `version` is metadata and must not
/// participate, so this implements `PartialEq` by hand rather than deriving
/// it.
#[derive(Debug, Clone)]
pub struct Node {
    pub addr: SocketAddr,
    pub id: NodeId,
    pub version: Option<Vec<u8>>,
}

impl Node {
    pub fn new(addr: SocketAddr, id: NodeId) -> Self {
        Node {
            addr,
            id,
            version: None,
        }
    }

    pub fn with_version(addr: SocketAddr, id: NodeId, version: Option<Vec<u8>>) -> Self {
        Node { addr, id, version }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.id == other.id
    }
}

impl Eq for Node {}

/// A `(IP, port)` pair advertised as holding content for some info-hash.
/// Peers are opaque to the Controller — produced by collaborators, forwarded
/// to user callbacks untouched.
pub type Peer = std::net::SocketAddr;
