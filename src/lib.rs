// ===================================================================================================
// mainline-dht-node - Kademlia-style mainline DHT node
// ===================================================================================================
//
// A single-threaded, reactor-driven Kademlia DHT node speaking the
// BitTorrent mainline (KRPC/BEP5) dialect: joins the overlay, answers
// ping/find_node/get_peers/announce_peer queries, and performs iterative
// get_peers lookups on a caller's behalf.
//
// ## KEY DESIGN PRINCIPLES
//
// ### 1. A Single Coordination Kernel (controller.rs)
// - Exposes exactly two entry points driven by the reactor: `tick` and
//   `on_datagram`, plus `get_peers` for callers and `on_stop` for shutdown
// - No internal concurrency and no suspension points: every call runs to
//   completion synchronously against `&mut self`
//
// ### 2. Collaborators, Not a Monolith
// - `querier` tracks outstanding transactions and correlates replies
// - `routing` owns the k-bucket table
// - `lookup` drives the iterative get_peers state machine
// - `responder` answers inbound queries and owns the peer tracker
// - `bootstrap` persists a snapshot of known-good contacts across restarts
// - `cache` short-circuits repeat lookups within a validity window
//
// ### 3. A Thin Reactor (reactor.rs)
// - One UDP socket, one timer armed to the Controller's requested
//   deadline, dispatched through a single `tokio::select!` loop
//
// ===================================================================================================

// ===== IDENTITY AND WIRE FORMAT =====
pub mod identifier; // 160-bit node ids / info-hashes and XOR distance
pub mod node; // Node and Peer data model
pub mod message; // KRPC bencode codec

// ===== COORDINATION KERNEL AND COLLABORATORS =====
pub mod bootstrap; // Bootstrap snapshot persistence
pub mod cache; // Short-lived peer-lookup cache
pub mod controller; // The Controller itself
pub mod experimental; // No-op measurement observer hook
pub mod lookup; // Iterative get_peers lookup state machine
pub mod querier; // Transaction tracking and correlation
pub mod responder; // Inbound query responses and peer tracker
pub mod routing; // K-bucket routing table

// ===== RUNTIME =====
pub mod reactor; // tokio UDP event loop driving the Controller

// ===== COMMAND LINE INTERFACE AND CONFIGURATION =====
pub mod cli; // Command line argument parsing using clap
pub mod config; // Configuration management with TOML support

// ===== RELIABILITY =====
pub mod error; // Core error types and result alias
pub mod logging; // Structured logging and tracing setup

// ===== CONVENIENCE RE-EXPORTS =====

/// Core error types and result alias for error handling.
pub use error::{DhtError, DhtResult};

/// The coordination kernel.
pub use controller::Controller;

/// Identity types shared across the crate.
pub use identifier::{InfoHash, NodeId};

/// The contact/peer data model.
pub use node::{Node, Peer};
