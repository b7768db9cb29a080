// ===================================================================================================
// Error Handling - DHT Node Error Types
// ===================================================================================================
//
// Structured error types for the DHT node, mirroring the categories a node actually
// produces: malformed KRPC datagrams, configuration problems, and I/O failures reading
// or writing the bootstrap snapshot. Kept as a hand-rolled enum (no derive macro) so
// every variant carries a human-readable message alongside its category.
//
// ===================================================================================================

use std::error::Error as StdError;
use std::fmt;

/// Errors surfaced by the DHT node's library crate.
///
/// Per the Controller's error-handling design (spec.md §7), none of these ever
/// cross the reactor boundary during normal operation — decode failures are
/// dropped, not propagated. This type exists for the boundary operations that
/// *can* fail loudly: construction, configuration loading, and bootstrap
/// snapshot persistence.
#[derive(Debug)]
pub enum DhtError {
    /// File system I/O failures: reading/writing the bootstrap snapshot or config file.
    Io(String),
    /// KRPC datagram failed to decode or a message violated the wire schema.
    Codec(String),
    /// Configuration file is missing required fields or fails validation.
    Config(String),
    /// A caller-supplied argument is out of range or otherwise invalid.
    BadRequest(String),
    /// Catch-all for errors bubbled up from a dependency via `anyhow`.
    Generic(String),
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhtError::Io(e) => write!(f, "I/O error: {}", e),
            DhtError::Codec(e) => write!(f, "KRPC codec error: {}", e),
            DhtError::Config(e) => write!(f, "configuration error: {}", e),
            DhtError::BadRequest(e) => write!(f, "bad request: {}", e),
            DhtError::Generic(e) => write!(f, "error: {}", e),
        }
    }
}

impl StdError for DhtError {}

impl From<std::io::Error> for DhtError {
    fn from(error: std::io::Error) -> Self {
        DhtError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for DhtError {
    fn from(error: serde_json::Error) -> Self {
        DhtError::Codec(format!("JSON error: {}", error))
    }
}

impl From<serde_bencode::Error> for DhtError {
    fn from(error: serde_bencode::Error) -> Self {
        DhtError::Codec(format!("bencode error: {}", error))
    }
}

impl From<toml::de::Error> for DhtError {
    fn from(error: toml::de::Error) -> Self {
        DhtError::Config(format!("TOML parse error: {}", error))
    }
}

impl From<toml::ser::Error> for DhtError {
    fn from(error: toml::ser::Error) -> Self {
        DhtError::Config(format!("TOML serialize error: {}", error))
    }
}

impl From<anyhow::Error> for DhtError {
    fn from(error: anyhow::Error) -> Self {
        DhtError::Generic(error.to_string())
    }
}

/// Result type alias for DHT node operations.
pub type DhtResult<T> = Result<T, DhtError>;
