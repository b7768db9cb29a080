//! 160-bit identifiers shared by [`crate::node::Node`] and info-hashes.
//!
//! Both node ids and info-hashes inhabit the same metric space (spec.md §3),
//! so a single newtype backs both; `InfoHash` is a type alias rather than a
//! distinct representation.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ID_LEN: usize = 20;

/// A 160-bit opaque identifier, big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(#[serde(with = "serde_bytes")] pub [u8; ID_LEN]);

/// `InfoHash` and `NodeId` are the same 160-bit space (spec.md §3).
pub type InfoHash = NodeId;

impl NodeId {
    pub const ZERO: NodeId = NodeId([0u8; ID_LEN]);

    /// Generate a uniformly random id, as done at node construction when the
    /// caller does not supply one (spec.md §4.1.1 step 2).
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        NodeId(bytes)
    }

    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// XOR distance to another id in the same space.
    pub fn distance(&self, other: &NodeId) -> Distance {
        let mut out = [0u8; ID_LEN];
        for i in 0..ID_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    /// Bucket index of `other` relative to `self`: `floor(log2(distance))`,
    /// or `None` when `other == self` (the spec's "−∞ for self").
    pub fn log_distance(&self, other: &NodeId) -> Option<usize> {
        self.distance(other).log2()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for NodeId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; ID_LEN];
        if bytes.len() != ID_LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        arr.copy_from_slice(&bytes);
        Ok(NodeId(arr))
    }
}

/// XOR distance between two 160-bit identifiers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance(pub [u8; ID_LEN]);

impl Distance {
    /// `floor(log2(self))`, or `None` if the distance is zero (identical ids).
    pub fn log2(&self) -> Option<usize> {
        for (byte_idx, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                let leading = byte.leading_zeros() as usize;
                let bit_in_byte = 7 - leading;
                return Some((ID_LEN - 1 - byte_idx) * 8 + bit_in_byte);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero_and_log_distance_is_none() {
        let id = NodeId::random();
        let d = id.distance(&id);
        assert_eq!(d.0, [0u8; ID_LEN]);
        assert_eq!(id.log_distance(&id), None);
    }

    #[test]
    fn log_distance_matches_highest_differing_bit() {
        let mut a = [0u8; ID_LEN];
        let mut b = [0u8; ID_LEN];
        a[0] = 0b0000_0001;
        b[0] = 0b0000_0000;
        let id_a = NodeId(a);
        let id_b = NodeId(b);
        // differing bit is bit 0 of the first (most-significant) byte,
        // i.e. bit index (ID_LEN-1)*8 + 0
        assert_eq!(id_a.log_distance(&id_b), Some((ID_LEN - 1) * 8));
    }

    #[test]
    fn hex_round_trip() {
        let id = NodeId::random();
        let s = id.to_string();
        let parsed: NodeId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn closer_distance_sorts_lower() {
        let origin = NodeId([0u8; ID_LEN]);
        let mut near = [0u8; ID_LEN];
        near[ID_LEN - 1] = 1;
        let mut far = [0u8; ID_LEN];
        far[0] = 1;
        let d_near = origin.distance(&NodeId(near));
        let d_far = origin.distance(&NodeId(far));
        assert!(d_near < d_far);
    }
}
