//! Property-based tests validating invariants called out in spec.md §8:
//! XOR-distance metric properties of `NodeId`/`InfoHash` (invariant basis
//! for routing-table bucketing) and the peer cache's window invariant
//! (invariant 4: "every cache entry returned by lookup has
//! `now - entry.ts <= 300s`").

use dht_node::cache::PeerCache;
use dht_node::identifier::NodeId;
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn id_strategy() -> impl Strategy<Value = NodeId> {
    prop::collection::vec(any::<u8>(), 20..=20)
        .prop_map(|bytes| {
            let mut arr = [0u8; 20];
            arr.copy_from_slice(&bytes);
            NodeId::from_bytes(arr)
        })
}

proptest! {
    /// XOR distance is symmetric: `d(a, b) == d(b, a)`.
    #[test]
    fn distance_is_symmetric(a in id_strategy(), b in id_strategy()) {
        prop_assert!(a.distance(&b).0 == b.distance(&a).0);
    }

    /// XOR distance to self is always zero, and only to self.
    #[test]
    fn distance_to_self_is_always_zero(a in id_strategy()) {
        prop_assert_eq!(a.distance(&a).0, [0u8; 20]);
        prop_assert_eq!(a.log_distance(&a), None);
    }

    /// `log_distance` always lands in `0..160` when the ids differ.
    #[test]
    fn log_distance_is_in_range_when_ids_differ(a in id_strategy(), b in id_strategy()) {
        prop_assume!(a != b);
        let log_dist = a.log_distance(&b);
        prop_assert!(log_dist.is_some());
        prop_assert!(log_dist.unwrap() < 160);
    }

    /// Hex round-trips through `Display`/`FromStr` for any id.
    #[test]
    fn hex_round_trip_holds_for_any_id(a in id_strategy()) {
        let s = a.to_string();
        let parsed: NodeId = s.parse().unwrap();
        prop_assert_eq!(a, parsed);
    }
}

proptest! {
    /// Invariant 4 (spec.md §8): a single insert's result is visible for
    /// exactly the validity window and not an instant longer.
    #[test]
    fn cache_entry_visibility_matches_the_window(lookup_offset_secs in 0u64..600) {
        let window = Duration::from_secs(300);
        let mut cache = PeerCache::new(window);
        let base = Instant::now();
        let ih = NodeId::from_bytes([7u8; 20]);
        let peer = "1.2.3.4:6881".parse().unwrap();

        cache.insert(base, ih, vec![peer]);
        let now = base + Duration::from_secs(lookup_offset_secs);
        let found = cache.lookup(now, ih);

        if lookup_offset_secs <= window.as_secs() {
            prop_assert_eq!(found, Some(vec![peer]));
        } else {
            prop_assert_eq!(found, None);
        }
    }

    /// Extending the same info-hash's entry in place preserves its
    /// original timestamp (spec.md §4.1.7) rather than resetting the
    /// window on every new batch of peers.
    #[test]
    fn in_place_extension_keeps_the_original_timestamp(
        extend_after_secs in 0u64..250,
        lookup_after_original_secs in 0u64..600,
    ) {
        let window = Duration::from_secs(300);
        let mut cache = PeerCache::new(window);
        let base = Instant::now();
        let ih = NodeId::from_bytes([9u8; 20]);
        let first: dht_node::node::Peer = "1.2.3.4:6881".parse().unwrap();
        let second: dht_node::node::Peer = "5.6.7.8:6882".parse().unwrap();

        cache.insert(base, ih, vec![first]);
        cache.insert(base + Duration::from_secs(extend_after_secs), ih, vec![second]);

        let now = base + Duration::from_secs(lookup_after_original_secs);
        let found = cache.lookup(now, ih);
        if lookup_after_original_secs <= window.as_secs() {
            prop_assert_eq!(found, Some(vec![first, second]));
        } else {
            prop_assert_eq!(found, None);
        }
    }
}
