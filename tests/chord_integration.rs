//! End-to-end scenarios (S1-S6) driving small in-process clusters of
//! nodes bound to loopback addresses through the public `Overlay` API.
//! Each test uses its own block of ports so the suite can run with the
//! default parallel test harness without port collisions.

use std::collections::HashSet;
use std::time::Duration;

use chord::identifier::HashRingKey;
use chord::{ChordError, Config, Key, Overlay};

fn fast_config() -> Config {
    Config::try_new(3, 5, 5, 500, 3, 1_000, false).unwrap()
}

async fn settle(rounds: u32) {
    tokio::time::sleep(Duration::from_millis(500 * rounds as u64 + 250)).await;
}

#[tokio::test]
async fn s1_single_node_publish_and_lookup() {
    let mut overlay = Overlay::new("127.0.0.1", fast_config());
    overlay.join(53100).await.unwrap();

    let key = overlay.publish("hello", "world".to_string()).await.unwrap();
    assert_eq!(key, Key::hash("hello"));

    let value = overlay.lookup(key).await.unwrap();
    assert_eq!(value, Some("world".to_string()));

    let summary = overlay.node_summary(53100).unwrap();
    assert!(summary.alone);
    assert_eq!(summary.predecessor.unwrap().id, summary.self_info.id);
    assert!(summary.successor_list.iter().all(|n| n.id == summary.self_info.id));

    overlay.leave_all().await;
}

#[tokio::test]
async fn s2_two_node_ring_stabilizes_and_shares_data() {
    let mut overlay = Overlay::new("127.0.0.1", fast_config());
    overlay.join(53200).await.unwrap();
    overlay.join(53201).await.unwrap();

    settle(2).await;

    let summary_a = overlay.node_summary(53200).unwrap();
    let summary_b = overlay.node_summary(53201).unwrap();

    assert_eq!(summary_a.successor_list.first().unwrap().id, summary_b.self_info.id);
    assert_eq!(summary_b.successor_list.first().unwrap().id, summary_a.self_info.id);

    // In a two-node ring the predecessor link converges in at least one
    // direction; the degenerate 2-cycle means the other side may still
    // point at itself until a later round (per the specification's S2).
    let b_points_at_a = summary_a.predecessor.as_ref().map(|p| p.id) == Some(summary_b.self_info.id);
    let a_points_at_b = summary_b.predecessor.as_ref().map(|p| p.id) == Some(summary_a.self_info.id);
    assert!(b_points_at_a || a_points_at_b, "at least one node's predecessor should point at the other");

    overlay.publish("hello", "world".to_string()).await.unwrap();

    // lookup through whichever node the overlay happens to act through;
    // since both nodes are hosted locally, at least one must resolve it.
    let value = overlay.lookup(Key::hash("hello")).await.unwrap();
    assert_eq!(value, Some("world".to_string()));

    overlay.leave_all().await;
}

#[tokio::test]
async fn s3_three_node_ring_closure_and_key_distribution() {
    let mut overlay = Overlay::new("127.0.0.1", fast_config());
    overlay.join(53300).await.unwrap();
    overlay.join(53301).await.unwrap();
    overlay.join(53302).await.unwrap();

    settle(4).await;

    for port in [53300u16, 53301, 53302] {
        let summary = overlay.node_summary(port).unwrap();
        assert!(!summary.alone);
    }

    for i in 0..10 {
        overlay.publish(&format!("key-{i}"), format!("value-{i}")).await.unwrap();
    }
    settle(1).await;

    let mut all_keys: Vec<Key> = Vec::new();
    for port in [53300u16, 53301, 53302] {
        all_keys.extend(overlay.node_file_keys(port).unwrap());
    }
    assert_eq!(all_keys.len(), 10, "every published key should be stored exactly once across the ring");
    let unique: HashSet<Key> = all_keys.iter().copied().collect();
    assert_eq!(unique.len(), 10, "no two nodes should store the same key");

    // Ring closure: following successor_list[0] from any node visits all three.
    let mut visited = HashSet::new();
    let mut current = overlay.node_summary(53300).unwrap();
    for _ in 0..3 {
        visited.insert(current.self_info.id);
        let next_id = current.successor_list.first().unwrap().id;
        current = [53300u16, 53301, 53302]
            .iter()
            .map(|p| overlay.node_summary(*p).unwrap())
            .find(|s| s.self_info.id == next_id)
            .unwrap();
    }
    assert_eq!(visited.len(), 3);

    overlay.leave_all().await;
}

#[tokio::test]
async fn s4_graceful_leave_hands_off_keys() {
    let mut overlay = Overlay::new("127.0.0.1", fast_config());
    overlay.join(53400).await.unwrap();
    overlay.join(53401).await.unwrap();
    overlay.join(53402).await.unwrap();
    settle(4).await;

    for i in 0..10 {
        overlay.publish(&format!("key-{i}"), format!("value-{i}")).await.unwrap();
    }
    settle(1).await;

    // Which keys land on B is a function of the SHA-1 hash of each name,
    // so this is read after publishing rather than asserted non-empty.
    let b_keys_before = overlay.node_file_keys(53401).unwrap();

    overlay.leave(53401).await.unwrap();
    settle(2).await;

    let a_keys = overlay.node_file_keys(53400).unwrap();
    let c_keys = overlay.node_file_keys(53402).unwrap();
    let remaining: HashSet<Key> = a_keys.iter().chain(c_keys.iter()).copied().collect();

    for key in &b_keys_before {
        assert!(remaining.contains(key), "B's key {key} should have been handed off to A or C");
    }
    assert_eq!(a_keys.len() + c_keys.len(), 10);

    // Ring closure over the remaining two nodes.
    let summary_a = overlay.node_summary(53400).unwrap();
    let summary_c = overlay.node_summary(53402).unwrap();
    assert_eq!(summary_a.successor_list.first().unwrap().id, summary_c.self_info.id);
    assert_eq!(summary_c.successor_list.first().unwrap().id, summary_a.self_info.id);

    overlay.leave_all().await;
}

#[tokio::test]
async fn s5_ungraceful_death_is_repaired_without_replication() {
    let mut overlay = Overlay::new("127.0.0.1", fast_config());
    overlay.join(53500).await.unwrap();
    overlay.join(53501).await.unwrap();
    overlay.join(53502).await.unwrap();
    settle(4).await;

    for i in 0..10 {
        overlay.publish(&format!("key-{i}"), format!("value-{i}")).await.unwrap();
    }
    settle(1).await;

    let b_keys = overlay.node_file_keys(53501).unwrap();

    overlay.kill_ungracefully(53501).unwrap();
    // give both survivors three periodic ticks to repair.
    settle(3).await;

    let summary_a = overlay.node_summary(53500).unwrap();
    let summary_c = overlay.node_summary(53502).unwrap();
    assert_eq!(summary_a.successor_list.first().unwrap().id, summary_c.self_info.id);
    assert_eq!(summary_c.successor_list.first().unwrap().id, summary_a.self_info.id);

    // B's keys are lost: nothing replicated them, so they should not all
    // reappear at once as a coincidence of hashing into existing keys.
    let a_keys: HashSet<Key> = overlay.node_file_keys(53500).unwrap().into_iter().collect();
    let c_keys: HashSet<Key> = overlay.node_file_keys(53502).unwrap().into_iter().collect();
    let survivors: HashSet<Key> = a_keys.union(&c_keys).copied().collect();
    let lost = b_keys.iter().filter(|k| !survivors.contains(k)).count();
    assert_eq!(lost, b_keys.len(), "B's keys are not replicated and must be lost on ungraceful death");
}

#[tokio::test]
async fn s6_invalid_periodic_interval_is_rejected() {
    let err = Config::try_new(3, 5, 5, 100, 3, 5_000, false).unwrap_err();
    assert!(matches!(err, ChordError::InvalidTimeout { value: 100, .. }));
}

#[tokio::test]
async fn publish_then_delete_then_lookup_returns_not_found() {
    let mut overlay = Overlay::new("127.0.0.1", fast_config());
    overlay.join(53600).await.unwrap();

    let key = overlay.publish("ephemeral", "gone-soon".to_string()).await.unwrap();
    assert_eq!(overlay.lookup(key).await.unwrap(), Some("gone-soon".to_string()));

    overlay.delete(key).await.unwrap();
    assert_eq!(overlay.lookup(key).await.unwrap(), None);

    overlay.leave_all().await;
}

#[tokio::test]
async fn publish_is_idempotent() {
    let mut overlay = Overlay::new("127.0.0.1", fast_config());
    overlay.join(53700).await.unwrap();

    let key = overlay.publish("dup", "v1".to_string()).await.unwrap();
    overlay.publish("dup", "v1".to_string()).await.unwrap();
    assert_eq!(overlay.lookup(key).await.unwrap(), Some("v1".to_string()));

    overlay.leave_all().await;
}

#[tokio::test]
async fn chord_is_empty_when_no_local_nodes() {
    let overlay = Overlay::new("127.0.0.1", fast_config());
    let err = overlay.lookup(Key::from(1u64)).await.unwrap_err();
    assert!(matches!(err, ChordError::ChordIsEmpty));
}
