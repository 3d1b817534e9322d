//! Integration tests for marshal-bus pub/sub buses

use marshal_bus::{BusRegistry, PubSub, Signal};
use std::time::Duration;

// ============================================================================
// Topic Isolation Tests
// ============================================================================

#[tokio::test]
async fn test_topics_are_isolated() {
    let bus = PubSub::new("events");
    let mut orders = bus.subscribe("orders");
    let mut users = bus.subscribe("users");

    bus.broadcast("orders", Signal::new("order.created", "/shop"));

    assert_eq!(
        orders.recv().await.unwrap().signal_type,
        "order.created"
    );

    let nothing = tokio::time::timeout(Duration::from_millis(20), users.recv()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_subscriber_count_tracks_drops() {
    let bus = PubSub::new("events");
    let a = bus.subscribe("t");
    let _b = bus.subscribe("t");
    assert_eq!(bus.subscriber_count("t"), 2);

    drop(a);
    assert_eq!(bus.subscriber_count("t"), 1);
    assert_eq!(bus.subscriber_count("unknown"), 0);
}

#[tokio::test]
async fn test_ordering_preserved_per_subscriber() {
    let bus = PubSub::new("events");
    let mut rx = bus.subscribe("seq");

    for i in 0..10 {
        bus.broadcast("seq", Signal::new(format!("step.{}", i), "/test"));
    }

    for i in 0..10 {
        assert_eq!(rx.recv().await.unwrap().signal_type, format!("step.{}", i));
    }
}

// ============================================================================
// Registry Tests
// ============================================================================

#[test]
fn test_registry_get_unknown() {
    let registry = BusRegistry::new();
    assert!(registry.get("missing").is_none());
}

#[tokio::test]
async fn test_registry_clone_shares_buses() {
    let registry = BusRegistry::new();
    let clone = registry.clone();

    let bus = registry.start("shared");
    let mut rx = bus.subscribe("t");

    clone
        .running("shared")
        .expect("Clone should see bus")
        .broadcast("t", Signal::new("hello", "/clone"));

    assert_eq!(rx.recv().await.unwrap().signal_type, "hello");
}
