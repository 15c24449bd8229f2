//! Connection registry properties over in-memory streams

use std::sync::Arc;

use btsock::connection::{ConnectionRecord, Direction};
use btsock::transport::SocketKind;
use btsock::{ConnectionRegistry, SocketError};
use tokio_test::assert_ok;

fn record(address: &str) -> ConnectionRecord {
    let (stream, _peer) = tokio::io::duplex(64);
    ConnectionRecord::new(
        Box::new(stream),
        address.to_string(),
        SocketKind::L2cap {
            psm: 4097,
            le: true,
            secure: false,
        },
        Direction::Inbound,
    )
}

#[tokio::test]
async fn test_resolve_returns_same_record_until_removed() {
    let registry = ConnectionRegistry::new();
    let id = registry.add(record("AA:BB:CC:DD:EE:FF")).await;

    let first = assert_ok!(registry.resolve(&id).await);
    let second = assert_ok!(registry.resolve(&id).await);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.direction(), Direction::Inbound);

    assert!(registry.remove(&id).await.is_some());
    assert!(matches!(
        registry.resolve(&id).await,
        Err(SocketError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_empty_id_resolves_only_sole_entry() {
    let registry = ConnectionRegistry::new();
    assert!(registry.resolve("").await.unwrap_err().is_resolution());

    let a = registry.add(record("AA:AA:AA:AA:AA:AA")).await;
    assert_eq!(assert_ok!(registry.resolve("").await).id(), a);

    let b = registry.add(record("BB:BB:BB:BB:BB:BB")).await;
    assert!(matches!(
        registry.resolve("").await,
        Err(SocketError::AmbiguousOrNoConnection { count: 2 })
    ));

    registry.remove(&a).await;
    assert_eq!(assert_ok!(registry.resolve("").await).id(), b);
}

#[tokio::test]
async fn test_ids_are_unique_and_listed() {
    let registry = ConnectionRegistry::new();
    let mut ids = Vec::new();
    for _ in 0..20 {
        ids.push(registry.add(record("AA:BB:CC:DD:EE:FF")).await);
    }

    let listed = registry.list().await;
    assert_eq!(listed.len(), 20);
    for id in &ids {
        assert_eq!(listed[id], "AA:BB:CC:DD:EE:FF");
    }
}

#[tokio::test]
async fn test_clear_closes_records() {
    let registry = ConnectionRegistry::new();
    let id = registry.add(record("AA:BB:CC:DD:EE:FF")).await;
    let held = assert_ok!(registry.resolve(&id).await);

    assert_eq!(registry.clear().await, 1);
    assert!(registry.is_empty().await);
    assert!(!held.is_open());
    assert!(matches!(
        held.write_all(b"late").await,
        Err(SocketError::ConnectionClosed { .. })
    ));
}
