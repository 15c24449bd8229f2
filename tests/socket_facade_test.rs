//! Integration tests for the socket facade over loopback TCP

use std::sync::Arc;
use std::time::Duration;

use btsock::events::{ACCEPT_ERROR, CONNECTION_LOST, CONNECT_ERROR, CONNECT_SUCCESS};
use btsock::worker::WorkerState;
use btsock::{Config, SocketError, SocketFacade};

const SPP_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

fn create_facade() -> Arc<SocketFacade> {
    Arc::new(SocketFacade::from_config(&Config::default()))
}

/// Accept and connect on the same facade; returns (outbound id, inbound id)
async fn connected_pair(facade: &SocketFacade) -> (String, String) {
    facade.begin_accept_uuid(SPP_UUID, 5000).await.unwrap();
    facade.begin_connect_uuid("127.0.0.1", SPP_UUID).await.unwrap();

    let outbound = match facade.wait_connect_worker().await {
        Some(WorkerState::Connected { connection_id }) => connection_id,
        other => panic!("connect worker ended in {:?}", other),
    };
    let inbound = match facade.wait_accept_worker().await {
        Some(WorkerState::Accepted { connection_id }) => connection_id,
        other => panic!("accept worker ended in {:?}", other),
    };
    (outbound, inbound)
}

#[tokio::test]
async fn test_connect_and_accept_register_both_ends() {
    let facade = create_facade();
    let (outbound, inbound) = connected_pair(&facade).await;

    let active = facade.active_connections().await;
    assert_eq!(active.len(), 2);
    assert_eq!(active.get(&outbound).map(String::as_str), Some("127.0.0.1"));
    assert!(active.contains_key(&inbound));

    let event = facade
        .events()
        .wait_for(CONNECT_SUCCESS, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(event.data["connectionId"], outbound.as_str());
    assert_eq!(facade.metrics().get_active_connections(), 2);
}

#[tokio::test]
async fn test_text_and_binary_round_trip() {
    let facade = create_facade();
    let (outbound, inbound) = connected_pair(&facade).await;

    facade.write("hello world\r\n", &outbound).await.unwrap();
    assert_eq!(facade.read_line(&inbound).await.unwrap(), "hello world");

    // "\x00\x01\xfe\xff"
    facade.write_binary("AAH+/w==", &inbound).await.unwrap();
    let received = facade.read_binary(Some(16), &outbound).await.unwrap();
    assert_eq!(received, "AAH+/w==");

    facade.write("ping", &outbound).await.unwrap();
    assert_eq!(facade.read(None, &inbound).await.unwrap(), "ping");
}

#[tokio::test]
async fn test_read_ready_reflects_pending_data() {
    let facade = create_facade();
    let (outbound, inbound) = connected_pair(&facade).await;

    assert!(!facade.read_ready(&inbound).await.unwrap());

    facade.write("x", &outbound).await.unwrap();
    let mut ready = false;
    for _ in 0..50 {
        if facade.read_ready(&inbound).await.unwrap() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ready);
    assert_eq!(facade.read(Some(1), &inbound).await.unwrap(), "x");
}

#[tokio::test]
async fn test_empty_id_requires_exactly_one_connection() {
    let facade = create_facade();
    let err = facade.write("x", "").await.unwrap_err();
    assert!(matches!(err, SocketError::AmbiguousOrNoConnection { count: 0 }));

    let (outbound, inbound) = connected_pair(&facade).await;
    let err = facade.read_ready("").await.unwrap_err();
    assert!(matches!(err, SocketError::AmbiguousOrNoConnection { count: 2 }));

    facade.stop(&outbound).await.unwrap();
    let sole = facade.registry().resolve("").await.unwrap();
    assert_eq!(sole.id(), inbound);
}

#[tokio::test]
async fn test_stop_then_operations_report_not_found() {
    let facade = create_facade();
    let (outbound, _inbound) = connected_pair(&facade).await;

    facade.stop(&outbound).await.unwrap();

    let err = facade.write("x", &outbound).await.unwrap_err();
    assert!(matches!(err, SocketError::NotFound { .. }));
    let err = facade.stop(&outbound).await.unwrap_err();
    assert!(matches!(err, SocketError::NotFound { .. }));
}

#[tokio::test]
async fn test_failed_read_removes_connection() {
    let facade = create_facade();
    let (outbound, inbound) = connected_pair(&facade).await;

    facade.stop(&outbound).await.unwrap();

    let err = facade.read(None, &inbound).await.unwrap_err();
    assert!(err.is_io());
    assert!(facade.active_connections().await.is_empty());

    let event = facade
        .events()
        .wait_for(CONNECTION_LOST, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(event.data["connectionId"], inbound.as_str());
    assert_eq!(facade.metrics().get_io_failures(), 1);

    let err = facade.read(None, &inbound).await.unwrap_err();
    assert!(matches!(err, SocketError::NotFound { .. }));
}

#[tokio::test]
async fn test_failed_write_removes_connection() {
    let facade = create_facade();
    let (outbound, inbound) = connected_pair(&facade).await;

    facade.stop(&inbound).await.unwrap();

    // the first writes may still land in the socket buffer before the reset
    let mut failure = None;
    for _ in 0..50 {
        if let Err(e) = facade.write("still there?", &outbound).await {
            failure = Some(e);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let err = failure.expect("write to a stopped peer kept succeeding");
    assert!(err.is_io());
    assert!(facade.active_connections().await.is_empty());

    let event = facade
        .events()
        .wait_for(CONNECTION_LOST, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(event.data["connectionId"], outbound.as_str());
}

#[tokio::test]
async fn test_oversized_read_rejected_without_invalidating() {
    let facade = create_facade();
    let (outbound, _inbound) = connected_pair(&facade).await;

    let err = facade.read(Some(1 << 46), &outbound).await.unwrap_err();
    assert!(matches!(err, SocketError::InvalidArgument(_)));
    let err = facade.read_binary(Some(usize::MAX), &outbound).await.unwrap_err();
    assert!(matches!(err, SocketError::InvalidArgument(_)));

    assert!(facade.active_connections().await.contains_key(&outbound));
}

#[tokio::test]
async fn test_stop_cancels_pending_accept_worker() {
    let facade = create_facade();
    let (outbound, _inbound) = connected_pair(&facade).await;

    facade.begin_accept_psm(0, false, false).await.unwrap();
    facade.stop(&outbound).await.unwrap();

    assert_eq!(facade.wait_accept_worker().await, Some(WorkerState::Cancelled));
}

#[tokio::test]
async fn test_second_accept_worker_is_rejected() {
    let facade = create_facade();
    facade.begin_accept_uuid(SPP_UUID, 0).await.unwrap();

    let err = facade.begin_accept_psm(0, false, false).await.unwrap_err();
    assert!(matches!(err, SocketError::WorkerBusy("accept")));

    facade.end_accept_worker().await;
    assert_eq!(facade.wait_accept_worker().await, Some(WorkerState::Cancelled));

    facade.begin_accept_psm(0, false, false).await.unwrap();
    facade.kill_workers().await;
}

#[tokio::test]
async fn test_l2cap_psm_connect() {
    let facade = create_facade();
    assert!(matches!(facade.psm().await, Err(SocketError::NoListener)));

    facade.begin_accept_psm(2000, true, false).await.unwrap();
    let psm = facade.psm().await.unwrap();
    assert_ne!(psm, 0);

    facade
        .begin_connect_psm("127.0.0.1", true, psm, false)
        .await
        .unwrap();

    assert!(matches!(
        facade.wait_connect_worker().await,
        Some(WorkerState::Connected { .. })
    ));
    assert!(matches!(
        facade.wait_accept_worker().await,
        Some(WorkerState::Accepted { .. })
    ));
    assert_eq!(facade.active_connections().await.len(), 2);
}

#[tokio::test]
async fn test_connect_to_unknown_service_fails() {
    let facade = create_facade();
    facade
        .begin_connect_uuid("127.0.0.1", "0000abcd-0000-1000-8000-00805f9b34fb")
        .await
        .unwrap();

    assert!(matches!(
        facade.wait_connect_worker().await,
        Some(WorkerState::Failed { .. })
    ));
    facade
        .events()
        .wait_for(CONNECT_ERROR, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(facade.active_connections().await.is_empty());
}

#[tokio::test]
async fn test_accept_timeout_fails_worker() {
    let facade = create_facade();
    facade.begin_accept_uuid(SPP_UUID, 50).await.unwrap();

    assert!(matches!(
        facade.wait_accept_worker().await,
        Some(WorkerState::Failed { .. })
    ));
    facade
        .events()
        .wait_for(ACCEPT_ERROR, Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalid_uuid_rejected_before_spawning() {
    let facade = create_facade();
    let err = facade.begin_connect_uuid("127.0.0.1", "not-a-uuid").await.unwrap_err();
    assert!(matches!(err, SocketError::InvalidArgument(_)));
    assert_eq!(facade.connect_worker_state().await, None);
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let facade = create_facade();
    connected_pair(&facade).await;

    facade.shutdown().await;
    assert!(facade.active_connections().await.is_empty());
    assert_eq!(facade.metrics().get_active_connections(), 0);
}
