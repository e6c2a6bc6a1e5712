//! End-to-end flows against a scripted fake accessory server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;

use usbgate_core::{Accessory, AccessoryError, AccessoryManager, StatusKey};
use usbgate_core::{STATUS_CONNECTED, STATUS_DISCONNECTED};
use usbgate_test_utils::config::{config_for, unreachable_config};
use usbgate_test_utils::server::{push_notification, push_raw_notification, FakeUsbServer};
use usbgate_test_utils::tracing_setup::init_test_tracing;

const DEMO_RECORD: &str = "Tizen|DemoKit|Demo accessory|1.0|usb:demo|SN001";

fn demo_accessory() -> Accessory {
    Accessory::new(
        "Tizen",
        "DemoKit",
        "Demo accessory",
        "1.0",
        "usb:demo",
        "SN001",
    )
}

fn manager_for(server: &FakeUsbServer) -> AccessoryManager {
    let (_tx, status) = StatusKey::channel(STATUS_DISCONNECTED);
    AccessoryManager::new(config_for(server), status)
}

// ── Discovery ─────────────────────────────────────────────────────────

#[tokio::test]
async fn attached_decodes_server_record() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply(DEMO_RECORD).await;
    let manager = manager_for(&server);

    let list = manager.attached().await.unwrap();
    assert_eq!(list.len(), 1);
    let acc = list.first().unwrap();
    assert_eq!(acc.manufacturer(), "Tizen");
    assert_eq!(acc.model(), "DemoKit");
    assert_eq!(acc.description(), "Demo accessory");
    assert_eq!(acc.version(), "1.0");
    assert_eq!(acc.uri(), "usb:demo");
    assert_eq!(acc.serial(), "SN001");

    assert_eq!(server.requests(), vec!["20|".to_string()]);
}

#[tokio::test]
async fn attached_rejects_malformed_record() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("only|three|fields").await;
    let manager = manager_for(&server);

    let err = manager.attached().await.unwrap_err();
    assert!(matches!(
        err,
        AccessoryError::Ipc(usbgate_core::ipc::IpcError::MalformedRecord { found: 2 })
    ));
}

// ── Permission checks ─────────────────────────────────────────────────

#[tokio::test]
async fn has_permission_round_trip_and_sticky_cache() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("2").await;
    let manager = manager_for(&server);

    let mut acc = demo_accessory();
    assert!(manager.has_permission(&mut acc).await.unwrap());
    assert!(acc.permission_granted());
    assert_eq!(server.requests(), vec!["22|com.example.app".to_string()]);

    // Granted handles short-circuit locally: no further round trips.
    assert!(manager.has_permission(&mut acc).await.unwrap());
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn has_permission_denied_leaves_flag_clear() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("1").await;
    let manager = manager_for(&server);

    let mut acc = demo_accessory();
    assert!(!manager.has_permission(&mut acc).await.unwrap());
    assert!(!acc.permission_granted());
}

// ── Permission request flow ───────────────────────────────────────────

#[tokio::test]
async fn grant_flow_invokes_callback_once_with_granted_record() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("2").await;
    let mut manager = manager_for(&server);
    let notify_path = server.notify_path();

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .request_permission(demo_accessory(), move |acc, granted| {
            tx.send((acc, granted)).unwrap();
        })
        .await
        .unwrap();
    assert!(manager.permission_request_pending());
    assert_eq!(server.requests(), vec!["21|com.example.app".to_string()]);

    let pusher = tokio::spawn(async move { push_notification(&notify_path, 3).await });
    let outcome = manager.dispatch_permission_response().await.unwrap();
    assert_eq!(outcome, Some(true));

    // Exactly one fixed-success acknowledgement went back to the server.
    assert_eq!(pusher.await.unwrap(), "2");

    let (acc, granted) = rx.recv().await.unwrap();
    assert!(granted);
    assert!(acc.permission_granted());
    assert_eq!(acc.serial(), "SN001");
    assert!(rx.try_recv().is_err());
    assert!(!manager.permission_request_pending());
}

#[tokio::test]
async fn deny_flow_leaves_flag_clear() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("2").await;
    let mut manager = manager_for(&server);
    let notify_path = server.notify_path();

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .request_permission(demo_accessory(), move |acc, granted| {
            tx.send((acc, granted)).unwrap();
        })
        .await
        .unwrap();

    let pusher = tokio::spawn(async move { push_notification(&notify_path, 4).await });
    let outcome = manager.dispatch_permission_response().await.unwrap();
    assert_eq!(outcome, Some(false));
    assert_eq!(pusher.await.unwrap(), "2");

    let (acc, granted) = rx.recv().await.unwrap();
    assert!(!granted);
    assert!(!acc.permission_granted());
}

#[tokio::test]
async fn unrecognized_notification_never_reaches_callback() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("2").await;
    let mut manager = manager_for(&server);
    let notify_path = server.notify_path();

    let (tx, mut rx) = mpsc::unbounded_channel::<(Accessory, bool)>();
    manager
        .request_permission(demo_accessory(), move |acc, granted| {
            tx.send((acc, granted)).unwrap();
        })
        .await
        .unwrap();

    let pusher =
        tokio::spawn(async move { push_raw_notification(&notify_path, b"not an opcode").await });
    let outcome = manager.dispatch_permission_response().await.unwrap();
    assert_eq!(outcome, None);
    // Still acknowledged; the read itself succeeded.
    assert_eq!(pusher.await.unwrap(), "2");

    // Callback was dropped un-invoked; the cycle released the armed slot.
    assert!(rx.recv().await.is_none());
    assert!(!manager.permission_request_pending());
}

#[tokio::test]
async fn second_request_while_armed_is_rejected_busy() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("2").await;
    let mut manager = manager_for(&server);

    manager
        .request_permission(demo_accessory(), |_, _| {})
        .await
        .unwrap();

    let err = manager
        .request_permission(demo_accessory(), |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(err, AccessoryError::Busy));

    // The armed request is untouched by the rejection.
    assert!(manager.permission_request_pending());
}

#[tokio::test]
async fn failed_request_rolls_back_listener() {
    init_test_tracing();
    let config = unreachable_config();
    let notify_path = config.sockets.notify_path();
    let (_tx, status) = StatusKey::channel(STATUS_DISCONNECTED);
    let mut manager = AccessoryManager::new(config, status);

    let err = manager
        .request_permission(demo_accessory(), |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccessoryError::Ipc(usbgate_core::ipc::IpcError::ServerUnreachable { .. })
    ));

    // Nothing stays armed and the notification socket file is gone.
    assert!(!manager.permission_request_pending());
    assert!(!notify_path.exists());
}

#[tokio::test]
async fn cancel_returns_record_without_invoking_callback() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("2").await;
    let mut manager = manager_for(&server);
    let notify_path = server.notify_path();

    let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
    manager
        .request_permission(demo_accessory(), move |_, granted| {
            tx.send(granted).unwrap();
        })
        .await
        .unwrap();
    assert!(notify_path.exists());

    let acc = manager.cancel_permission_request().unwrap();
    assert_eq!(acc.serial(), "SN001");
    assert!(!acc.permission_granted());
    assert!(!manager.permission_request_pending());
    assert!(!notify_path.exists());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn request_can_be_re_armed_after_dispatch() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply("2").await;
    let mut manager = manager_for(&server);
    let notify_path = server.notify_path();

    manager
        .request_permission(demo_accessory(), |_, _| {})
        .await
        .unwrap();
    let path = notify_path.clone();
    let pusher = tokio::spawn(async move { push_notification(&path, 4).await });
    manager.dispatch_permission_response().await.unwrap();
    pusher.await.unwrap();

    // The previous cycle fully released its resources.
    manager
        .request_permission(demo_accessory(), |_, _| {})
        .await
        .unwrap();
    assert!(manager.permission_request_pending());
}

// ── Connection-status bridge ──────────────────────────────────────────

#[tokio::test]
async fn connect_notification_queries_and_invokes_callback() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply(DEMO_RECORD).await;
    let (status_tx, status) = StatusKey::channel(STATUS_DISCONNECTED);
    let mut manager = AccessoryManager::new(config_for(&server), status);

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .set_connection_changed_cb(move |acc, connected| {
            tx.send((acc.map(|a| a.serial().to_string()), connected))
                .unwrap();
        })
        .unwrap();

    status_tx.send(STATUS_CONNECTED).unwrap();
    let (serial, connected) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(connected);
    assert_eq!(serial.as_deref(), Some("SN001"));
    // One fresh identity query per connect notification.
    assert_eq!(server.requests(), vec!["20|".to_string()]);

    status_tx.send(STATUS_DISCONNECTED).unwrap();
    let (record, connected) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!connected);
    assert!(record.is_none());
    // Disconnect performs no lookup.
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn unknown_status_value_is_ignored() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply(DEMO_RECORD).await;
    let (status_tx, status) = StatusKey::channel(STATUS_DISCONNECTED);
    let mut manager = AccessoryManager::new(config_for(&server), status);

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .set_connection_changed_cb(move |acc, connected| {
            tx.send((acc.map(|a| a.serial().to_string()), connected))
                .unwrap();
        })
        .unwrap();

    status_tx.send(7).unwrap();
    status_tx.send(STATUS_DISCONNECTED).unwrap();

    // Only the valid transition is dispatched.
    let (record, connected) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_none());
    assert!(!connected);
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn unregister_stops_dispatch() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply(DEMO_RECORD).await;
    let (status_tx, status) = StatusKey::channel(STATUS_DISCONNECTED);
    let mut manager = AccessoryManager::new(config_for(&server), status);

    let (tx, mut rx) = mpsc::unbounded_channel::<bool>();
    manager
        .set_connection_changed_cb(move |_, connected| {
            tx.send(connected).unwrap();
        })
        .unwrap();
    assert!(manager.connection_callback_registered());

    manager.unset_connection_changed_cb();
    assert!(!manager.connection_callback_registered());

    status_tx.send(STATUS_CONNECTED).unwrap();
    // The sender side of the callback channel is dropped with the watch.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn is_connected_reads_status_key() {
    init_test_tracing();
    let server = FakeUsbServer::with_reply(DEMO_RECORD).await;
    let (status_tx, status) = StatusKey::channel(STATUS_DISCONNECTED);
    let manager = AccessoryManager::new(config_for(&server), status);

    assert!(!manager.is_connected().unwrap());
    status_tx.send(STATUS_CONNECTED).unwrap();
    assert!(manager.is_connected().unwrap());

    status_tx.send(42).unwrap();
    assert!(matches!(
        manager.is_connected(),
        Err(AccessoryError::OperationFailed(_))
    ));
}
