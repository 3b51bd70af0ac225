//! Events Test Suite: attach/detach against endpoints with different removal APIs

mod common;

use beeconnect::{attach, CapabilityHandle, EndpointEvent, ErrorKind};
use common::{MockEndpoint, Removal, ADDR_A, ADDR_B};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

fn as_handle(endpoint: &Arc<MockEndpoint>) -> Arc<dyn CapabilityHandle> {
    endpoint.clone()
}

#[tokio::test]
async fn attach_registers_four_handlers_and_forwards_events() {
    let endpoint = MockEndpoint::new().arc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = attach(&as_handle(&endpoint), tx);

    assert_eq!(endpoint.handler_count(), 4);
    assert_eq!(subscription.handler_count(), 4);
    assert!(subscription.is_active());

    endpoint.emit("accountsChanged", json!([ADDR_A, ADDR_B]));
    endpoint.emit("chainChanged", json!("0x89"));
    endpoint.emit("connect", json!({"chainId": "0x1"}));
    endpoint.emit("disconnect", json!({"code": 4900, "message": "bye"}));

    assert_eq!(rx.recv().await, Some(EndpointEvent::AccountsChanged(vec![ADDR_A.into(), ADDR_B.into()])));
    assert_eq!(rx.recv().await, Some(EndpointEvent::ChainChanged("0x89".into())));
    assert_eq!(rx.recv().await, Some(EndpointEvent::Connected { chain_id: Some("0x1".into()) }));
    match rx.recv().await {
        Some(EndpointEvent::Disconnected(err)) => assert_eq!(err.kind, ErrorKind::NetworkDisconnected),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn detach_removes_exactly_its_handlers() {
    let endpoint = MockEndpoint::new().arc();
    let handle = as_handle(&endpoint);
    let (tx, _rx) = mpsc::unbounded_channel();
    let first = attach(&handle, tx.clone());
    let second = attach(&handle, tx);
    assert_eq!(endpoint.handler_count(), 8);

    first.detach();
    assert_eq!(endpoint.handler_count(), 4);
    assert_eq!(endpoint.remove_calls.load(Ordering::SeqCst), 4);
    assert_eq!(endpoint.remove_all_calls.load(Ordering::SeqCst), 0);
    assert!(!first.is_active());
    assert!(second.is_active());

    // idempotent
    first.detach();
    assert_eq!(endpoint.remove_calls.load(Ordering::SeqCst), 4);

    second.detach();
    assert_eq!(endpoint.handler_count(), 0);
}

#[tokio::test]
async fn falls_back_to_remove_all_listeners() {
    let endpoint = MockEndpoint::new().removal(Removal::BlanketOnly).arc();
    let (tx, _rx) = mpsc::unbounded_channel();
    let subscription = attach(&as_handle(&endpoint), tx);

    subscription.detach();
    assert_eq!(endpoint.handler_count(), 0);
    assert_eq!(endpoint.remove_calls.load(Ordering::SeqCst), 0);
    assert_eq!(endpoint.remove_all_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handlers_are_muted_when_nothing_can_be_removed() {
    let endpoint = MockEndpoint::new().removal(Removal::Neither).arc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = attach(&as_handle(&endpoint), tx);

    subscription.detach();
    // still registered on the endpoint, but silent
    assert_eq!(endpoint.handler_count(), 4);
    endpoint.emit("accountsChanged", json!([ADDR_A]));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn request_only_endpoints_get_an_empty_subscription() {
    let endpoint = MockEndpoint::new().request_only().arc();
    let (tx, _rx) = mpsc::unbounded_channel();
    let subscription = attach(&as_handle(&endpoint), tx);

    assert_eq!(subscription.handler_count(), 0);
    assert_eq!(endpoint.on_calls.load(Ordering::SeqCst), 0);
    subscription.detach();
    subscription.detach();
    assert!(!subscription.is_active());
}

#[tokio::test]
async fn payloads_are_coerced_before_forwarding() {
    let endpoint = MockEndpoint::new().arc();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = attach(&as_handle(&endpoint), tx);

    endpoint.emit("accountsChanged", json!(ADDR_A));
    endpoint.emit("accountsChanged", json!(null));
    endpoint.emit("chainChanged", json!(56));
    endpoint.emit("chainChanged", json!({"chainId": " 0xA "}));
    endpoint.emit("chainChanged", json!(false));
    endpoint.emit("disconnect", json!(null));

    assert_eq!(rx.recv().await, Some(EndpointEvent::AccountsChanged(vec![ADDR_A.into()])));
    assert_eq!(rx.recv().await, Some(EndpointEvent::AccountsChanged(vec![])));
    assert_eq!(rx.recv().await, Some(EndpointEvent::ChainChanged("0x38".into())));
    assert_eq!(rx.recv().await, Some(EndpointEvent::ChainChanged("0xa".into())));
    match rx.recv().await {
        Some(EndpointEvent::Error(err)) => assert_eq!(err.kind, ErrorKind::InvalidParams),
        other => panic!("unexpected {:?}", other),
    }
    match rx.recv().await {
        Some(EndpointEvent::Disconnected(err)) => {
            assert_eq!(err.kind, ErrorKind::NetworkDisconnected);
            assert_eq!(err.message, "endpoint disconnected");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn dropped_receiver_does_not_break_the_endpoint() {
    let endpoint = MockEndpoint::new().arc();
    let (tx, rx) = mpsc::unbounded_channel();
    let _subscription = attach(&as_handle(&endpoint), tx);
    drop(rx);

    endpoint.emit("chainChanged", json!("0x1"));
    assert_eq!(endpoint.handler_count(), 4);
}
