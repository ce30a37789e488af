//! Tests for position messages and the local log

use super::*;
use crate::error::Error;
use crate::types::{Offset, Partition, PositionTable};
use bytes::Bytes;
use std::time::Duration;

fn table(entries: &[(&str, &str)]) -> PositionTable {
    entries
        .iter()
        .map(|(path, next)| {
            (
                Partition::new().with("path", *path),
                Offset::new().with("next", *next),
            )
        })
        .collect()
}

async fn next_delivery(rx: &mut tokio::sync::mpsc::Receiver<Delivery>) -> Delivery {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("delivery channel closed")
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn test_message_kind_wire_names() {
    assert_eq!(MessageKind::Online.to_string(), "ONLINE");
    assert_eq!(MessageKind::PositionChange.to_string(), "POSITION_CHANGE");
    assert_eq!(
        "POSITION_CHANGE".parse::<MessageKind>().unwrap(),
        MessageKind::PositionChange
    );
    assert!(matches!(
        "OFFLINE".parse::<MessageKind>(),
        Err(Error::UnknownMessageKind { .. })
    ));
}

#[test]
fn test_message_wire_format() {
    let message = PositionMessage::PositionChange(table(&[("/data/a.log", "120")]));
    let json: serde_json::Value = serde_json::from_slice(&message.encode().unwrap()).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "kind": "POSITION_CHANGE",
            "positions": [
                {"partition": {"path": "/data/a.log"}, "offset": {"next": "120"}}
            ]
        })
    );
}

#[test]
fn test_message_decode_online() {
    let payload = br#"{"kind":"ONLINE","positions":[{"partition":{"path":"/data/a.log"},"offset":{"next":"3"}}]}"#;
    let message = PositionMessage::decode(payload).unwrap();

    assert_eq!(message.kind(), MessageKind::Online);
    assert_eq!(message.positions(), &table(&[("/data/a.log", "3")]));
}

#[test]
fn test_message_decode_rejects_unknown_kind() {
    let payload = br#"{"kind":"OFFLINE","positions":[]}"#;
    match PositionMessage::decode(payload) {
        Err(Error::UnknownMessageKind { kind }) => assert_eq!(kind, "OFFLINE"),
        other => panic!("unexpected decode result: {other:?}"),
    }
}

#[test]
fn test_message_decode_rejects_malformed_payload() {
    assert!(matches!(
        PositionMessage::decode(br#"{"positions":[]}"#),
        Err(Error::Delivery { .. })
    ));
    assert!(matches!(
        PositionMessage::decode(br#"{"kind":"ONLINE","positions":{"a":"b"}}"#),
        Err(Error::Delivery { .. })
    ));
}

#[test]
fn test_message_decode_without_positions() {
    let message = PositionMessage::decode(br#"{"kind":"POSITION_CHANGE"}"#).unwrap();
    assert_eq!(message.kind(), MessageKind::PositionChange);
    assert!(message.positions().is_empty());
}

#[test]
fn test_message_into_positions() {
    let positions = table(&[("/data/a.log", "1"), ("/data/b.log", "2")]);
    let message = PositionMessage::Online(positions.clone());
    assert_eq!(message.into_positions(), positions);
}

// ============================================================================
// Local Log Tests
// ============================================================================

#[tokio::test]
async fn test_local_log_delivers_to_all_including_sender() {
    let network = LocalLogNetwork::new();
    let a = network.join("positions", "worker-a").await;
    let b = network.join("positions", "worker-b").await;

    let mut rx_a = a.subscribe().await.unwrap();
    let mut rx_b = b.subscribe().await.unwrap();

    let message = PositionMessage::PositionChange(table(&[("/data/a.log", "120")]));
    a.send(message.clone());

    assert_eq!(next_delivery(&mut rx_a).await.unwrap(), message);
    assert_eq!(next_delivery(&mut rx_b).await.unwrap(), message);
}

#[tokio::test]
async fn test_local_log_topics_are_isolated() {
    let network = LocalLogNetwork::new();
    let a = network.join("positions", "worker-a").await;
    let other = network.join("other", "worker-b").await;

    let mut rx_other = other.subscribe().await.unwrap();
    a.send(PositionMessage::Online(PositionTable::new()));

    let result = tokio::time::timeout(Duration::from_millis(100), rx_other.recv()).await;
    assert!(result.is_err());
    assert_eq!(other.topic(), "other");
    assert_eq!(a.worker_id(), "worker-a");
}

#[tokio::test]
async fn test_local_log_reports_undecodable_payload() {
    let network = LocalLogNetwork::new();
    let log = network.join("positions", "worker-a").await;
    let mut rx = log.subscribe().await.unwrap();

    log.publish_raw(Bytes::from_static(b"garbage"));
    log.send(PositionMessage::Online(PositionTable::new()));

    assert!(matches!(
        next_delivery(&mut rx).await,
        Err(Error::Delivery { .. })
    ));
    // The failure affects that message only
    assert_eq!(
        next_delivery(&mut rx).await.unwrap().kind(),
        MessageKind::Online
    );
}

#[tokio::test]
async fn test_local_log_reports_lag_as_delivery_error() {
    let network = LocalLogNetwork::with_capacity(2);
    let log = network.join("positions", "worker-a").await;
    let mut rx = log.subscribe().await.unwrap();

    // Flood the topic before the consumer gets a chance to run
    for i in 0..64 {
        log.send(PositionMessage::PositionChange(table(&[(
            "/data/a.log",
            &i.to_string(),
        )])));
    }

    let mut saw_error = false;
    while let Ok(Some(delivery)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await
    {
        if matches!(delivery, Err(Error::Delivery { .. })) {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_local_log_unsubscribe_closes_channel() {
    let network = LocalLogNetwork::new();
    let log = network.join("positions", "worker-a").await;
    let mut rx = log.subscribe().await.unwrap();

    log.unsubscribe().await;

    let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}
