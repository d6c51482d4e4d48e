//! Integration tests for the NATS backend against a real server.
//!
//! Run with `cargo test -p messaging -- --ignored` (needs Docker).

#![cfg(feature = "nats")]

use messaging::{
    Broker, BrokerError, BrokerOptions, DecodeFailurePolicy, Handler, Message, NatsBroker,
    Publication, PublishOptions, SubscribeOptions,
};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{StreamExt, TestNats, TestSubjects};
use tokio::sync::mpsc;

fn collector() -> (Arc<dyn Handler>, mpsc::UnboundedReceiver<Publication>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: Arc<dyn Handler> = Arc::new(move |publication: Publication| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(publication);
            Ok::<(), BrokerError>(())
        }
    });
    (handler, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Publication>) -> Publication {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for publication")
        .expect("handler dropped")
}

async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<Publication>) {
    let res = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(res.is_err(), "handler was invoked unexpectedly");
}

async fn connected(nats: &TestNats) -> NatsBroker {
    let broker = NatsBroker::new([nats.address()], BrokerOptions::default().with_name("test"));
    broker.connect().await.expect("Failed to connect broker");
    broker
}

async fn settle(broker: &NatsBroker) {
    // Let the server register subscriptions before publishing
    broker.client().await.unwrap().flush().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_connect_is_idempotent() {
    let nats = TestNats::new().await;
    let broker = NatsBroker::new([nats.address()], BrokerOptions::default());

    assert_eq!(broker.address(), nats.connection_string());
    broker.connect().await.unwrap();
    broker.connect().await.unwrap();
    assert!(broker.is_connected().await);

    broker.disconnect().await.unwrap();
    assert!(!broker.is_connected().await);
    assert!(broker.disconnect().await.unwrap_err().is_not_connected());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_publish_subscribe_round_trip() {
    let nats = TestNats::new().await;
    let subjects = TestSubjects::from_test_name("test_publish_subscribe_round_trip");
    let topic = subjects.subject("orders");
    let broker = connected(&nats).await;

    let (handler, mut rx) = collector();
    let mut sub = broker
        .subscribe(&topic, handler, SubscribeOptions::default())
        .await
        .unwrap();
    settle(&broker).await;

    let msg = Message::new("payload").with_header("k", "v");
    broker
        .publish(&topic, &msg, PublishOptions::default())
        .await
        .unwrap();

    let publication = recv(&mut rx).await;
    assert_eq!(publication.topic(), topic);
    assert_eq!(publication.message(), &msg);
    assert!(publication.ack().await.is_ok());

    sub.unsubscribe().await.unwrap();
    broker.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_wire_format_is_json_envelope() {
    let nats = TestNats::new().await;
    let subjects = TestSubjects::from_test_name("test_wire_format_is_json_envelope");
    let topic = subjects.subject("wire");
    let broker = connected(&nats).await;

    let mut raw = nats.client().subscribe(topic.clone()).await.unwrap();
    nats.client().flush().await.unwrap();

    broker
        .publish(
            &topic,
            &Message::new("payload").with_header("k", "v"),
            PublishOptions::default(),
        )
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), raw.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        message.payload.as_ref(),
        br#"{"Header":{"k":"v"},"Body":"cGF5bG9hZA=="}"#
    );
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_undecodable_payload_is_dropped() {
    let nats = TestNats::new().await;
    let subjects = TestSubjects::from_test_name("test_undecodable_payload_is_dropped");
    let topic = subjects.subject("orders");
    let broker = connected(&nats).await;

    let (handler, mut rx) = collector();
    let _sub = broker
        .subscribe(&topic, handler, SubscribeOptions::default())
        .await
        .unwrap();
    settle(&broker).await;

    broker.publish_raw(&topic, b"{not json").await.unwrap();
    assert_silent(&mut rx).await;

    broker
        .publish(&topic, &Message::new("ok"), PublishOptions::default())
        .await
        .unwrap();
    assert_eq!(recv(&mut rx).await.message().body(), b"ok");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_dead_letter_forwards_raw_payload() {
    let nats = TestNats::new().await;
    let subjects = TestSubjects::from_test_name("test_dead_letter_forwards_raw_payload");
    let topic = subjects.subject("orders");
    let dlq = subjects.subject("orders.dlq");
    let broker = connected(&nats).await;

    let mut dead_letters = nats.client().subscribe(dlq.clone()).await.unwrap();
    nats.client().flush().await.unwrap();

    let (handler, _rx) = collector();
    let _sub = broker
        .subscribe(
            &topic,
            handler,
            SubscribeOptions::default().with_decode_failure(DecodeFailurePolicy::dead_letter(&dlq)),
        )
        .await
        .unwrap();
    settle(&broker).await;

    broker.publish_raw(&topic, b"garbage").await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), dead_letters.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.payload.as_ref(), b"garbage");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_queue_group_delivers_once() {
    let nats = TestNats::new().await;
    let subjects = TestSubjects::from_test_name("test_queue_group_delivers_once");
    let topic = subjects.subject("jobs");
    let queue = subjects.queue("workers");
    let broker = connected(&nats).await;

    let (handler, mut rx) = collector();
    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(
            broker
                .subscribe(
                    &topic,
                    handler.clone(),
                    SubscribeOptions::default().with_queue(&queue),
                )
                .await
                .unwrap(),
        );
    }
    settle(&broker).await;

    for i in 0..6 {
        broker
            .publish(&topic, &Message::new(format!("{}", i)), PublishOptions::default())
            .await
            .unwrap();
    }

    for _ in 0..6 {
        recv(&mut rx).await;
    }
    assert_silent(&mut rx).await;
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_broadcast_without_queue() {
    let nats = TestNats::new().await;
    let subjects = TestSubjects::from_test_name("test_broadcast_without_queue");
    let topic = subjects.subject("news");
    let broker = connected(&nats).await;

    let (handler, mut rx) = collector();
    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(
            broker
                .subscribe(&topic, handler.clone(), SubscribeOptions::default())
                .await
                .unwrap(),
        );
    }
    settle(&broker).await;

    broker
        .publish(&topic, &Message::new("hello"), PublishOptions::default())
        .await
        .unwrap();

    for _ in 0..3 {
        assert_eq!(recv(&mut rx).await.message().body(), b"hello");
    }
    assert_silent(&mut rx).await;
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_unsubscribe_stops_delivery() {
    let nats = TestNats::new().await;
    let subjects = TestSubjects::from_test_name("test_unsubscribe_stops_delivery");
    let topic = subjects.subject("orders");
    let broker = connected(&nats).await;

    let (handler, mut rx) = collector();
    let mut sub = broker
        .subscribe(&topic, handler, SubscribeOptions::default())
        .await
        .unwrap();
    settle(&broker).await;

    sub.unsubscribe().await.unwrap();
    settle(&broker).await;

    broker
        .publish(&topic, &Message::new("late"), PublishOptions::default())
        .await
        .unwrap();
    assert!(rx.recv().await.is_none());
    assert!(sub.unsubscribe().await.is_err());
}
