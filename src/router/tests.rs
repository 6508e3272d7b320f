use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{PartitionRouter, RouterOptions, ScaleoutReceiver, on_message, topic_index};
use crate::codec::{decode_slice, encode};
use crate::connection::test_helpers::{ScriptedNamespace, brokered};
use crate::connection::{ConnectionManager, ConnectionOptions};
use crate::message::Message;
use crate::utils::error::{BrokerError, FramingError, TransportError};

type Received = (String, u64, Vec<Message>);

#[derive(Debug, Default)]
struct Recorder {
    calls: Mutex<Vec<Received>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Received> {
        self.calls.lock().unwrap().clone()
    }
}

impl ScaleoutReceiver for Recorder {
    fn on_received(&self, stream_id: &str, sequence_number: u64, messages: Vec<Message>) {
        self.calls
            .lock()
            .unwrap()
            .push((stream_id.to_string(), sequence_number, messages));
    }
}

fn manager(namespace: &ScriptedNamespace) -> Arc<ConnectionManager<ScriptedNamespace>> {
    Arc::new(ConnectionManager::new(
        namespace.clone(),
        ConnectionOptions::default(),
    ))
}

fn options(topic_count: usize) -> RouterOptions {
    RouterOptions {
        topic_prefix: "test".to_string(),
        topic_count,
    }
}

fn values(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.value.as_str()).collect()
}

fn encoded(messages: &[Message]) -> Bytes {
    encode(messages).into_bytes().unwrap()
}

/// Start a router over `namespace` whose receiver is discarded.
async fn start(
    namespace: &ScriptedNamespace,
    topic_count: usize,
) -> PartitionRouter<ScriptedNamespace> {
    let receiver = Arc::new(Recorder::default());
    PartitionRouter::start(manager(namespace), options(topic_count), receiver)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_start_subscribes_to_every_partition() {
    let namespace = ScriptedNamespace::new();
    let router = start(&namespace, 3).await;

    assert_eq!(router.topics(), ["test_0", "test_1", "test_2"]);
    {
        let state = namespace.state.lock().unwrap();
        assert_eq!(state.topics.len(), 3);
        let mut subscribed: Vec<_> = state
            .subscriptions
            .iter()
            .map(|p| p.topic.clone())
            .collect();
        subscribed.sort();
        assert_eq!(subscribed, router.topics());
    }

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_rejects_zero_topics() {
    let namespace = ScriptedNamespace::new();
    let receiver = Arc::new(Recorder::default());
    let result = PartitionRouter::start(manager(&namespace), options(0), receiver).await;

    assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    assert!(namespace.state.lock().unwrap().subscriptions.is_empty());
}

#[tokio::test]
async fn test_start_rejects_empty_prefix() {
    let namespace = ScriptedNamespace::new();
    let opts = RouterOptions {
        topic_prefix: String::new(),
        topic_count: 2,
    };
    let receiver = Arc::new(Recorder::default());
    let result = PartitionRouter::start(manager(&namespace), opts, receiver).await;

    assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_topic_for_follows_partition_index() {
    let namespace = ScriptedNamespace::new();
    let router = start(&namespace, 5).await;

    assert_eq!(router.topic_for("a"), "test_4");
    assert_eq!(router.topic_for("b"), "test_1");
    for source in ["conn-a", "conn-b", "conn-c", ""] {
        let expected = format!("test_{}", topic_index(source, 5));
        assert_eq!(router.topic_for(source), expected);
    }

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_publishes_one_batch_per_source() {
    let namespace = ScriptedNamespace::new();
    let router = start(&namespace, 5).await;

    router
        .send(vec![
            Message::new("a", "k", "1"),
            Message::new("b", "k", "2"),
            Message::new("a", "k", "3"),
        ])
        .await
        .unwrap();

    let sent = namespace.sent();
    assert_eq!(sent.len(), 2);

    assert_eq!(sent[0].0, "test_4");
    let first = decode_slice(&sent[0].1.body).unwrap();
    assert!(first.iter().all(|m| m.source == "a"));
    assert_eq!(values(&first), ["1", "3"]);

    assert_eq!(sent[1].0, "test_1");
    let second = decode_slice(&sent[1].1.body).unwrap();
    assert_eq!(values(&second), ["2"]);

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_same_partition_keeps_group_order() {
    let namespace = ScriptedNamespace::new();
    let router = start(&namespace, 1).await;

    router
        .send(vec![
            Message::new("y", "k", "1"),
            Message::new("x", "k", "2"),
            Message::new("y", "k", "3"),
        ])
        .await
        .unwrap();

    let sent = namespace.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(topic, _)| topic == "test_0"));
    assert_eq!(values(&decode_slice(&sent[0].1.body).unwrap()), ["1", "3"]);
    assert_eq!(values(&decode_slice(&sent[1].1.body).unwrap()), ["2"]);

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_empty_batch_publishes_nothing() {
    let namespace = ScriptedNamespace::new();
    let router = start(&namespace, 5).await;

    router.send(Vec::new()).await.unwrap();
    assert!(namespace.sent().is_empty());

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_stops_at_first_failed_publish() {
    let namespace = ScriptedNamespace::new();
    namespace.fail_send_at(1);
    let router = start(&namespace, 5).await;

    let result = router
        .send(vec![
            Message::new("conn-a", "k", "1"),
            Message::new("conn-b", "k", "2"),
            Message::new("conn-c", "k", "3"),
        ])
        .await;

    assert!(matches!(
        result,
        Err(TransportError::Broker(BrokerError::Communication(_)))
    ));
    let sent = namespace.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(values(&decode_slice(&sent[0].1.body).unwrap()), ["1"]);
    assert_eq!(namespace.state.lock().unwrap().send_attempts, 2);

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_send_rejects_oversized_message_before_publishing() {
    let namespace = ScriptedNamespace::new();
    let router = start(&namespace, 5).await;

    let result = router
        .send(vec![
            Message::new("b", "k", "small"),
            Message::new("a", "k", "x".repeat(300_000)),
        ])
        .await;

    assert!(matches!(
        result,
        Err(TransportError::Framing(FramingError::FieldTooLarge(300_000)))
    ));
    assert!(namespace.sent().is_empty());
    assert_eq!(namespace.state.lock().unwrap().send_attempts, 0);

    router.shutdown().await.unwrap();
}

#[test]
fn test_on_message_forwards_each_item_with_its_sequence_number() {
    let recorder = Recorder::default();
    let batch = vec![
        brokered(
            7,
            encoded(&[Message::new("a", "k", "1"), Message::new("a", "k", "2")]),
        ),
        brokered(9, encoded(&[Message::new("b", "k", "3")])),
    ];

    on_message(&recorder, "test_2", batch).unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "test_2");
    assert_eq!(calls[0].1, 7);
    assert_eq!(values(&calls[0].2), ["1", "2"]);
    assert_eq!(calls[1].1, 9);
    assert_eq!(values(&calls[1].2), ["3"]);
}

#[test]
fn test_on_message_delivers_empty_item() {
    let recorder = Recorder::default();
    on_message(&recorder, "test_0", vec![brokered(1, encoded(&[]))]).unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].2.is_empty());
}

#[test]
fn test_on_message_aborts_batch_on_bad_item() {
    let recorder = Recorder::default();
    let batch = vec![
        brokered(1, encoded(&[Message::new("a", "k", "1")])),
        brokered(2, Bytes::from_static(&[7, 0, 0, 0])),
        brokered(3, encoded(&[Message::new("a", "k", "3")])),
    ];

    let result = on_message(&recorder, "test_0", batch);

    assert!(matches!(
        result,
        Err(TransportError::Framing(FramingError::InvalidMarker(7)))
    ));
    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, 1);
}

#[tokio::test]
async fn test_received_batches_reach_the_receiver() {
    let namespace = ScriptedNamespace::new();
    namespace.script(
        "test_1",
        vec![Ok(vec![
            brokered(11, encoded(&[Message::new("b", "k", "hello")])),
            brokered(12, encoded(&[Message::new("b", "k", "again")])),
        ])],
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let receiver = move |stream_id: &str, sequence_number: u64, messages: Vec<Message>| {
        let _ = tx.send((stream_id.to_string(), sequence_number, messages));
    };
    let router = PartitionRouter::start(manager(&namespace), options(3), Arc::new(receiver))
        .await
        .unwrap();

    let wait = Duration::from_secs(5);
    let (stream_id, seq, messages) = tokio::time::timeout(wait, rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stream_id, "test_1");
    assert_eq!(seq, 11);
    assert_eq!(values(&messages), ["hello"]);

    let (_, seq, _) = tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap();
    assert_eq!(seq, 12);

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_item_does_not_stop_the_pump() {
    let namespace = ScriptedNamespace::new();
    namespace.script(
        "test_0",
        vec![
            Ok(vec![brokered(1, Bytes::from_static(&[1, 2, 3]))]),
            Ok(vec![brokered(2, encoded(&[Message::new("a", "k", "ok")]))]),
        ],
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let receiver = move |_: &str, sequence_number: u64, _: Vec<Message>| {
        let _ = tx.send(sequence_number);
    };
    let router = PartitionRouter::start(manager(&namespace), options(1), Arc::new(receiver))
        .await
        .unwrap();

    let seq = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seq, 2);

    router.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_subscriptions_and_connection() {
    let namespace = ScriptedNamespace::new();
    let router = start(&namespace, 3).await;

    router.shutdown().await.unwrap();

    let state = namespace.state.lock().unwrap();
    assert!(state.subscriptions.is_empty());
    assert_eq!(state.deleted.len(), 3);
    assert_eq!(state.closed_receivers, 3);
    assert!(state.closed);
}

#[tokio::test]
async fn test_shutdown_reports_pump_failure() {
    let namespace = ScriptedNamespace::new();
    namespace.script(
        "test_1",
        vec![Err(BrokerError::EntityNotFound("test_1".to_string()))],
    );
    let router = start(&namespace, 2).await;

    // the failed pump closes its receiver on the way out
    tokio::time::timeout(Duration::from_secs(5), async {
        while namespace.state.lock().unwrap().closed_receivers == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let result = router.shutdown().await;
    match result {
        Err(TransportError::Pump { topic, source }) => {
            assert_eq!(topic, "test_1");
            assert_eq!(source, BrokerError::EntityNotFound("test_1".to_string()));
        }
        other => panic!("expected pump failure, got {other:?}"),
    }
    assert!(namespace.state.lock().unwrap().closed);
}
