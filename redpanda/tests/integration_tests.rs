//! Integration tests for [`PaymentUpdateConsumer`] against a real Kafka broker.
//!
//! These tests spin up Kafka with testcontainers and check that accepted
//! records are handled and that records the handler keeps rejecting land on
//! the dead-letter topic with their origin headers.
//!
//! # Running These Tests
//!
//! They are marked `#[ignore]` because they need Docker and take a while to
//! start Kafka:
//! ```bash
//! cargo test -p room-reservation-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use futures::StreamExt;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use room_reservation_core::{HandlerError, MessageHandler};
use room_reservation_redpanda::{
    HEADER_ERROR, HEADER_ORIGINAL_TOPIC, PaymentUpdateConsumer,
};
use room_reservation_runtime::retry::RetryPolicy;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

/// Accepts JSON objects, rejects everything else.
#[derive(Default)]
struct RecordingHandler {
    accepted: Mutex<Vec<serde_json::Value>>,
}

impl MessageHandler for RecordingHandler {
    fn handle<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            let value: serde_json::Value = serde_json::from_slice(payload)?;
            self.accepted.lock().unwrap().push(value);
            Ok(())
        })
    }
}

fn producer(brokers: &str) -> FutureProducer {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "5000")
        .create()
        .expect("Failed to create producer")
}

async fn publish(producer: &FutureProducer, topic: &str, payload: &[u8]) {
    for attempt in 1..=60 {
        let record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(topic).payload(payload);
        if producer.send(record, Duration::from_secs(5)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Kafka did not accept the record on {topic}");
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_good_records_are_handled_and_bad_records_are_dead_lettered() {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get Kafka port");
    let brokers = format!("127.0.0.1:{port}");
    let topic = "bank-transfer-payment-update";

    let producer = producer(&brokers);
    publish(&producer, topic, b"not json at all").await;
    publish(&producer, topic, br#"{"paymentId":"p-1"}"#).await;

    let consumer = PaymentUpdateConsumer::builder()
        .brokers(&brokers)
        .consumer_group("reservation-it")
        .topic(topic)
        .redelivery(
            RetryPolicy::builder()
                .max_attempts(2)
                .initial_delay(Duration::from_millis(10))
                .build(),
        )
        .build()
        .expect("Failed to build consumer");
    let dead_letter_topic = consumer.dead_letter_topic().to_owned();

    let handler = Arc::new(RecordingHandler::default());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
    let run = {
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { consumer.run(handler.as_ref(), &mut shutdown_rx).await })
    };

    let dlt_reader: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", "dlt-reader")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Failed to create DLT reader");
    dlt_reader.subscribe(&[dead_letter_topic.as_str()]).unwrap();

    let dead = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(Ok(message)) = dlt_reader.stream().next().await {
                return message.detach();
            }
        }
    })
    .await
    .expect("Nothing arrived on the dead-letter topic");

    assert_eq!(dead.payload(), Some(&b"not json at all"[..]));
    let headers = dead.headers().expect("dead-lettered record should carry headers");
    let header = |key: &str| {
        headers
            .iter()
            .find(|h| h.key == key)
            .and_then(|h| h.value)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    };
    assert_eq!(header(HEADER_ORIGINAL_TOPIC).as_deref(), Some(topic));
    assert!(header(HEADER_ERROR).is_some());

    tokio::time::timeout(Duration::from_secs(30), async {
        while handler.accepted.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("Valid record was never handled");
    assert_eq!(handler.accepted.lock().unwrap()[0]["paymentId"], "p-1");

    shutdown_tx.send(()).unwrap();
    run.await.unwrap().expect("consumer should stop cleanly");
}
