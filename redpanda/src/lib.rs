//! Redpanda consumer for payment-update events.
//!
//! [`PaymentUpdateConsumer`] reads one topic through a Kafka-compatible broker
//! (Redpanda, Kafka) and hands every record to a [`MessageHandler`]. Offsets are
//! committed manually, so delivery is at-least-once:
//!
//! - A record the handler accepts is committed.
//! - A record the handler keeps failing on is redelivered in-process according
//!   to the redelivery [`RetryPolicy`]. Once the budget is spent it is published
//!   to the dead-letter topic (`<topic>.DLT` unless configured otherwise) with
//!   headers describing where it came from, and then committed.
//! - If the dead-letter publish itself fails, the offset is left uncommitted and
//!   [`PaymentUpdateConsumer::run`] returns, so the record is redelivered after
//!   a restart instead of being lost.
//!
//! Records are processed one at a time, which preserves per-partition order.
//!
//! # Example
//!
//! ```no_run
//! use room_reservation_redpanda::PaymentUpdateConsumer;
//! # use room_reservation_core::MessageHandler;
//! # async fn example(handler: &dyn MessageHandler) -> Result<(), Box<dyn std::error::Error>> {
//! let consumer = PaymentUpdateConsumer::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("room-reservations")
//!     .topic("bank-transfer-payment-update")
//!     .build()?;
//!
//! let (_shutdown_tx, mut shutdown) = tokio::sync::broadcast::channel(1);
//! consumer.run(handler, &mut shutdown).await?;
//! # Ok(())
//! # }
//! ```

use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use room_reservation_core::MessageHandler;
use room_reservation_runtime::metrics::ConsumerMetrics;
use room_reservation_runtime::retry::{RetryPolicy, retry};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

/// Suffix appended to the source topic to name its dead-letter topic.
pub const DEAD_LETTER_SUFFIX: &str = ".DLT";

/// Header carrying the topic the dead-lettered record was read from.
pub const HEADER_ORIGINAL_TOPIC: &str = "x-original-topic";
/// Header carrying the source partition.
pub const HEADER_ORIGINAL_PARTITION: &str = "x-original-partition";
/// Header carrying the source offset.
pub const HEADER_ORIGINAL_OFFSET: &str = "x-original-offset";
/// Header carrying the last handler error.
pub const HEADER_ERROR: &str = "x-exception-message";

/// Dead-letter topic for `topic`.
#[must_use]
pub fn dead_letter_topic_for(topic: &str) -> String {
    format!("{topic}{DEAD_LETTER_SUFFIX}")
}

/// Errors raised by the consumer itself, as opposed to handler failures.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// The client could not be configured or created.
    #[error("Failed to connect to brokers: {0}")]
    ConnectionFailed(String),

    /// Subscribing to the source topic failed.
    #[error("Failed to subscribe to {topic}: {reason}")]
    SubscriptionFailed {
        /// Source topic.
        topic: String,
        /// Broker error.
        reason: String,
    },

    /// A record could not be published to the dead-letter topic. Its offset was
    /// not committed.
    #[error("Failed to publish {topic}[{partition}]@{offset} to dead-letter topic: {reason}")]
    DeadLetterFailed {
        /// Source topic.
        topic: String,
        /// Source partition.
        partition: i32,
        /// Source offset.
        offset: i64,
        /// Producer error.
        reason: String,
    },
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The handler accepted the record.
    Acknowledged,
    /// The handler failed on every redelivery.
    DeadLettered {
        /// Error of the last attempt.
        reason: String,
    },
}

/// Run `handler` on `payload`, redelivering failures according to `policy`.
///
/// Never fails: a record either ends up [`Delivery::Acknowledged`] or
/// [`Delivery::DeadLettered`].
pub async fn deliver(handler: &dyn MessageHandler, payload: &[u8], policy: &RetryPolicy) -> Delivery {
    match retry(policy, "payment_update_delivery", || handler.handle(payload)).await {
        Ok(()) => Delivery::Acknowledged,
        Err(error) => Delivery::DeadLettered {
            reason: error.to_string(),
        },
    }
}

/// Consumer of the payment-update topic.
///
/// Created through [`PaymentUpdateConsumer::builder`]. Clients are created
/// eagerly but connect lazily, so building never blocks on the broker.
pub struct PaymentUpdateConsumer {
    consumer: StreamConsumer,
    producer: FutureProducer,
    topic: String,
    dead_letter_topic: String,
    redelivery: RetryPolicy,
    publish_timeout: Duration,
}

impl std::fmt::Debug for PaymentUpdateConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentUpdateConsumer")
            .field("topic", &self.topic)
            .field("dead_letter_topic", &self.dead_letter_topic)
            .field("redelivery", &self.redelivery)
            .field("publish_timeout", &self.publish_timeout)
            .finish_non_exhaustive()
    }
}

impl PaymentUpdateConsumer {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> PaymentUpdateConsumerBuilder {
        PaymentUpdateConsumerBuilder::default()
    }

    /// Source topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Dead-letter topic.
    #[must_use]
    pub fn dead_letter_topic(&self) -> &str {
        &self.dead_letter_topic
    }

    /// Consume until `shutdown` fires.
    ///
    /// Broker errors while polling are logged and polling continues; librdkafka
    /// reconnects on its own.
    ///
    /// # Errors
    ///
    /// - [`ConsumerError::SubscriptionFailed`] if the topic cannot be subscribed.
    /// - [`ConsumerError::DeadLetterFailed`] if a record could not be dead-lettered.
    ///   That record is left uncommitted.
    pub async fn run(
        &self,
        handler: &dyn MessageHandler,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ConsumerError> {
        self.consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| ConsumerError::SubscriptionFailed {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            topic = %self.topic,
            dead_letter_topic = %self.dead_letter_topic,
            max_attempts = self.redelivery.max_attempts,
            manual_commit = true,
            "Payment update consumer subscribed"
        );

        let mut stream = self.consumer.stream();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(topic = %self.topic, "Payment update consumer shutting down");
                    return Ok(());
                }
                next = stream.next() => match next {
                    Some(Ok(message)) => self.process(handler, &message).await?,
                    Some(Err(e)) => {
                        tracing::warn!(topic = %self.topic, error = %e, "Failed to receive message");
                    }
                    None => {
                        tracing::debug!(topic = %self.topic, "Consumer stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn process(
        &self,
        handler: &dyn MessageHandler,
        message: &BorrowedMessage<'_>,
    ) -> Result<(), ConsumerError> {
        let started = Instant::now();
        let payload = message.payload().unwrap_or_default();
        ConsumerMetrics::record_received(&self.topic);
        tracing::trace!(
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            "Received payment update"
        );

        match deliver(handler, payload, &self.redelivery).await {
            Delivery::Acknowledged => {
                ConsumerMetrics::record_acknowledged(&self.topic, started.elapsed());
            }
            Delivery::DeadLettered { reason } => {
                self.dead_letter(message, payload, &reason).await?;
                ConsumerMetrics::record_dead_lettered(&self.topic, started.elapsed());
            }
        }

        self.commit(message);
        Ok(())
    }

    async fn dead_letter(
        &self,
        message: &BorrowedMessage<'_>,
        payload: &[u8],
        reason: &str,
    ) -> Result<(), ConsumerError> {
        let partition = message.partition().to_string();
        let offset = message.offset().to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: HEADER_ORIGINAL_TOPIC,
                value: Some(message.topic()),
            })
            .insert(Header {
                key: HEADER_ORIGINAL_PARTITION,
                value: Some(partition.as_str()),
            })
            .insert(Header {
                key: HEADER_ORIGINAL_OFFSET,
                value: Some(offset.as_str()),
            })
            .insert(Header {
                key: HEADER_ERROR,
                value: Some(reason),
            });

        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&self.dead_letter_topic)
            .payload(payload)
            .headers(headers);
        if let Some(key) = message.key() {
            record = record.key(key);
        }

        match self
            .producer
            .send(record, Timeout::After(self.publish_timeout))
            .await
        {
            Ok(_) => {
                tracing::warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    dead_letter_topic = %self.dead_letter_topic,
                    reason,
                    "Payment update dead-lettered"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %kafka_error,
                    "Failed to publish to dead-letter topic, leaving offset uncommitted"
                );
                Err(ConsumerError::DeadLetterFailed {
                    topic: message.topic().to_owned(),
                    partition: message.partition(),
                    offset: message.offset(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            // The record will be seen again; handlers are idempotent.
            tracing::warn!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "Failed to commit offset (message may be redelivered)"
            );
        }
    }
}

/// Builder for [`PaymentUpdateConsumer`].
#[derive(Debug, Default)]
pub struct PaymentUpdateConsumerBuilder {
    brokers: Option<String>,
    consumer_group: Option<String>,
    topic: Option<String>,
    dead_letter_topic: Option<String>,
    auto_offset_reset: Option<String>,
    redelivery: Option<RetryPolicy>,
    publish_timeout: Option<Duration>,
}

impl PaymentUpdateConsumerBuilder {
    /// Comma-separated broker list. Required.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Consumer group. Required.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Source topic. Required.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Dead-letter topic. Defaults to the source topic plus [`DEAD_LETTER_SUFFIX`].
    #[must_use]
    pub fn dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// Where a new consumer group starts: `earliest` (default) or `latest`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// In-process redelivery before dead-lettering. Defaults to
    /// [`RetryPolicy::default`].
    #[must_use]
    pub fn redelivery(mut self, policy: RetryPolicy) -> Self {
        self.redelivery = Some(policy);
        self
    }

    /// How long a dead-letter publish may take. Defaults to 5 seconds.
    #[must_use]
    pub const fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }

    /// Create the consumer and the dead-letter producer.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::ConnectionFailed`] if a required setting is
    /// missing or librdkafka rejects the configuration.
    pub fn build(self) -> Result<PaymentUpdateConsumer, ConsumerError> {
        let brokers = self
            .brokers
            .ok_or_else(|| ConsumerError::ConnectionFailed("Brokers must be specified".to_owned()))?;
        let consumer_group = self.consumer_group.ok_or_else(|| {
            ConsumerError::ConnectionFailed("Consumer group must be specified".to_owned())
        })?;
        let topic = self
            .topic
            .ok_or_else(|| ConsumerError::ConnectionFailed("Topic must be specified".to_owned()))?;
        let dead_letter_topic = self
            .dead_letter_topic
            .unwrap_or_else(|| dead_letter_topic_for(&topic));
        let auto_offset_reset = self.auto_offset_reset.unwrap_or_else(|| "earliest".to_owned());
        let publish_timeout = self.publish_timeout.unwrap_or(Duration::from_secs(5));

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| ConsumerError::ConnectionFailed(format!("Failed to create consumer: {e}")))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", publish_timeout.as_millis().to_string())
            .set("acks", "all")
            .create()
            .map_err(|e| ConsumerError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        tracing::debug!(
            brokers = %brokers,
            consumer_group = %consumer_group,
            topic = %topic,
            dead_letter_topic = %dead_letter_topic,
            auto_offset_reset = %auto_offset_reset,
            "Payment update consumer configured"
        );

        Ok(PaymentUpdateConsumer {
            consumer,
            producer,
            topic,
            dead_letter_topic,
            redelivery: self.redelivery.unwrap_or_default(),
            publish_timeout,
        })
    }
}
