//! Subject-addressed publish/subscribe with a request/reply primitive.
//!
//! There is no native RPC framing on the transport: a request carries the
//! name of a private inbox subject, the responder publishes its answer on
//! that inbox, and the requester waits for exactly one message there.
//!
//! ## Redis wire format
//!
//! Every message is a UTF-8 JSON frame published on the channel named after
//! the subject:
//!
//! ```text
//! {"reply_to": "_INBOX.<uuid>" | null, "data": "<UTF-8 JSON body>"}
//! ```
//!
//! `PUBLISH` returns the number of receiving subscribers; zero receivers for
//! a request is reported as [`BusError::NoResponders`] without waiting.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{error::AppError, Result};

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub reply_to: Option<String>,
    pub payload: Vec<u8>,
}

/// Stream of messages for one subscription. Dropping it unsubscribes.
pub type Subscription = BoxStream<'static, Message>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("no responders on subject {subject}")]
    NoResponders { subject: String },

    #[error("request on subject {subject} timed out after {timeout:?}")]
    TimedOut { subject: String, timeout: Duration },

    #[error("message on subject {subject} has no reply address")]
    NoReplyAddress { subject: String },

    #[error("message encoding error: {0}")]
    Encoding(String),

    #[error("bus transport error: {0}")]
    Transport(String),
}

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::Transport(e.to_string())
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> std::result::Result<(), BusError>;

    /// Publishes on `subject` and waits for a single reply, bounded by `timeout`.
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, BusError>;

    /// Subscribes to a subject or a wildcard pattern (`stats.events.*`).
    async fn subscribe(&self, subject: &str) -> std::result::Result<Subscription, BusError>;

    /// Answers a request message on its reply address.
    async fn respond(&self, message: &Message, payload: Vec<u8>) -> std::result::Result<(), BusError> {
        let reply_to = message
            .reply_to
            .as_deref()
            .ok_or_else(|| BusError::NoReplyAddress {
                subject: message.subject.clone(),
            })?;
        self.publish(reply_to, payload).await
    }
}

/// Unique private subject for one request.
pub fn new_inbox() -> String {
    format!("_INBOX.{}", Uuid::new_v4().simple())
}

/// Token-wise subject matching: `*` matches one token, `>` the rest.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn is_pattern(subject: &str) -> bool {
    subject.split('.').any(|token| token == "*" || token == ">")
}

/// Redis glob covering every subject a token pattern can match.
///
/// Glob `*` also crosses dots, so the result is wider than the pattern and
/// deliveries must still be checked with [`subject_matches`].
fn redis_glob(pattern: &str) -> String {
    pattern
        .split('.')
        .map(|token| match token {
            "*" | ">" => "*".to_string(),
            literal => {
                let mut escaped = String::with_capacity(literal.len());
                for c in literal.chars() {
                    if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                        escaped.push('\\');
                    }
                    escaped.push(c);
                }
                escaped
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    reply_to: Option<String>,
    data: String,
}

fn encode_frame(reply_to: Option<String>, payload: Vec<u8>) -> std::result::Result<String, BusError> {
    let data = String::from_utf8(payload)
        .map_err(|e| BusError::Encoding(format!("payload is not UTF-8: {}", e)))?;
    serde_json::to_string(&Frame { reply_to, data })
        .map_err(|e| BusError::Encoding(e.to_string()))
}

fn decode_frame(bytes: &[u8]) -> std::result::Result<Frame, BusError> {
    serde_json::from_slice(bytes).map_err(|e| BusError::Encoding(format!("invalid frame: {}", e)))
}

/// Redis pub/sub transport.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    connection: MultiplexedConnection,
}

impl RedisBus {
    pub async fn new(url: &str) -> Result<Self> {
        info!("Initializing Redis message bus");

        let client = Client::open(url)
            .map_err(|e| AppError::configuration(format!("Failed to create bus client: {}", e)))?;

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| AppError::configuration(format!("Failed to connect to bus: {}", e)))?;

        info!("Redis message bus initialized successfully");

        Ok(Self { client, connection })
    }

    async fn publish_frame(
        &self,
        subject: &str,
        reply_to: Option<String>,
        payload: Vec<u8>,
    ) -> std::result::Result<i64, BusError> {
        let frame = encode_frame(reply_to, payload)?;
        let mut conn = self.connection.clone();
        let receivers: i64 = conn.publish(subject, frame).await?;
        debug!(subject = %subject, receivers, "Published frame");
        Ok(receivers)
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> std::result::Result<(), BusError> {
        self.publish_frame(subject, None, payload).await.map(|_| ())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, BusError> {
        let inbox = new_inbox();

        let exchange = async {
            // Subscribe before publishing so the reply cannot be missed
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(&inbox).await?;

            let receivers = self.publish_frame(subject, Some(inbox.clone()), payload).await?;
            if receivers == 0 {
                return Err(BusError::NoResponders {
                    subject: subject.to_string(),
                });
            }

            let mut replies = pubsub.on_message();
            match replies.next().await {
                Some(msg) => decode_frame(msg.get_payload_bytes()).map(|frame| frame.data.into_bytes()),
                None => Err(BusError::Transport(format!("inbox {} closed", inbox))),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BusError::TimedOut {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }

    async fn subscribe(&self, subject: &str) -> std::result::Result<Subscription, BusError> {
        // Subscriptions need a dedicated connection, not the multiplexed one
        let mut pubsub = self.client.get_async_pubsub().await?;
        let pattern = subject.to_string();
        if is_pattern(subject) {
            pubsub.psubscribe(redis_glob(subject)).await?;
        } else {
            pubsub.subscribe(subject).await?;
        }
        info!(subject = %subject, "Subscribed to bus subject");

        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let subject = msg.get_channel_name().to_string();
            if !subject_matches(&pattern, &subject) {
                debug!(subject = %subject, pattern = %pattern, "Skipping glob match outside the token pattern");
                return futures::future::ready(None);
            }
            let message = match decode_frame(msg.get_payload_bytes()) {
                Ok(frame) => Some(Message {
                    subject,
                    reply_to: frame.reply_to,
                    payload: frame.data.into_bytes(),
                }),
                Err(e) => {
                    warn!(subject = %subject, "Dropping undecodable bus frame: {}", e);
                    None
                }
            };
            futures::future::ready(message)
        });

        Ok(stream.boxed())
    }
}

/// In-process bus with the same request/reply semantics as [`RedisBus`].
#[derive(Clone, Default)]
pub struct MemoryBus {
    subscribers: Arc<DashMap<String, Vec<mpsc::UnboundedSender<Message>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers to every live matching subscriber and returns how many received it.
    fn deliver(&self, message: Message) -> usize {
        let mut delivered = 0;
        for mut entry in self.subscribers.iter_mut() {
            if !subject_matches(entry.key(), &message.subject) {
                continue;
            }
            entry
                .value_mut()
                .retain(|sender| sender.unbounded_send(message.clone()).is_ok());
            delivered += entry.value().len();
        }
        self.subscribers.retain(|_, senders| !senders.is_empty());
        delivered
    }

    fn register(&self, subject: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.entry(subject.to_string()).or_default().push(tx);
        rx
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> std::result::Result<(), BusError> {
        let receivers = self.deliver(Message {
            subject: subject.to_string(),
            reply_to: None,
            payload,
        });
        debug!(subject = %subject, receivers, "Published message");
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, BusError> {
        let inbox = new_inbox();
        let mut replies = self.register(&inbox);

        let receivers = self.deliver(Message {
            subject: subject.to_string(),
            reply_to: Some(inbox.clone()),
            payload,
        });

        let result = if receivers == 0 {
            Err(BusError::NoResponders {
                subject: subject.to_string(),
            })
        } else {
            match tokio::time::timeout(timeout, replies.next()).await {
                Ok(Some(reply)) => Ok(reply.payload),
                Ok(None) => Err(BusError::Transport(format!("inbox {} closed", inbox))),
                Err(_) => Err(BusError::TimedOut {
                    subject: subject.to_string(),
                    timeout,
                }),
            }
        };

        self.subscribers.remove(&inbox);
        result
    }

    async fn subscribe(&self, subject: &str) -> std::result::Result<Subscription, BusError> {
        Ok(self.register(subject).boxed())
    }
}
