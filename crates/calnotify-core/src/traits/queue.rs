//! Message queue trait: a narrow publish/consume boundary over a broker.

use async_trait::async_trait;
use futures::stream::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Lazy, unbounded sequence of deliveries. Ends when the queue is closed.
pub type DeliveryStream = Box<dyn Stream<Item = Delivery> + Send + Unpin>;

/// Backend hook that settles a single delivery.
pub trait Acknowledger: Send {
    fn ack(&mut self) -> Result<()>;
}

/// One message handed to a consumer. Acknowledging is the consumer's job.
pub struct Delivery {
    body: Vec<u8>,
    tag: u64,
    redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, tag: u64, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, tag, redelivered, acker }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Broker-assigned delivery tag.
    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// Decode the JSON body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn ack(&mut self) -> Result<()> {
        self.acker.ack()
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("redelivered", &self.redelivered)
            .field("len", &self.body.len())
            .finish()
    }
}

/// A single named, non-durable, point-to-point queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue name.
    fn name(&self) -> &str;

    /// Connect and declare the queue.
    async fn connect(&self) -> Result<()>;

    /// Release the connection. Safe to call repeatedly or before `connect`.
    async fn close(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Enqueue an already encoded body.
    async fn publish_raw(&self, body: Vec<u8>) -> Result<()>;

    /// Start consuming. Every call opens a fresh stream.
    async fn consume(&self) -> Result<DeliveryStream>;
}

impl dyn MessageQueue {
    /// Encode `payload` as JSON and enqueue it.
    pub async fn publish<T: Serialize + Sync>(&self, payload: &T) -> Result<()> {
        let body = serde_json::to_vec(payload)?;
        self.publish_raw(body).await
    }
}
