//! In-process broker.
//!
//! Brokers are registered by address, so every `LocalQueue` built from the
//! same address and queue name shares one queue, like separate connections to
//! one broker. Deliveries dropped without an ack go back to the head of the
//! queue, flagged as redelivered.

use async_trait::async_trait;
use calnotify_core::error::{CalNotifyError, Result};
use calnotify_core::traits::{Acknowledger, Delivery, DeliveryStream, MessageQueue};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::Notify;

struct Pending {
    body: Vec<u8>,
    redelivered: bool,
}

/// One named queue inside a broker.
struct SharedQueue {
    pending: Mutex<VecDeque<Pending>>,
    next_tag: AtomicU64,
    notify: Notify,
}

impl SharedQueue {
    fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            next_tag: AtomicU64::new(1),
            notify: Notify::new(),
        }
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_back(&self, message: Pending) {
        self.pending().push_back(message);
        self.notify.notify_one();
    }

    fn push_front(&self, message: Pending) {
        self.pending().push_front(message);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Pending> {
        self.pending().pop_front()
    }
}

/// A broker instance: a set of named queues.
#[derive(Default)]
pub struct LocalBroker {
    queues: Mutex<HashMap<String, Arc<SharedQueue>>>,
}

/// Brokers by address for the life of the process.
///
/// One broker is added per distinct address and entries are never removed,
/// so addresses should come from configuration rather than be generated.
fn registry() -> &'static Mutex<HashMap<String, Arc<LocalBroker>>> {
    static BROKERS: OnceLock<Mutex<HashMap<String, Arc<LocalBroker>>>> = OnceLock::new();
    BROKERS.get_or_init(Default::default)
}

impl LocalBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide broker registered under `address`.
    ///
    /// The first call for an address registers a broker that stays alive
    /// until the process exits, even after every queue on it is closed.
    pub fn at(address: &str) -> Arc<Self> {
        let mut brokers = registry().lock().unwrap_or_else(PoisonError::into_inner);
        brokers.entry(address.to_string()).or_insert_with(LocalBroker::new).clone()
    }

    fn declare(&self, name: &str) -> Arc<SharedQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.entry(name.to_string()).or_insert_with(|| Arc::new(SharedQueue::new())).clone()
    }

    /// Messages waiting in `name`, not counting unacked deliveries.
    pub fn depth(&self, name: &str) -> usize {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get(name).map(|q| q.pending().len()).unwrap_or(0)
    }
}

/// Per-connection state. Closing it ends the connection's consumer streams.
struct Connection {
    queue: Arc<SharedQueue>,
    closed: AtomicBool,
    notify: Notify,
}

impl Connection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Puts an unacked delivery back on the queue when dropped.
struct LocalAcker {
    queue: Arc<SharedQueue>,
    body: Option<Vec<u8>>,
}

impl Acknowledger for LocalAcker {
    fn ack(&mut self) -> Result<()> {
        match self.body.take() {
            Some(_) => Ok(()),
            None => Err(CalNotifyError::queue("delivery already acknowledged")),
        }
    }
}

impl Drop for LocalAcker {
    fn drop(&mut self) {
        if let Some(body) = self.body.take() {
            tracing::debug!("Requeueing unacknowledged delivery");
            self.queue.push_front(Pending { body, redelivered: true });
        }
    }
}

/// `MessageQueue` bound to one queue of a `LocalBroker`.
pub struct LocalQueue {
    name: String,
    broker: Arc<LocalBroker>,
    conn: Mutex<Option<Arc<Connection>>>,
}

impl LocalQueue {
    /// Queue `name` on the broker registered at `address`.
    pub fn new(address: &str, name: impl Into<String>) -> Self {
        Self::with_broker(LocalBroker::at(address), name)
    }

    pub fn with_broker(broker: Arc<LocalBroker>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            broker,
            conn: Mutex::new(None),
        }
    }

    pub fn broker(&self) -> &Arc<LocalBroker> {
        &self.broker
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|c| !c.is_closed())
            .ok_or_else(|| CalNotifyError::QueueNotConnected(self.name.clone()))
    }
}

async fn next_delivery(conn: &Connection) -> Option<Delivery> {
    loop {
        let queue_signal = conn.queue.notify.notified();
        let close_signal = conn.notify.notified();
        tokio::pin!(queue_signal);
        tokio::pin!(close_signal);
        queue_signal.as_mut().enable();
        close_signal.as_mut().enable();

        if conn.is_closed() {
            return None;
        }
        if let Some(message) = conn.queue.pop() {
            let tag = conn.queue.next_tag.fetch_add(1, Ordering::Relaxed);
            let acker = LocalAcker {
                queue: conn.queue.clone(),
                body: Some(message.body.clone()),
            };
            return Some(Delivery::new(message.body, tag, message.redelivered, Box::new(acker)));
        }

        tokio::select! {
            _ = &mut queue_signal => {}
            _ = &mut close_signal => {}
        }
    }
}

#[async_trait]
impl MessageQueue for LocalQueue {
    fn name(&self) -> &str { &self.name }

    async fn connect(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if conn.as_ref().is_some_and(|c| !c.is_closed()) {
            return Ok(());
        }
        *conn = Some(Arc::new(Connection {
            queue: self.broker.declare(&self.name),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }));
        tracing::info!(queue = %self.name, "Local queue connected");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(conn) = conn {
            conn.close();
            tracing::info!(queue = %self.name, "Local queue closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection().is_ok()
    }

    async fn publish_raw(&self, body: Vec<u8>) -> Result<()> {
        let conn = self.connection()?;
        conn.queue.push_back(Pending { body, redelivered: false });
        Ok(())
    }

    async fn consume(&self) -> Result<DeliveryStream> {
        let conn = self.connection()?;
        let stream = futures::stream::unfold(conn, |conn| async move {
            let delivery = next_delivery(&conn).await?;
            Some((delivery, conn))
        });
        Ok(Box::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn queue_pair(name: &str) -> (LocalQueue, LocalQueue) {
        let broker = LocalBroker::new();
        (
            LocalQueue::with_broker(broker.clone(), name),
            LocalQueue::with_broker(broker, name),
        )
    }

    #[tokio::test]
    async fn test_not_connected() {
        let (queue, _) = queue_pair("q");
        assert!(!queue.is_connected());
        assert!(matches!(queue.publish_raw(b"x".to_vec()).await, Err(CalNotifyError::QueueNotConnected(_))));
        assert!(queue.consume().await.is_err());
        // closing an unconnected queue is fine
        queue.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_then_consume_in_order() {
        let (producer, consumer) = queue_pair("orders");
        producer.connect().await.unwrap();
        consumer.connect().await.unwrap();

        for n in 0..3 {
            producer.publish_raw(format!("{n}").into_bytes()).await.unwrap();
        }
        assert_eq!(producer.broker().depth("orders"), 3);

        let mut stream = consumer.consume().await.unwrap();
        for n in 0..3 {
            let mut delivery = stream.next().await.unwrap();
            assert_eq!(delivery.body(), format!("{n}").as_bytes());
            assert!(!delivery.redelivered());
            delivery.ack().unwrap();
        }
        assert_eq!(consumer.broker().depth("orders"), 0);
    }

    #[tokio::test]
    async fn test_consumer_waits_for_publish() {
        let (producer, consumer) = queue_pair("late");
        producer.connect().await.unwrap();
        consumer.connect().await.unwrap();

        let mut stream = consumer.consume().await.unwrap();
        let waiter = tokio::spawn(async move { stream.next().await.map(|d| d.body().to_vec()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.publish_raw(b"hello".to_vec()).await.unwrap();

        let body = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(body.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_unacked_delivery_is_redelivered() {
        let (producer, consumer) = queue_pair("retry");
        producer.connect().await.unwrap();
        consumer.connect().await.unwrap();
        producer.publish_raw(b"payload".to_vec()).await.unwrap();

        let mut stream = consumer.consume().await.unwrap();
        let first = stream.next().await.unwrap();
        drop(first);

        let mut again = stream.next().await.unwrap();
        assert_eq!(again.body(), b"payload");
        assert!(again.redelivered());
        again.ack().unwrap();
        assert!(again.ack().is_err());
        drop(again);
        assert_eq!(consumer.broker().depth("retry"), 0);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (_, consumer) = queue_pair("closing");
        consumer.connect().await.unwrap();
        let mut stream = consumer.consume().await.unwrap();

        let reader = tokio::spawn(async move { stream.next().await.is_none() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        consumer.close().await.unwrap();
        consumer.close().await.unwrap();

        let ended = tokio::time::timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert!(ended);
        assert!(!consumer.is_connected());
    }

    #[tokio::test]
    async fn test_closing_producer_keeps_consumer_alive() {
        let (producer, consumer) = queue_pair("shared");
        producer.connect().await.unwrap();
        consumer.connect().await.unwrap();
        producer.publish_raw(b"one".to_vec()).await.unwrap();
        producer.close().await.unwrap();

        let mut stream = consumer.consume().await.unwrap();
        let mut delivery = stream.next().await.unwrap();
        delivery.ack().unwrap();
        assert_eq!(delivery.body(), b"one");
    }

    #[tokio::test]
    async fn test_point_to_point() {
        let broker = LocalBroker::new();
        let producer = LocalQueue::with_broker(broker.clone(), "p2p");
        let a = LocalQueue::with_broker(broker.clone(), "p2p");
        let b = LocalQueue::with_broker(broker.clone(), "p2p");
        for q in [&producer, &a, &b] {
            q.connect().await.unwrap();
        }
        producer.publish_raw(b"only-once".to_vec()).await.unwrap();

        let mut sa = a.consume().await.unwrap();
        let mut sb = b.consume().await.unwrap();
        let mut got = sa.next().await.unwrap();
        got.ack().unwrap();

        let other = tokio::time::timeout(Duration::from_millis(50), sb.next()).await;
        assert!(other.is_err(), "message must reach a single consumer");
    }

    #[tokio::test]
    async fn test_registry_shares_queues_by_address() {
        let address = format!("local://test-{}", std::process::id());
        let producer = LocalQueue::new(&address, "registry");
        let consumer = LocalQueue::new(&address, "registry");
        let elsewhere = LocalQueue::new(&format!("{address}-other"), "registry");
        producer.connect().await.unwrap();
        consumer.connect().await.unwrap();
        elsewhere.connect().await.unwrap();

        producer.publish_raw(b"x".to_vec()).await.unwrap();
        assert_eq!(consumer.broker().depth("registry"), 1);
        assert_eq!(elsewhere.broker().depth("registry"), 0);
    }

    #[tokio::test]
    async fn test_registered_broker_outlives_closed_queues() {
        let address = "local://registry-lifetime-test";
        let queue = LocalQueue::new(address, "kept");
        queue.connect().await.unwrap();
        queue.publish_raw(b"left behind".to_vec()).await.unwrap();
        queue.close().await.unwrap();
        drop(queue);

        let again = LocalBroker::at(address);
        assert!(Arc::ptr_eq(&again, &LocalBroker::at(address)));
        assert_eq!(again.depth("kept"), 1);
    }
}
