//! Outbound notification path.
//!
//! Producers (the sweep loop, the command handler) push fixed-size records
//! without blocking; a single sender task drains them to the transport. When
//! the queue is full the oldest record is dropped: hints are advisory and the
//! peer's acks remain the source of truth.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Notify;

use crate::events::Outbound;
use crate::logging::{agg_increment, log, obj, v_str, Domain, Level};
use crate::protocol::encode;
use crate::reliability::retry::{retry_async, RetryConfig};

pub const RECORD_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record of {0} bytes exceeds {RECORD_LEN}")]
pub struct RecordError(pub usize);

/// One serialized outbound message, stored inline.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Record {
    len: u8,
    bytes: [u8; RECORD_LEN],
}

impl Record {
    pub fn from_text(text: &str) -> Result<Self, RecordError> {
        let raw = text.as_bytes();
        if raw.len() > RECORD_LEN {
            return Err(RecordError(raw.len()));
        }
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            len: raw.len() as u8,
            bytes,
        })
    }

    pub fn encode(msg: &Outbound) -> Result<Self, RecordError> {
        Self::from_text(&encode(msg))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({:?})", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Failed(String),
}

/// The wireless link to the peer application.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug)]
pub struct NotificationQueue {
    buf: Mutex<VecDeque<Record>>,
    capacity: usize,
    overflow: AtomicU64,
    ready: Notify,
    closed: AtomicBool,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            overflow: AtomicU64::new(0),
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Record>> {
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue without blocking. Returns the record evicted to make room.
    pub fn push(&self, record: Record) -> Option<Record> {
        let evicted = {
            let mut buf = self.lock();
            let evicted = if buf.len() >= self.capacity {
                buf.pop_front()
            } else {
                None
            };
            buf.push_back(record);
            evicted
        };
        if let Some(dropped) = evicted {
            let total = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
            agg_increment("overflow");
            log(
                Level::Warn,
                Domain::Notify,
                "overflow",
                obj(&[
                    ("dropped", v_str(dropped.as_str())),
                    ("kept", v_str(record.as_str())),
                    ("overflow_total", json!(total)),
                ]),
            );
        }
        self.ready.notify_one();
        evicted
    }

    /// Encode and enqueue; an oversized record is logged and skipped.
    pub fn publish(&self, msg: &Outbound) {
        match Record::encode(msg) {
            Ok(rec) => {
                self.push(rec);
            }
            Err(e) => log(
                Level::Error,
                Domain::Notify,
                "encode_failed",
                obj(&[
                    ("message", v_str(&format!("{:?}", msg))),
                    ("error", v_str(&e.to_string())),
                ]),
            ),
        }
    }

    pub fn try_pop(&self) -> Option<Record> {
        self.lock().pop_front()
    }

    /// Wait for the next record. `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Record> {
        loop {
            if let Some(rec) = self.try_pop() {
                return Some(rec);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.ready.notified().await;
        }
    }

    /// Drop everything not yet sent (the peer that wanted it is gone).
    pub fn discard_pending(&self) -> usize {
        let mut buf = self.lock();
        let n = buf.len();
        buf.clear();
        n
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_one();
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Drain `queue` into `transport` until the queue is closed.
///
/// A record that still fails after the retry budget is dropped and logged.
/// Returns the number of records delivered.
pub async fn run_sender<T>(queue: Arc<NotificationQueue>, transport: Arc<T>, retry: RetryConfig) -> u64
where
    T: Transport + ?Sized,
{
    let mut sent = 0u64;
    while let Some(rec) = queue.pop().await {
        let result = retry_async(&retry, "notify_send", || transport.send(rec.as_bytes())).await;
        match result {
            Ok(()) => {
                sent += 1;
                log(
                    Level::Debug,
                    Domain::Notify,
                    "sent",
                    obj(&[("record", v_str(rec.as_str()))]),
                );
            }
            Err(e) => log(
                Level::Warn,
                Domain::Notify,
                "send_dropped",
                obj(&[
                    ("record", v_str(rec.as_str())),
                    ("error", v_str(&e.to_string())),
                ]),
            ),
        }
    }
    log(
        Level::Info,
        Domain::Notify,
        "sender_stopped",
        obj(&[
            ("sent", json!(sent)),
            ("overflow_total", json!(queue.overflow_count())),
        ]),
    );
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SemanticEvent;

    fn rec(s: &str) -> Record {
        Record::from_text(s).unwrap()
    }

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<String>>,
        fail_first: AtomicU64,
    }

    #[async_trait]
    impl Transport for Collect {
        async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(TransportError::Failed("busy".into()));
            }
            self.seen
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
    }

    #[test]
    fn test_record_bounds() {
        assert_eq!(rec("hover:e2").as_bytes(), b"hover:e2");
        assert!(Record::from_text(&"x".repeat(RECORD_LEN)).is_ok());
        assert_eq!(
            Record::from_text(&"x".repeat(RECORD_LEN + 1)),
            Err(RecordError(RECORD_LEN + 1))
        );
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let q = NotificationQueue::new(3);
        for s in ["a", "b", "c"] {
            assert!(q.push(rec(s)).is_none());
        }
        assert_eq!(q.push(rec("d")), Some(rec("a")));
        assert_eq!(q.overflow_count(), 1);
        let drained: Vec<String> = std::iter::from_fn(|| q.try_pop())
            .map(|r| r.as_str().to_string())
            .collect();
        assert_eq!(drained, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_publish_encodes() {
        let q = NotificationQueue::new(2);
        q.publish(&SemanticEvent::Move { from: "e2".parse().unwrap(), to: "e4".parse().unwrap() }.into());
        assert_eq!(q.try_pop().unwrap().as_str(), "move:e2e4");
    }

    #[tokio::test]
    async fn test_sender_drains_in_order_and_stops_on_close() {
        let q = Arc::new(NotificationQueue::new(10));
        let t = Arc::new(Collect::default());
        q.push(rec("hover:e2"));
        q.push(rec("move:e2e4"));
        q.close();
        let sent = run_sender(q.clone(), t.clone(), RetryConfig::transport(0, 1)).await;
        assert_eq!(sent, 2);
        assert_eq!(*t.seen.lock().unwrap(), vec!["hover:e2", "move:e2e4"]);
    }

    #[tokio::test]
    async fn test_sender_retries_transient_failure() {
        let q = Arc::new(NotificationQueue::new(10));
        let t = Arc::new(Collect::default());
        t.fail_first.store(1, Ordering::SeqCst);
        q.push(rec("clear"));
        q.close();
        let sent = run_sender(q, t.clone(), RetryConfig::transport(2, 1)).await;
        assert_eq!(sent, 1);
        assert_eq!(*t.seen.lock().unwrap(), vec!["clear"]);
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_push() {
        let q = Arc::new(NotificationQueue::new(4));
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await })
        };
        tokio::task::yield_now().await;
        q.push(rec("ready_to_start"));
        let got = consumer.await.unwrap();
        assert_eq!(got.unwrap().as_str(), "ready_to_start");
    }
}
