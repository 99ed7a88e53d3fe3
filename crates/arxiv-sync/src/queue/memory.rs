use arxiv_sync_common::{Result, SyncError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use super::{ChunkMessage, ChunkQueue, RawDelivery};

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<String>,
    in_flight: HashMap<String, String>,
    published: usize,
    acked: usize,
    fail_publish: bool,
}

/// In-memory [`ChunkQueue`] with visibility semantics
///
/// Received messages move to an in-flight set until acknowledged;
/// [`requeue_unacked`](Self::requeue_unacked) simulates the visibility
/// timeout expiring.
#[derive(Debug, Default)]
pub struct InMemoryChunkQueue {
    inner: Mutex<Inner>,
}

impl InMemoryChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a raw body, bypassing [`ChunkQueue::publish`]
    pub fn push_raw(&self, body: impl Into<String>) {
        self.lock().ready.push_back(body.into());
    }

    pub fn fail_publish(&self, fail: bool) {
        self.lock().fail_publish = fail;
    }

    /// Return every unacknowledged in-flight message to the ready queue
    pub fn requeue_unacked(&self) -> usize {
        let mut inner = self.lock();
        let bodies: Vec<String> = inner.in_flight.drain().map(|(_, body)| body).collect();
        let count = bodies.len();
        inner.ready.extend(bodies);
        count
    }

    pub fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn published(&self) -> usize {
        self.lock().published
    }

    pub fn acked(&self) -> usize {
        self.lock().acked
    }
}

#[async_trait]
impl ChunkQueue for InMemoryChunkQueue {
    async fn publish(&self, message: &ChunkMessage) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let mut inner = self.lock();
        if inner.fail_publish {
            return Err(SyncError::Queue("Injected publish failure".into()));
        }
        inner.ready.push_back(body);
        inner.published += 1;
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<RawDelivery>> {
        let mut inner = self.lock();
        let mut deliveries = Vec::new();

        while deliveries.len() < max {
            let Some(body) = inner.ready.pop_front() else { break };
            let receipt = Uuid::new_v4().to_string();
            inner.in_flight.insert(receipt.clone(), body.clone());
            deliveries.push(RawDelivery { body, receipt });
        }

        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.in_flight.remove(receipt).is_none() {
            return Err(SyncError::Queue(format!("Unknown receipt handle: {}", receipt)));
        }
        inner.acked += 1;
        Ok(())
    }
}
