//! In-process bus.
//!
//! Every registration owns a bounded FIFO queue drained by its own tokio
//! task. Deliveries to one consumer are therefore ordered per publisher,
//! while different consumers run concurrently. A full queue drops the
//! payload: fan-out is best-effort.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use super::{Bus, BusHandler, ConsumerHandle, Payload};
use crate::error::BusError;

struct Registration {
    id: u64,
    tx: mpsc::Sender<Payload>,
}

/// Single-process implementation of [`Bus`].
pub struct LocalBus {
    topics: DashMap<String, Vec<Registration>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl LocalBus {
    /// Create a bus whose consumer queues hold `queue_capacity` payloads.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Number of topics with at least one consumer.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Number of live registrations on `topic`.
    #[cfg(test)]
    pub fn consumer_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |regs| regs.len())
    }
}

impl Bus for LocalBus {
    fn register(
        &self,
        topic: &str,
        handler: Arc<dyn BusHandler>,
    ) -> Result<ConsumerHandle, BusError> {
        if topic.is_empty() || topic.ends_with('.') {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime(topic.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ConsumerHandle::new(id, topic);
        let (tx, mut rx) = mpsc::channel::<Payload>(self.queue_capacity);

        let consumer = handle.clone();
        runtime.spawn(async move {
            while let Some(payload) = rx.recv().await {
                trace!(consumer = %consumer, handler = handler.name(), kind = payload.kind(), "Delivering payload");
                handler.handle(payload).await;
            }
            trace!(consumer = %consumer, "Consumer queue closed");
        });

        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(Registration { id, tx });
        debug!(consumer = %handle, "Registered bus consumer");
        Ok(handle)
    }

    fn unregister(&self, handle: &ConsumerHandle) {
        let now_empty = match self.topics.get_mut(handle.topic()) {
            Some(mut regs) => {
                regs.retain(|r| r.id != handle.id());
                regs.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.topics.remove_if(handle.topic(), |_, regs| regs.is_empty());
        }
        debug!(consumer = %handle, "Unregistered bus consumer");
    }

    fn publish(&self, topic: &str, payload: Payload) -> usize {
        let Some(regs) = self.topics.get(topic) else {
            trace!(%topic, "No consumers for topic");
            return 0;
        };

        let mut queued = 0;
        for reg in regs.iter() {
            match reg.tx.try_send(payload.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%topic, consumer = reg.id, "Consumer queue full, dropping payload");
                    crate::metrics::record_bus_drop();
                }
                // Task already gone; the registration is about to be removed.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        queued
    }
}
