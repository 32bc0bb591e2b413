//! C9 — `EventBus`: in-process, multi-subscriber fan-out of state/progress/
//! error/detail events, ordered per instance (§4.7).
//!
//! Replaces the source's shared publish/subscribe singleton (§9 Design
//! Notes): a single `EventBus` is constructed once and handed by reference
//! to every component that publishes; subscribers register with a bounded
//! inbox so a slow consumer cannot block the writer path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::models::{BatchStatistics, OverallTestStatus, RawTestOutcome, SubTestItem, SubTestStatus};

/// Depth of each subscriber's inbox. Overflow drops the event and logs a
/// warning rather than back-pressuring the publisher (§4.7, §5).
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StateChanged {
        instance_id: Uuid,
        old_status: OverallTestStatus,
        new_status: OverallTestStatus,
    },
    SubTestChanged {
        instance_id: Uuid,
        sub_test_item: SubTestItem,
        status: SubTestStatus,
    },
    ErrorDetail {
        instance_id: Uuid,
        message: String,
    },
    TestProgressChanged {
        batch_id: Uuid,
        completed: u32,
        total: u32,
    },
    ManualTestStatusChanged {
        instance_id: Uuid,
        sub_test_item: SubTestItem,
        status: SubTestStatus,
    },
    MonitoringData {
        instance_id: Uuid,
        readings: serde_json::Value,
    },
    /// Emitted once every instance in a batch reaches a terminal status.
    BatchSummaryChanged {
        batch_id: Uuid,
        statistics: BatchStatistics,
    },
}

impl Event {
    /// The instance this event is ordered against, if any (progress/summary
    /// events are ordered per-batch instead; see §4.7 "cross-instance
    /// ordering is not guaranteed").
    pub fn instance_id(&self) -> Option<Uuid> {
        match self {
            Event::StateChanged { instance_id, .. }
            | Event::SubTestChanged { instance_id, .. }
            | Event::ErrorDetail { instance_id, .. }
            | Event::ManualTestStatusChanged { instance_id, .. }
            | Event::MonitoringData { instance_id, .. } => Some(*instance_id),
            Event::TestProgressChanged { .. } | Event::BatchSummaryChanged { .. } => None,
        }
    }
}

/// An event envelope: the payload plus a monotonically increasing sequence
/// number assigned at publish time (§4.7 P5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq: u64,
    pub published_at: DateTime<Utc>,
    pub event: Event,
}

struct Subscriber {
    id: Uuid,
    sender: mpsc::Sender<EventEnvelope>,
}

/// In-process multi-subscriber event bus. Cheaply `Clone`-able (wraps an
/// `Arc`); hand out clones to every publisher rather than a global.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    next_seq: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                subscribers: RwLock::new(Vec::new()),
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a new subscriber and returns the receiving end of its
    /// bounded inbox plus a handle usable with `unsubscribe`.
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = Uuid::new_v4();
        self.inner
            .subscribers
            .write()
            .await
            .push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        self.inner.subscribers.write().await.retain(|s| s.id != id);
    }

    /// Publishes `event` to every current subscriber. Ordering for a single
    /// `instance_id` is guaranteed because StateManager serializes calls per
    /// instance and always awaits `publish` before returning (§4.7).
    pub async fn publish(&self, event: Event) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            seq,
            published_at: Utc::now(),
            event,
        };
        let subscribers = self.inner.subscribers.read().await;
        for sub in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.sender.try_send(envelope.clone())
            {
                warn!(
                    "事件订阅者 {} 的队列已满，丢弃事件 seq={}",
                    sub.id, envelope.seq
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_for_one_instance_arrive_in_publish_order() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe().await;
        let instance_id = Uuid::new_v4();

        for i in 0..5u32 {
            bus.publish(Event::TestProgressChanged {
                batch_id: instance_id,
                completed: i,
                total: 5,
            })
            .await;
        }

        let mut seqs = Vec::new();
        for _ in 0..5 {
            let env = rx.recv().await.unwrap();
            seqs.push(env.seq);
        }
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }

    #[tokio::test]
    async fn unsubscribed_receiver_gets_no_more_events() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe().await;
        bus.unsubscribe(id).await;
        bus.publish(Event::MonitoringData {
            instance_id: Uuid::new_v4(),
            readings: serde_json::json!({}),
        })
        .await;
        assert!(rx.recv().await.is_none());
    }
}
