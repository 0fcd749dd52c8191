//! Event outbox — at-least-once, idempotent emission of lifecycle events.
//!
//! Services record events into the outbox in the same logical step as the
//! state change that produced them; a dispatcher later drains undelivered
//! entries into the job queue. Recording deduplicates by the event's
//! idempotency key, and an entry is only marked delivered when the queue
//! accepts it — a failed enqueue leaves it pending for the next drain, so
//! delivery is at-least-once and consumers must deduplicate by key.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use souqpay_types::{Result, SellerId, SettlementEvent};

/// Downstream job queue. Delivery is at-least-once; consumers deduplicate
/// by idempotency key.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, topic: &str, payload: serde_json::Value, idempotency_key: &str)
    -> Result<()>;
}

/// Fire-and-forget notification sink. Failures here never roll back the
/// state change that triggered the notification.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, seller_id: SellerId, template: &str, data: serde_json::Value) -> Result<()>;
}

/// One recorded event awaiting (or past) delivery.
#[derive(Debug, Clone)]
struct OutboxEntry {
    key: String,
    event: SettlementEvent,
    recorded_at: DateTime<Utc>,
    delivered: bool,
}

/// The settlement event outbox.
#[derive(Default)]
pub struct EventOutbox {
    entries: Mutex<Vec<OutboxEntry>>,
}

impl EventOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event. Returns `false` when an event with the same
    /// idempotency key was already recorded (replay — nothing changes).
    pub fn record(&self, event: SettlementEvent) -> bool {
        let key = event.idempotency_key();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.iter().any(|e| e.key == key) {
            tracing::debug!(key, "outbox replay ignored");
            return false;
        }
        entries.push(OutboxEntry {
            key,
            event,
            recorded_at: Utc::now(),
            delivered: false,
        });
        true
    }

    /// Deliver undelivered entries to the queue. Entries whose enqueue
    /// fails stay pending and are retried on the next drain. Returns the
    /// number delivered in this pass.
    ///
    /// The lock is not held across `enqueue`: the queue may itself record
    /// events, and a slow queue must not block recording. Two dispatchers
    /// draining at once may both deliver an entry — that is within the
    /// at-least-once contract, consumers deduplicate by key.
    pub fn dispatch(&self, queue: &dyn JobQueue) -> usize {
        let pending: Vec<(String, &'static str, serde_json::Value)> = {
            let entries = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries
                .iter()
                .filter(|e| !e.delivered)
                .filter_map(|e| match serde_json::to_value(&e.event) {
                    Ok(payload) => Some((e.key.clone(), e.event.topic(), payload)),
                    Err(err) => {
                        tracing::error!(key = e.key, %err, "outbox entry not serializable");
                        None
                    }
                })
                .collect()
        };

        let mut delivered_keys = Vec::new();
        for (key, topic, payload) in pending {
            match queue.enqueue(topic, payload, &key) {
                Ok(()) => delivered_keys.push(key),
                Err(err) => {
                    tracing::warn!(key, %err, "enqueue failed, entry stays pending");
                }
            }
        }

        let delivered = delivered_keys.len();
        if delivered > 0 {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for entry in entries.iter_mut() {
                if delivered_keys.contains(&entry.key) {
                    entry.delivered = true;
                }
            }
            tracing::debug!(delivered, "outbox dispatched");
        }
        delivered
    }

    /// Number of entries not yet delivered.
    pub fn pending_len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|e| !e.delivered)
            .count()
    }

    /// Age of the oldest undelivered entry, for monitoring.
    pub fn oldest_pending(&self) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|e| !e.delivered)
            .map(|e| e.recorded_at)
            .min()
    }
}

/// In-memory queue and notifier for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory {
    use std::sync::Mutex;

    use souqpay_types::{Result, SellerId, SouqpayError};

    use super::{JobQueue, NotificationSink};

    /// Records enqueued jobs; optionally fails the next N enqueues.
    #[derive(Default)]
    pub struct MemoryQueue {
        pub jobs: Mutex<Vec<(String, serde_json::Value, String)>>,
        pub fail_next: Mutex<usize>,
    }

    impl MemoryQueue {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next(&self, n: usize) {
            *self.fail_next.lock().unwrap() = n;
        }

        pub fn len(&self) -> usize {
            self.jobs.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl JobQueue for MemoryQueue {
        fn enqueue(
            &self,
            topic: &str,
            payload: serde_json::Value,
            idempotency_key: &str,
        ) -> Result<()> {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(SouqpayError::Internal("queue unavailable".into()));
            }
            self.jobs
                .lock()
                .unwrap()
                .push((topic.to_string(), payload, idempotency_key.to_string()));
            Ok(())
        }
    }

    /// Records notifications per seller.
    #[derive(Default)]
    pub struct MemoryNotifier {
        pub sent: Mutex<Vec<(SellerId, String, serde_json::Value)>>,
    }

    impl MemoryNotifier {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn templates_for(&self, seller_id: SellerId) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _, _)| *id == seller_id)
                .map(|(_, template, _)| template.clone())
                .collect()
        }
    }

    impl NotificationSink for MemoryNotifier {
        fn notify(
            &self,
            seller_id: SellerId,
            template: &str,
            data: serde_json::Value,
        ) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((seller_id, template.to_string(), data));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use souqpay_types::{EscrowAccountId, EscrowTxId, OrgId};

    use super::memory::MemoryQueue;
    use super::*;

    fn funded_event() -> SettlementEvent {
        SettlementEvent::EscrowFunded {
            org_id: OrgId::new(),
            account_id: EscrowAccountId::new(),
            tx_id: EscrowTxId::new(),
            amount: Decimal::new(1000, 0),
        }
    }

    #[test]
    fn record_deduplicates_by_key() {
        let outbox = EventOutbox::new();
        let event = funded_event();
        assert!(outbox.record(event.clone()));
        assert!(!outbox.record(event), "replay must be a no-op");
        assert_eq!(outbox.pending_len(), 1);
    }

    #[test]
    fn dispatch_delivers_and_marks() {
        let outbox = EventOutbox::new();
        let queue = MemoryQueue::new();
        outbox.record(funded_event());
        outbox.record(funded_event());

        assert_eq!(outbox.dispatch(&queue), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(outbox.pending_len(), 0);

        // Nothing left to deliver on the second pass.
        assert_eq!(outbox.dispatch(&queue), 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn failed_enqueue_stays_pending() {
        let outbox = EventOutbox::new();
        let queue = MemoryQueue::new();
        outbox.record(funded_event());

        queue.fail_next(1);
        assert_eq!(outbox.dispatch(&queue), 0);
        assert_eq!(outbox.pending_len(), 1, "failed delivery must stay pending");

        // Queue recovered: the entry goes out on the next drain.
        assert_eq!(outbox.dispatch(&queue), 1);
        assert_eq!(outbox.pending_len(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn queue_may_record_back_into_the_outbox() {
        // A consumer that reacts to a delivery by recording a follow-up
        // event must not deadlock the dispatcher.
        struct RecordingQueue {
            outbox: std::sync::Arc<EventOutbox>,
        }
        impl JobQueue for RecordingQueue {
            fn enqueue(
                &self,
                _topic: &str,
                _payload: serde_json::Value,
                _idempotency_key: &str,
            ) -> Result<()> {
                self.outbox.record(funded_event());
                Ok(())
            }
        }

        let outbox = std::sync::Arc::new(EventOutbox::new());
        outbox.record(funded_event());
        let queue = RecordingQueue {
            outbox: std::sync::Arc::clone(&outbox),
        };
        assert_eq!(outbox.dispatch(&queue), 1);
        assert_eq!(outbox.pending_len(), 1, "the follow-up event is recorded");
    }

    #[test]
    fn payload_carries_event_tag() {
        let outbox = EventOutbox::new();
        let queue = MemoryQueue::new();
        outbox.record(funded_event());
        outbox.dispatch(&queue);

        let jobs = queue.jobs.lock().unwrap();
        let (topic, payload, key) = &jobs[0];
        assert_eq!(topic, "settlement.escrow");
        assert_eq!(payload["type"], "escrow_funded");
        assert!(key.starts_with("escrow.funded:"));
    }
}
