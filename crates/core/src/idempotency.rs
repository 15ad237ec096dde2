use std::collections::HashSet;
use std::sync::Mutex;

use crate::types::TriggerType;

/// Composite key identifying one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    pub trigger: TriggerType,
    pub event_id: i64,
    pub updated_at: String,
}

impl DeliveryKey {
    pub fn new(trigger: TriggerType, event_id: i64, updated_at: impl Into<String>) -> Self {
        Self {
            trigger,
            event_id,
            updated_at: updated_at.into(),
        }
    }
}

/// Process-local cache of deliveries that have already been handled.
///
/// This is an optimization to skip redundant upstream fetches on platform
/// redeliveries. It is not race-free across concurrent requests and it does
/// not survive restarts; the POS-side existence check stays the
/// authoritative duplicate-order guard.
#[derive(Debug, Default)]
pub struct IdempotencyGuard {
    seen: Mutex<HashSet<DeliveryKey>>,
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the key has already been handled.
    pub fn contains(&self, key: &DeliveryKey) -> bool {
        self.seen.lock().expect("idempotency guard").contains(key)
    }

    /// Marks the key as handled for the remainder of the process lifetime.
    pub fn register(&self, key: &DeliveryKey) {
        self.seen
            .lock()
            .expect("idempotency guard")
            .insert(key.clone());
    }
}
