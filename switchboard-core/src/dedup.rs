//! Webhook delivery deduplication.
//!
//! Messaging platforms redeliver webhooks; routing the same message id
//! twice would bill two backend calls and double-append to memory. A
//! small bounded in-process set is enough — it is cleared wholesale
//! when full and is not correctness-critical (a dropped id only means
//! one duplicate gets through).

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

/// Bounded set of recently seen delivery ids.
pub struct DeliveryDedup {
    seen: Mutex<HashSet<String>>,
    capacity: usize,
}

impl DeliveryDedup {
    /// Create a dedup set holding at most `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    /// Record a delivery id. Returns `false` when the id was already
    /// seen (the caller should drop the delivery).
    pub fn first_seen(&self, message_id: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(message_id) {
            return false;
        }
        if seen.len() >= self.capacity {
            debug!(capacity = self.capacity, "dedup set full, clearing");
            seen.clear();
        }
        seen.insert(message_id.to_string());
        true
    }

    /// Number of ids currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether no ids are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl Default for DeliveryDedup {
    fn default() -> Self {
        Self::new(4096)
    }
}
