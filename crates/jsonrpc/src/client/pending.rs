//! Bounded-window bookkeeping for "preserve foreign responses" (spec.md
//! §4.6): remembers cancelled request ids briefly so their late response is
//! dropped quietly instead of logged as unexpected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::message::MessageId;

pub const DEFAULT_TOMBSTONE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Default)]
pub struct Tombstones {
    inner: Arc<DashMap<MessageId, Instant>>,
}

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: MessageId) {
        self.inner.insert(id, Instant::now());
    }

    /// Removes and reports whether `id` was a live tombstone.
    pub fn remove(&self, id: &MessageId) -> bool {
        self.inner.remove(id).is_some()
    }

    pub fn evict_older_than(&self, window: Duration) {
        let cutoff = Instant::now();
        self.inner
            .retain(|_, inserted_at| cutoff.duration_since(*inserted_at) < window);
    }
}
