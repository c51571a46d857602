//! Per-order mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One mutex per order id, created on demand and dropped when unused.
///
/// Work on different ids never contends. The guarded state is `()`, so a
/// poisoned lock carries no broken invariant and is simply taken over.
#[derive(Default)]
pub struct OrderLocks {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `order_id`.
    pub fn with_lock<T>(&self, order_id: &str, f: impl FnOnce() -> T) -> T {
        let entry = {
            let mut entries = self.entries();
            Arc::clone(
                entries
                    .entry(order_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        let result = {
            let _guard = entry.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only handed out under the map lock, so a count of two
        // (map + ours) means nobody else is waiting.
        let mut entries = self.entries();
        if Arc::strong_count(&entry) == 2 {
            entries.remove(order_id);
        }

        result
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
