//! Swap-on-write publication of graph stores.
//!
//! Readers grab an `Arc` of the current store and keep using it for the whole
//! query. A rebuild constructs a new store off to the side and publishes it in
//! one swap; in-flight queries finish against the store they started with.

use crate::graph::store::DocumentGraphStore;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Clone)]
pub struct StoreHandle {
    current: Arc<RwLock<Arc<DocumentGraphStore>>>,
}

impl StoreHandle {
    pub fn new(store: DocumentGraphStore) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(store))),
        }
    }

    /// The store published most recently.
    pub fn current(&self) -> Arc<DocumentGraphStore> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the published store, returning the previous one.
    pub fn publish(&self, store: DocumentGraphStore) -> Arc<DocumentGraphStore> {
        let next = Arc::new(store);
        // Build the index before readers can see the new store.
        next.ensure_index();
        let documents = next.len();

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, next);
        drop(guard);

        info!(
            name: "store.published",
            documents = documents,
            previous_documents = previous.len(),
            "Published graph store"
        );
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::tests::store_with;

    #[test]
    fn test_readers_keep_their_snapshot() {
        let handle = StoreHandle::new(store_with(&["a"]));
        let before = handle.current();

        let previous = handle.publish(store_with(&["a", "b"]));

        assert_eq!(before.len(), 1);
        assert_eq!(previous.len(), 1);
        assert_eq!(handle.current().len(), 2);
        assert!(!handle.current().is_index_stale());
    }
}
