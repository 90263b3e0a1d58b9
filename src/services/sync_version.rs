//! Process-wide monotonic sequence counter shared by the change log and
//! the message bus. A single `tokio::sync::Mutex` serializes allocation so
//! two concurrent writers never hand out the same number.

use std::sync::Arc;

use tokio::sync::Mutex;

#[derive(Clone)]
pub struct SyncVersionCounter {
    inner: Arc<Mutex<u64>>,
}

impl SyncVersionCounter {
    pub fn starting_at(value: u64) -> Self {
        Self { inner: Arc::new(Mutex::new(value)) }
    }

    /// Allocate and return the next sequence number.
    pub async fn next(&self) -> u64 {
        let mut guard = self.inner.lock().await;
        *guard += 1;
        *guard
    }

    pub async fn current(&self) -> u64 {
        *self.inner.lock().await
    }
}
