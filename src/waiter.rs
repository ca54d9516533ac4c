//! Per-path waiter registry.
//!
//! This is the store's only link to blocked readers: the store calls
//! `notify`, a long-poll or SSE handler calls `register` and awaits the
//! returned signal. The registry never holds a reference back into the
//! store — ownership is one-way (store owns registry; a waiter only ever
//! gets a wake handle), so there is no cycle to reason about.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
pub struct WaiterRegistry {
    paths: Mutex<HashMap<String, Arc<Notify>>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the wake signal for `path`, creating one if this is the first
    /// registration. Callers must snapshot a `Notified` future (via
    /// `notify.notified()`) *before* re-checking shared state, so a
    /// concurrent `notify` can't be missed between the check and the await.
    pub fn register(&self, path: &str) -> Arc<Notify> {
        self.paths
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wake every task currently awaiting `path`'s signal. At-least-once: a
    /// spurious wake (no new data) is fine, the waiter just re-reads.
    pub fn notify(&self, path: &str) {
        if let Some(notify) = self.paths.lock().get(path) {
            notify.notify_waiters();
        }
    }

    /// Drop the registration for `path`, e.g. once the stream is deleted.
    /// Waiters already holding a clone of the `Arc<Notify>` are unaffected.
    pub fn remove(&self, path: &str) {
        self.paths.lock().remove(path);
    }
}
