//! Realtime subscriptions
//!
//! A [`Subscription`] owns the task that forwards collection snapshots to a
//! callback. Callbacks of one subscription run one at a time and in order;
//! separate subscriptions interleave freely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::Watch;

/// Handle to an active subscription
///
/// Unsubscribing is idempotent and never fails. Dropping the handle
/// unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    label: &'static str,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Forward every snapshot from `rx` to `on_snapshot`, starting with the
    /// current one
    pub fn spawn<F>(label: &'static str, mut rx: Watch, mut on_snapshot: F) -> Self
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();

        let task = tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                on_snapshot(&snapshot);

                if rx.changed().await.is_err() {
                    debug!(subscription = label, "Snapshot source closed");
                    break;
                }
            }
        });

        debug!(subscription = label, "Subscribed");
        Self {
            label,
            active,
            task: Some(task),
        }
    }

    /// A handle with nothing behind it, returned when setup fails
    pub fn noop() -> Self {
        Self {
            label: "noop",
            active: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop delivering snapshots
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!(subscription = self.label, "Unsubscribed");
        }
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
