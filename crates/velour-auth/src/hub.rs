//! Notification hub for session state changes.
//!
//! Delivery is synchronous and in publish order. A subscriber sees every
//! snapshot published after it registered and nothing published before.
//! Callbacks run without any hub lock held, so they may read the manager,
//! subscribe, or unsubscribe (themselves included).

use crate::AuthState;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

type Callback = Arc<dyn Fn(&AuthState) + Send + Sync>;

struct Entry {
    id: u64,
    active: AtomicBool,
    callback: Callback,
}

#[derive(Default)]
struct HubInner {
    entries: Mutex<Vec<Arc<Entry>>>,
    next_id: AtomicU64,
}

/// Fan-out of [`AuthState`] snapshots to registered callbacks.
#[derive(Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It receives every snapshot published from now on.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let entry = Arc::new(Entry {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            callback: Arc::new(callback),
        });
        self.inner.entries.lock().push(entry.clone());

        Subscription {
            entry,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `state` to every subscriber registered before this call.
    ///
    /// Runs on the caller's thread and never suspends. A panicking callback
    /// is logged and does not prevent delivery to the others.
    pub fn publish(&self, state: &AuthState) {
        let targets: Vec<Arc<Entry>> = self.inner.entries.lock().clone();

        for entry in targets {
            // Unsubscribed by an earlier callback during this publish
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            let callback = &entry.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
                error!(
                    subscriber = entry.id,
                    phase = %state.phase(),
                    "Session subscriber panicked"
                );
            }
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Registration handle returned by [`NotificationHub::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    entry: Arc<Entry>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Stop delivery to this callback. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.entry.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.entries.lock().retain(|e| e.id != self.entry.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.entry.active.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.entry.id
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.entry.id)
            .field("active", &self.is_active())
            .finish()
    }
}
