//! The transport-agnostic channel contract and listener bookkeeping.
//!
//! A [`Channel`] hides the concrete transport (panel frame port or device
//! debugger binding) behind a uniform send/subscribe/close surface. The
//! multiplexer layer is written purely against this trait; it never learns
//! which side of the bridge it is running on.
//!
//! [`ListenerSet`] is the one listener registry used everywhere in the
//! workspace (raw channels, per-kind multiplexer sets, frame ports). Its
//! dispatch rules encode two invariants the rest of the system relies on:
//!
//! - Dispatch runs over a snapshot: a listener that removes itself (or any
//!   other listener) mid-pass does not affect the current pass.
//! - A panicking listener never starves the remaining listeners of the same
//!   pass; the panic is caught and logged.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use thiserror::Error;
use tracing::error;

/// Callback invoked with each inbound JSON value.
pub type MessageListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Errors surfaced by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel (or the handle it was reached through) has been closed.
    #[error("channel is closed")]
    Closed,

    /// The underlying transport rejected the message.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The message could not be serialized for the wire.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Uniform contract over one duplex transport.
///
/// Implementations must make `close` idempotent and must keep `send`
/// non-blocking; delivery is fire-and-forget at this layer.
pub trait Channel: Send + Sync {
    /// Sends one raw JSON value to the remote side.
    fn send(&self, message: Value) -> Result<(), ChannelError>;

    /// Registers a listener for every inbound value, unfiltered.
    fn on_message(&self, listener: MessageListener) -> Subscription;

    /// Detaches from the transport and releases all listeners.
    fn close(&self);
}

// ── Listener set ──────────────────────────────────────────────────────────────

struct ListenerSetInner {
    next_id: u64,
    entries: Vec<(u64, MessageListener)>,
}

/// An ordered set of listeners with snapshot dispatch and id-based removal.
pub struct ListenerSet {
    inner: Arc<Mutex<ListenerSetInner>>,
}

impl ListenerSet {
    /// Creates an empty set. Returned in an `Arc` because sets are shared
    /// between channels and the closures feeding them.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Mutex::new(ListenerSetInner {
                next_id: 0,
                entries: Vec::new(),
            })),
        })
    }

    /// Adds a listener and returns its removal handle.
    ///
    /// Listener identity is not deduplicated: adding the same function twice
    /// yields two entries and two notifications per dispatch. Callers are
    /// responsible for not double-subscribing.
    pub fn add(&self, listener: MessageListener) -> Subscription {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.entries.push((id, listener));
        Subscription {
            entries: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Invokes every listener registered at the start of this call.
    ///
    /// The entry list is snapshotted under the lock and the lock is released
    /// before any listener runs, so listeners may freely add or remove
    /// subscriptions. A panicking listener is caught and logged; the rest of
    /// the pass still runs.
    pub fn dispatch(&self, value: &Value) {
        let snapshot: Vec<(u64, MessageListener)> = {
            let inner = self.inner.lock().expect("lock poisoned");
            inner.entries.clone()
        };
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                error!(listener_id = id, "message listener panicked; continuing dispatch");
            }
        }
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.inner.lock().expect("lock poisoned").entries.clear();
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").entries.len()
    }

    /// Whether the set has no listeners.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// Removal handle for one registered listener.
///
/// Holds only a weak reference to its set's entries, so an outstanding
/// handle never keeps a closed channel's listeners alive.
pub struct Subscription {
    entries: Weak<Mutex<ListenerSetInner>>,
    id: u64,
}

impl Subscription {
    /// Stops further delivery to the associated listener.
    ///
    /// Idempotent: the second and later calls are no-ops. Safe to call from
    /// inside a listener that is currently executing.
    pub fn remove(&self) {
        if let Some(entries) = self.entries.upgrade() {
            let mut inner = entries.lock().expect("lock poisoned");
            inner.entries.retain(|(entry_id, _)| *entry_id != self.id);
        }
    }

    /// A handle that is not attached to any listener.
    ///
    /// Used by closed channels that must still honour the `on_message`
    /// contract; `remove` on a detached handle does nothing.
    pub fn detached() -> Self {
        Self {
            entries: Weak::new(),
            id: 0,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: Arc<AtomicUsize>) -> MessageListener {
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_reaches_every_listener() {
        let set = ListenerSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _a = set.add(counting_listener(Arc::clone(&count)));
        let _b = set.add(counting_listener(Arc::clone(&count)));

        set.dispatch(&json!(1));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_removed_listener_is_not_called_again() {
        let set = ListenerSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = set.add(counting_listener(Arc::clone(&count)));

        set.dispatch(&json!(1));
        sub.remove();
        set.dispatch(&json!(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let set = ListenerSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = set.add(counting_listener(Arc::clone(&count)));

        sub.remove();
        sub.remove();
        set.dispatch(&json!(1));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn test_detached_subscription_remove_is_a_noop() {
        // Must not panic even though there is no set behind it.
        Subscription::detached().remove();
    }

    #[test]
    fn test_removal_inside_listener_does_not_affect_current_pass() {
        let set = ListenerSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        // First listener removes the second one mid-dispatch.
        let victim_sub: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let victim_sub_for_remover = Arc::clone(&victim_sub);
        let _remover = set.add(Arc::new(move |_| {
            if let Some(sub) = victim_sub_for_remover.lock().unwrap().as_ref() {
                sub.remove();
            }
        }));
        let sub = set.add(counting_listener(Arc::clone(&count)));
        *victim_sub.lock().unwrap() = Some(sub);

        // The victim was registered before this dispatch began, so the
        // snapshot still includes it.
        set.dispatch(&json!(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // But the next pass no longer does.
        set.dispatch(&json!(2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_starve_the_rest() {
        let set = ListenerSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _bad = set.add(Arc::new(|_| panic!("listener blew up")));
        let _good = set.add(counting_listener(Arc::clone(&count)));

        set.dispatch(&json!(1));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_removes_all_listeners() {
        let set = ListenerSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _a = set.add(counting_listener(Arc::clone(&count)));
        let _b = set.add(counting_listener(Arc::clone(&count)));

        set.clear();
        set.dispatch(&json!(1));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_same_listener_added_twice_is_called_twice() {
        // The set does not deduplicate by identity; that is the caller's job.
        let set = ListenerSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let listener = counting_listener(Arc::clone(&count));
        let _a = set.add(Arc::clone(&listener));
        let _b = set.add(listener);

        set.dispatch(&json!(1));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
