//! Reference-counted channel ownership and the per-plugin client registry.
//!
//! The channel is shared by every plugin client in a context, so no single
//! client may tear it down while others still use it. [`SharedChannel`]
//! makes the ownership explicit: each consumer holds a [`ChannelHandle`],
//! and the underlying transport's `close` runs exactly once, when the last
//! handle is released.
//!
//! [`ClientRegistry`] memoizes one [`PluginClient`] per plugin identifier so
//! that repeated requests — including requests racing during construction —
//! observe a single instance and a single channel-level subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::channel::{Channel, ChannelError, MessageListener, Subscription};
use crate::client::PluginClient;

// ── Shared channel ────────────────────────────────────────────────────────────

/// Explicit shared ownership of one channel.
///
/// Cloning is deliberately not implemented; consumers acquire handles so
/// every reference is visible in the count.
pub struct SharedChannel {
    inner: Arc<dyn Channel>,
    refs: Arc<AtomicUsize>,
}

impl SharedChannel {
    /// Wraps a channel with a reference count of zero. The channel stays
    /// open until at least one handle has been acquired and all handles have
    /// been released.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            inner: channel,
            refs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquires a new counted reference to the channel.
    pub fn acquire(&self) -> ChannelHandle {
        self.refs.fetch_add(1, Ordering::SeqCst);
        ChannelHandle {
            inner: Arc::clone(&self.inner),
            refs: Arc::clone(&self.refs),
            released: AtomicBool::new(false),
        }
    }

    /// Current number of outstanding handles.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }
}

/// One counted reference to a [`SharedChannel`].
///
/// Dropping the handle releases it; [`release`](Self::release) may also be
/// called explicitly. Either way the release happens once, and the final
/// release closes the underlying channel.
pub struct ChannelHandle {
    inner: Arc<dyn Channel>,
    refs: Arc<AtomicUsize>,
    released: AtomicBool,
}

impl ChannelHandle {
    /// Sends through the shared channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if this handle was already released.
    pub fn send(&self, message: Value) -> Result<(), ChannelError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.inner.send(message)
    }

    /// Subscribes to the shared channel's inbound traffic.
    ///
    /// A released handle returns a detached subscription rather than
    /// re-attaching to a channel it no longer owns a share of.
    pub fn on_message(&self, listener: MessageListener) -> Subscription {
        if self.released.load(Ordering::SeqCst) {
            return Subscription::detached();
        }
        self.inner.on_message(listener)
    }

    /// Releases this reference. The underlying channel's `close` runs only
    /// when this was the last outstanding handle. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            debug!("last channel reference released; closing transport");
            self.inner.close();
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Client registry ───────────────────────────────────────────────────────────

/// One multiplexer instance per plugin identifier over a shared channel.
///
/// The registry itself holds an owner handle, so client churn (every client
/// closing) never tears down the transport; that happens only at
/// [`dispose`](Self::dispose).
pub struct ClientRegistry {
    shared: SharedChannel,
    owner: ChannelHandle,
    clients: Mutex<HashMap<String, Arc<PluginClient>>>,
    disposed: AtomicBool,
}

impl ClientRegistry {
    /// Takes ownership of a channel and prepares an empty registry.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        let shared = SharedChannel::new(channel);
        let owner = shared.acquire();
        Self {
            shared,
            owner,
            clients: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns the client for `plugin_id`, constructing it on first request.
    ///
    /// Construction happens under the registry lock, so two callers racing
    /// for the same identifier observe one instance and one handshake — never
    /// two.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after [`dispose`](Self::dispose).
    pub fn client(&self, plugin_id: &str) -> Result<Arc<PluginClient>, ChannelError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        let mut clients = self.clients.lock().expect("lock poisoned");
        if let Some(existing) = clients.get(plugin_id) {
            return Ok(Arc::clone(existing));
        }
        debug!(plugin_id, "creating plugin client");
        let client = PluginClient::new(plugin_id, self.shared.acquire());
        clients.insert(plugin_id.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Closes and forgets the client for `plugin_id`, releasing its channel
    /// reference. Returns whether such a client existed.
    pub fn close_client(&self, plugin_id: &str) -> bool {
        let removed = self
            .clients
            .lock()
            .expect("lock poisoned")
            .remove(plugin_id);
        match removed {
            Some(client) => {
                client.close();
                true
            }
            None => false,
        }
    }

    /// Number of live clients.
    pub fn active_clients(&self) -> usize {
        self.clients.lock().expect("lock poisoned").len()
    }

    /// Current channel reference count (clients plus the registry's own
    /// owner reference).
    pub fn channel_refs(&self) -> usize {
        self.shared.ref_count()
    }

    /// Closes every client and releases the owner reference, tearing down
    /// the transport. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<Arc<PluginClient>> = self
            .clients
            .lock()
            .expect("lock poisoned")
            .drain()
            .map(|(_, client)| client)
            .collect();
        for client in drained {
            client.close();
        }
        self.owner.release();
    }
}

impl Drop for ClientRegistry {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ListenerSet;
    use serde_json::json;

    /// Minimal channel whose only observable behaviour is whether `close`
    /// ran.
    struct CloseTrackingChannel {
        listeners: Arc<ListenerSet>,
        close_calls: AtomicUsize,
    }

    impl CloseTrackingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                listeners: ListenerSet::new(),
                close_calls: AtomicUsize::new(0),
            })
        }

        fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }
    }

    impl Channel for CloseTrackingChannel {
        fn send(&self, _message: Value) -> Result<(), ChannelError> {
            Ok(())
        }

        fn on_message(&self, listener: MessageListener) -> Subscription {
            self.listeners.add(listener)
        }

        fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            self.listeners.clear();
        }
    }

    #[test]
    fn test_same_plugin_id_returns_same_instance() {
        let channel = CloseTrackingChannel::new();
        let registry = ClientRegistry::new(channel as Arc<dyn Channel>);

        let a = registry.client("p1").unwrap();
        let b = registry.client("p1").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.active_clients(), 1);
    }

    #[test]
    fn test_distinct_plugin_ids_get_distinct_clients() {
        let channel = CloseTrackingChannel::new();
        let registry = ClientRegistry::new(channel as Arc<dyn Channel>);

        let a = registry.client("a").unwrap();
        let b = registry.client("b").unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.active_clients(), 2);
    }

    #[test]
    fn test_one_client_closing_does_not_close_the_transport() {
        let channel = CloseTrackingChannel::new();
        let registry = ClientRegistry::new(Arc::clone(&channel) as Arc<dyn Channel>);

        let _keep = registry.client("keep").unwrap();
        registry.close_client("gone");
        let _ = registry.client("gone").unwrap();
        registry.close_client("gone");

        // "keep" and the registry's owner reference are still outstanding.
        assert_eq!(channel.close_calls(), 0);
    }

    #[test]
    fn test_dispose_closes_transport_exactly_once() {
        let channel = CloseTrackingChannel::new();
        let registry = ClientRegistry::new(Arc::clone(&channel) as Arc<dyn Channel>);

        let _a = registry.client("a").unwrap();
        let _b = registry.client("b").unwrap();

        registry.dispose();
        registry.dispose();

        assert_eq!(channel.close_calls(), 1);
        assert!(matches!(registry.client("a"), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_handle_release_is_idempotent() {
        let channel = CloseTrackingChannel::new();
        let shared = SharedChannel::new(Arc::clone(&channel) as Arc<dyn Channel>);

        let first = shared.acquire();
        let second = shared.acquire();
        assert_eq!(shared.ref_count(), 2);

        first.release();
        first.release();
        assert_eq!(shared.ref_count(), 1);
        assert_eq!(channel.close_calls(), 0);

        second.release();
        assert_eq!(channel.close_calls(), 1);
    }

    #[test]
    fn test_dropping_a_handle_releases_it() {
        let channel = CloseTrackingChannel::new();
        let shared = SharedChannel::new(Arc::clone(&channel) as Arc<dyn Channel>);

        {
            let _handle = shared.acquire();
            assert_eq!(shared.ref_count(), 1);
        }

        assert_eq!(shared.ref_count(), 0);
        assert_eq!(channel.close_calls(), 1);
    }

    #[test]
    fn test_released_handle_rejects_send_and_detaches_subscriptions() {
        let channel = CloseTrackingChannel::new();
        let shared = SharedChannel::new(Arc::clone(&channel) as Arc<dyn Channel>);

        let handle = shared.acquire();
        handle.release();

        assert!(matches!(handle.send(json!(1)), Err(ChannelError::Closed)));
        // Detached subscription: removing it must be a harmless no-op.
        handle.on_message(Arc::new(|_| {})).remove();
    }
}
