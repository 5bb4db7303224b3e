//! Per-plugin multiplexer over the shared channel.
//!
//! One [`PluginClient`] exists per plugin identifier. It tags outgoing
//! messages with the plugin id and a message type, filters inbound traffic
//! down to its own id, and fans matching messages out to per-type listener
//! sets. Construction normally goes through
//! [`ClientRegistry`](crate::registry::ClientRegistry), which guarantees one
//! instance (and one channel-level subscription) per plugin id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, trace};

use crate::channel::{ChannelError, ListenerSet, Subscription};
use crate::protocol::messages::PluginMessage;
use crate::registry::ChannelHandle;

/// Routing layer for a single plugin over the shared channel.
pub struct PluginClient {
    plugin_id: String,
    channel: ChannelHandle,
    /// Listener sets keyed by message type; each set receives payloads only.
    kinds: Mutex<HashMap<String, Arc<ListenerSet>>>,
    /// Wildcard listeners receiving every message addressed to this plugin.
    any: Arc<ListenerSet>,
    /// The single channel-level subscription feeding this client.
    channel_sub: Mutex<Option<Subscription>>,
    closed: AtomicBool,
}

impl PluginClient {
    /// Creates a client for `plugin_id` over an acquired channel reference.
    ///
    /// Installs exactly one channel-level listener regardless of how many
    /// per-type subscriptions are added later. The listener holds only a
    /// weak reference back to the client, so dropping the client detaches it
    /// naturally.
    pub fn new(plugin_id: impl Into<String>, channel: ChannelHandle) -> Arc<Self> {
        let client = Arc::new(Self {
            plugin_id: plugin_id.into(),
            channel,
            kinds: Mutex::new(HashMap::new()),
            any: ListenerSet::new(),
            channel_sub: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&client);
        let sub = client.channel.on_message(Arc::new(move |raw: &Value| {
            if let Some(client) = weak.upgrade() {
                client.route(raw);
            }
        }));
        *client.channel_sub.lock().expect("lock poisoned") = Some(sub);

        client
    }

    /// The plugin identifier this client routes for.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Sends a typed message to the remote side. Fire-and-forget: no
    /// acknowledgement is tracked at this layer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after [`close`](Self::close), or the
    /// underlying channel's error.
    pub fn send(&self, kind: &str, payload: Value) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        let message = PluginMessage::new(self.plugin_id.clone(), kind, payload);
        self.channel.send(message.to_value())
    }

    /// Subscribes a listener to messages of one type.
    ///
    /// The listener receives the message payload. Listener identity is not
    /// deduplicated; subscribing the same function twice doubles delivery.
    pub fn on_message(
        &self,
        kind: &str,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let set = {
            let mut kinds = self.kinds.lock().expect("lock poisoned");
            Arc::clone(kinds.entry(kind.to_string()).or_insert_with(ListenerSet::new))
        };
        set.add(Arc::new(listener))
    }

    /// Subscribes a listener to every message addressed to this plugin,
    /// regardless of type. Used by the panel relay, which forwards whole
    /// messages into the embedded document.
    pub fn on_any_message(
        &self,
        listener: impl Fn(&PluginMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.any.add(Arc::new(move |raw: &Value| {
            if let Some(message) = PluginMessage::from_value(raw) {
                listener(&message);
            }
        }))
    }

    /// Routes one raw channel value through this client's filters.
    fn route(&self, raw: &Value) {
        let Some(message) = PluginMessage::from_value(raw) else {
            // Not a plugin message: the shared channel may carry traffic for
            // other consumers, so this is dropped without noise.
            trace!("discarding structurally foreign channel value");
            return;
        };
        if message.plugin_id != self.plugin_id {
            return;
        }

        self.any.dispatch(raw);

        let set = {
            let kinds = self.kinds.lock().expect("lock poisoned");
            kinds.get(&message.kind).map(Arc::clone)
        };
        if let Some(set) = set {
            set.dispatch(&message.payload);
        }
    }

    /// Tears down this client: clears every listener set, removes the
    /// channel-level subscription, and releases this client's channel
    /// reference. The underlying transport closes only when the last
    /// reference is released. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(plugin_id = %self.plugin_id, "closing plugin client");
        if let Some(sub) = self.channel_sub.lock().expect("lock poisoned").take() {
            sub.remove();
        }
        self.kinds.lock().expect("lock poisoned").clear();
        self.any.clear();
        self.channel.release();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
