//! Panel-side [`Channel`] implementation over a frame port.
//!
//! Outbound messages are wrapped in the constant `bridge-message` envelope
//! so the host page can tell bridge traffic apart from unrelated cross-frame
//! chatter. Inbound frames are unwrapped and redistributed to every
//! registered listener unconditionally — filtering per plugin happens one
//! layer up, in the multiplexer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use devpanel_core::channel::{Channel, ChannelError, ListenerSet, MessageListener, Subscription};
use devpanel_core::protocol::codec;

use crate::port::FramePort;

/// The panel transport: messages ride the embedding frame's message port.
pub struct PanelChannel {
    port: Arc<dyn FramePort>,
    listeners: Arc<ListenerSet>,
    port_sub: Mutex<Option<Subscription>>,
    closed: AtomicBool,
}

impl PanelChannel {
    /// Wraps a frame port. One port-level subscription is installed up
    /// front; it unwraps frames and feeds this channel's listener set for
    /// the life of the channel.
    pub fn new(port: Arc<dyn FramePort>) -> Self {
        let listeners = ListenerSet::new();
        let listeners_in = Arc::clone(&listeners);
        let port_sub = port.on_frame(Arc::new(move |frame: &Value| {
            // Frames without the bridge envelope belong to other users of
            // the same port and are dropped silently.
            if let Some(message) = codec::unwrap_frame(frame) {
                listeners_in.dispatch(&message);
            }
        }));

        Self {
            port,
            listeners,
            port_sub: Mutex::new(Some(port_sub)),
            closed: AtomicBool::new(false),
        }
    }
}

impl Channel for PanelChannel {
    fn send(&self, message: Value) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.port.post(codec::wrap_frame(message))
    }

    fn on_message(&self, listener: MessageListener) -> Subscription {
        if self.closed.load(Ordering::SeqCst) {
            return Subscription::detached();
        }
        self.listeners.add(listener)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing panel channel");
        if let Some(sub) = self.port_sub.lock().expect("lock poisoned").take() {
            sub.remove();
        }
        self.listeners.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
