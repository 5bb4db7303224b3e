//! Panel lifecycle controller.
//!
//! One controller per rendered plugin panel. It owns the presentation state
//! machine and nothing else — rendering goes through the [`ViewHost`] seam,
//! messaging through the shared [`PluginClient`]:
//!
//! ```text
//!            Ready signal                    Failed signal
//! Loading ───────────────► Ready    Loading ─────────────► Error
//!    ▲                       │
//!    └──── Destroyed signal ─┘
//! ```
//!
//! On every `Ready` the controller mounts the plugin's embedded document and
//! wires a bidirectional relay between the document's own message port and
//! the multiplexer. The relay is torn down with the view and re-established
//! on every re-render; it is never carried across a `Destroyed → Ready`
//! transition.
//!
//! Several controllers may exist for one plugin (split views); they share
//! one driver/multiplexer pair, and a controller constructed after
//! readiness was already achieved renders straight into `Ready` without a
//! second handshake.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use devpanel_core::channel::Subscription;
use devpanel_core::client::PluginClient;
use devpanel_core::protocol::codec;
use devpanel_core::protocol::messages::{LifecycleSignal, PluginMessage};

use crate::discovery::PluginRecord;
use crate::port::FramePort;

// ── Rendering seam ────────────────────────────────────────────────────────────

/// A mounted plugin panel document.
pub trait PanelView: Send + Sync {
    /// The document's own message port, used by the relay.
    fn port(&self) -> Arc<dyn FramePort>;

    /// Removes the document from the host surface.
    fn dispose(&self);
}

/// The rendering surface the shell draws panels on.
///
/// Exactly one of the three render calls is active per plugin at any time;
/// the controller always tears the previous presentation down before
/// requesting the next one.
#[cfg_attr(test, mockall::automock)]
pub trait ViewHost: Send + Sync {
    /// Shows the loading placeholder for `plugin`.
    fn show_loading(&self, plugin: &str);

    /// Shows an error surface carrying `reason` verbatim.
    fn show_error(&self, plugin: &str, reason: &str);

    /// Embeds the plugin's panel document served under `path`.
    fn mount_panel(&self, plugin: &str, path: &str) -> Arc<dyn PanelView>;
}

// ── Controller ────────────────────────────────────────────────────────────────

/// Presentation state of one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelState {
    /// Waiting for the device handshake; the loading placeholder is shown.
    Loading,
    /// The plugin panel is mounted and relaying.
    Ready,
    /// The handshake failed; the diagnostic is shown verbatim.
    Error(String),
}

/// A mounted view together with its relay subscriptions.
struct MountedView {
    view_id: Uuid,
    view: Arc<dyn PanelView>,
    inbound: Subscription,
    outbound: Subscription,
}

/// Drives one plugin panel's presentation from lifecycle signals.
pub struct PanelLifecycle {
    record: PluginRecord,
    client: Arc<PluginClient>,
    host: Arc<dyn ViewHost>,
    state: Mutex<PanelState>,
    mounted: Mutex<Option<MountedView>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl PanelLifecycle {
    /// Creates a controller and renders its initial state.
    ///
    /// `initially_ready` short-circuits the loading phase for plugins whose
    /// handshake already completed — a second view for the same plugin must
    /// not wait for a readiness it cannot observe again. Must be called
    /// within a tokio runtime.
    pub fn start(
        record: PluginRecord,
        client: Arc<PluginClient>,
        host: Arc<dyn ViewHost>,
        signals: broadcast::Receiver<LifecycleSignal>,
        initially_ready: bool,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            record,
            client,
            host,
            state: Mutex::new(PanelState::Loading),
            mounted: Mutex::new(None),
            watcher: Mutex::new(None),
        });

        if initially_ready {
            controller.apply(LifecycleSignal::Ready);
        } else {
            controller.host.show_loading(&controller.record.name);
        }

        let weak = Arc::downgrade(&controller);
        let watcher = tokio::spawn(async move {
            let mut signals = signals;
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        let Some(controller) = weak.upgrade() else { break };
                        controller.apply(signal);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lagged behind lifecycle signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *controller.watcher.lock().expect("lock poisoned") = Some(watcher);

        controller
    }

    /// The current presentation state.
    pub fn state(&self) -> PanelState {
        self.state.lock().expect("lock poisoned").clone()
    }

    /// The plugin this controller presents.
    pub fn plugin(&self) -> &PluginRecord {
        &self.record
    }

    /// Tears down the view and stops watching signals. The shared client is
    /// left open — other views for the same plugin may still use it.
    pub fn shutdown(&self) {
        if let Some(handle) = self.watcher.lock().expect("lock poisoned").take() {
            handle.abort();
        }
        self.teardown_view();
    }

    // ── Transitions ───────────────────────────────────────────────────────────

    fn apply(&self, signal: LifecycleSignal) {
        self.teardown_view();
        match signal {
            LifecycleSignal::Ready => {
                let view = self
                    .host
                    .mount_panel(&self.record.name, &self.record.path);
                let mounted = self.wire_relay(view);
                debug!(plugin = %self.record.name, view_id = %mounted.view_id, "panel mounted");
                *self.mounted.lock().expect("lock poisoned") = Some(mounted);
                *self.state.lock().expect("lock poisoned") = PanelState::Ready;
            }
            LifecycleSignal::Failed { reason } => {
                self.host.show_error(&self.record.name, &reason);
                *self.state.lock().expect("lock poisoned") = PanelState::Error(reason);
            }
            LifecycleSignal::Destroyed => {
                self.host.show_loading(&self.record.name);
                *self.state.lock().expect("lock poisoned") = PanelState::Loading;
            }
        }
    }

    /// Connects the embedded document's port to the multiplexer, both ways.
    fn wire_relay(&self, view: Arc<dyn PanelView>) -> MountedView {
        let port = view.port();

        // Embedded document → bridge. The document posts complete plugin
        // messages; anything else on its port is not ours.
        let client = Arc::clone(&self.client);
        let plugin = self.record.name.clone();
        let inbound = port.on_frame(Arc::new(move |frame: &Value| {
            let Some(raw) = codec::unwrap_frame(frame) else { return };
            let Some(message) = PluginMessage::from_value(&raw) else { return };
            if message.plugin_id != plugin {
                return;
            }
            if let Err(e) = client.send(&message.kind, message.payload.clone()) {
                warn!(plugin = %plugin, error = %e, "relay send failed");
            }
        }));

        // Bridge → embedded document, every message type for this plugin.
        let port_out = Arc::clone(&port);
        let plugin_out = self.record.name.clone();
        let outbound = self.client.on_any_message(move |message: &PluginMessage| {
            let frame = codec::wrap_frame(message.to_value());
            if port_out.post(frame).is_err() {
                debug!(plugin = %plugin_out, "relay target port is gone");
            }
        });

        MountedView {
            view_id: Uuid::new_v4(),
            view,
            inbound,
            outbound,
        }
    }

    fn teardown_view(&self) {
        if let Some(mounted) = self.mounted.lock().expect("lock poisoned").take() {
            debug!(plugin = %self.record.name, view_id = %mounted.view_id, "panel unmounted");
            mounted.inbound.remove();
            mounted.outbound.remove();
            mounted.view.dispose();
        }
    }
}

impl Drop for PanelLifecycle {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().expect("lock poisoned").take() {
            handle.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
