//! Wire shapes shared by both sides of the bridge.
//!
//! Every message that crosses the bridge is JSON. There are three nested
//! shapes, innermost first:
//!
//! - [`PluginMessage`] — what plugin code sends and receives: a routing key
//!   (`pluginId` + `type`) plus an arbitrary JSON payload.
//! - [`DomainEnvelope`] — device-side framing: a plugin message wrapped with
//!   the logical domain name before it crosses the debugger-protocol binding.
//! - [`FrameEnvelope`] — panel-side framing: a plugin message wrapped with a
//!   constant marker type so the host page can tell bridge traffic apart from
//!   unrelated cross-frame chatter.
//!
//! The bridge enforces no schema on `payload` beyond it being JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Protocol constants ────────────────────────────────────────────────────────

/// The single logical domain multiplexed over the debugger-protocol binding.
///
/// The domain abstraction supports more than one name, but only this one is
/// defined.
pub const BRIDGE_DOMAIN: &str = "bridge";

/// Envelope marker for panel-side cross-document frames.
pub const FRAME_ENVELOPE_TYPE: &str = "bridge-message";

// ── Plugin message ────────────────────────────────────────────────────────────

/// A routed message exchanged between a plugin's device code and its panel UI.
///
/// `plugin_id` and `kind` together form the routing key. The multiplexer
/// filters on `plugin_id` and fans out on `kind`; the payload travels opaque.
///
/// # Serde representation
///
/// ```json
/// {"pluginId":"profiler","type":"sample","payload":{"ms":16}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMessage {
    /// Identifier of the plugin this message belongs to.
    #[serde(rename = "pluginId")]
    pub plugin_id: String,
    /// Message type within the plugin's own vocabulary.
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary JSON payload. Absent payloads deserialize to `null`.
    #[serde(default)]
    pub payload: Value,
}

impl PluginMessage {
    /// Builds a message addressed to `plugin_id` with the given type and payload.
    pub fn new(
        plugin_id: impl Into<String>,
        kind: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            kind: kind.into(),
            payload,
        }
    }

    /// Attempts to interpret a raw JSON value as a plugin message.
    ///
    /// Returns `None` when the value does not structurally match — the caller
    /// is expected to discard such traffic silently, since the shared channel
    /// may carry frames for other consumers.
    pub fn from_value(raw: &Value) -> Option<Self> {
        serde_json::from_value(raw.clone()).ok()
    }

    /// Serializes this message to a raw JSON value.
    ///
    /// Serialization of these shapes cannot fail: every field is either a
    /// string or already a `Value`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("PluginMessage serialization is infallible")
    }
}

// ── Device-side envelope ──────────────────────────────────────────────────────

/// Framing for traffic crossing the debugger-protocol binding.
///
/// Inbound binding invocations carry one of these as a JSON string; envelopes
/// whose `domain` is not the registered one are ignored by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEnvelope {
    /// Name of the logical sub-channel, normally [`BRIDGE_DOMAIN`].
    pub domain: String,
    /// The wrapped plugin message, kept as raw JSON.
    pub message: Value,
}

// ── Panel-side envelope ───────────────────────────────────────────────────────

/// Framing for traffic crossing the panel's cross-document message port.
///
/// The `type` field is always [`FRAME_ENVELOPE_TYPE`]; frames with any other
/// marker belong to someone else and are dropped without logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEnvelope {
    /// Envelope marker, always [`FRAME_ENVELOPE_TYPE`] for bridge traffic.
    #[serde(rename = "type")]
    pub kind: String,
    /// The wrapped plugin message, kept as raw JSON.
    pub payload: Value,
}

// ── Lifecycle signals ─────────────────────────────────────────────────────────

/// Signals broadcast by the device handshake driver to panel lifecycle
/// controllers.
///
/// `Ready` and `Destroyed` may alternate many times over one session as the
/// inspected execution context is torn down and recreated; `Failed` is fired
/// at most once per failed handshake attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The domain completed its handshake; queued traffic has been flushed.
    Ready,
    /// The handshake failed; `reason` is suitable for direct display.
    Failed {
        /// Human-readable diagnostic, rendered verbatim by the panel.
        reason: String,
    },
    /// The inspected execution context went away; a new handshake will run
    /// when the context is recreated.
    Destroyed,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
