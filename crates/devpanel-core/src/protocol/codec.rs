//! Serialization boundaries for both transports.
//!
//! All encoding quirks live here so call sites never see them:
//!
//! - The device transport executes outbound traffic as a *source-level
//!   expression string* handed to the host's evaluation primitive. That
//!   forces double encoding: the `{domain, message}` envelope is serialized
//!   to JSON, and the resulting string is then escaped again as a JSON string
//!   literal so it survives embedding in the expression. A transport with a
//!   structured-clone channel could skip [`encode_eval_expression`] entirely
//!   without touching any call site.
//! - The panel transport wraps messages in a `{type, payload}` frame before
//!   posting them across the document boundary; [`unwrap_frame`] drops
//!   foreign frames.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{DomainEnvelope, FrameEnvelope, FRAME_ENVELOPE_TYPE};

/// Global receiver function the device-side expression evaluates into.
///
/// The inspected page installs this function; the driver never checks for it
/// explicitly because the expression itself guards on its presence.
pub const EVAL_RECEIVER: &str = "globalThis.__devpanelReceiveMessage";

/// Errors produced at the serialization boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An inbound binding payload was not a valid `{domain, message}` envelope.
    ///
    /// This indicates a host/bridge protocol mismatch and is unrecoverable
    /// for the current session.
    #[error("malformed domain envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// An outbound envelope could not be serialized.
    #[error("envelope serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

// ── Device-side boundary ──────────────────────────────────────────────────────

/// Encodes one outbound message as an expression string for the host
/// evaluation primitive.
///
/// The message is wrapped in a [`DomainEnvelope`], serialized, escaped as a
/// JSON string literal, and spliced into a call of [`EVAL_RECEIVER`]. The
/// guard (`f && f(...)`) makes the expression a no-op when the receiver has
/// not been installed yet, which tolerates teardown races on the host side.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if the envelope cannot be serialized.
pub fn encode_eval_expression(domain: &str, message: &Value) -> Result<String, CodecError> {
    let envelope = DomainEnvelope {
        domain: domain.to_string(),
        message: message.clone(),
    };
    let serialized = serde_json::to_string(&envelope).map_err(CodecError::Serialize)?;
    // Second pass: escape the serialized envelope as a JSON string literal.
    let literal = serde_json::to_string(&serialized).map_err(CodecError::Serialize)?;
    Ok(format!("{EVAL_RECEIVER} && {EVAL_RECEIVER}({literal})"))
}

/// Parses one inbound binding invocation payload into a [`DomainEnvelope`].
///
/// The binding hands us the serialized envelope directly (single-encoded —
/// the double encoding only exists on the outbound evaluation path).
///
/// # Errors
///
/// Returns [`CodecError::MalformedEnvelope`] if the payload is not valid
/// JSON or does not match the envelope shape.
pub fn decode_binding_payload(raw: &str) -> Result<DomainEnvelope, CodecError> {
    serde_json::from_str(raw).map_err(CodecError::MalformedEnvelope)
}

// ── Panel-side boundary ───────────────────────────────────────────────────────

/// Wraps a message in the cross-document frame envelope.
pub fn wrap_frame(message: Value) -> Value {
    serde_json::to_value(FrameEnvelope {
        kind: FRAME_ENVELOPE_TYPE.to_string(),
        payload: message,
    })
    .expect("FrameEnvelope serialization is infallible")
}

/// Extracts the message from a cross-document frame.
///
/// Returns `None` for frames that are not bridge traffic (wrong shape or
/// wrong `type` marker); such frames belong to other users of the same
/// messaging mechanism and are dropped without logging.
pub fn unwrap_frame(frame: &Value) -> Option<Value> {
    let envelope: FrameEnvelope = serde_json::from_value(frame.clone()).ok()?;
    if envelope.kind != FRAME_ENVELOPE_TYPE {
        return None;
    }
    Some(envelope.payload)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
