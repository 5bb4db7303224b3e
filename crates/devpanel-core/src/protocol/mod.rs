//! Wire shapes and serialization boundaries shared by both bridge sides.

pub mod codec;
pub mod messages;

pub use codec::{decode_binding_payload, encode_eval_expression, unwrap_frame, wrap_frame, CodecError};
pub use messages::{
    DomainEnvelope, FrameEnvelope, LifecycleSignal, PluginMessage, BRIDGE_DOMAIN,
    FRAME_ENVELOPE_TYPE,
};
