//! # devpanel-core
//!
//! Shared foundation for DevPanel, the plugin bridge between an inspected
//! application process (the "device") and an inspector front-end (the
//! "panel"). Independently-built plugins exchange structured JSON messages
//! across that boundary; this crate defines everything both sides agree on.
//!
//! It has no dependency on any concrete transport, async runtime, or UI
//! surface. The pieces:
//!
//! - **`protocol`** – The wire shapes ([`PluginMessage`], the device-side
//!   domain envelope, the panel-side frame envelope) and the serialization
//!   boundaries that hide each transport's framing quirks.
//!
//! - **`channel`** – The [`Channel`] contract every transport implements,
//!   plus the listener-set machinery with its dispatch guarantees (snapshot
//!   dispatch, panic isolation, idempotent removal).
//!
//! - **`client`** – The per-plugin multiplexer: tags outbound messages with
//!   the plugin identity, filters inbound traffic, fans out per message type.
//!
//! - **`registry`** – Explicit shared ownership of the channel (reference
//!   counted, closed exactly once) and the one-client-per-plugin registry.

pub mod channel;
pub mod client;
pub mod protocol;
pub mod registry;

pub use channel::{Channel, ChannelError, ListenerSet, MessageListener, Subscription};
pub use client::PluginClient;
pub use protocol::messages::{LifecycleSignal, PluginMessage, BRIDGE_DOMAIN};
pub use registry::{ChannelHandle, ClientRegistry, SharedChannel};
