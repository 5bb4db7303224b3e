//! # devpanel-shell
//!
//! Panel side of the DevPanel bridge: the half that runs in the inspector
//! front-end document.
//!
//! The shell discovers installed plugins, presents one embedded panel per
//! plugin, and relays traffic between each embedded document and the shared
//! bridge channel:
//!
//! - **`port`** – the cross-document message-port collaborator trait and an
//!   in-process loopback pair.
//! - **`channel`** – the panel-side [`Channel`](devpanel_core::channel::Channel)
//!   implementation: envelope wrapping over a frame port.
//! - **`discovery`** – manifest-marker scanning of installed packages.
//! - **`lifecycle`** – the per-panel `Loading → Ready → Error` state machine
//!   and the bidirectional relay into embedded panel documents.

pub mod channel;
pub mod discovery;
pub mod lifecycle;
pub mod port;

pub use channel::PanelChannel;
pub use discovery::{
    list_installed_plugins, DiscoveryError, DiscoveryOptions, PanelDescriptor, PluginManifest,
    PluginRecord, PLUGIN_MANIFEST,
};
pub use lifecycle::{PanelLifecycle, PanelState, PanelView, ViewHost};
pub use port::{FramePort, InProcessPort};
