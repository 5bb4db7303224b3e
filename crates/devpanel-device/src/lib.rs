//! # devpanel-device
//!
//! Device side of the DevPanel bridge: the half that lives inside the
//! inspected application process.
//!
//! The inspected runtime exposes a debugger-protocol dispatcher (a global
//! object) and execution-context lifecycle events; this crate drives the
//! domain handshake over that surface and keeps it alive across app reloads:
//!
//! 1. Poll for the dispatcher global (bounded probe — the dispatcher appears
//!    asynchronously after process start).
//! 2. Register the host-named binding and activate the `"bridge"` domain.
//! 3. Queue inbound traffic until readiness, then flush exactly once.
//! 4. On execution-context destruction, drop back to `Uninitialized` and
//!    re-run the whole handshake when the context is recreated, without the
//!    subscribers ever noticing beyond a `Destroyed`/`Ready` signal pair.
//!
//! Modules:
//!
//! - **`host`** – collaborator traits for the inspected runtime, plus a
//!   scriptable mock used throughout the tests.
//! - **`driver`** – the handshake state machine ([`DomainDriver`]).
//! - **`channel`** – the [`Channel`](devpanel_core::channel::Channel)
//!   adapter over the driver.

pub mod channel;
pub mod driver;
pub mod host;

pub use channel::DeviceChannel;
pub use driver::{DomainDriver, DomainState, DriverConfig, DriverError};
pub use host::{BindingCallback, ContextEvent, HostDispatcher, HostError, InspectorHost};
