//! Collaborator surface of the inspected runtime.
//!
//! The device side of the bridge does not own any transport of its own: the
//! host runtime exposes a debugger-protocol dispatcher (a global object in
//! the inspected process) and a stream of execution-context lifecycle
//! events. These traits describe exactly that surface and nothing more, so
//! the handshake driver can be exercised against the [`mock`] implementation
//! without a live inspector.
//!
//! The dispatcher may appear *after* the bridge starts (the classic startup
//! race); that is why [`InspectorHost::dispatcher`] returns an `Option` and
//! the driver polls it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

pub mod mock;

/// Callback registered for invocations of the host binding. The argument is
/// the raw payload string exactly as the host delivered it.
pub type BindingCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Lifecycle events for the host's execution contexts, scoped by name.
///
/// Only one primary context exists in practice; the driver filters on the
/// configured context name and ignores the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// A context with the given name was (re)created.
    Created { name: String },
    /// The context with the given name was torn down.
    Destroyed { name: String },
}

/// Errors surfaced by the host dispatcher.
#[derive(Debug, Error)]
pub enum HostError {
    /// The binding callback could not be registered.
    #[error("binding registration failed: {0}")]
    Binding(String),

    /// The named domain could not be activated on the dispatcher.
    #[error("domain activation failed: {0}")]
    DomainInit(String),

    /// The host rejected an evaluation request.
    #[error("host evaluation failed: {0}")]
    Evaluate(String),
}

/// The debugger-protocol dispatcher global exposed by the inspected runtime.
pub trait HostDispatcher: Send + Sync {
    /// The name of the binding the host expects callbacks to be registered
    /// under. `None` or an empty string means the host is misconfigured;
    /// the driver treats both as a fatal construction error.
    fn binding_name(&self) -> Option<String>;

    /// Registers `callback` for invocations of the named binding.
    fn register_binding(&self, name: &str, callback: BindingCallback) -> Result<(), HostError>;

    /// Activates the named domain. Inbound traffic for the domain is only
    /// accepted by the host after this call.
    fn initialize_domain(&self, domain: &str) -> Result<(), HostError>;

    /// Evaluates a source-level expression in the inspected context.
    /// Outbound bridge traffic travels through here (see the codec's
    /// double-encoding boundary).
    fn evaluate(&self, expression: &str) -> Result<(), HostError>;
}

/// The host runtime the device bridge runs inside.
pub trait InspectorHost: Send + Sync {
    /// Whether this environment exposes an inspector at all. `false` means
    /// the device transport cannot be constructed here; callers treat this
    /// as "feature unavailable", not an error to retry.
    fn is_available(&self) -> bool;

    /// The dispatcher global, if it exists yet. Appears asynchronously some
    /// time after process start.
    fn dispatcher(&self) -> Option<Arc<dyn HostDispatcher>>;

    /// Subscribes to execution-context created/destroyed events.
    fn context_events(&self) -> broadcast::Receiver<ContextEvent>;
}
