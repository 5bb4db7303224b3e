//! Mock inspector host for unit testing.
//!
//! Lets tests stand in for the inspected runtime without a live debugger
//! attachment: install or remove the dispatcher to script the readiness
//! race, invoke the registered binding to inject inbound traffic, and emit
//! context events to simulate app reloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::{BindingCallback, ContextEvent, HostDispatcher, HostError, InspectorHost};

/// Default binding name advertised by [`MockDispatcher::new`].
pub const MOCK_BINDING_NAME: &str = "__devpanelBinding";

/// A scriptable implementation of [`HostDispatcher`].
pub struct MockDispatcher {
    binding_name: Option<String>,
    registered: Mutex<Option<(String, BindingCallback)>>,
    domains: Mutex<Vec<String>>,
    evaluated: Mutex<Vec<String>>,
    fail_domain_init: AtomicBool,
}

impl MockDispatcher {
    /// Creates a dispatcher advertising the default binding name.
    pub fn new() -> Arc<Self> {
        Self::with_binding_name(Some(MOCK_BINDING_NAME))
    }

    /// Creates a dispatcher advertising an arbitrary (possibly missing or
    /// empty) binding name, for misconfiguration tests.
    pub fn with_binding_name(name: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            binding_name: name.map(str::to_string),
            registered: Mutex::new(None),
            domains: Mutex::new(Vec::new()),
            evaluated: Mutex::new(Vec::new()),
            fail_domain_init: AtomicBool::new(false),
        })
    }

    /// Makes subsequent `initialize_domain` calls fail.
    pub fn set_fail_domain_init(&self, fail: bool) {
        self.fail_domain_init.store(fail, Ordering::SeqCst);
    }

    /// Invokes the registered binding callback with a raw payload, as the
    /// host would on inbound traffic. Returns `false` if no callback has
    /// been registered yet.
    pub fn invoke_binding(&self, payload: &str) -> bool {
        let callback = {
            let registered = self.registered.lock().expect("lock poisoned");
            registered.as_ref().map(|(_, cb)| Arc::clone(cb))
        };
        match callback {
            Some(cb) => {
                cb(payload);
                true
            }
            None => false,
        }
    }

    /// Name the bridge registered its callback under, if any.
    pub fn registered_binding(&self) -> Option<String> {
        self.registered
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|(name, _)| name.clone())
    }

    /// Domains activated so far, in order.
    pub fn initialized_domains(&self) -> Vec<String> {
        self.domains.lock().expect("lock poisoned").clone()
    }

    /// Expressions handed to `evaluate`, in order.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().expect("lock poisoned").clone()
    }
}

impl HostDispatcher for MockDispatcher {
    fn binding_name(&self) -> Option<String> {
        self.binding_name.clone()
    }

    fn register_binding(&self, name: &str, callback: BindingCallback) -> Result<(), HostError> {
        *self.registered.lock().expect("lock poisoned") = Some((name.to_string(), callback));
        Ok(())
    }

    fn initialize_domain(&self, domain: &str) -> Result<(), HostError> {
        if self.fail_domain_init.load(Ordering::SeqCst) {
            return Err(HostError::DomainInit(format!(
                "domain '{domain}' rejected by mock"
            )));
        }
        self.domains
            .lock()
            .expect("lock poisoned")
            .push(domain.to_string());
        Ok(())
    }

    fn evaluate(&self, expression: &str) -> Result<(), HostError> {
        self.evaluated
            .lock()
            .expect("lock poisoned")
            .push(expression.to_string());
        Ok(())
    }
}

/// A scriptable implementation of [`InspectorHost`].
pub struct MockInspectorHost {
    available: bool,
    dispatcher: Mutex<Option<Arc<MockDispatcher>>>,
    events: broadcast::Sender<ContextEvent>,
}

impl MockInspectorHost {
    /// An available host with no dispatcher installed yet (the startup race
    /// in its initial position).
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            available: true,
            dispatcher: Mutex::new(None),
            events,
        })
    }

    /// A host with no inspector at all, for platform-unsupported tests.
    pub fn unavailable() -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            available: false,
            dispatcher: Mutex::new(None),
            events,
        })
    }

    /// Installs (or replaces) the dispatcher global.
    pub fn install_dispatcher(&self, dispatcher: Arc<MockDispatcher>) {
        *self.dispatcher.lock().expect("lock poisoned") = Some(dispatcher);
    }

    /// Removes the dispatcher global, as happens when the inspected context
    /// is torn down.
    pub fn remove_dispatcher(&self) {
        *self.dispatcher.lock().expect("lock poisoned") = None;
    }

    /// The currently installed mock dispatcher, for assertions.
    pub fn dispatcher_handle(&self) -> Option<Arc<MockDispatcher>> {
        self.dispatcher.lock().expect("lock poisoned").clone()
    }

    /// Emits an execution-context-created event.
    pub fn emit_context_created(&self, name: &str) {
        let _ = self.events.send(ContextEvent::Created {
            name: name.to_string(),
        });
    }

    /// Emits an execution-context-destroyed event.
    pub fn emit_context_destroyed(&self, name: &str) {
        let _ = self.events.send(ContextEvent::Destroyed {
            name: name.to_string(),
        });
    }
}

impl InspectorHost for MockInspectorHost {
    fn is_available(&self) -> bool {
        self.available
    }

    fn dispatcher(&self) -> Option<Arc<dyn HostDispatcher>> {
        self.dispatcher
            .lock()
            .expect("lock poisoned")
            .clone()
            .map(|d| d as Arc<dyn HostDispatcher>)
    }

    fn context_events(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
