//! Domain handshake driver for the device side.
//!
//! The driver owns the logical `"bridge"` domain multiplexed over the host's
//! debugger-protocol binding and keeps it alive across execution-context
//! churn. Its life revolves around one state machine:
//!
//! ```text
//! Uninitialized ──(handshake starts)──► WaitingForHostReady ──► Ready
//!       ▲                                                        │
//!       └────────────(execution context destroyed)───────────────┘
//! ```
//!
//! A handshake attempt runs in four steps:
//!
//! 1. **Readiness probe** – poll for the dispatcher global with a bounded
//!    retry budget (default 20 attempts × 250 ms). Exhausting the budget is
//!    fatal for the attempt; recovery only happens on the next
//!    context-created event.
//! 2. **Binding registration** – read the host-provided binding name (must
//!    be a non-empty string) and register the inbound callback under it.
//! 3. **Domain activation** – `initialize_domain` on the dispatcher; the
//!    host accepts inbound domain traffic only after this call.
//! 4. **Readiness** – flip to `Ready`, fire the `Ready` lifecycle signal,
//!    and flush the pending queue exactly once, in FIFO order.
//!
//! Inbound traffic that arrives before step 4 completes is queued; traffic
//! for foreign domains is ignored. Outbound sends while not `Ready` are
//! silent no-ops, tolerating teardown races. Subscribers persist across
//! reconnects — a context destroy clears the ready state but never the
//! subscriber set.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use devpanel_core::channel::{ListenerSet, Subscription};
use devpanel_core::protocol::codec::{self, CodecError};
use devpanel_core::protocol::messages::{LifecycleSignal, BRIDGE_DOMAIN};

use crate::host::{ContextEvent, HostDispatcher, HostError, InspectorHost};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Tunables for the handshake driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Name of the logical domain to activate.
    pub domain: String,
    /// Name of the primary execution context; lifecycle events for other
    /// context names are ignored.
    pub context_name: String,
    /// Maximum number of readiness-probe attempts per handshake.
    pub probe_attempts: u32,
    /// Delay between readiness-probe attempts.
    pub probe_interval: Duration,
}

impl Default for DriverConfig {
    /// Defaults: domain `"bridge"`, context `"main"`, 20 probe attempts at
    /// 250 ms (a ceiling of roughly five seconds).
    fn default() -> Self {
        Self {
            domain: BRIDGE_DOMAIN.to_string(),
            context_name: "main".to_string(),
            probe_attempts: 20,
            probe_interval: Duration::from_millis(250),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors surfaced by the handshake driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// This environment exposes no inspector; the device transport cannot
    /// exist here. Callers treat this as "feature unavailable".
    #[error("inspector bridge is unavailable in this environment")]
    Unsupported,

    /// The host advertised no binding name, or an empty one.
    #[error("host binding name is missing or empty")]
    MissingBindingName,

    /// The dispatcher global never appeared within the probe budget.
    #[error("inspector dispatcher did not appear after {attempts} probe attempts")]
    ProbeTimeout { attempts: u32 },

    /// The pending queue was not empty when a duplicate readiness flush was
    /// attempted. The queue must drain exactly once per readiness transition.
    #[error("pending queue was not drained exactly once per readiness transition")]
    DuplicateFlush,

    /// A dispatcher operation failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The serialization boundary rejected a message.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Domain state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    /// No handshake has completed and none is in flight.
    Uninitialized,
    /// A handshake is in flight; inbound traffic is being queued.
    WaitingForHostReady,
    /// The domain is live; traffic flows in both directions.
    Ready,
}

struct DriverState {
    phase: DomainState,
    dispatcher: Option<Arc<dyn HostDispatcher>>,
    pending: VecDeque<Value>,
}

/// Establishes and maintains domain readiness across execution-context churn.
pub struct DomainDriver {
    config: DriverConfig,
    host: Arc<dyn InspectorHost>,
    state: Mutex<DriverState>,
    subscribers: Arc<ListenerSet>,
    signals: broadcast::Sender<LifecycleSignal>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    weak: Weak<DomainDriver>,
}

impl DomainDriver {
    /// Creates a driver bound to `host` and starts watching context events.
    ///
    /// Must be called from within a tokio runtime (the context watcher is a
    /// spawned task). No handshake runs yet; call [`connect`](Self::connect)
    /// for the initial attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Unsupported`] when the host exposes no
    /// inspector.
    pub fn new(
        host: Arc<dyn InspectorHost>,
        config: DriverConfig,
    ) -> Result<Arc<Self>, DriverError> {
        if !host.is_available() {
            return Err(DriverError::Unsupported);
        }

        let (signals, _) = broadcast::channel(32);
        let events = host.context_events();

        let driver = Arc::new_cyclic(|weak| Self {
            config,
            host,
            state: Mutex::new(DriverState {
                phase: DomainState::Uninitialized,
                dispatcher: None,
                pending: VecDeque::new(),
            }),
            subscribers: ListenerSet::new(),
            signals,
            watcher: Mutex::new(None),
            weak: weak.clone(),
        });

        let watcher = tokio::spawn(Self::watch_context_events(
            Arc::downgrade(&driver),
            events,
        ));
        *driver.watcher.lock().expect("lock poisoned") = Some(watcher);

        Ok(driver)
    }

    /// Runs the initial handshake.
    ///
    /// A probe timeout additionally fires exactly one `Failed` lifecycle
    /// signal, because panels may already be observing this driver while the
    /// first handshake is still in flight. Other construction failures
    /// (missing binding name, domain activation refusal) propagate to the
    /// caller only.
    ///
    /// # Errors
    ///
    /// Any [`DriverError`] from the handshake steps above.
    pub async fn connect(&self) -> Result<(), DriverError> {
        match self.handshake().await {
            Ok(()) => Ok(()),
            Err(DriverError::ProbeTimeout { attempts }) => {
                self.emit(LifecycleSignal::Failed {
                    reason: format!(
                        "inspector dispatcher did not appear after {attempts} probe attempts"
                    ),
                });
                Err(DriverError::ProbeTimeout { attempts })
            }
            Err(other) => Err(other),
        }
    }

    /// Current domain state.
    pub fn state(&self) -> DomainState {
        self.state.lock().expect("lock poisoned").phase
    }

    /// Sends one message out through the host evaluation primitive.
    ///
    /// While the domain is not `Ready` this is a silent no-op (logged at
    /// debug level): teardown races between the app reloading and plugin
    /// code still sending are expected, not errors.
    ///
    /// # Errors
    ///
    /// Returns an error only for serialization failures or a host rejection
    /// of the evaluation itself.
    pub fn send(&self, message: &Value) -> Result<(), DriverError> {
        let dispatcher = {
            let state = self.state.lock().expect("lock poisoned");
            if state.phase != DomainState::Ready {
                debug!(domain = %self.config.domain, "dropping outbound message while not ready");
                return Ok(());
            }
            state.dispatcher.clone()
        };
        let Some(dispatcher) = dispatcher else {
            // Ready without a dispatcher cannot be reached through normal
            // transitions; treat it like the not-ready no-op.
            return Ok(());
        };

        let expression = codec::encode_eval_expression(&self.config.domain, message)?;
        dispatcher.evaluate(&expression)?;
        Ok(())
    }

    /// Subscribes a listener to inbound domain messages. Subscribers persist
    /// across reconnects until their subscription is removed.
    pub fn on_message(
        &self,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribers.add(Arc::new(listener))
    }

    /// Subscribes to lifecycle signals (`Ready` / `Failed` / `Destroyed`).
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.signals.subscribe()
    }

    /// Stops the context watcher and drops all state and subscribers.
    /// Idempotent.
    pub fn close(&self) {
        if let Some(handle) = self.watcher.lock().expect("lock poisoned").take() {
            handle.abort();
        }
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.phase = DomainState::Uninitialized;
            state.dispatcher = None;
            state.pending.clear();
        }
        self.subscribers.clear();
    }

    // ── Handshake steps ───────────────────────────────────────────────────────

    async fn handshake(&self) -> Result<(), DriverError> {
        let result = self.handshake_attempt().await;
        if result.is_err() {
            // A failed attempt leaves no handshake in flight.
            self.state.lock().expect("lock poisoned").phase = DomainState::Uninitialized;
        }
        result
    }

    async fn handshake_attempt(&self) -> Result<(), DriverError> {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.phase = DomainState::WaitingForHostReady;
            state.dispatcher = None;
        }

        let dispatcher = self.probe_dispatcher().await?;

        let binding_name = dispatcher
            .binding_name()
            .filter(|name| !name.is_empty())
            .ok_or(DriverError::MissingBindingName)?;

        let weak = self.weak.clone();
        dispatcher.register_binding(
            &binding_name,
            Arc::new(move |raw: &str| {
                if let Some(driver) = weak.upgrade() {
                    driver.handle_binding_invocation(raw);
                }
            }),
        )?;

        dispatcher.initialize_domain(&self.config.domain)?;
        debug!(
            domain = %self.config.domain,
            binding = %binding_name,
            "domain activated on host dispatcher"
        );

        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.dispatcher = Some(Arc::clone(&dispatcher));
        }

        self.mark_ready()
    }

    /// Polls for the dispatcher global with a bounded retry budget.
    async fn probe_dispatcher(&self) -> Result<Arc<dyn HostDispatcher>, DriverError> {
        for attempt in 0..self.config.probe_attempts {
            if let Some(dispatcher) = self.host.dispatcher() {
                trace!(attempt, "dispatcher global found");
                return Ok(dispatcher);
            }
            if attempt + 1 < self.config.probe_attempts {
                tokio::time::sleep(self.config.probe_interval).await;
            }
        }

        Err(DriverError::ProbeTimeout {
            attempts: self.config.probe_attempts,
        })
    }

    /// Flips to `Ready`, fires the signal, and flushes the pending queue.
    ///
    /// Invariant: the queue drains exactly once per readiness transition.
    /// Reaching this with the domain already `Ready` and a non-empty queue
    /// means a flush would run twice — that is fatal and logged.
    fn mark_ready(&self) -> Result<(), DriverError> {
        let drained: Vec<Value> = {
            let mut state = self.state.lock().expect("lock poisoned");
            if state.phase == DomainState::Ready {
                if !state.pending.is_empty() {
                    error!(
                        queued = state.pending.len(),
                        "pending queue non-empty at duplicate readiness flush"
                    );
                    return Err(DriverError::DuplicateFlush);
                }
                return Ok(());
            }
            state.phase = DomainState::Ready;
            state.pending.drain(..).collect()
        };

        self.emit(LifecycleSignal::Ready);
        for message in &drained {
            self.subscribers.dispatch(message);
        }
        Ok(())
    }

    // ── Inbound path ──────────────────────────────────────────────────────────

    /// Handles one raw invocation of the host binding.
    fn handle_binding_invocation(&self, raw: &str) {
        let envelope = match codec::decode_binding_payload(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                // A payload the codec cannot parse means the host and bridge
                // disagree about the protocol; this session is unrecoverable.
                error!(error = %e, "malformed inbound binding payload");
                self.state.lock().expect("lock poisoned").phase = DomainState::Uninitialized;
                self.emit(LifecycleSignal::Failed {
                    reason: format!("malformed inbound envelope: {e}"),
                });
                return;
            }
        };

        if envelope.domain != self.config.domain {
            trace!(domain = %envelope.domain, "ignoring envelope for foreign domain");
            return;
        }

        let deliver_now = {
            let mut state = self.state.lock().expect("lock poisoned");
            match state.phase {
                DomainState::Ready => true,
                _ => {
                    state.pending.push_back(envelope.message.clone());
                    false
                }
            }
        };
        if deliver_now {
            self.subscribers.dispatch(&envelope.message);
        }
    }

    // ── Context lifecycle coupling ────────────────────────────────────────────

    async fn watch_context_events(
        weak: Weak<DomainDriver>,
        mut events: broadcast::Receiver<ContextEvent>,
    ) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(driver) = weak.upgrade() else { break };
                    driver.handle_context_event(event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "lagged behind execution-context events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn handle_context_event(&self, event: ContextEvent) {
        match event {
            ContextEvent::Created { name } if name == self.config.context_name => {
                debug!(context = %name, "execution context created; re-running handshake");
                if let Err(e) = self.handshake().await {
                    warn!(error = %e, "handshake after context creation failed");
                    self.emit(LifecycleSignal::Failed {
                        reason: e.to_string(),
                    });
                }
            }
            ContextEvent::Destroyed { name } if name == self.config.context_name => {
                debug!(context = %name, "execution context destroyed");
                {
                    let mut state = self.state.lock().expect("lock poisoned");
                    state.phase = DomainState::Uninitialized;
                    state.dispatcher = None;
                    // Subscribers persist; only the ready state is cleared.
                }
                self.emit(LifecycleSignal::Destroyed);
            }
            _ => {}
        }
    }

    fn emit(&self, signal: LifecycleSignal) {
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.signals.send(signal);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
