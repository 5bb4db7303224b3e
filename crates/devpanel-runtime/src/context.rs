//! The bridge context: explicit ownership of everything that used to be
//! ambient.
//!
//! One [`BridgeContext`] exists per process context (an inspected device
//! runtime, or a panel shell document). It owns:
//!
//! - the environment descriptor (which transport this context gets),
//! - the channel, as a tagged [`BridgeChannel`] variant resolved exactly
//!   once behind [`registry`](BridgeContext::registry) — call sites never
//!   sniff the transport kind;
//! - the client registry, and with it the reference-counted teardown of the
//!   transport;
//! - on the device side, the domain handshake driver.
//!
//! Construction is lazy and memoized in flight: concurrent first callers all
//! await the same initialization and observe the same instances. `dispose`
//! is the single teardown point.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, warn};

use devpanel_core::channel::{Channel, ChannelError, MessageListener, Subscription};
use devpanel_core::client::PluginClient;
use devpanel_core::protocol::messages::LifecycleSignal;
use devpanel_core::registry::ClientRegistry;
use devpanel_device::channel::DeviceChannel;
use devpanel_device::driver::{DomainDriver, DomainState, DriverConfig, DriverError};
use devpanel_device::host::InspectorHost;
use devpanel_shell::channel::PanelChannel;
use devpanel_shell::discovery::PluginRecord;
use devpanel_shell::lifecycle::{PanelLifecycle, ViewHost};
use devpanel_shell::port::FramePort;
use serde_json::Value;

// ── Environment and channel variants ──────────────────────────────────────────

/// What kind of context this process is, and the transport primitive the
/// host supplies for it.
pub enum BridgeEnvironment {
    /// A panel shell document: traffic rides the embedding frame's port.
    Panel { port: Arc<dyn FramePort> },
    /// An inspected device runtime: traffic rides the debugger binding.
    Device {
        host: Arc<dyn InspectorHost>,
        config: DriverConfig,
    },
}

/// The channel variant, selected once at context initialization.
pub enum BridgeChannel {
    Panel(PanelChannel),
    Device(DeviceChannel),
}

impl Channel for BridgeChannel {
    fn send(&self, message: Value) -> Result<(), ChannelError> {
        match self {
            BridgeChannel::Panel(channel) => channel.send(message),
            BridgeChannel::Device(channel) => channel.send(message),
        }
    }

    fn on_message(&self, listener: MessageListener) -> Subscription {
        match self {
            BridgeChannel::Panel(channel) => channel.on_message(listener),
            BridgeChannel::Device(channel) => channel.on_message(listener),
        }
    }

    fn close(&self) {
        match self {
            BridgeChannel::Panel(channel) => channel.close(),
            BridgeChannel::Device(channel) => channel.close(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors surfaced by the bridge context.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The context was disposed, or a failed initialization already consumed
    /// its environment.
    #[error("bridge context is unavailable (disposed or initialization already failed)")]
    Unavailable,

    /// No handshake driver exists in this context (panel-side contexts have
    /// none; split-process embedders relay lifecycle signals themselves).
    #[error("no handshake driver in this context")]
    NoDriver,

    /// Device-side construction failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A channel operation failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Owns the channel, registry, and (device-side) driver for one context.
pub struct BridgeContext {
    environment: Mutex<Option<BridgeEnvironment>>,
    registry: OnceCell<Arc<ClientRegistry>>,
    driver: Mutex<Option<Arc<DomainDriver>>>,
}

impl BridgeContext {
    /// Prepares a context for the given environment. Nothing is constructed
    /// until the first [`registry`](Self::registry) or
    /// [`client`](Self::client) call.
    pub fn new(environment: BridgeEnvironment) -> Self {
        Self {
            environment: Mutex::new(Some(environment)),
            registry: OnceCell::new(),
            driver: Mutex::new(None),
        }
    }

    /// The client registry over this context's channel, constructing both on
    /// first use.
    ///
    /// Concurrent first callers all await the same in-flight initialization;
    /// the transport variant is resolved exactly once. On the device side
    /// the initial handshake runs here; a probe timeout is tolerated (the
    /// driver recovers on the next execution-context creation, and panels
    /// meanwhile show the `Failed` diagnostic), while other handshake
    /// failures fail the initialization.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Unavailable`] after `dispose` or a failed first
    /// initialization; [`BridgeError::Driver`] for fatal device-side
    /// construction errors.
    pub async fn registry(&self) -> Result<Arc<ClientRegistry>, BridgeError> {
        let registry = self
            .registry
            .get_or_try_init(|| async {
                let environment = self
                    .environment
                    .lock()
                    .expect("lock poisoned")
                    .take()
                    .ok_or(BridgeError::Unavailable)?;

                let channel = match environment {
                    BridgeEnvironment::Panel { port } => {
                        debug!("initializing panel-side bridge channel");
                        BridgeChannel::Panel(PanelChannel::new(port))
                    }
                    BridgeEnvironment::Device { host, config } => {
                        debug!("initializing device-side bridge channel");
                        let driver = DomainDriver::new(host, config)?;
                        match driver.connect().await {
                            Ok(()) => {}
                            Err(DriverError::ProbeTimeout { .. }) => {
                                warn!(
                                    "initial handshake timed out; \
                                     waiting for execution-context creation"
                                );
                            }
                            Err(e) => return Err(BridgeError::Driver(e)),
                        }
                        *self.driver.lock().expect("lock poisoned") =
                            Some(Arc::clone(&driver));
                        BridgeChannel::Device(DeviceChannel::new(driver))
                    }
                };

                Ok(Arc::new(ClientRegistry::new(
                    Arc::new(channel) as Arc<dyn Channel>
                )))
            })
            .await?;
        Ok(Arc::clone(registry))
    }

    /// The multiplexer for `plugin_id`, memoized per identifier.
    pub async fn client(&self, plugin_id: &str) -> Result<Arc<PluginClient>, BridgeError> {
        Ok(self.registry().await?.client(plugin_id)?)
    }

    /// The handshake driver, when this is a device-side context that has
    /// been initialized.
    pub fn driver(&self) -> Option<Arc<DomainDriver>> {
        self.driver.lock().expect("lock poisoned").clone()
    }

    /// Subscribes to the driver's lifecycle signals.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NoDriver`] when this context has no driver.
    pub fn lifecycle_signals(&self) -> Result<broadcast::Receiver<LifecycleSignal>, BridgeError> {
        self.driver()
            .map(|driver| driver.subscribe_lifecycle())
            .ok_or(BridgeError::NoDriver)
    }

    /// Builds a panel lifecycle controller for `record`, wired to this
    /// context's driver signals and multiplexer.
    ///
    /// Available in contexts that own a driver (single-process embedders
    /// that render panels next to the inspected runtime). A controller for
    /// an already-`Ready` driver renders directly into the ready state.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NoDriver`] for driverless contexts.
    pub async fn present(
        &self,
        record: PluginRecord,
        view_host: Arc<dyn ViewHost>,
    ) -> Result<Arc<PanelLifecycle>, BridgeError> {
        let client = self.client(&record.name).await?;
        let driver = self.driver().ok_or(BridgeError::NoDriver)?;
        let signals = driver.subscribe_lifecycle();
        let initially_ready = driver.state() == DomainState::Ready;
        Ok(PanelLifecycle::start(
            record,
            client,
            view_host,
            signals,
            initially_ready,
        ))
    }

    /// Tears the context down: closes every client, releases the channel,
    /// and stops the driver. Idempotent; later `registry()` calls fail with
    /// [`BridgeError::Unavailable`] or a closed-channel error.
    pub fn dispose(&self) {
        // Drop an unconsumed environment so late initialization cannot
        // resurrect the context.
        self.environment.lock().expect("lock poisoned").take();
        if let Some(registry) = self.registry.get() {
            registry.dispose();
        }
        if let Some(driver) = self.driver.lock().expect("lock poisoned").take() {
            driver.close();
        }
    }
}

impl Drop for BridgeContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
