//! # devpanel-runtime
//!
//! Top-level wiring for the DevPanel bridge. Embedding applications create
//! one [`BridgeContext`] per process context, hand it the host-supplied
//! transport primitive (a frame port on the panel side, an inspector host
//! on the device side), and get back lazily-constructed, memoized access to
//! the channel, the per-plugin multiplexers, and — where a driver exists —
//! panel lifecycle controllers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use devpanel_device::driver::DriverConfig;
//! use devpanel_device::host::InspectorHost;
//! use devpanel_runtime::{BridgeContext, BridgeEnvironment};
//! use serde_json::json;
//!
//! # async fn example(host: Arc<dyn InspectorHost>) -> Result<(), Box<dyn std::error::Error>> {
//! let context = BridgeContext::new(BridgeEnvironment::Device {
//!     host,
//!     config: DriverConfig::default(),
//! });
//!
//! let profiler = context.client("profiler").await?;
//! profiler.send("sample", json!({"ms": 16}))?;
//! # Ok(())
//! # }
//! ```

pub mod context;

pub use context::{BridgeChannel, BridgeContext, BridgeEnvironment, BridgeError};
