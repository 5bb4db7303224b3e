//! Device-side [`Channel`] implementation over the domain driver.
//!
//! A thin adapter: the driver owns all the interesting behaviour (handshake,
//! queueing, reconnects); this type just gives it the uniform channel shape
//! the multiplexer layer works against.

use std::sync::Arc;

use serde_json::Value;
use devpanel_core::channel::{Channel, ChannelError, MessageListener, Subscription};

use crate::driver::DomainDriver;

/// The device transport: messages ride the debugger-protocol binding.
pub struct DeviceChannel {
    driver: Arc<DomainDriver>,
}

impl DeviceChannel {
    /// Wraps an existing driver. The driver is shared: lifecycle observers
    /// keep their own `Arc` to it.
    pub fn new(driver: Arc<DomainDriver>) -> Self {
        Self { driver }
    }

    /// The underlying handshake driver.
    pub fn driver(&self) -> &Arc<DomainDriver> {
        &self.driver
    }
}

impl Channel for DeviceChannel {
    fn send(&self, message: Value) -> Result<(), ChannelError> {
        self.driver
            .send(&message)
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    fn on_message(&self, listener: MessageListener) -> Subscription {
        self.driver.on_message(move |value: &Value| listener(value))
    }

    fn close(&self) {
        self.driver.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverConfig;
    use crate::host::mock::{MockDispatcher, MockInspectorHost};
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_channel_send_rides_the_dispatcher() {
        let host = MockInspectorHost::new();
        let dispatcher = MockDispatcher::new();
        host.install_dispatcher(Arc::clone(&dispatcher));

        let driver = DomainDriver::new(host, DriverConfig::default()).unwrap();
        driver.connect().await.unwrap();

        let channel = DeviceChannel::new(Arc::clone(&driver));
        channel
            .send(json!({"pluginId": "p", "type": "t", "payload": null}))
            .unwrap();

        assert_eq!(dispatcher.evaluated().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_listeners_receive_inbound_domain_traffic() {
        let host = MockInspectorHost::new();
        let dispatcher = MockDispatcher::new();
        host.install_dispatcher(Arc::clone(&dispatcher));

        let driver = DomainDriver::new(host, DriverConfig::default()).unwrap();
        driver.connect().await.unwrap();
        let channel = DeviceChannel::new(driver);

        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let _sub = channel.on_message(Arc::new(move |value: &Value| {
            seen_in.lock().unwrap().push(value.clone());
        }));

        dispatcher.invoke_binding(
            r#"{"domain":"bridge","message":{"pluginId":"p","type":"t","payload":7}}"#,
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["payload"], 7);
    }

    #[tokio::test]
    async fn test_channel_close_is_idempotent() {
        let host = MockInspectorHost::new();
        host.install_dispatcher(MockDispatcher::new());
        let driver = DomainDriver::new(host, DriverConfig::default()).unwrap();
        driver.connect().await.unwrap();

        let channel = DeviceChannel::new(Arc::clone(&driver));
        channel.close();
        channel.close();

        // After close, sends silently no-op through the driver.
        assert!(channel.send(json!(null)).is_ok());
    }
}
