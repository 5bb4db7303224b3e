//! Full-stack integration tests: context, driver, multiplexers, and panel
//! lifecycle assembled the way a single-process embedder uses them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use devpanel_core::protocol::codec;
use devpanel_device::driver::{DomainState, DriverConfig};
use devpanel_device::host::mock::{MockDispatcher, MockInspectorHost};
use devpanel_device::host::InspectorHost;
use devpanel_runtime::{BridgeContext, BridgeEnvironment};
use devpanel_shell::discovery::PluginRecord;
use devpanel_shell::lifecycle::{PanelState, PanelView, ViewHost};
use devpanel_shell::port::{FramePort, InProcessPort};

// ── Fakes ─────────────────────────────────────────────────────────────────────

struct FakeView {
    port: Arc<InProcessPort>,
}

impl PanelView for FakeView {
    fn port(&self) -> Arc<dyn FramePort> {
        Arc::clone(&self.port) as Arc<dyn FramePort>
    }

    fn dispose(&self) {}
}

#[derive(Default)]
struct FakeViewHost {
    loading_calls: AtomicUsize,
    documents: Mutex<HashMap<String, Arc<InProcessPort>>>,
}

impl FakeViewHost {
    fn document_end(&self, plugin: &str) -> Arc<InProcessPort> {
        Arc::clone(
            self.documents
                .lock()
                .unwrap()
                .get(plugin)
                .expect("panel was never mounted"),
        )
    }
}

impl ViewHost for FakeViewHost {
    fn show_loading(&self, _plugin: &str) {
        self.loading_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn show_error(&self, _plugin: &str, _reason: &str) {}

    fn mount_panel(&self, plugin: &str, _path: &str) -> Arc<dyn PanelView> {
        let (view_end, document_end) = InProcessPort::pair();
        self.documents
            .lock()
            .unwrap()
            .insert(plugin.to_string(), document_end);
        Arc::new(FakeView { port: view_end })
    }
}

fn record(name: &str) -> PluginRecord {
    PluginRecord {
        name: name.to_string(),
        path: format!("/plugins/{name}"),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_present_renders_directly_into_ready_when_driver_is_ready() {
    let host = MockInspectorHost::new();
    host.install_dispatcher(MockDispatcher::new());
    let context = BridgeContext::new(BridgeEnvironment::Device {
        host: host as Arc<dyn InspectorHost>,
        config: DriverConfig::default(),
    });

    // Initialize and complete the handshake before any panel exists.
    context.registry().await.unwrap();
    assert_eq!(context.driver().unwrap().state(), DomainState::Ready);

    let view_host = Arc::new(FakeViewHost::default());
    let controller = context
        .present(record("profiler"), Arc::clone(&view_host) as Arc<dyn ViewHost>)
        .await
        .unwrap();

    // No waiting: readiness was already achieved.
    assert_eq!(controller.state(), PanelState::Ready);
    assert_eq!(view_host.loading_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_embedded_document_traffic_reaches_the_dispatcher() {
    let host = MockInspectorHost::new();
    let dispatcher = MockDispatcher::new();
    host.install_dispatcher(Arc::clone(&dispatcher));
    let context = BridgeContext::new(BridgeEnvironment::Device {
        host: host as Arc<dyn InspectorHost>,
        config: DriverConfig::default(),
    });
    context.registry().await.unwrap();

    let view_host = Arc::new(FakeViewHost::default());
    let _controller = context
        .present(record("net"), Arc::clone(&view_host) as Arc<dyn ViewHost>)
        .await
        .unwrap();

    // The embedded panel posts a message; it must come out of the host
    // evaluation primitive, double-encoded.
    view_host
        .document_end("net")
        .post(codec::wrap_frame(json!({
            "pluginId": "net", "type": "clear", "payload": null
        })))
        .unwrap();

    let evaluated = dispatcher.evaluated();
    assert_eq!(evaluated.len(), 1);
    assert!(evaluated[0].contains("clear"));
}

#[tokio::test]
async fn test_inbound_device_traffic_reaches_the_embedded_document() {
    let host = MockInspectorHost::new();
    let dispatcher = MockDispatcher::new();
    host.install_dispatcher(Arc::clone(&dispatcher));
    let context = BridgeContext::new(BridgeEnvironment::Device {
        host: host as Arc<dyn InspectorHost>,
        config: DriverConfig::default(),
    });
    context.registry().await.unwrap();

    let view_host = Arc::new(FakeViewHost::default());
    let _controller = context
        .present(record("profiler"), Arc::clone(&view_host) as Arc<dyn ViewHost>)
        .await
        .unwrap();

    let frames: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let frames_in = Arc::clone(&frames);
    let _sub = view_host
        .document_end("profiler")
        .on_frame(Arc::new(move |f| frames_in.lock().unwrap().push(f.clone())));

    // Inbound from the inspected app, through the binding.
    dispatcher.invoke_binding(
        r#"{"domain":"bridge","message":{"pluginId":"profiler","type":"sample","payload":{"ms":7}}}"#,
    );

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["payload"]["payload"]["ms"], 7);
}

#[tokio::test]
async fn test_app_reload_cycles_the_panel_and_resumes() {
    let host = MockInspectorHost::new();
    let dispatcher = MockDispatcher::new();
    host.install_dispatcher(Arc::clone(&dispatcher));
    let context = BridgeContext::new(BridgeEnvironment::Device {
        host: Arc::clone(&host) as Arc<dyn InspectorHost>,
        config: DriverConfig::default(),
    });
    context.registry().await.unwrap();

    let view_host = Arc::new(FakeViewHost::default());
    let controller = context
        .present(record("profiler"), Arc::clone(&view_host) as Arc<dyn ViewHost>)
        .await
        .unwrap();
    assert_eq!(controller.state(), PanelState::Ready);

    // App reload.
    host.emit_context_destroyed("main");
    wait_until(|| controller.state() == PanelState::Loading).await;
    host.emit_context_created("main");
    wait_until(|| controller.state() == PanelState::Ready).await;

    // The remounted document is relayed again.
    let frames: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let frames_in = Arc::clone(&frames);
    let _sub = view_host
        .document_end("profiler")
        .on_frame(Arc::new(move |f| frames_in.lock().unwrap().push(f.clone())));

    dispatcher.invoke_binding(
        r#"{"domain":"bridge","message":{"pluginId":"profiler","type":"sample","payload":1}}"#,
    );
    assert_eq!(frames.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_view_for_the_same_plugin_shares_the_multiplexer() {
    let host = MockInspectorHost::new();
    host.install_dispatcher(MockDispatcher::new());
    let context = BridgeContext::new(BridgeEnvironment::Device {
        host: host as Arc<dyn InspectorHost>,
        config: DriverConfig::default(),
    });
    context.registry().await.unwrap();

    let first_host = Arc::new(FakeViewHost::default());
    let second_host = Arc::new(FakeViewHost::default());
    let first = context
        .present(record("profiler"), Arc::clone(&first_host) as Arc<dyn ViewHost>)
        .await
        .unwrap();
    let second = context
        .present(record("profiler"), Arc::clone(&second_host) as Arc<dyn ViewHost>)
        .await
        .unwrap();

    // Same plugin id, same client instance underneath; the second view did
    // not wait for a second handshake.
    assert_eq!(first.state(), PanelState::Ready);
    assert_eq!(second.state(), PanelState::Ready);
    let registry = context.registry().await.unwrap();
    assert_eq!(registry.active_clients(), 1);
}
