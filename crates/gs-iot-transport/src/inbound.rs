//! Inbound transport adapter.
//!
//! Subscribes the configured topic once connected and forwards every
//! delivered payload — newline-terminated — to the pipeline's byte sink
//! with an empty channel id. Forwarding runs on a single task per
//! subscription, so delivery order is preserved.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use gs_mqtt_channel::{ClientFactory, CredentialStore, MqttError, QoS};

use crate::config::ConnectionConfig;
use crate::error::{TransportError, TransportResult};
use crate::lifecycle::{ConnectionHandle, SessionHook, TransportLifecycle};
use crate::properties::PropertySource;
use crate::status::StatusHandle;

/// Failures the sink can report back per buffer.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The forwarding buffer exceeded the sink's capacity.
    #[error("sink buffer overflow (capacity {capacity} bytes)")]
    Overflow { capacity: usize },

    #[error("{0}")]
    Other(String),
}

/// The pipeline's byte-stream sink.
pub trait ByteSink: Send + Sync {
    fn receive(&self, bytes: &[u8], channel_id: &str) -> Result<(), SinkError>;
}

/// Inbound adapter: MQTT topic → pipeline byte sink.
pub struct InboundAdapter {
    lifecycle: Arc<TransportLifecycle>,
}

impl InboundAdapter {
    pub fn new(
        properties: Arc<dyn PropertySource>,
        credentials: Arc<dyn CredentialStore>,
        factory: Arc<dyn ClientFactory>,
        sink: Arc<dyn ByteSink>,
    ) -> Self {
        let status = StatusHandle::new();
        let hook = Arc::new(InboundSession {
            sink,
            status: status.clone(),
            lifecycle: OnceLock::new(),
        });
        let lifecycle = Arc::new(TransportLifecycle::new(
            properties,
            credentials,
            factory,
            hook.clone(),
            status,
        ));
        let _ = hook.lifecycle.set(Arc::downgrade(&lifecycle));
        Self { lifecycle }
    }

    pub async fn start(&self) {
        self.lifecycle.start().await;
    }

    pub async fn stop(&self) {
        self.lifecycle.stop().await;
    }

    /// Re-apply configuration; rebuilds the connection when it changed.
    pub async fn setup(&self) {
        self.lifecycle.setup().await;
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn status(&self) -> StatusHandle {
        self.lifecycle.status()
    }
}

/// Post-connect work: subscribe the topic and spawn the forwarding task.
struct InboundSession {
    sink: Arc<dyn ByteSink>,
    status: StatusHandle,
    // Set once right after construction; weak because the lifecycle owns
    // this hook.
    lifecycle: OnceLock<Weak<TransportLifecycle>>,
}

#[async_trait]
impl SessionHook for InboundSession {
    async fn on_connected(
        &self,
        handle: &ConnectionHandle,
        config: &ConnectionConfig,
    ) -> TransportResult<()> {
        let stream = handle
            .client
            .subscribe(&config.topic, QoS::AtMostOnce)
            .await
            .map_err(subscribe_err)?;

        let sink = Arc::clone(&self.sink);
        let status = self.status.clone();
        let lifecycle = self.lifecycle.get().cloned();
        tokio::spawn(forward(stream, sink, status, lifecycle));
        Ok(())
    }
}

/// Drain one subscription in delivery order. Ends when the connection is
/// torn down (the stream closes) or the sink fails unrecoverably.
async fn forward(
    mut stream: mpsc::Receiver<Vec<u8>>,
    sink: Arc<dyn ByteSink>,
    status: StatusHandle,
    lifecycle: Option<Weak<TransportLifecycle>>,
) {
    while let Some(payload) = stream.recv().await {
        if payload.is_empty() {
            continue;
        }
        let mut framed = Vec::with_capacity(payload.len() + 1);
        framed.extend_from_slice(&payload);
        framed.push(b'\n');

        match sink.receive(&framed, "") {
            Ok(()) => {}
            Err(e @ SinkError::Overflow { .. }) => {
                // The buffer is not retried; the subscription stays open.
                tracing::error!(error = %e, "sink overflow, message dropped");
                status.fail(e.to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "unexpected sink failure, stopping transport");
                if let Some(lifecycle) = lifecycle.as_ref().and_then(Weak::upgrade) {
                    lifecycle.stop().await;
                }
                status.fail(e.to_string());
                return;
            }
        }
    }
}

fn subscribe_err(e: MqttError) -> TransportError {
    match e {
        MqttError::Subscribe(m) => TransportError::Subscribe(m),
        other => TransportError::Subscribe(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{InMemoryProperties, keys};
    use crate::status::RunningState;
    use gs_mqtt_channel::{MockClientFactory, StaticCredentialStore};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum SinkMode {
        Accept,
        Overflow,
        Fail,
    }

    struct ChannelSink {
        tx: mpsc::UnboundedSender<(Vec<u8>, String)>,
        mode: Mutex<SinkMode>,
    }

    impl ChannelSink {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(Vec<u8>, String)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    tx,
                    mode: Mutex::new(SinkMode::Accept),
                }),
                rx,
            )
        }

        fn set_mode(&self, mode: SinkMode) {
            *self.mode.lock().unwrap() = mode;
        }
    }

    impl ByteSink for ChannelSink {
        fn receive(&self, bytes: &[u8], channel_id: &str) -> Result<(), SinkError> {
            match *self.mode.lock().unwrap() {
                SinkMode::Accept => {
                    let _ = self.tx.send((bytes.to_vec(), channel_id.to_string()));
                    Ok(())
                }
                SinkMode::Overflow => Err(SinkError::Overflow { capacity: 1024 }),
                SinkMode::Fail => Err(SinkError::Other("sink detached".into())),
            }
        }
    }

    fn props() -> Arc<InMemoryProperties> {
        let props = Arc::new(InMemoryProperties::new());
        props.set(keys::IOT_SERVICE_TYPE, "Topic");
        props.set(keys::CLIENT_ENDPOINT, "broker.example.com:8883");
        props.set(keys::X509_CERTIFICATE, "CERT-PEM");
        props.set(keys::PRIVATE_KEY, "KEY-PEM");
        props.set(keys::TOPIC_NAME, "events/in");
        props
    }

    fn adapter(
        factory: Arc<MockClientFactory>,
        sink: Arc<dyn ByteSink>,
    ) -> InboundAdapter {
        InboundAdapter::new(props(), Arc::new(StaticCredentialStore), factory, sink)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met within deadline");
    }

    #[tokio::test]
    async fn payload_is_forwarded_newline_terminated_on_empty_channel() {
        let factory = Arc::new(MockClientFactory::new());
        let (sink, mut rx) = ChannelSink::new();
        let adapter = adapter(factory.clone(), sink);

        adapter.start().await;
        let client = factory.last_client().unwrap();
        assert!(client.is_subscribed_to("events/in"));

        client.inject("events/in", b"hello");
        let (bytes, channel) = rx.recv().await.unwrap();
        assert_eq!(bytes, b"hello\n");
        assert_eq!(channel, "");
    }

    #[tokio::test]
    async fn delivery_order_is_preserved() {
        let factory = Arc::new(MockClientFactory::new());
        let (sink, mut rx) = ChannelSink::new();
        let adapter = adapter(factory.clone(), sink);

        adapter.start().await;
        let client = factory.last_client().unwrap();
        for i in 0..5u8 {
            client.inject("events/in", &[b'0' + i]);
        }
        for i in 0..5u8 {
            let (bytes, _) = rx.recv().await.unwrap();
            assert_eq!(bytes, vec![b'0' + i, b'\n']);
        }
    }

    #[tokio::test]
    async fn empty_payloads_are_ignored() {
        let factory = Arc::new(MockClientFactory::new());
        let (sink, mut rx) = ChannelSink::new();
        let adapter = adapter(factory.clone(), sink);

        adapter.start().await;
        let client = factory.last_client().unwrap();
        client.inject("events/in", b"");
        client.inject("events/in", b"next");

        let (bytes, _) = rx.recv().await.unwrap();
        assert_eq!(bytes, b"next\n");
    }

    #[tokio::test]
    async fn overflow_sets_error_without_closing_subscription() {
        let factory = Arc::new(MockClientFactory::new());
        let (sink, mut rx) = ChannelSink::new();
        let adapter = adapter(factory.clone(), Arc::clone(&sink) as Arc<dyn ByteSink>);

        adapter.start().await;
        let client = factory.last_client().unwrap();
        let status = adapter.status();

        sink.set_mode(SinkMode::Overflow);
        client.inject("events/in", b"too-big");
        wait_for(|| status.state() == RunningState::Error).await;
        assert!(status.error_message().unwrap().contains("overflow"));

        // Subscription survives: later messages still flow.
        sink.set_mode(SinkMode::Accept);
        client.inject("events/in", b"after");
        let (bytes, _) = rx.recv().await.unwrap();
        assert_eq!(bytes, b"after\n");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn unexpected_sink_failure_stops_the_adapter() {
        let factory = Arc::new(MockClientFactory::new());
        let (sink, _rx) = ChannelSink::new();
        let adapter = adapter(factory.clone(), Arc::clone(&sink) as Arc<dyn ByteSink>);

        adapter.start().await;
        let client = factory.last_client().unwrap();
        let status = adapter.status();

        sink.set_mode(SinkMode::Fail);
        client.inject("events/in", b"poison");

        wait_for(|| status.state() == RunningState::Error).await;
        wait_for(|| !client.is_connected()).await;
        assert!(status.error_message().unwrap().contains("sink detached"));
    }

    #[tokio::test]
    async fn subscribe_failure_is_a_setup_failure() {
        let factory = Arc::new(MockClientFactory::new());
        let (sink, _rx) = ChannelSink::new();
        let adapter = adapter(factory.clone(), sink);

        factory.fail_subscribe("not authorized");
        adapter.start().await;

        let status = adapter.status();
        assert_eq!(status.state(), RunningState::Error);
        assert!(status.error_message().unwrap().contains("not authorized"));
        // The partially-built connection was torn down.
        assert!(!factory.last_client().unwrap().is_connected());

        factory.heal();
        adapter.start().await;
        assert!(adapter.is_running());
    }
}
