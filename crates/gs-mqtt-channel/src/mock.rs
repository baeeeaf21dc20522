//! Mock MQTT client for testing without a real broker.
//!
//! Records every call the transport lifecycle makes — publishes,
//! subscriptions, attach/detach, shadow operations, connect/disconnect —
//! and lets tests inject inbound messages and per-operation failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::QoS;
use tokio::sync::{mpsc, oneshot};

use crate::client::{ClientFactory, MessageStream, MqttClient, PublishOutcome, PublishReceipt};
use crate::credentials::CredentialBundle;
use crate::error::{MqttError, MqttResult};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Mock implementation of the `MqttClient` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
#[derive(Default)]
pub struct MockClient {
    connected: AtomicBool,
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    senders: Mutex<Vec<(String, mpsc::Sender<Vec<u8>>)>>,
    attached: Mutex<Vec<String>>,
    detached: Mutex<Vec<String>>,
    shadow_deletes: Mutex<Vec<String>>,
    shadow_updates: Mutex<Vec<(String, Vec<u8>)>>,

    connect_error: Mutex<Option<String>>,
    subscribe_error: Mutex<Option<String>>,
    shadow_delete_error: Mutex<Option<String>>,
    shadow_update_error: Mutex<Option<String>>,
    publish_outcome: Mutex<Option<PublishOutcome>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Assertions ────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|(f, _)| f == filter)
    }

    /// Devices currently attached (attach calls minus detach calls).
    pub fn attached_devices(&self) -> Vec<String> {
        let detached = self.detached.lock().unwrap();
        self.attached
            .lock()
            .unwrap()
            .iter()
            .filter(|d| !detached.contains(d))
            .cloned()
            .collect()
    }

    pub fn shadow_deletes(&self) -> Vec<String> {
        self.shadow_deletes.lock().unwrap().clone()
    }

    pub fn shadow_updates(&self) -> Vec<(String, Vec<u8>)> {
        self.shadow_updates.lock().unwrap().clone()
    }

    // ── Behavior control ──────────────────────────────────────

    pub fn fail_connect(&self, message: &str) {
        *self.connect_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_subscribe(&self, message: &str) {
        *self.subscribe_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_shadow_delete(&self, message: &str) {
        *self.shadow_delete_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_shadow_update(&self, message: &str) {
        *self.shadow_update_error.lock().unwrap() = Some(message.to_string());
    }

    /// Force every subsequent publish receipt to resolve to `outcome`.
    pub fn resolve_publishes_with(&self, outcome: PublishOutcome) {
        *self.publish_outcome.lock().unwrap() = Some(outcome);
    }

    /// Deliver an inbound message to every subscriber of `topic`.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let senders = self.senders.lock().unwrap();
        for (filter, tx) in senders.iter() {
            if filter == topic {
                tx.try_send(payload.to_vec()).unwrap();
            }
        }
    }
}

#[async_trait]
impl MqttClient for MockClient {
    async fn connect(&self) -> MqttResult<()> {
        if let Some(msg) = self.connect_error.lock().unwrap().clone() {
            return Err(MqttError::Connection(msg));
        }
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self, _timeout: Duration) -> MqttResult<()> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        // Ending the streams mirrors the real client dropping its routes.
        self.senders.lock().unwrap().clear();
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> MqttResult<PublishReceipt> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        let outcome = self
            .publish_outcome
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(PublishOutcome::Success);
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Ok(PublishReceipt::new(rx))
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> MqttResult<MessageStream> {
        if let Some(msg) = self.subscribe_error.lock().unwrap().clone() {
            return Err(MqttError::Subscribe(msg));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .push((topic.to_string(), qos));
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().unwrap().push((topic.to_string(), tx));
        Ok(rx)
    }

    async fn attach(&self, device_id: &str) -> MqttResult<()> {
        self.attached.lock().unwrap().push(device_id.to_string());
        Ok(())
    }

    async fn detach(&self, device_id: &str) -> MqttResult<()> {
        self.detached.lock().unwrap().push(device_id.to_string());
        Ok(())
    }

    async fn delete_shadow(&self, device_id: &str, _timeout: Duration) -> MqttResult<()> {
        if let Some(msg) = self.shadow_delete_error.lock().unwrap().clone() {
            return Err(MqttError::Shadow(msg));
        }
        self.shadow_deletes
            .lock()
            .unwrap()
            .push(device_id.to_string());
        Ok(())
    }

    async fn update_shadow(
        &self,
        device_id: &str,
        payload: Vec<u8>,
        _timeout: Duration,
    ) -> MqttResult<()> {
        if let Some(msg) = self.shadow_update_error.lock().unwrap().clone() {
            return Err(MqttError::Shadow(msg));
        }
        self.shadow_updates
            .lock()
            .unwrap()
            .push((device_id.to_string(), payload));
        Ok(())
    }
}

// ── Factory ───────────────────────────────────────────────────

/// Mock `ClientFactory` — hands out `MockClient` values and records every
/// build request so tests can count rebuild cycles.
#[derive(Default)]
pub struct MockClientFactory {
    clients: Mutex<Vec<Arc<MockClient>>>,
    requests: Mutex<Vec<(String, String)>>,
    build_error: Mutex<Option<String>>,
    connect_error: Mutex<Option<String>>,
    subscribe_error: Mutex<Option<String>>,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// `(endpoint, client_id)` pairs in build order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().unwrap().clone()
    }

    pub fn last_client(&self) -> Option<Arc<MockClient>> {
        self.clients.lock().unwrap().last().cloned()
    }

    /// Make `build` itself fail.
    pub fn fail_build(&self, message: &str) {
        *self.build_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make every client this factory hands out fail its `connect()`.
    pub fn fail_connect(&self, message: &str) {
        *self.connect_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make every client this factory hands out fail its `subscribe()`.
    pub fn fail_subscribe(&self, message: &str) {
        *self.subscribe_error.lock().unwrap() = Some(message.to_string());
    }

    /// Clear failure presets.
    pub fn heal(&self) {
        *self.build_error.lock().unwrap() = None;
        *self.connect_error.lock().unwrap() = None;
        *self.subscribe_error.lock().unwrap() = None;
    }
}

impl ClientFactory for MockClientFactory {
    fn build(
        &self,
        endpoint: &str,
        client_id: &str,
        _credentials: &CredentialBundle,
    ) -> MqttResult<Arc<dyn MqttClient>> {
        if let Some(msg) = self.build_error.lock().unwrap().clone() {
            return Err(MqttError::Connection(msg));
        }
        let client = Arc::new(MockClient::new());
        if let Some(msg) = self.connect_error.lock().unwrap().as_deref() {
            client.fail_connect(msg);
        }
        if let Some(msg) = self.subscribe_error.lock().unwrap().as_deref() {
            client.fail_subscribe(msg);
        }
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), client_id.to_string()));
        self.clients.lock().unwrap().push(Arc::clone(&client));
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_records_messages() {
        let mock = MockClient::new();
        mock.publish("test/topic", QoS::AtMostOnce, b"hello".to_vec())
            .await
            .unwrap();
        mock.publish("test/other", QoS::AtLeastOnce, b"world".to_vec())
            .await
            .unwrap();

        let msgs = mock.published();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].topic, "test/topic");
        assert_eq!(msgs[0].payload, b"hello");
        assert_eq!(msgs[1].topic, "test/other");
    }

    #[tokio::test]
    async fn inject_delivers_to_subscriber_in_order() {
        let mock = MockClient::new();
        let mut stream = mock.subscribe("events/in", QoS::AtMostOnce).await.unwrap();

        mock.inject("events/in", b"first");
        mock.inject("events/in", b"second");
        mock.inject("other/topic", b"elsewhere");

        assert_eq!(stream.recv().await.unwrap(), b"first");
        assert_eq!(stream.recv().await.unwrap(), b"second");
        assert!(stream.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_ends_streams() {
        let mock = MockClient::new();
        let mut stream = mock.subscribe("events/in", QoS::AtMostOnce).await.unwrap();
        mock.connect().await.unwrap();
        mock.disconnect(Duration::from_millis(100)).await.unwrap();

        assert!(!mock.is_connected());
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn attach_detach_tracking() {
        let mock = MockClient::new();
        mock.attach("sensor-1").await.unwrap();
        assert_eq!(mock.attached_devices(), vec!["sensor-1"]);
        mock.detach("sensor-1").await.unwrap();
        assert!(mock.attached_devices().is_empty());
    }

    #[tokio::test]
    async fn failure_presets_apply() {
        let mock = MockClient::new();
        mock.fail_connect("broker unreachable");
        assert!(mock.connect().await.is_err());
        assert!(!mock.is_connected());

        mock.fail_shadow_delete("no such shadow");
        assert!(
            mock.delete_shadow("sensor-1", Duration::from_millis(100))
                .await
                .is_err()
        );
        assert!(mock.shadow_deletes().is_empty());
    }

    #[tokio::test]
    async fn forced_publish_outcome() {
        let mock = MockClient::new();
        mock.resolve_publishes_with(PublishOutcome::Timeout);
        let receipt = mock
            .publish("t", QoS::AtMostOnce, b"x".to_vec())
            .await
            .unwrap();
        assert_eq!(receipt.outcome().await, PublishOutcome::Timeout);
    }

    #[tokio::test]
    async fn factory_records_builds() {
        let factory = MockClientFactory::new();
        let bundle = CredentialBundle {
            root_ca: None,
            certificate: b"cert".to_vec(),
            private_key: b"key".to_vec(),
        };
        factory.build("host-a", "id-1", &bundle).unwrap();
        factory.build("host-b", "id-2", &bundle).unwrap();

        assert_eq!(factory.build_count(), 2);
        assert_eq!(
            factory.requests(),
            vec![
                ("host-a".to_string(), "id-1".to_string()),
                ("host-b".to_string(), "id-2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn factory_failure_presets() {
        let factory = MockClientFactory::new();
        let bundle = CredentialBundle {
            root_ca: None,
            certificate: b"cert".to_vec(),
            private_key: b"key".to_vec(),
        };

        factory.fail_build("no TLS");
        assert!(factory.build("host", "id", &bundle).is_err());

        factory.heal();
        factory.fail_connect("refused");
        let client = factory.build("host", "id", &bundle).unwrap();
        assert!(client.connect().await.is_err());
    }
}
