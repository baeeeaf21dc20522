//! MQTT client capability — the narrow interface the transport lifecycle
//! drives, plus the rumqttc-backed production implementation.
//!
//! `RumqttcClient` owns the `AsyncClient` and drives the `EventLoop` in a
//! spawned task once `connect()` succeeds. Incoming publishes are routed to
//! per-subscription channels so each subscriber sees messages in delivery
//! order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::credentials::CredentialBundle;
use crate::error::{MqttError, MqttResult};
use crate::topics;

/// Bounded time a fire-and-forget publish may spend in flight before its
/// receipt resolves to `Timeout`.
const PUBLISH_COMPLETION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Per-subscription channel capacity.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Ordered stream of raw payloads delivered on one subscription.
pub type MessageStream = mpsc::Receiver<Vec<u8>>;

// ── Publish completion ────────────────────────────────────────

/// Resolution of a fire-and-forget publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Success,
    Failure(String),
    Timeout,
}

/// Handle resolving to the outcome of one publish.
///
/// The publish call itself never blocks on delivery; callers that care about
/// the outcome await the receipt on a separate task.
pub struct PublishReceipt {
    rx: oneshot::Receiver<PublishOutcome>,
}

impl PublishReceipt {
    pub fn new(rx: oneshot::Receiver<PublishOutcome>) -> Self {
        Self { rx }
    }

    /// Wait for the publish to resolve. A dropped completion channel counts
    /// as a failure.
    pub async fn outcome(self) -> PublishOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| PublishOutcome::Failure("completion channel closed".into()))
    }
}

// ── Capability trait ──────────────────────────────────────────

/// Abstraction over the MQTT client the transport lifecycle owns.
///
/// Enables mocking in tests without a real broker. One value of this trait
/// represents one connection; the lifecycle builds a fresh client for every
/// (re)configuration cycle.
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Establish the connection. Bounded only by the client's own defaults.
    async fn connect(&self) -> MqttResult<()>;

    /// Disconnect, waiting at most `timeout` for the broker handshake.
    async fn disconnect(&self, timeout: Duration) -> MqttResult<()>;

    /// Fire-and-forget publish. Returns as soon as the message is handed to
    /// the client; the receipt resolves asynchronously.
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>)
    -> MqttResult<PublishReceipt>;

    /// Subscribe to a topic, returning the ordered message stream for it.
    async fn subscribe(&self, topic: &str, qos: QoS) -> MqttResult<MessageStream>;

    /// Attach a device identity to this connection (shadow delta
    /// notifications for the device start flowing).
    async fn attach(&self, device_id: &str) -> MqttResult<()>;

    /// Detach a previously attached device identity.
    async fn detach(&self, device_id: &str) -> MqttResult<()>;

    /// Delete the remote shadow document for a device.
    async fn delete_shadow(&self, device_id: &str, timeout: Duration) -> MqttResult<()>;

    /// Replace the remote shadow document for a device.
    async fn update_shadow(
        &self,
        device_id: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> MqttResult<()>;
}

/// Builds a connected-capable client from a configuration snapshot.
///
/// The transport lifecycle calls this once per rebuild so every
/// configuration change gets a fresh client.
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        endpoint: &str,
        client_id: &str,
        credentials: &CredentialBundle,
    ) -> MqttResult<Arc<dyn MqttClient>>;
}

// ── RumqttcClient ─────────────────────────────────────────────

type Routes = Arc<Mutex<Vec<(String, mpsc::Sender<Vec<u8>>)>>>;

/// Production MQTT client over `rumqttc::AsyncClient`.
pub struct RumqttcClient {
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    routes: Routes,
}

impl RumqttcClient {
    pub fn new(client: AsyncClient, eventloop: EventLoop) -> Self {
        Self {
            client,
            eventloop: Mutex::new(Some(eventloop)),
            driver: Mutex::new(None),
            routes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Drive the event loop: resolve the ready signal on the first CONNACK
    /// (or first error), then keep routing inbound publishes until aborted.
    async fn drive(
        mut eventloop: EventLoop,
        routes: Routes,
        mut ready: Option<oneshot::Sender<MqttResult<()>>>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let senders: Vec<mpsc::Sender<Vec<u8>>> = {
                        let routes = routes.lock().await;
                        routes
                            .iter()
                            .filter(|(filter, _)| filter == &publish.topic)
                            .map(|(_, tx)| tx.clone())
                            .collect()
                    };
                    if senders.is_empty() {
                        tracing::debug!(topic = %publish.topic, "no subscriber for message");
                    }
                    for tx in senders {
                        if tx.send(publish.payload.to_vec()).await.is_err() {
                            tracing::debug!(topic = %publish.topic, "subscriber dropped");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Before CONNACK an error fails the pending connect; after
                    // that rumqttc reconnects on the next poll.
                    match ready.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(MqttError::Connection(e.to_string())));
                            return;
                        }
                        None => {
                            tracing::warn!(error = %e, "MQTT event loop error, retrying in 5s");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&self) -> MqttResult<()> {
        let eventloop = self
            .eventloop
            .lock()
            .await
            .take()
            .ok_or_else(|| MqttError::Connection("client already connected".into()))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(Self::drive(
            eventloop,
            Arc::clone(&self.routes),
            Some(ready_tx),
        ));
        *self.driver.lock().await = Some(handle);

        ready_rx
            .await
            .map_err(|_| MqttError::Connection("event loop exited before CONNACK".into()))?
    }

    async fn disconnect(&self, timeout: Duration) -> MqttResult<()> {
        // Dropping the route senders ends every subscriber stream.
        self.routes.lock().await.clear();

        let result = tokio::time::timeout(timeout, self.client.disconnect()).await;
        if let Some(driver) = self.driver.lock().await.take() {
            driver.abort();
        }
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MqttError::Connection(e.to_string())),
            Err(_) => Err(MqttError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: Vec<u8>,
    ) -> MqttResult<PublishReceipt> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(
                PUBLISH_COMPLETION_TIMEOUT,
                client.publish(topic, qos, false, payload),
            )
            .await
            {
                Ok(Ok(())) => PublishOutcome::Success,
                Ok(Err(e)) => PublishOutcome::Failure(e.to_string()),
                Err(_) => PublishOutcome::Timeout,
            };
            let _ = tx.send(outcome);
        });
        Ok(PublishReceipt::new(rx))
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> MqttResult<MessageStream> {
        self.client
            .subscribe(topic, qos)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.routes.lock().await.push((topic.to_string(), tx));
        Ok(rx)
    }

    async fn attach(&self, device_id: &str) -> MqttResult<()> {
        self.client
            .subscribe(topics::shadow_delta(device_id), QoS::AtLeastOnce)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    async fn detach(&self, device_id: &str) -> MqttResult<()> {
        self.client
            .unsubscribe(topics::shadow_delta(device_id))
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    async fn delete_shadow(&self, device_id: &str, timeout: Duration) -> MqttResult<()> {
        let publish = self.client.publish(
            topics::shadow_delete(device_id),
            QoS::AtLeastOnce,
            false,
            Vec::new(),
        );
        match tokio::time::timeout(timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MqttError::Shadow(format!("shadow delete failed: {e}"))),
            Err(_) => Err(MqttError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn update_shadow(
        &self,
        device_id: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> MqttResult<()> {
        let publish = self.client.publish(
            topics::shadow_update(device_id),
            QoS::AtLeastOnce,
            false,
            payload,
        );
        match tokio::time::timeout(timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MqttError::Shadow(format!("shadow update failed: {e}"))),
            Err(_) => Err(MqttError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

// ── Factory ───────────────────────────────────────────────────

/// Factory producing `RumqttcClient` values for AWS IoT endpoints.
pub struct RumqttcClientFactory {
    keepalive: Duration,
}

impl RumqttcClientFactory {
    pub fn new(keepalive: Duration) -> Self {
        Self { keepalive }
    }
}

impl Default for RumqttcClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ClientFactory for RumqttcClientFactory {
    fn build(
        &self,
        endpoint: &str,
        client_id: &str,
        credentials: &CredentialBundle,
    ) -> MqttResult<Arc<dyn MqttClient>> {
        let (host, port) = split_endpoint(endpoint)?;
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(self.keepalive);
        options.set_transport(credentials.tls_transport());

        let (client, eventloop) = AsyncClient::new(options, SUBSCRIPTION_BUFFER);
        Ok(Arc::new(RumqttcClient::new(client, eventloop)))
    }
}

/// Split an endpoint of the form `host` or `host:port`; the port defaults
/// to 8883 (MQTT over TLS).
fn split_endpoint(endpoint: &str) -> MqttResult<(String, u16)> {
    if endpoint.trim().is_empty() {
        return Err(MqttError::Connection("empty endpoint".into()));
    }
    match endpoint.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) if !host.is_empty() => Ok((host.to_string(), port)),
            _ => Err(MqttError::Connection(format!(
                "invalid endpoint '{endpoint}'"
            ))),
        },
        None => Ok((endpoint.to_string(), 8883)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_without_port_defaults_to_8883() {
        let (host, port) = split_endpoint("a1b2c3-ats.iot.us-east-1.amazonaws.com").unwrap();
        assert_eq!(host, "a1b2c3-ats.iot.us-east-1.amazonaws.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn endpoint_with_port() {
        let (host, port) = split_endpoint("broker.local:1883").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn invalid_endpoints_rejected() {
        assert!(split_endpoint("").is_err());
        assert!(split_endpoint("host:notaport").is_err());
        assert!(split_endpoint(":8883").is_err());
    }

    #[tokio::test]
    async fn dropped_receipt_sender_is_a_failure() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let receipt = PublishReceipt::new(rx);
        assert!(matches!(receipt.outcome().await, PublishOutcome::Failure(_)));
    }

    #[tokio::test]
    async fn receipt_resolves_to_sent_outcome() {
        let (tx, rx) = oneshot::channel();
        tx.send(PublishOutcome::Timeout).unwrap();
        assert_eq!(PublishReceipt::new(rx).outcome().await, PublishOutcome::Timeout);
    }
}
