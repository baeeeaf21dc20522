//! Outbound transport adapter.
//!
//! Converts pipeline byte buffers into publish calls (Topic mode) or
//! shadow delete+update pairs (Device mode). Every send is a single
//! best-effort attempt; nothing is retried automatically.

use std::sync::Arc;

use async_trait::async_trait;

use gs_mqtt_channel::{ClientFactory, CredentialStore, PublishOutcome, QoS};

use crate::config::{ConnectionConfig, ServiceMode};
use crate::error::TransportResult;
use crate::lifecycle::{ConnectionHandle, SHADOW_TIMEOUT, SessionHook, TransportLifecycle};
use crate::properties::PropertySource;
use crate::status::StatusHandle;

/// Outbound adapter: pipeline byte buffers → MQTT topic or device shadow.
pub struct OutboundAdapter {
    lifecycle: Arc<TransportLifecycle>,
}

impl OutboundAdapter {
    pub fn new(
        properties: Arc<dyn PropertySource>,
        credentials: Arc<dyn CredentialStore>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let status = StatusHandle::new();
        let lifecycle = Arc::new(TransportLifecycle::new(
            properties,
            credentials,
            factory,
            Arc::new(OutboundSession),
            status,
        ));
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

    /// Send one payload.
    ///
    /// Topic mode publishes fire-and-forget at QoS "at most once"; the
    /// completion resolves on a background task and is logged once per
    /// outcome. Device mode resolves a device id from the hint, deletes the
    /// existing shadow, then applies the payload as the new shadow document
    /// before returning. Drops (missing client, blank device id) are
    /// warnings; shadow failures promote the Error state.
    pub async fn send(&self, payload: &[u8], device_id_hint: Option<&str>) {
        let (handle, config) = self.lifecycle.session().await;
        let Some(config) = config else {
            tracing::warn!("dropping send: transport has no applied configuration");
            return;
        };
        match config.service_mode {
            ServiceMode::Topic => self.send_to_topic(handle, &config, payload).await,
            ServiceMode::Device => {
                self.send_to_device(handle, payload, device_id_hint).await;
            }
        }
    }

    async fn send_to_topic(
        &self,
        handle: Option<ConnectionHandle>,
        config: &ConnectionConfig,
        payload: &[u8],
    ) {
        let Some(handle) = handle else {
            tracing::warn!(
                endpoint = %config.endpoint,
                "dropping publish: no connected client"
            );
            return;
        };
        match handle
            .client
            .publish(&config.topic, QoS::AtMostOnce, payload.to_vec())
            .await
        {
            Ok(receipt) => {
                let topic = config.topic.clone();
                tokio::spawn(async move {
                    match receipt.outcome().await {
                        PublishOutcome::Success => {
                            tracing::debug!(topic = %topic, "publish delivered");
                        }
                        PublishOutcome::Failure(e) => {
                            tracing::warn!(topic = %topic, error = %e, "publish failed");
                        }
                        PublishOutcome::Timeout => {
                            tracing::warn!(topic = %topic, "publish timed out");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(topic = %config.topic, error = %e, "publish not accepted");
            }
        }
    }

    async fn send_to_device(
        &self,
        handle: Option<ConnectionHandle>,
        payload: &[u8],
        device_id_hint: Option<&str>,
    ) {
        let Some(device_id) = device_id_hint.map(str::trim).filter(|s| !s.is_empty()) else {
            tracing::warn!("dropping send: blank device id");
            return;
        };
        let Some(binding) = handle.and_then(|h| h.binding) else {
            tracing::warn!(device = device_id, "dropping send: no active device binding");
            return;
        };
        if device_id != binding.device_id() {
            tracing::debug!(
                resolved = device_id,
                bound = binding.device_id(),
                "device id hint differs from active binding"
            );
        }
        if let Err(e) = binding.delete(SHADOW_TIMEOUT).await {
            tracing::error!(error = %e, device = binding.device_id(), "shadow delete failed");
            self.lifecycle.status().fail(e.to_string());
            return;
        }
        if let Err(e) = binding.update(payload.to_vec(), SHADOW_TIMEOUT).await {
            tracing::error!(error = %e, device = binding.device_id(), "shadow update failed");
            self.lifecycle.status().fail(e.to_string());
        }
    }
}

/// Post-connect work: a Device-mode connection starts from a clean slate,
/// so any stale shadow left by a previous session is deleted best-effort.
struct OutboundSession;

#[async_trait]
impl SessionHook for OutboundSession {
    async fn on_connected(
        &self,
        handle: &ConnectionHandle,
        _config: &ConnectionConfig,
    ) -> TransportResult<()> {
        if let Some(binding) = &handle.binding {
            if let Err(e) = binding.delete(SHADOW_TIMEOUT).await {
                tracing::warn!(
                    error = %e,
                    device = binding.device_id(),
                    "failed to clear stale shadow after connect"
                );
            }
        }
        Ok(())
    }
}
