//! Connection lifecycle and reconfiguration state machine.
//!
//! Shared by the inbound and outbound adapters. One `TransportLifecycle`
//! owns at most one live client + shadow binding pair, serializes every
//! transition, and rebuilds the connection when the configuration snapshot
//! drifts from the applied one.
//!
//! State machine: `Stopped -> Starting -> {Started, Error}`;
//! `{Started, Error, Stopped} -> Stopping -> Stopped`. Error is not
//! terminal — a later `start()` retries setup from scratch. A config change
//! detected while Started rebuilds through an internal teardown without a
//! visible Stopped state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gs_mqtt_channel::{ClientFactory, CredentialStore, MqttClient, MqttError};

use crate::config::{ConnectionConfig, ServiceMode};
use crate::error::{TransportError, TransportResult};
use crate::properties::PropertySource;
use crate::shadow::ShadowBinding;
use crate::status::{RunningState, StatusHandle};

/// Bound on shadow delete and client disconnect during teardown, and on
/// outbound shadow operations.
pub const SHADOW_TIMEOUT: Duration = Duration::from_millis(5000);

/// One live connection: exactly one client, at most one shadow binding.
/// Exclusively owned by a single adapter instance.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub client: Arc<dyn MqttClient>,
    pub binding: Option<ShadowBinding>,
}

/// Adapter-specific work to run once the connection is established
/// (inbound: subscribe the topic; outbound: clear any stale shadow).
///
/// A hook failure is a setup failure.
#[async_trait]
pub trait SessionHook: Send + Sync {
    async fn on_connected(
        &self,
        handle: &ConnectionHandle,
        config: &ConnectionConfig,
    ) -> TransportResult<()>;
}

/// Hook that does nothing after connect.
pub struct NoopSession;

#[async_trait]
impl SessionHook for NoopSession {
    async fn on_connected(
        &self,
        _handle: &ConnectionHandle,
        _config: &ConnectionConfig,
    ) -> TransportResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    /// Currently-applied configuration; candidates diff against this.
    active: Option<ConnectionConfig>,
    handle: Option<ConnectionHandle>,
}

/// The lifecycle state machine.
pub struct TransportLifecycle {
    properties: Arc<dyn PropertySource>,
    credentials: Arc<dyn CredentialStore>,
    factory: Arc<dyn ClientFactory>,
    hook: Arc<dyn SessionHook>,
    status: StatusHandle,
    inner: tokio::sync::Mutex<Inner>,
}

impl TransportLifecycle {
    pub fn new(
        properties: Arc<dyn PropertySource>,
        credentials: Arc<dyn CredentialStore>,
        factory: Arc<dyn ClientFactory>,
        hook: Arc<dyn SessionHook>,
        status: StatusHandle,
    ) -> Self {
        Self {
            properties,
            credentials,
            factory,
            hook,
            status,
            inner: tokio::sync::Mutex::new(Inner::default()),
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.status.state() == RunningState::Started
    }

    /// Begin running. No-op while Starting or Started; from any other state
    /// (including Error) this retries setup from scratch.
    pub async fn start(&self) {
        match self.status.state() {
            RunningState::Starting | RunningState::Started => return,
            _ => {}
        }
        self.status.set_state(RunningState::Starting);
        self.setup().await;
    }

    /// Apply the current configuration, rebuilding the connection if it
    /// drifted. Safe to call while Started — an unchanged configuration
    /// with a live handle is a no-op.
    pub async fn setup(&self) {
        let mut inner = self.inner.lock().await;
        match self.try_setup(&mut inner).await {
            Ok(()) => {
                self.status.set_error_message(None);
                self.status.set_state(RunningState::Started);
            }
            Err(e) => {
                tracing::error!(error = %e, "transport setup failed");
                // Leave no partially-connected handle behind.
                Self::release(&mut inner).await;
                self.status.fail(e.to_string());
            }
        }
    }

    async fn try_setup(&self, inner: &mut Inner) -> TransportResult<()> {
        let candidate = ConnectionConfig::from_properties(self.properties.as_ref())?;
        candidate.validate()?;

        let pending_change = inner
            .active
            .as_ref()
            .is_some_and(|active| active != &candidate);
        if !pending_change && inner.handle.is_some() {
            return Ok(());
        }
        if pending_change {
            Self::release(inner).await;
        }

        let bundle = self
            .credentials
            .resolve(
                &candidate.certificate,
                &candidate.private_key,
                candidate.root_ca.as_deref(),
            )
            .map_err(credential_err)?;

        let client = self
            .factory
            .build(&candidate.endpoint, candidate.client_id(), &bundle)
            .map_err(connect_err)?;

        let binding = match candidate.service_mode {
            ServiceMode::Device => {
                // validate() guarantees the field is present and non-empty.
                let device_id = candidate.device_id_field.clone().unwrap_or_default();
                let binding = ShadowBinding::attach(Arc::clone(&client), device_id)
                    .await
                    .map_err(connect_err)?;
                Some(binding)
            }
            ServiceMode::Topic => None,
        };

        // Store the handle before connecting so a failure below still tears
        // down through the normal path.
        inner.handle = Some(ConnectionHandle {
            client: Arc::clone(&client),
            binding,
        });

        client.connect().await.map_err(connect_err)?;

        if let Some(handle) = inner.handle.as_ref() {
            self.hook.on_connected(handle, &candidate).await?;
        }

        inner.active = Some(candidate);
        Ok(())
    }

    /// Stop the adapter. No-op while already Stopping; always permitted
    /// otherwise.
    pub async fn stop(&self) {
        if self.status.state() == RunningState::Stopping {
            return;
        }
        self.status.set_state(RunningState::Stopping);
        let mut inner = self.inner.lock().await;
        Self::release(&mut inner).await;
        drop(inner);
        self.status.set_error_message(None);
        self.status.set_state(RunningState::Stopped);
    }

    /// Idempotent teardown. Every step is best-effort: failures are logged
    /// and never propagated, and the handle/binding references are cleared
    /// unconditionally.
    async fn release(inner: &mut Inner) {
        let Some(handle) = inner.handle.take() else {
            return;
        };
        if let Some(binding) = &handle.binding {
            if let Err(e) = binding.detach().await {
                tracing::warn!(
                    error = %e,
                    device = binding.device_id(),
                    "failed to detach device during teardown"
                );
            }
            if let Err(e) = binding.delete(SHADOW_TIMEOUT).await {
                tracing::warn!(
                    error = %e,
                    device = binding.device_id(),
                    "failed to delete shadow during teardown"
                );
            }
        }
        if let Err(e) = handle.client.disconnect(SHADOW_TIMEOUT).await {
            tracing::warn!(error = %e, "failed to disconnect client during teardown");
        }
        tracing::debug!("teardown complete");
    }

    /// Snapshot the current handle and applied configuration. Used by the
    /// outbound send path; never exposes the handle for mutation.
    pub(crate) async fn session(&self) -> (Option<ConnectionHandle>, Option<ConnectionConfig>) {
        let inner = self.inner.lock().await;
        (inner.handle.clone(), inner.active.clone())
    }
}

fn credential_err(e: MqttError) -> TransportError {
    match e {
        MqttError::Credential(m) => TransportError::Credential(m),
        other => TransportError::Credential(other.to_string()),
    }
}

fn connect_err(e: MqttError) -> TransportError {
    match e {
        MqttError::Connection(m) => TransportError::Connect(m),
        other => TransportError::Connect(other.to_string()),
    }
}
