//! Device shadow binding.
//!
//! A `ShadowBinding` attaches one device identity to one connection. It
//! exists iff the adapter runs in Device mode and the handle is connected;
//! the lifecycle guarantees at most one binding per handle.

use std::sync::Arc;
use std::time::Duration;

use gs_mqtt_channel::{MqttClient, MqttResult};

/// Attachment of a device identity to an MQTT client.
#[derive(Clone)]
pub struct ShadowBinding {
    client: Arc<dyn MqttClient>,
    device_id: String,
}

impl ShadowBinding {
    /// Attach `device_id` to the client, yielding the binding.
    pub async fn attach(client: Arc<dyn MqttClient>, device_id: String) -> MqttResult<Self> {
        client.attach(&device_id).await?;
        Ok(Self { client, device_id })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Detach the device identity from the client.
    pub async fn detach(&self) -> MqttResult<()> {
        self.client.detach(&self.device_id).await
    }

    /// Delete the device's remote shadow document.
    pub async fn delete(&self, timeout: Duration) -> MqttResult<()> {
        self.client.delete_shadow(&self.device_id, timeout).await
    }

    /// Apply `payload` as the device's new shadow-update document.
    pub async fn update(&self, payload: Vec<u8>, timeout: Duration) -> MqttResult<()> {
        self.client
            .update_shadow(&self.device_id, payload, timeout)
            .await
    }
}
