//! Connection configuration snapshots.
//!
//! A `ConnectionConfig` is immutable once constructed; every setup cycle
//! reads a fresh candidate from the property source and compares it
//! structurally against the active one. Any difference means the connection
//! must be rebuilt.

use serde::Deserialize;

use crate::error::{TransportError, TransportResult};
use crate::properties::{PropertySource, keys};

/// Fallback MQTT client identity when the configuration names neither a
/// device schema nor a device id field.
const DEFAULT_CLIENT_ID: &str = "geostream-transport";

/// The two service modes: publish/subscribe on a named topic, or binding
/// to a specific device's shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ServiceMode {
    Topic,
    Device,
}

impl ServiceMode {
    fn parse(value: &str) -> TransportResult<Self> {
        if value.eq_ignore_ascii_case("topic") {
            Ok(ServiceMode::Topic)
        } else if value.eq_ignore_ascii_case("device") {
            Ok(ServiceMode::Device)
        } else {
            Err(TransportError::Configuration(format!(
                "invalid {} '{value}' (expected 'Topic' or 'Device')",
                keys::IOT_SERVICE_TYPE
            )))
        }
    }
}

/// Immutable snapshot of connection parameters.
///
/// Structural equality is the whole of change detection: a candidate that
/// compares equal to the active config means no rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    pub service_mode: ServiceMode,
    /// Broker endpoint, `host` or `host:port`.
    pub endpoint: String,
    /// Optional root CA reference; platform trust store when absent.
    #[serde(default)]
    pub root_ca: Option<String>,
    /// Device X.509 certificate reference.
    pub certificate: String,
    /// Device private key reference.
    pub private_key: String,
    /// Topic to subscribe (inbound) or publish (outbound, Topic mode).
    pub topic: String,
    /// Event-schema reference naming the device id source (Device mode).
    #[serde(default)]
    pub device_schema: Option<String>,
    /// Event field carrying the device id (Device mode).
    #[serde(default)]
    pub device_id_field: Option<String>,
}

impl ConnectionConfig {
    /// Snapshot a candidate configuration from the property source.
    ///
    /// Each recognized key is read once. Missing required keys are
    /// configuration errors.
    pub fn from_properties(props: &dyn PropertySource) -> TransportResult<Self> {
        let service_mode = ServiceMode::parse(&required(props, keys::IOT_SERVICE_TYPE)?)?;
        Ok(Self {
            service_mode,
            endpoint: required(props, keys::CLIENT_ENDPOINT)?,
            root_ca: optional(props, keys::ROOT_CA),
            certificate: required(props, keys::X509_CERTIFICATE)?,
            private_key: required(props, keys::PRIVATE_KEY)?,
            topic: required(props, keys::TOPIC_NAME)?,
            device_schema: optional(props, keys::DEVICE_ID_GED_NAME),
            device_id_field: optional(props, keys::DEVICE_ID_FIELD_NAME),
        })
    }

    /// Enforce the cross-field invariant: Device mode requires a device id
    /// field.
    pub fn validate(&self) -> TransportResult<()> {
        if self.service_mode == ServiceMode::Device
            && self.device_id_field.as_deref().is_none_or(str::is_empty)
        {
            return Err(TransportError::Configuration(format!(
                "service mode 'Device' requires a non-empty {}",
                keys::DEVICE_ID_FIELD_NAME
            )));
        }
        Ok(())
    }

    /// MQTT client identity: the device schema name when present, else the
    /// device id field, else a fixed default.
    pub fn client_id(&self) -> &str {
        self.device_schema
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.device_id_field.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(DEFAULT_CLIENT_ID)
    }
}

fn required(props: &dyn PropertySource, key: &str) -> TransportResult<String> {
    props
        .get_property(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TransportError::Configuration(format!("missing required property '{key}'")))
}

fn optional(props: &dyn PropertySource, key: &str) -> Option<String> {
    props.get_property(key).filter(|v| !v.is_empty())
}
