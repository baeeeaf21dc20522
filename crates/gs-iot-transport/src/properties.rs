//! Property source — the hosting pipeline's view of transport configuration.
//!
//! The host exposes configuration as flat string properties; the transport
//! reads each recognized key once per setup cycle and snapshots the result
//! into a `ConnectionConfig`.

use std::collections::HashMap;
use std::sync::Mutex;

/// Recognized property keys.
pub mod keys {
    pub const IOT_SERVICE_TYPE: &str = "iotServiceType";
    pub const CLIENT_ENDPOINT: &str = "clientEndPoint";
    pub const ROOT_CA: &str = "rootCertificateAuthority";
    pub const X509_CERTIFICATE: &str = "x509Certificate";
    pub const PRIVATE_KEY: &str = "privateKey";
    pub const TOPIC_NAME: &str = "topicName";
    pub const DEVICE_ID_GED_NAME: &str = "deviceIdGedName";
    pub const DEVICE_ID_FIELD_NAME: &str = "deviceIdFieldName";
}

/// Read access to the host's property store.
pub trait PropertySource: Send + Sync {
    fn has_property(&self, name: &str) -> bool;

    fn get_property(&self, name: &str) -> Option<String>;
}

/// Map-backed property source.
///
/// Interior mutability lets hosts (and tests) change properties between
/// setup cycles, which is what drives reconfiguration.
#[derive(Default)]
pub struct InMemoryProperties {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove(&self, name: &str) {
        self.values.lock().unwrap().remove(name);
    }
}

impl PropertySource for InMemoryProperties {
    fn has_property(&self, name: &str) -> bool {
        self.values.lock().unwrap().contains_key(name)
    }

    fn get_property(&self, name: &str) -> Option<String> {
        self.values.lock().unwrap().get(name).cloned()
    }
}
