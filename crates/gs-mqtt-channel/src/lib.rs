//! MQTT client capability for the GeoStream IoT bridge.
//!
//! Wraps everything the transport adapters need from the broker side:
//! - `MqttClient` trait for connect/disconnect/publish/subscribe and device
//!   shadow operations (mockable in tests)
//! - `RumqttcClient` with TLS (mTLS) for production against AWS IoT Core
//! - `CredentialStore` for resolving certificate/key material
//! - `MockClient` / `MockClientFactory` for testing without a broker

pub mod client;
pub mod credentials;
pub mod error;
pub mod mock;
pub mod topics;

// Re-exports for convenience.
pub use client::{
    ClientFactory, MessageStream, MqttClient, PublishOutcome, PublishReceipt, RumqttcClient,
    RumqttcClientFactory,
};
pub use credentials::{CredentialBundle, CredentialStore, PemFileStore, StaticCredentialStore};
pub use error::{MqttError, MqttResult};
pub use mock::{MockClient, MockClientFactory, PublishedMessage};
pub use rumqttc::QoS;
