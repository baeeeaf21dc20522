//! IoT transport adapters for the GeoStream pipeline.
//!
//! Bridges the streaming event pipeline to an MQTT-based IoT back end:
//! - `InboundAdapter` subscribes a topic and feeds payloads into the
//!   pipeline's byte sink
//! - `OutboundAdapter` publishes pipeline buffers to a topic or applies
//!   them as device-shadow updates
//! - `TransportLifecycle` is the connection/reconfiguration state machine
//!   both adapters share

pub mod config;
pub mod error;
pub mod inbound;
pub mod lifecycle;
pub mod outbound;
pub mod properties;
pub mod shadow;
pub mod status;

// Re-exports for convenience.
pub use config::{ConnectionConfig, ServiceMode};
pub use error::{TransportError, TransportResult};
pub use inbound::{ByteSink, InboundAdapter, SinkError};
pub use lifecycle::{ConnectionHandle, SessionHook, TransportLifecycle};
pub use outbound::OutboundAdapter;
pub use properties::{InMemoryProperties, PropertySource};
pub use shadow::ShadowBinding;
pub use status::{RunningState, StatusHandle};
