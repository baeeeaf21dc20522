//! Credential resolution for mTLS connections to AWS IoT Core.
//!
//! A `CredentialStore` turns the certificate/key references carried in the
//! transport configuration into a `CredentialBundle` of PEM bytes, which the
//! client factory converts into rumqttc's TLS transport.

use rumqttc::{TlsConfiguration, Transport};

use crate::error::{MqttError, MqttResult};

/// Resolved connection credential material, PEM-encoded.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    /// Root CA certificate (e.g., AmazonRootCA1.pem). When absent the
    /// platform trust store is used.
    pub root_ca: Option<Vec<u8>>,
    /// Device X.509 certificate.
    pub certificate: Vec<u8>,
    /// Device private key.
    pub private_key: Vec<u8>,
}

impl CredentialBundle {
    /// Build a rumqttc TLS transport from this bundle.
    pub fn tls_transport(&self) -> Transport {
        match &self.root_ca {
            Some(ca) => Transport::tls_with_config(TlsConfiguration::Simple {
                ca: ca.clone(),
                alpn: None,
                client_auth: Some((self.certificate.clone(), self.private_key.clone())),
            }),
            None => Transport::tls_with_default_config(),
        }
    }
}

/// Resolves certificate + private key references into a credential bundle.
///
/// A resolution failure surfaces as a setup failure in the transport
/// lifecycle.
pub trait CredentialStore: Send + Sync {
    fn resolve(
        &self,
        certificate: &str,
        private_key: &str,
        root_ca: Option<&str>,
    ) -> MqttResult<CredentialBundle>;
}

/// Credential store that treats configuration values as PEM file paths.
pub struct PemFileStore;

impl CredentialStore for PemFileStore {
    fn resolve(
        &self,
        certificate: &str,
        private_key: &str,
        root_ca: Option<&str>,
    ) -> MqttResult<CredentialBundle> {
        let certificate = read_pem(certificate, "client certificate")?;
        let private_key = read_pem(private_key, "private key")?;
        let root_ca = root_ca.map(|path| read_pem(path, "root CA")).transpose()?;
        Ok(CredentialBundle {
            root_ca,
            certificate,
            private_key,
        })
    }
}

fn read_pem(path: &str, what: &str) -> MqttResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        MqttError::Credential(format!("failed to read {what} '{path}': {e}"))
    })
}

/// Credential store that treats configuration values as inline PEM text.
///
/// Used when the hosting pipeline stores certificate material directly in
/// its property store rather than on disk.
pub struct StaticCredentialStore;

impl CredentialStore for StaticCredentialStore {
    fn resolve(
        &self,
        certificate: &str,
        private_key: &str,
        root_ca: Option<&str>,
    ) -> MqttResult<CredentialBundle> {
        if certificate.trim().is_empty() {
            return Err(MqttError::Credential("empty client certificate".into()));
        }
        if private_key.trim().is_empty() {
            return Err(MqttError::Credential("empty private key".into()));
        }
        Ok(CredentialBundle {
            root_ca: root_ca.map(|ca| ca.as_bytes().to_vec()),
            certificate: certificate.as_bytes().to_vec(),
            private_key: private_key.as_bytes().to_vec(),
        })
    }
}
