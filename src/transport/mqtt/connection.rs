//! Pure connection state management for the MQTT transport
//!
//! This module contains connection state, the transport error type, client
//! identity generation and the mapping from broker configuration to
//! rumqttc options. Apart from reading TLS material, nothing here performs I/O.

use crate::config::MqttSection;
use rumqttc::{MqttOptions, QoS, TlsConfiguration, Transport as RumqttcTransport};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Keep-alive interval negotiated with the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Upper bound for a single connect handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time `disconnect` waits for in-flight packets to flush
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Capacity of the rumqttc request channel
pub const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Every subscribe and publish uses at-least-once delivery
pub const QOS: QoS = QoS::AtLeastOnce;

/// Connection state for the MQTT transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No session and no attempt in flight
    Disconnected = 0,
    /// Initial connect attempt in flight
    Connecting = 1,
    /// ConnAck received, operations allowed
    Connected = 2,
    /// Reconnect attempt in flight
    Reconnecting = 3,
    /// `disconnect` called; terminal until it completes
    ShuttingDown = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::ShuttingDown,
            _ => ConnectionState::Disconnected,
        }
    }

    /// True while an attempt is in flight and has not resolved yet
    pub fn is_attempting(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::ShuttingDown => "shutting_down",
        };
        f.write_str(name)
    }
}

/// Lock-free cell holding a [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Atomically replace the state with `f(current)`.
    ///
    /// Returns the `(previous, new)` pair.
    pub fn update<F>(&self, mut f: F) -> (ConnectionState, ConnectionState)
    where
        F: FnMut(ConnectionState) -> ConnectionState,
    {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let from = ConnectionState::from_u8(current);
            let to = f(from);
            match self.0.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (from, to),
                Err(actual) => current = actual,
            }
        }
    }
}

/// MQTT transport errors
///
/// Only construction errors reach callers; everything raised at runtime is
/// logged by the transport.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker configuration: {0}")]
    InvalidBrokerConfig(String),
    #[error("TLS {kind} file not found: {}", path.display())]
    TlsFileNotFound { kind: &'static str, path: PathBuf },
    #[error("Failed to read TLS {kind} file {}", path.display())]
    TlsFileRead {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TLS {kind}: {reason}")]
    TlsMaterial { kind: &'static str, reason: String },
}

/// Build the client identifier `tracker-{hostname}-{pid}`
pub fn generate_client_id() -> String {
    format!("tracker-{}-{}", hostname(), std::process::id())
}

fn hostname() -> String {
    ["/proc/sys/kernel/hostname", "/etc/hostname"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .or_else(|| {
            std::env::var("HOSTNAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Map broker configuration to rumqttc options.
///
/// TLS files are read here so a missing certificate fails at construction
/// instead of on every reconnect attempt.
pub fn configure_mqtt_options(
    client_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    if config.host.trim().is_empty() {
        return Err(MqttError::InvalidBrokerConfig(
            "broker host must not be empty".to_string(),
        ));
    }
    if config.port == 0 {
        return Err(MqttError::InvalidBrokerConfig(
            "broker port must be in 1-65535".to_string(),
        ));
    }

    let mut mqtt_options = MqttOptions::new(client_id, config.host.clone(), config.port);
    mqtt_options.set_keep_alive(KEEP_ALIVE);
    mqtt_options.set_clean_session(true);

    if !config.insecure {
        mqtt_options.set_transport(configure_tls(config)?);
    }

    debug!(
        client_id = %client_id,
        host = %config.host,
        port = config.port,
        tls = !config.insecure,
        "Configured MQTT options"
    );

    Ok(mqtt_options)
}

fn configure_tls(config: &MqttSection) -> Result<RumqttcTransport, MqttError> {
    let Some(tls) = &config.tls else {
        debug!("TLS section not set, using default TLS configuration");
        return Ok(RumqttcTransport::tls_with_default_config());
    };

    let client_auth = match (&tls.client_cert_path, &tls.client_key_path) {
        (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some((
            read_tls_file("client certificate", cert)?,
            read_tls_file("client key", key)?,
        )),
        _ => None,
    };

    if !tls.verify_server {
        warn!("Server certificate verification disabled; broker identity is not checked");
        let client_config = unverified_client_config(client_auth)?;
        return Ok(RumqttcTransport::tls_with_config(TlsConfiguration::Rustls(
            Arc::new(client_config),
        )));
    }

    match tls.ca_cert_path.as_deref().filter(|path| !path.is_empty()) {
        Some(ca_path) => {
            let ca = read_tls_file("CA certificate", ca_path)?;
            Ok(RumqttcTransport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth,
            }))
        }
        None if client_auth.is_some() => Err(MqttError::InvalidBrokerConfig(
            "client certificate authentication requires ca_cert_path".to_string(),
        )),
        None => Ok(RumqttcTransport::tls_with_default_config()),
    }
}

/// rustls client config that accepts any server certificate
fn unverified_client_config(
    client_auth: Option<(Vec<u8>, Vec<u8>)>,
) -> Result<rustls::ClientConfig, MqttError> {
    let builder = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert));

    let Some((cert_pem, key_pem)) = client_auth else {
        return Ok(builder.with_no_client_auth());
    };

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_material("client certificate", e))?;
    if certs.is_empty() {
        return Err(tls_material("client certificate", "no certificate in PEM"));
    }
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| tls_material("client key", e))?
        .ok_or_else(|| tls_material("client key", "no private key in PEM"))?;

    builder
        .with_client_auth_cert(certs, key)
        .map_err(|e| tls_material("client certificate", e))
}

fn tls_material(kind: &'static str, reason: impl fmt::Display) -> MqttError {
    MqttError::TlsMaterial {
        kind,
        reason: reason.to_string(),
    }
}

/// Verifier used when `verify_server` is off
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        use rustls::SignatureScheme;
        vec![
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}

fn read_tls_file(kind: &'static str, path: &str) -> Result<Vec<u8>, MqttError> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(MqttError::TlsFileNotFound {
            kind,
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|source| MqttError::TlsFileRead {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsSection;
    use std::io::Write;

    fn plain_config() -> MqttSection {
        MqttSection {
            host: "localhost".to_string(),
            port: 1883,
            insecure: true,
            tls: None,
        }
    }

    #[test]
    fn test_atomic_state_roundtrip() {
        let cell = AtomicConnectionState::new(ConnectionState::Disconnected);

        for state in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::ShuttingDown,
            ConnectionState::Disconnected,
        ] {
            cell.update(|_| state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn test_atomic_state_update_reports_transition() {
        let cell = AtomicConnectionState::new(ConnectionState::Connecting);

        let (from, to) = cell.update(|_| ConnectionState::Connected);

        assert_eq!(from, ConnectionState::Connecting);
        assert_eq!(to, ConnectionState::Connected);
    }

    #[test]
    fn test_is_attempting() {
        assert!(ConnectionState::Connecting.is_attempting());
        assert!(ConnectionState::Reconnecting.is_attempting());
        assert!(!ConnectionState::Connected.is_attempting());
        assert!(!ConnectionState::Disconnected.is_attempting());
        assert!(!ConnectionState::ShuttingDown.is_attempting());
    }

    #[test]
    fn test_client_id_is_stable_within_process() {
        let first = generate_client_id();
        let second = generate_client_id();

        assert_eq!(first, second);
        assert!(first.starts_with("tracker-"));
        assert!(first.ends_with(&format!("-{}", std::process::id())));
    }

    #[test]
    fn test_configure_plain_options() {
        let options = configure_mqtt_options("tracker-test-1", &plain_config()).unwrap();

        assert_eq!(options.client_id(), "tracker-test-1");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), KEEP_ALIVE);
        assert!(options.clean_session());
    }

    #[test]
    fn test_empty_host_rejected() {
        let mut config = plain_config();
        config.host = "  ".to_string();

        let result = configure_mqtt_options("id", &config);
        assert!(matches!(result, Err(MqttError::InvalidBrokerConfig(_))));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = plain_config();
        config.port = 0;

        let result = configure_mqtt_options("id", &config);
        assert!(matches!(result, Err(MqttError::InvalidBrokerConfig(_))));
    }

    #[test]
    fn test_tls_without_section_uses_defaults() {
        let mut config = plain_config();
        config.insecure = false;

        assert!(configure_mqtt_options("id", &config).is_ok());
    }

    #[test]
    fn test_missing_ca_file_rejected() {
        let mut config = plain_config();
        config.insecure = false;
        config.tls = Some(TlsSection {
            ca_cert_path: Some("/nonexistent/ca.pem".to_string()),
            client_cert_path: None,
            client_key_path: None,
            verify_server: true,
        });

        let result = configure_mqtt_options("id", &config);
        assert!(matches!(
            result,
            Err(MqttError::TlsFileNotFound {
                kind: "CA certificate",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_client_key_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "cert").unwrap();

        let mut config = plain_config();
        config.insecure = false;
        config.tls = Some(TlsSection {
            ca_cert_path: None,
            client_cert_path: Some(cert.path().to_string_lossy().to_string()),
            client_key_path: Some("/nonexistent/client.key".to_string()),
            verify_server: true,
        });

        let result = configure_mqtt_options("id", &config);
        assert!(matches!(
            result,
            Err(MqttError::TlsFileNotFound {
                kind: "client key",
                ..
            })
        ));
    }

    #[test]
    fn test_client_auth_requires_ca() {
        let cert = tempfile::NamedTempFile::new().unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();

        let mut config = plain_config();
        config.insecure = false;
        config.tls = Some(TlsSection {
            ca_cert_path: None,
            client_cert_path: Some(cert.path().to_string_lossy().to_string()),
            client_key_path: Some(key.path().to_string_lossy().to_string()),
            verify_server: true,
        });

        let result = configure_mqtt_options("id", &config);
        assert!(matches!(result, Err(MqttError::InvalidBrokerConfig(_))));
    }

    #[test]
    fn test_insecure_ignores_tls_section() {
        let mut config = plain_config();
        config.tls = Some(TlsSection {
            ca_cert_path: Some("/nonexistent/ca.pem".to_string()),
            client_cert_path: None,
            client_key_path: None,
            verify_server: true,
        });

        assert!(configure_mqtt_options("id", &config).is_ok());
    }

    fn unverified_tls(cert: Option<String>, key: Option<String>) -> MqttSection {
        let mut config = plain_config();
        config.insecure = false;
        config.tls = Some(TlsSection {
            ca_cert_path: Some("/nonexistent/ca.pem".to_string()),
            client_cert_path: cert,
            client_key_path: key,
            verify_server: false,
        });
        config
    }

    #[test]
    fn test_unverified_tls_uses_custom_rustls_config() {
        // Arrange: CA is ignored when the server is not verified
        let config = unverified_tls(None, None);

        // Act
        let transport = configure_tls(&config).unwrap();

        // Assert
        assert!(matches!(
            transport,
            RumqttcTransport::Tls(TlsConfiguration::Rustls(_))
        ));
        let options = configure_mqtt_options("id", &config).unwrap();
        assert!(matches!(
            options.transport(),
            RumqttcTransport::Tls(TlsConfiguration::Rustls(_))
        ));
    }

    #[test]
    fn test_unverified_tls_rejects_unparseable_client_cert() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a certificate").unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(key, "not a key").unwrap();

        let config = unverified_tls(
            Some(cert.path().to_string_lossy().to_string()),
            Some(key.path().to_string_lossy().to_string()),
        );

        let result = configure_mqtt_options("id", &config);
        assert!(matches!(
            result,
            Err(MqttError::TlsMaterial {
                kind: "client certificate",
                ..
            })
        ));
    }

    #[test]
    fn test_verified_tls_keeps_simple_config() {
        let mut ca = tempfile::NamedTempFile::new().unwrap();
        writeln!(ca, "ca").unwrap();
        let mut config = plain_config();
        config.insecure = false;
        config.tls = Some(TlsSection {
            ca_cert_path: Some(ca.path().to_string_lossy().to_string()),
            client_cert_path: None,
            client_key_path: None,
            verify_server: true,
        });

        let transport = configure_tls(&config).unwrap();

        assert!(matches!(
            transport,
            RumqttcTransport::Tls(TlsConfiguration::Simple { .. })
        ));
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::InvalidBrokerConfig("test".to_string()),
            MqttError::TlsFileNotFound {
                kind: "CA certificate",
                path: PathBuf::from("/tmp/ca.pem"),
            },
            MqttError::TlsMaterial {
                kind: "client key",
                reason: "no private key in PEM".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
