//! Client-side TLS engine: version selection, optional client identity,
//! validation modes including pinning, and ALPN negotiation. Wraps an
//! established TCP socket in a TLS session before handing the byte stream
//! to the framer.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::{certs, private_key};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{NexusError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherSuitePreset {
    Default,
    Strong,
    Compatible,
    /// Restricts negotiation to exactly these IANA cipher suite ids.
    Custom(Vec<u16>),
}

#[derive(Clone)]
pub enum ValidationPolicy {
    System,
    Custom { root_cert_der: Vec<u8> },
    Pinning { pinned_der: Vec<Vec<u8>> },
    Disabled,
}

impl std::fmt::Debug for ValidationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationPolicy::System => write!(f, "System"),
            ValidationPolicy::Custom { .. } => write!(f, "Custom"),
            ValidationPolicy::Pinning { pinned_der } => write!(f, "Pinning({} certs)", pinned_der.len()),
            ValidationPolicy::Disabled => write!(f, "Disabled"),
        }
    }
}

impl ValidationPolicy {
    /// Maps the legacy `allowSelfSigned` flag: `true` disables validation
    /// entirely, `false` falls back to the platform trust store. The legacy
    /// field itself is not exposed; only this mapping is.
    pub fn from_allow_self_signed(allow_self_signed: bool) -> Self {
        if allow_self_signed {
            ValidationPolicy::Disabled
        } else {
            ValidationPolicy::System
        }
    }
}

#[derive(Clone)]
pub struct ClientIdentity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub private_key: Arc<PrivateKeyDer<'static>>,
}

impl ClientIdentity {
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_chain = load_certs(cert_path.as_ref())?;
        let private_key = load_private_key(key_path.as_ref())?;
        Ok(Self {
            cert_chain,
            private_key: Arc::new(private_key),
        })
    }

    pub fn from_pem_bytes(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let cert_chain = parse_certs(cert_pem)?;
        let private_key = parse_private_key(key_pem)?;
        Ok(Self {
            cert_chain,
            private_key: Arc::new(private_key),
        })
    }
}

#[derive(Clone)]
pub struct TlsConfig {
    pub min_version: TlsVersion,
    pub identity: Option<ClientIdentity>,
    pub validation: ValidationPolicy,
    pub cipher_suites: CipherSuitePreset,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub sni_override: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::Automatic,
            identity: None,
            validation: ValidationPolicy::System,
            cipher_suites: CipherSuitePreset::Default,
            alpn_protocols: Vec::new(),
            sni_override: None,
        }
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("min_version", &self.min_version)
            .field("validation", &self.validation)
            .field("alpn_protocols", &self.alpn_protocols.len())
            .finish_non_exhaustive()
    }
}

impl TlsConfig {
    fn protocol_versions(&self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        match self.min_version {
            TlsVersion::Tls13 => &rustls::DEFAULT_VERSIONS[..1],
            _ => rustls::ALL_VERSIONS,
        }
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let provider = Arc::new(rustls::crypto::CryptoProvider {
            cipher_suites: select_cipher_suites(&self.cipher_suites),
            ..rustls::crypto::ring::default_provider()
        });
        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(self.protocol_versions())
            .map_err(|e| NexusError::TlsHandshakeFailed(e.to_string()))?;

        let mut config = match &self.validation {
            ValidationPolicy::System => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                with_identity(builder.with_root_certificates(roots), &self.identity)?
            }
            ValidationPolicy::Custom { root_cert_der } => {
                let mut roots = RootCertStore::empty();
                let der = CertificateDer::from(root_cert_der.clone());
                roots
                    .add(der)
                    .map_err(|e| NexusError::CertLoadFailed(e.to_string()))?;
                with_identity(builder.with_root_certificates(roots), &self.identity)?
            }
            ValidationPolicy::Pinning { pinned_der } => {
                let verifier = Arc::new(PinningVerifier {
                    pinned: pinned_der.clone(),
                });
                with_identity(builder.dangerous().with_custom_certificate_verifier(verifier), &self.identity)?
            }
            ValidationPolicy::Disabled => {
                let verifier = Arc::new(DisabledVerifier);
                with_identity(builder.dangerous().with_custom_certificate_verifier(verifier), &self.identity)?
            }
        };

        if !self.alpn_protocols.is_empty() {
            config.alpn_protocols = self.alpn_protocols.clone();
        }

        Ok(config)
    }
}

/// Narrows the ring provider's suite list per preset. `Strong` keeps only
/// 256-bit AEAD and ChaCha20-Poly1305 suites; `Default`/`Compatible` keep
/// the provider's full list; `Custom` keeps only the named IANA ids.
fn select_cipher_suites(preset: &CipherSuitePreset) -> Vec<rustls::SupportedCipherSuite> {
    let all = rustls::crypto::ring::default_provider().cipher_suites;
    match preset {
        CipherSuitePreset::Default | CipherSuitePreset::Compatible => all,
        CipherSuitePreset::Strong => all
            .into_iter()
            .filter(|cs| {
                let name = format!("{:?}", cs.suite());
                name.contains("AES_256_GCM") || name.contains("CHACHA20_POLY1305")
            })
            .collect(),
        CipherSuitePreset::Custom(ids) => all
            .into_iter()
            .filter(|cs| ids.contains(&u16::from(cs.suite())))
            .collect(),
    }
}

fn with_identity(
    builder: rustls::ConfigBuilder<ClientConfig, rustls::client::WantsClientCert>,
    identity: &Option<ClientIdentity>,
) -> Result<ClientConfig> {
    match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.cert_chain.clone(), identity.private_key.clone_key())
            .map_err(|e| NexusError::TlsHandshakeFailed(e.to_string())),
        None => Ok(builder.with_no_client_auth()),
    }
}

/// Connects a `TcpStream` through TLS, returning the wrapped stream. SNI is
/// the logical endpoint hostname, never the proxy's.
pub async fn connect(config: &TlsConfig, hostname: &str, socket: TcpStream) -> Result<TlsStream<TcpStream>> {
    let client_config = config.client_config()?;
    let connector = TlsConnector::from(Arc::new(client_config));
    let server_name_str = config.sni_override.clone().unwrap_or_else(|| hostname.to_string());
    let server_name = ServerName::try_from(server_name_str)
        .map_err(|e| NexusError::TlsHandshakeFailed(format!("invalid SNI hostname: {e}")))?;

    connector
        .connect(server_name, socket)
        .await
        .map_err(|e| NexusError::TlsHandshakeFailed(e.to_string()))
}

/// Verifier used under `ValidationPolicy::Pinning`: walks the presented
/// chain and accepts only if the leaf's DER encoding matches the pin set.
#[derive(Debug)]
struct PinningVerifier {
    pinned: Vec<Vec<u8>>,
}

impl rustls::client::danger::ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        let presented = end_entity.as_ref();
        if self.pinned.iter().any(|pin| pin.as_slice() == presented) {
            Ok(rustls::client::danger::ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General("certificate does not match pinned set".to_string()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &rustls::crypto::ring::default_provider().signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &rustls::crypto::ring::default_provider().signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
    }
}

/// Verifier used under `ValidationPolicy::Disabled` — accepts any presented
/// chain. Mirrors the legacy `allowSelfSigned=true` behavior.
#[derive(Debug)]
struct DisabledVerifier;

impl rustls::client::danger::ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &rustls::crypto::ring::default_provider().signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &rustls::crypto::ring::default_provider().signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| NexusError::CertLoadFailed(e.to_string()))?;
    let mut reader = BufReader::new(file);
    certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NexusError::CertLoadFailed(e.to_string()))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| NexusError::CertLoadFailed(e.to_string()))?;
    let mut reader = BufReader::new(file);
    private_key(&mut reader)
        .map_err(|e| NexusError::CertLoadFailed(e.to_string()))?
        .ok_or_else(|| NexusError::CertLoadFailed("no private key found in file".to_string()))
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);
    certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NexusError::CertLoadFailed(e.to_string()))
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem);
    private_key(&mut reader)
        .map_err(|e| NexusError::CertLoadFailed(e.to_string()))?
        .ok_or_else(|| NexusError::CertLoadFailed("no private key found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_self_signed_mapping() {
        assert!(matches!(
            ValidationPolicy::from_allow_self_signed(true),
            ValidationPolicy::Disabled
        ));
        assert!(matches!(
            ValidationPolicy::from_allow_self_signed(false),
            ValidationPolicy::System
        ));
    }

    #[test]
    fn test_default_config_uses_system_validation() {
        let config = TlsConfig::default();
        assert!(matches!(config.validation, ValidationPolicy::System));
        assert!(config.client_config().is_ok());
    }

    #[test]
    fn test_pinning_config_builds() {
        let config = TlsConfig {
            validation: ValidationPolicy::Pinning { pinned_der: vec![vec![1, 2, 3]] },
            ..TlsConfig::default()
        };
        assert!(config.client_config().is_ok());
    }

    #[test]
    fn test_invalid_cert_bytes_rejected() {
        let result = ClientIdentity::from_pem_bytes(b"not a cert", b"not a key");
        assert!(result.is_err());
    }

    #[test]
    fn test_alpn_list_applied() {
        let config = TlsConfig {
            alpn_protocols: vec![b"h2".to_vec()],
            ..TlsConfig::default()
        };
        let built = config.client_config().unwrap();
        assert_eq!(built.alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn test_strong_preset_narrows_suite_list() {
        let all = select_cipher_suites(&CipherSuitePreset::Default);
        let strong = select_cipher_suites(&CipherSuitePreset::Strong);
        assert!(strong.len() < all.len());
        assert!(strong.iter().all(|cs| {
            let name = format!("{:?}", cs.suite());
            name.contains("AES_256_GCM") || name.contains("CHACHA20_POLY1305")
        }));
    }

    #[test]
    fn test_custom_preset_filters_to_named_ids() {
        let all = select_cipher_suites(&CipherSuitePreset::Default);
        let one_id = u16::from(all[0].suite());
        let custom = select_cipher_suites(&CipherSuitePreset::Custom(vec![one_id]));
        assert_eq!(custom.len(), 1);
        assert_eq!(u16::from(custom[0].suite()), one_id);
    }

    #[test]
    fn test_custom_preset_builds_valid_client_config() {
        let all = select_cipher_suites(&CipherSuitePreset::Default);
        let ids: Vec<u16> = all.iter().map(|cs| u16::from(cs.suite())).collect();
        let config = TlsConfig {
            cipher_suites: CipherSuitePreset::Custom(ids),
            ..TlsConfig::default()
        };
        assert!(config.client_config().is_ok());
    }
}
