//! TLS client configuration

use crate::error::Result;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring::default_provider;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ProtocolVersion, RootCertStore, SignatureScheme};
use std::sync::Arc;

/// Accepts any server certificate while still checking handshake signatures
#[derive(Debug)]
pub struct NoCertificateVerification(CryptoProvider);

impl NoCertificateVerification {
    pub fn new(provider: CryptoProvider) -> Self {
        Self(provider)
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Client configuration: webpki roots, ALPN `h2` unless HTTP/2 is disabled
pub fn client_config(verify_certificates: bool, enable_http2: bool) -> Result<Arc<ClientConfig>> {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if !verify_certificates {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoCertificateVerification::new(default_provider())));
    }

    config.alpn_protocols = if enable_http2 {
        vec![b"h2".to_vec(), b"http/1.1".to_vec()]
    } else {
        vec![b"http/1.1".to_vec()]
    };

    Ok(Arc::new(config))
}

/// Human label of a negotiated protocol version: `TLS-1.x`, or `SSL-3` below TLS 1.0
pub fn version_label(version: ProtocolVersion) -> String {
    let code = u16::from(version);
    if code >= 0x0301 {
        format!("TLS-1.{}", code - 0x0301)
    } else {
        "SSL-3".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_labels() {
        assert_eq!(version_label(ProtocolVersion::TLSv1_0), "TLS-1.0");
        assert_eq!(version_label(ProtocolVersion::TLSv1_2), "TLS-1.2");
        assert_eq!(version_label(ProtocolVersion::TLSv1_3), "TLS-1.3");
        assert_eq!(version_label(ProtocolVersion::SSLv3), "SSL-3");
    }

    #[test]
    fn test_alpn_follows_http2_toggle() {
        let config = client_config(true, true).unwrap();
        assert_eq!(config.alpn_protocols[0], b"h2".to_vec());

        let config = client_config(false, false).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }
}
