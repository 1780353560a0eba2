//! TLS handshakes against arbitrary hosts.
//!
//! Recon targets routinely present self-signed or mismatched certificates,
//! so the handshake accepts any chain and only reports what was offered.

use anyhow::{anyhow, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

/// What the server presented during the handshake.
#[derive(Debug, Clone)]
pub struct TlsPeer {
    pub alpn: Option<String>,
    /// DER of the end-entity certificate, if one was sent.
    pub leaf_der: Option<Vec<u8>>,
}

#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn client_config() -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Complete a handshake with `ip:port` and capture the leaf certificate.
/// `sni` is sent when given; otherwise the IP address is used as server name.
pub async fn handshake(ip: IpAddr, port: u16, sni: Option<&str>, io_timeout: Duration) -> Result<TlsPeer> {
    let connector = TlsConnector::from(Arc::new(client_config()?));
    let server_name = match sni {
        Some(host) => ServerName::try_from(host.to_owned()).map_err(|_| anyhow!("invalid server name: {host}"))?,
        None => ServerName::IpAddress(ip.into()),
    };
    let stream = timeout(io_timeout, TcpStream::connect(SocketAddr::new(ip, port))).await??;
    let tls = timeout(io_timeout, connector.connect(server_name, stream)).await??;
    let conn = tls.get_ref().1;
    let alpn = conn.alpn_protocol().map(|v| String::from_utf8_lossy(v).to_string());
    let leaf_der = conn.peer_certificates().and_then(|c| c.first()).map(|c| c.as_ref().to_vec());
    Ok(TlsPeer { alpn, leaf_der })
}
