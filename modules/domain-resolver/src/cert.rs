//! Certificate-derived names: the live leaf certificate and CT logs.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use host_prober::ports::is_tls_port;
use host_prober::tls;
use recon_core::{DiscoveredIp, DomainType};
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::DomainStrategy;

pub const CRTSH_BASE_URL: &str = "https://crt.sh";

/// DNS names in the certificate's SAN extension followed by the subject CN.
pub fn certificate_names(der: &[u8]) -> Result<Vec<String>> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| anyhow!("unparsable certificate: {e}"))?;
    let mut names: Vec<String> = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for gn in &san.value.general_names {
            if let GeneralName::DNSName(n) = gn {
                names.push(n.to_string());
            }
        }
    }
    for cn in cert.subject().iter_common_name() {
        if let Ok(s) = cn.as_str() {
            if !names.iter().any(|n| n == s) {
                names.push(s.to_string());
            }
        }
    }
    Ok(names)
}

/// Handshake with every open TLS port of the host and read its certificate.
pub struct TlsCertificateStrategy {
    io_timeout: Duration,
}

impl TlsCertificateStrategy {
    pub fn new(io_timeout: Duration) -> Self {
        TlsCertificateStrategy { io_timeout }
    }
}

#[async_trait]
impl DomainStrategy for TlsCertificateStrategy {
    fn name(&self) -> &str {
        "tls-certificate"
    }

    fn kind(&self) -> DomainType {
        DomainType::SslCert
    }

    async fn discover(&self, host: &DiscoveredIp) -> Result<Vec<String>> {
        let ip: IpAddr = host.ip_address.parse()?;
        let ports: Vec<u16> = host.port_scan_data.open_ports.iter().copied().filter(|p| is_tls_port(*p)).collect();
        let mut names = Vec::new();
        let mut answered = false;
        let mut last_err = None;
        for port in &ports {
            match tls::handshake(ip, *port, None, self.io_timeout).await {
                Ok(peer) => match peer.leaf_der.as_deref().map(certificate_names).transpose() {
                    Ok(found) => {
                        answered = true;
                        names.extend(found.into_iter().flatten());
                    }
                    Err(e) => {
                        debug!(%ip, port, "bad certificate: {e:#}");
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    debug!(%ip, port, "handshake failed: {e:#}");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if !answered => Err(e),
            _ => Ok(names),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    #[serde(default)]
    common_name: Option<String>,
    #[serde(default)]
    name_value: String,
}

/// Names from a crt.sh JSON answer; `name_value` holds one name per line.
pub(crate) fn parse_crtsh(body: &str) -> Result<Vec<String>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<CrtShEntry> = serde_json::from_str(body).context("decoding crt.sh response")?;
    let mut names = Vec::new();
    for e in entries {
        names.extend(e.name_value.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()));
        if let Some(cn) = e.common_name {
            names.push(cn);
        }
    }
    Ok(names)
}

/// Certificate-transparency search on crt.sh for certificates naming the IP.
pub struct CrtShStrategy {
    client: Client,
    base_url: String,
}

impl CrtShStrategy {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("asnrecon/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building crt.sh HTTP client")?;
        Ok(CrtShStrategy { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl DomainStrategy for CrtShStrategy {
    fn name(&self) -> &str {
        "crt.sh"
    }

    fn kind(&self) -> DomainType {
        DomainType::SslCert
    }

    async fn discover(&self, host: &DiscoveredIp) -> Result<Vec<String>> {
        let url = format!("{}/?q={}&output=json", self.base_url, host.ip_address);
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            bail!("crt.sh answered {}", resp.status());
        }
        parse_crtsh(&resp.text().await?)
    }
}
