//! Names announced by services themselves: SMTP greetings and HTTP redirects.

use anyhow::Result;
use async_trait::async_trait;
use host_prober::banner::{http_head, read_greeting};
use host_prober::ports::{is_greeting_port, is_tls_port};
use recon_core::{DiscoveredIp, DomainType};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::DomainStrategy;

/// Hostname from an SMTP greeting such as `220 mx1.example.net ESMTP Postfix`.
pub fn parse_smtp_greeting(line: &str) -> Option<String> {
    let rest = line.strip_prefix("220")?;
    let rest = rest.trim_start_matches(['-', ' ']);
    rest.split_whitespace().next().map(str::to_string)
}

/// Host part of an absolute `Location:` value. Relative redirects carry none.
pub fn redirect_host(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    url.host_str().map(str::to_string)
}

pub struct SmtpBannerStrategy {
    ports: Vec<u16>,
    io_timeout: Duration,
}

impl SmtpBannerStrategy {
    pub fn new(io_timeout: Duration) -> Self {
        SmtpBannerStrategy { ports: vec![25, 587], io_timeout }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }
}

#[async_trait]
impl DomainStrategy for SmtpBannerStrategy {
    fn name(&self) -> &str {
        "smtp-banner"
    }

    fn kind(&self) -> DomainType {
        DomainType::MailServer
    }

    async fn discover(&self, host: &DiscoveredIp) -> Result<Vec<String>> {
        let ip: IpAddr = host.ip_address.parse()?;
        let mut names = Vec::new();
        let mut answered = false;
        let mut last_err = None;
        for port in host.port_scan_data.open_ports.iter().filter(|p| self.ports.contains(p)) {
            match read_greeting(ip, *port, self.io_timeout).await {
                Ok(line) => {
                    answered = true;
                    names.extend(parse_smtp_greeting(&line));
                }
                Err(e) => {
                    debug!(%ip, port, "no greeting: {e:#}");
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

/// `HEAD /` on the plaintext web ports and follow nothing; only the
/// redirect target's host is recorded.
pub struct HttpRedirectStrategy {
    io_timeout: Duration,
}

impl HttpRedirectStrategy {
    pub fn new(io_timeout: Duration) -> Self {
        HttpRedirectStrategy { io_timeout }
    }
}

#[async_trait]
impl DomainStrategy for HttpRedirectStrategy {
    fn name(&self) -> &str {
        "http-redirect"
    }

    fn kind(&self) -> DomainType {
        DomainType::WebServer
    }

    async fn discover(&self, host: &DiscoveredIp) -> Result<Vec<String>> {
        let ip: IpAddr = host.ip_address.parse()?;
        let mut names = Vec::new();
        let web_ports = host.port_scan_data.open_ports.iter().filter(|p| !is_tls_port(**p) && !is_greeting_port(**p));
        let mut answered = false;
        let mut last_err = None;
        for port in web_ports {
            match http_head(ip, *port, &host.ip_address, self.io_timeout).await {
                Ok(head) => {
                    answered = true;
                    names.extend(head.location.as_deref().and_then(redirect_host));
                }
                Err(e) => {
                    debug!(%ip, port, "HEAD failed: {e:#}");
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
