use crate::banner::{http_head, read_greeting};
use crate::ports::{is_greeting_port, is_tls_port, well_known_service};
use crate::{tls, HostProbe, HostReport};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

const MAX_BANNER_LEN: usize = 80;

/// TCP connect probe over a fixed port list, with optional banner-based
/// service identification on the ports found open.
pub struct TcpServiceProbe {
    ports: Vec<u16>,
    connect_timeout: Duration,
    banner_timeout: Duration,
    grab_banners: bool,
}

impl TcpServiceProbe {
    pub fn new(ports: Vec<u16>, connect_timeout: Duration) -> Self {
        TcpServiceProbe { ports, connect_timeout, banner_timeout: connect_timeout * 2, grab_banners: true }
    }

    pub fn with_banner_timeout(mut self, banner_timeout: Duration) -> Self {
        self.banner_timeout = banner_timeout;
        self
    }

    /// Skip banner grabbing; services come from the well-known port table only.
    pub fn without_banners(mut self) -> Self {
        self.grab_banners = false;
        self
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

pub async fn port_open(ip: IpAddr, port: u16, per_attempt: Duration) -> bool {
    matches!(timeout(per_attempt, TcpStream::connect(SocketAddr::new(ip, port))).await, Ok(Ok(_)))
}

fn table_name(port: u16) -> String {
    well_known_service(port).unwrap_or("unknown").to_string()
}

fn clip(s: &str) -> String {
    s.chars().take(MAX_BANNER_LEN).collect()
}

/// Best-effort name for the service on an open port, e.g. `http (nginx/1.25.3)`.
pub async fn identify_service(ip: IpAddr, port: u16, io_timeout: Duration) -> String {
    let base = table_name(port);
    if is_tls_port(port) {
        return match tls::handshake(ip, port, None, io_timeout).await {
            Ok(peer) => match peer.alpn {
                Some(alpn) => format!("{base} (tls, alpn={alpn})"),
                None => format!("{base} (tls)"),
            },
            Err(e) => {
                trace!(%ip, port, "tls handshake failed: {e:#}");
                base
            }
        };
    }
    if is_greeting_port(port) {
        return match read_greeting(ip, port, io_timeout).await {
            Ok(line) => format!("{base} ({})", clip(&line)),
            Err(_) => base,
        };
    }
    match http_head(ip, port, &ip.to_string(), io_timeout).await {
        Ok(head) => match head.server {
            Some(server) => format!("http ({})", clip(&server)),
            None => "http".to_string(),
        },
        Err(_) => base,
    }
}

#[async_trait]
impl HostProbe for TcpServiceProbe {
    async fn probe(&self, ip: IpAddr) -> Option<HostReport> {
        let mut open_ports = Vec::new();
        for &port in &self.ports {
            if port_open(ip, port, self.connect_timeout).await {
                open_ports.push(port);
            }
        }
        if open_ports.is_empty() {
            return None;
        }
        let mut services = Vec::with_capacity(open_ports.len());
        for &port in &open_ports {
            let name = if self.grab_banners {
                identify_service(ip, port, self.banner_timeout).await
            } else {
                table_name(port)
            };
            services.push(name);
        }
        Some(HostReport { open_ports, services })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    }

    async fn http_server(response: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut s, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    if let Ok(n) = s.read(&mut buf).await {
                        if n > 0 {
                            let _ = s.write_all(response).await;
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn open_http_port_is_identified() {
        let addr = http_server(b"HTTP/1.1 200 OK\r\nServer: test-httpd/1.0\r\n\r\n").await;
        let closed = closed_port().await;
        let probe = TcpServiceProbe::new(vec![closed, addr.port()], Duration::from_millis(500));
        let report = probe.probe(addr.ip()).await.unwrap();
        assert_eq!(report.open_ports, vec![addr.port()]);
        assert_eq!(report.services, vec!["http (test-httpd/1.0)".to_string()]);
    }

    #[tokio::test]
    async fn host_with_nothing_open_is_not_live() {
        let closed = closed_port().await;
        let probe = TcpServiceProbe::new(vec![closed], Duration::from_millis(300));
        assert!(probe.probe("127.0.0.1".parse().unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn table_fallback_without_banners() {
        let addr = http_server(b"HTTP/1.0 200 OK\r\n\r\n").await;
        let probe = TcpServiceProbe::new(vec![addr.port()], Duration::from_millis(500)).without_banners();
        let report = probe.probe(addr.ip()).await.unwrap();
        assert_eq!(report.services, vec!["unknown".to_string()]);
    }
}
