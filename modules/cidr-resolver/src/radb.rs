//! Route objects from a routing-registry WHOIS server (RADb by default).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::CidrSource;

pub const DEFAULT_HOST: &str = "whois.radb.net";
const MAX_RESPONSE: u64 = 8 * 1024 * 1024;

pub struct RadbWhoisSource {
    host: String,
    port: u16,
    io_timeout: Duration,
}

impl RadbWhoisSource {
    pub fn new(host: impl Into<String>, port: u16, io_timeout: Duration) -> Self {
        RadbWhoisSource { host: host.into(), port, io_timeout }
    }

    async fn query(&self, q: &str) -> Result<String> {
        let addr = (self.host.as_str(), self.port);
        let mut stream = timeout(self.io_timeout, TcpStream::connect(addr))
            .await
            .context("whois connect timed out")??;
        timeout(self.io_timeout, stream.write_all(q.as_bytes())).await??;
        let mut buf = Vec::new();
        timeout(self.io_timeout, (&mut stream).take(MAX_RESPONSE).read_to_end(&mut buf))
            .await
            .context("whois read timed out")??;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Collect the values of `route:` attributes from a WHOIS response.
pub(crate) fn parse_route_objects(text: &str) -> Result<Vec<String>> {
    let mut routes = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.starts_with("%ERROR") {
            bail!("whois error: {}", line.trim_start_matches('%').trim());
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("route") {
                let v = value.trim();
                if !v.is_empty() {
                    routes.push(v.to_string());
                }
            }
        }
    }
    Ok(routes)
}

#[async_trait]
impl CidrSource for RadbWhoisSource {
    fn name(&self) -> &str {
        "radb"
    }

    async fn prefixes(&self, asn: u32) -> Result<Vec<String>> {
        let text = self.query(&format!("-i origin AS{asn}\r\n")).await?;
        parse_route_objects(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const SAMPLE: &str = "\
route:      1.1.1.0/24
descr:      APNIC and Cloudflare DNS Resolver project
origin:     AS13335
mnt-by:     MAINT-AS13335
source:     RADB

route6:     2606:4700::/32
origin:     AS13335

route:      104.16.0.0/13
origin:     AS13335
";

    #[test]
    fn parses_route_attributes_only() {
        assert_eq!(parse_route_objects(SAMPLE).unwrap(), vec!["1.1.1.0/24", "104.16.0.0/13"]);
    }

    #[test]
    fn no_entries_is_empty() {
        assert!(parse_route_objects("%  No entries found for the selected source(s).\n").unwrap().is_empty());
    }

    #[test]
    fn server_error_is_reported() {
        assert!(parse_route_objects("%ERROR:101: no entries found\n").is_err());
    }

    #[tokio::test]
    async fn queries_a_whois_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 128];
            let n = sock.read(&mut buf).await.unwrap();
            let q = String::from_utf8_lossy(&buf[..n]).to_string();
            sock.write_all(SAMPLE.as_bytes()).await.unwrap();
            q
        });
        let src = RadbWhoisSource::new("127.0.0.1", port, Duration::from_secs(2));
        let got = src.prefixes(13335).await.unwrap();
        assert_eq!(got, vec!["1.1.1.0/24", "104.16.0.0/13"]);
        assert_eq!(server.await.unwrap(), "-i origin AS13335\r\n");
    }

    #[tokio::test]
    async fn unreachable_server_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let src = RadbWhoisSource::new("127.0.0.1", port, Duration::from_millis(500));
        assert!(src.prefixes(13335).await.is_err());
    }
}
