//! Plaintext banner grabbing: HTTP `HEAD` and server greetings.

use anyhow::{anyhow, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHead {
    pub status_line: String,
    pub server: Option<String>,
    pub location: Option<String>,
}

/// Parse the start of an HTTP response. `None` if the text is not HTTP.
pub fn parse_http_head(text: &str) -> Option<HttpHead> {
    let mut lines = text.lines();
    let status_line = lines.next()?.trim().to_string();
    if !status_line.starts_with("HTTP/") {
        return None;
    }
    let mut server = None;
    let mut location = None;
    for line in lines.take(40) {
        if line.trim().is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        if name.eq_ignore_ascii_case("server") && !value.is_empty() {
            server = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("location") && !value.is_empty() {
            location = Some(value.to_string());
        }
    }
    Some(HttpHead { status_line, server, location })
}

/// Send `HEAD /` and parse the response headers.
pub async fn http_head(ip: IpAddr, port: u16, host_header: &str, io_timeout: Duration) -> Result<HttpHead> {
    let mut stream = timeout(io_timeout, TcpStream::connect(SocketAddr::new(ip, port))).await??;
    let req = format!(
        "HEAD / HTTP/1.0\r\nHost: {host_header}\r\nUser-Agent: asnrecon/0.1\r\nConnection: close\r\n\r\n"
    );
    timeout(io_timeout, stream.write_all(req.as_bytes())).await??;
    let mut buf = vec![0u8; 4096];
    let n = timeout(io_timeout, stream.read(&mut buf)).await??;
    let text = String::from_utf8_lossy(&buf[..n]);
    parse_http_head(&text).ok_or_else(|| anyhow!("{ip}:{port} did not answer with HTTP"))
}

/// Read the first line a server sends after accept (SSH, SMTP, FTP, POP, IMAP).
pub async fn read_greeting(ip: IpAddr, port: u16, io_timeout: Duration) -> Result<String> {
    let mut stream = timeout(io_timeout, TcpStream::connect(SocketAddr::new(ip, port))).await??;
    let mut buf = vec![0u8; 512];
    let n = timeout(io_timeout, stream.read(&mut buf)).await??;
    let mut line = String::from_utf8_lossy(&buf[..n]).to_string();
    if let Some(idx) = line.find('\n') {
        line.truncate(idx);
    }
    let line = line.trim().to_string();
    if line.is_empty() {
        return Err(anyhow!("{ip}:{port} sent an empty greeting"));
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn parses_server_and_location() {
        let h = parse_http_head("HTTP/1.1 301 Moved Permanently\r\nServer: nginx/1.25.3\r\nLocation: https://www.example.com/\r\n\r\n").unwrap();
        assert_eq!(h.status_line, "HTTP/1.1 301 Moved Permanently");
        assert_eq!(h.server.as_deref(), Some("nginx/1.25.3"));
        assert_eq!(h.location.as_deref(), Some("https://www.example.com/"));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let h = parse_http_head("HTTP/1.0 200 OK\r\nSERVER: caddy\r\n\r\n").unwrap();
        assert_eq!(h.server.as_deref(), Some("caddy"));
        assert_eq!(h.location, None);
    }

    #[test]
    fn non_http_is_rejected() {
        assert!(parse_http_head("SSH-2.0-OpenSSH_9.6\r\n").is_none());
        assert!(parse_http_head("").is_none());
    }

    #[tokio::test]
    async fn reads_greeting_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"220 mx1.example.net ESMTP Postfix\r\n").await.unwrap();
        });
        let line = read_greeting(addr.ip(), addr.port(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(line, "220 mx1.example.net ESMTP Postfix");
    }

    #[tokio::test]
    async fn head_request_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let n = s.read(&mut buf).await.unwrap();
            assert!(buf[..n].starts_with(b"HEAD / HTTP/1.0\r\n"));
            s.write_all(b"HTTP/1.0 302 Found\r\nLocation: http://portal.example.org/login\r\n\r\n").await.unwrap();
        });
        let h = http_head(addr.ip(), addr.port(), "127.0.0.1", Duration::from_secs(2)).await.unwrap();
        assert_eq!(h.location.as_deref(), Some("http://portal.example.org/login"));
    }
}
