use anyhow::{anyhow, Result};

/// HTTP and alt-HTTP ports probed when nothing else is configured.
pub const DEFAULT_PROBE_PORTS: &[u16] = &[80, 443, 8080, 8443];

/// Parse a comma-separated list of ports/ranges (e.g., "80,443", "8000-8010,8443").
pub fn parse_ports(list: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();
    for part in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let s: u16 = start.trim().parse()?;
                let e: u16 = end.trim().parse()?;
                if s == 0 || s > e {
                    return Err(anyhow!("invalid port range: {part}"));
                }
                ports.extend(s..=e);
            }
            None => {
                let p: u16 = part.parse()?;
                if p == 0 {
                    return Err(anyhow!("invalid port: {part}"));
                }
                ports.push(p);
            }
        }
    }
    if ports.is_empty() {
        return Err(anyhow!("no ports in {list:?}"));
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

pub fn well_known_service(port: u16) -> Option<&'static str> {
    Some(match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "domain",
        80 => "http",
        110 => "pop3",
        143 => "imap",
        443 => "https",
        465 => "smtps",
        587 => "submission",
        993 => "imaps",
        995 => "pop3s",
        3306 => "mysql",
        3389 => "ms-wbt-server",
        5432 => "postgresql",
        6379 => "redis",
        8000 | 8008 | 8888 => "http-alt",
        8080 => "http-proxy",
        8443 => "https-alt",
        _ => return None,
    })
}

/// Ports that speak TLS first; a plaintext banner is never sent on them.
pub fn is_tls_port(port: u16) -> bool {
    matches!(port, 443 | 465 | 636 | 853 | 993 | 995 | 8443 | 9443)
}

/// Ports whose server talks first (greeting line).
pub fn is_greeting_port(port: u16) -> bool {
    matches!(port, 21 | 22 | 25 | 110 | 143 | 587)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_list() {
        assert_eq!(parse_ports("80,443,8080").unwrap(), vec![80, 443, 8080]);
    }

    #[test]
    fn parse_ranges_and_list() {
        assert_eq!(parse_ports("8000-8002, 80,8001").unwrap(), vec![80, 8000, 8001, 8002]);
    }

    #[test]
    fn reject_invalid() {
        assert!(parse_ports("0").is_err());
        assert!(parse_ports("10-5").is_err());
        assert!(parse_ports("http").is_err());
        assert!(parse_ports(" , ").is_err());
    }

    #[test]
    fn service_table() {
        assert_eq!(well_known_service(443), Some("https"));
        assert_eq!(well_known_service(8080), Some("http-proxy"));
        assert_eq!(well_known_service(31337), None);
        assert!(is_tls_port(8443) && !is_tls_port(8080));
        assert!(is_greeting_port(22) && !is_greeting_port(80));
    }
}
