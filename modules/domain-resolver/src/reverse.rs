use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::lookup::ReverseLookup;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use recon_core::{DiscoveredIp, DomainType};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use crate::DomainStrategy;

/// PTR lookup of the host address through the system resolver.
pub struct ReverseDnsStrategy {
    resolver: TokioAsyncResolver,
}

impl ReverseDnsStrategy {
    pub fn new(query_timeout: Duration) -> Self {
        let (config, mut opts) = read_system_conf().unwrap_or_else(|e| {
            debug!("no usable system resolver config, using public defaults: {e}");
            (ResolverConfig::default(), ResolverOpts::default())
        });
        opts.timeout = query_timeout;
        opts.attempts = 2;
        ReverseDnsStrategy { resolver: TokioAsyncResolver::tokio(config, opts) }
    }
}

/// An address without PTR records yields no names rather than an error.
fn ptr_names(answer: std::result::Result<ReverseLookup, ResolveError>) -> Result<Vec<String>> {
    match answer {
        Ok(lookup) => Ok(lookup.iter().map(|ptr| ptr.to_string()).collect()),
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DomainStrategy for ReverseDnsStrategy {
    fn name(&self) -> &str {
        "reverse-dns"
    }

    fn kind(&self) -> DomainType {
        DomainType::ReverseDns
    }

    async fn discover(&self, host: &DiscoveredIp) -> Result<Vec<String>> {
        let ip: IpAddr = host.ip_address.parse()?;
        ptr_names(self.resolver.reverse_lookup(ip).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::proto::op::{Query, ResponseCode};
    use hickory_resolver::proto::rr::{Name, RecordType};
    use std::str::FromStr;

    #[test]
    fn nxdomain_means_no_names() {
        let name = Name::from_str("1.2.0.192.in-addr.arpa.").unwrap();
        let err = ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: Box::new(Query::query(name, RecordType::PTR)),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::NXDomain,
            trusted: true,
        });
        assert!(ptr_names(Err(err)).unwrap().is_empty());
    }

    #[test]
    fn transport_errors_are_reported() {
        let err = ResolveError::from(ResolveErrorKind::Timeout);
        assert!(ptr_names(Err(err)).is_err());
    }

    #[tokio::test]
    async fn a_non_ip_host_is_rejected() {
        let host = DiscoveredIp::new(
            uuid::Uuid::now_v7(),
            "not-an-ip",
            recon_core::PortScanData { open_ports: vec![], services: vec![], scan_time: 0, scan_method: "tcp_connect".into() },
        );
        assert!(ReverseDnsStrategy::new(Duration::from_millis(100)).discover(&host).await.is_err());
    }
}
