//! Stage 1: resolve an ASN to its announced IPv4 prefixes.
//!
//! Several routing-data sources are queried concurrently. A failing source is
//! logged and skipped; the stage only fails when every source failed.

mod cymru;
mod radb;
mod ripestat;

pub use cymru::CymruMetadataSource;
pub use radb::{RadbWhoisSource, DEFAULT_HOST as RADB_HOST};
pub use recon_core::ip_count;
pub use ripestat::{RipeStatSource, DEFAULT_BASE_URL as RIPESTAT_BASE_URL};

use async_trait::async_trait;
use recon_core::{AsnInfo, CidrRange, ReconError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A routing-data source able to list the prefixes originated by an ASN.
#[async_trait]
pub trait CidrSource: Send + Sync {
    fn name(&self) -> &str;
    async fn prefixes(&self, asn: u32) -> anyhow::Result<Vec<String>>;
}

/// Organization/country lookup for a first-seen ASN.
#[async_trait]
pub trait AsnMetadataSource: Send + Sync {
    async fn lookup(&self, asn: u32) -> anyhow::Result<AsnInfo>;
}

pub struct CidrResolver {
    sources: Vec<Arc<dyn CidrSource>>,
    timeout_per_source: Duration,
}

impl CidrResolver {
    pub fn new(sources: Vec<Arc<dyn CidrSource>>, timeout_per_source: Duration) -> Self {
        CidrResolver { sources, timeout_per_source }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Query every source concurrently and merge their answers, deduplicated
    /// by exact prefix string.
    pub async fn resolve(&self, asn: u32, asn_id: Uuid, cancel: &CancellationToken) -> Result<Vec<CidrRange>, ReconError> {
        if self.sources.is_empty() {
            return Err(ReconError::StageExhausted("no CIDR sources configured".into()));
        }
        let queries = self.sources.iter().map(|src| async move {
            let res = match timeout(self.timeout_per_source, src.prefixes(asn)).await {
                Ok(r) => r,
                Err(_) => Err(anyhow::anyhow!("timed out after {} ms", self.timeout_per_source.as_millis())),
            };
            (src.name(), res)
        });
        let answers = tokio::select! {
            _ = cancel.cancelled() => return Err(ReconError::Cancelled),
            a = futures::future::join_all(queries) => a,
        };

        let mut seen = HashSet::new();
        let mut ranges = Vec::new();
        let mut failures = Vec::new();
        for (name, res) in answers {
            match res {
                Ok(list) => {
                    debug!(source = name, asn, count = list.len(), "source answered");
                    for p in list {
                        let p = p.trim();
                        if !p.is_empty() && seen.insert(p.to_string()) {
                            ranges.push(CidrRange::new(asn_id, p));
                        }
                    }
                }
                Err(e) => {
                    let err = ReconError::source_unavailable(name, format!("{e:#}"));
                    warn!(asn, "{err}");
                    failures.push(err.to_string());
                }
            }
        }

        if failures.len() == self.sources.len() {
            return Err(ReconError::StageExhausted(format!(
                "all CIDR sources failed for AS{asn}: {}",
                failures.join("; ")
            )));
        }
        info!(asn, prefixes = ranges.len(), failed_sources = failures.len(), "CIDR resolution finished");
        Ok(ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Vec<&'static str>);

    #[async_trait]
    impl CidrSource for Fixed {
        fn name(&self) -> &str { self.0 }
        async fn prefixes(&self, _asn: u32) -> anyhow::Result<Vec<String>> {
            Ok(self.1.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Down(&'static str);

    #[async_trait]
    impl CidrSource for Down {
        fn name(&self) -> &str { self.0 }
        async fn prefixes(&self, _asn: u32) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("connection refused")
        }
    }

    struct Hung;

    #[async_trait]
    impl CidrSource for Hung {
        fn name(&self) -> &str { "hung" }
        async fn prefixes(&self, _asn: u32) -> anyhow::Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec!["203.0.113.0/24".into()])
        }
    }

    fn resolver(sources: Vec<Arc<dyn CidrSource>>) -> CidrResolver {
        CidrResolver::new(sources, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn duplicate_prefixes_across_sources_collapse() {
        let r = resolver(vec![
            Arc::new(Fixed("bgp", vec!["10.0.0.0/16", "192.168.1.0/24"])),
            Arc::new(Fixed("whois", vec!["10.0.0.0/16", " 172.16.5.0/24 "])),
        ]);
        let out = r.resolve(13335, Uuid::now_v7(), &CancellationToken::new()).await.unwrap();
        let mut got: Vec<_> = out.iter().map(|c| (c.cidr.clone(), c.ip_count)).collect();
        got.sort();
        assert_eq!(
            got,
            vec![
                ("10.0.0.0/16".to_string(), 65536),
                ("172.16.5.0/24".to_string(), 256),
                ("192.168.1.0/24".to_string(), 256),
            ]
        );
    }

    #[tokio::test]
    async fn overlapping_prefixes_are_not_merged() {
        let r = resolver(vec![
            Arc::new(Fixed("bgp", vec!["10.0.0.0/16"])),
            Arc::new(Fixed("whois", vec!["10.0.0.0/24"])),
        ]);
        let out = r.resolve(1, Uuid::now_v7(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn one_failing_source_is_tolerated() {
        let r = resolver(vec![Arc::new(Down("radb")), Arc::new(Fixed("ripestat", vec!["198.51.100.0/24"]))]);
        let out = r.resolve(64500, Uuid::now_v7(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cidr, "198.51.100.0/24");
    }

    #[tokio::test]
    async fn invalid_length_is_kept_with_zero_count() {
        let r = resolver(vec![Arc::new(Fixed("bgp", vec!["198.51.100.0"]))]);
        let out = r.resolve(64500, Uuid::now_v7(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out[0].ip_count, 0);
    }

    #[tokio::test]
    async fn all_sources_failing_exhausts_the_stage() {
        let r = resolver(vec![Arc::new(Down("radb")), Arc::new(Hung)]);
        let started = std::time::Instant::now();
        let err = r.resolve(64500, Uuid::now_v7(), &CancellationToken::new()).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            ReconError::StageExhausted(msg) => {
                assert!(msg.contains("radb"), "{msg}");
                assert!(msg.contains("timed out"), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_answers_are_not_failures() {
        let r = resolver(vec![Arc::new(Fixed("bgp", vec![])), Arc::new(Down("radb"))]);
        let out = r.resolve(64500, Uuid::now_v7(), &CancellationToken::new()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let r = CidrResolver::new(vec![Arc::new(Hung)], Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = r.resolve(1, Uuid::now_v7(), &cancel).await.unwrap_err();
        assert!(matches!(err, ReconError::Cancelled));
    }

    #[tokio::test]
    async fn no_sources_is_exhausted() {
        let r = resolver(vec![]);
        assert!(matches!(
            r.resolve(1, Uuid::now_v7(), &CancellationToken::new()).await,
            Err(ReconError::StageExhausted(_))
        ));
    }
}
