//! Stage 3: map live hosts to domain names.
//!
//! Every strategy runs against every selected host. Strategies fail
//! independently; a host with no names is not an error.

mod banner;
mod cert;
mod reverse;

pub use banner::{parse_smtp_greeting, redirect_host, HttpRedirectStrategy, SmtpBannerStrategy};
pub use cert::{certificate_names, CrtShStrategy, TlsCertificateStrategy, CRTSH_BASE_URL};
pub use reverse::ReverseDnsStrategy;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use recon_core::{DiscoveredIp, DomainType, ReconError, RepositoryError, ResolvedDomain};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One way of turning a live host into candidate names.
#[async_trait]
pub trait DomainStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> DomainType;
    async fn discover(&self, host: &DiscoveredIp) -> anyhow::Result<Vec<String>>;
}

/// Lower-case, strip the trailing root dot and a leading wildcard label.
/// Returns `None` for IP literals, single labels and malformed names.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let mut name = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if let Some(rest) = name.strip_prefix("*.") {
        name = rest.to_string();
    }
    if name.is_empty() || name.len() > 253 || !name.contains('.') || name.parse::<IpAddr>().is_ok() {
        return None;
    }
    let labels_ok = name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    });
    labels_ok.then_some(name)
}

#[derive(Debug, Clone)]
pub struct DomainOptions {
    /// Only the first `max_hosts` live hosts are resolved.
    pub max_hosts: usize,
    pub concurrency: usize,
    pub timeout_per_strategy: Duration,
}

impl Default for DomainOptions {
    fn default() -> Self {
        DomainOptions { max_hosts: 20, concurrency: 8, timeout_per_strategy: Duration::from_secs(10) }
    }
}

pub struct DomainResolver {
    strategies: Vec<Arc<dyn DomainStrategy>>,
    opts: DomainOptions,
}

impl DomainResolver {
    pub fn new(strategies: Vec<Arc<dyn DomainStrategy>>, opts: DomainOptions) -> Self {
        DomainResolver { strategies, opts }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    async fn run_strategies(&self, host: &DiscoveredIp) -> Vec<(DomainType, String, anyhow::Result<Vec<String>>)> {
        let runs = self.strategies.iter().map(|s| async move {
            let res = match timeout(self.opts.timeout_per_strategy, s.discover(host)).await {
                Ok(r) => r,
                Err(_) => Err(anyhow::anyhow!("timed out after {} ms", self.opts.timeout_per_strategy.as_millis())),
            };
            (s.kind(), s.name().to_string(), res)
        });
        futures::future::join_all(runs).await
    }

    /// Resolve names for up to `max_hosts` hosts, handing each new
    /// `(ip, domain, type)` association to `sink`. Returns how many were stored.
    pub async fn resolve_hosts<F>(
        &self,
        job_id: Uuid,
        hosts: &[DiscoveredIp],
        cancel: &CancellationToken,
        mut sink: F,
    ) -> Result<usize, ReconError>
    where
        F: FnMut(ResolvedDomain) -> Result<(), RepositoryError> + Send,
    {
        let selected = &hosts[..hosts.len().min(self.opts.max_hosts)];
        if hosts.len() > selected.len() {
            debug!(%job_id, live = hosts.len(), cap = self.opts.max_hosts, "resolving a capped subset of hosts");
        }
        let mut pending = stream::iter(selected.to_vec())
            .map(|host| async move {
                let answers = self.run_strategies(&host).await;
                (host.ip_address, answers)
            })
            .buffer_unordered(self.opts.concurrency.max(1));

        let mut seen: HashSet<(String, String, DomainType)> = HashSet::new();
        let mut stored = 0usize;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(ReconError::Cancelled),
                n = pending.next() => n,
            };
            let Some((ip, answers)) = next else { break };
            for (kind, strategy, res) in answers {
                let names = match res {
                    Ok(names) => names,
                    Err(e) => {
                        warn!(%job_id, %ip, "{}", ReconError::source_unavailable(strategy, format!("{e:#}")));
                        continue;
                    }
                };
                for name in names.iter().filter_map(|n| normalize_domain(n)) {
                    if !seen.insert((ip.clone(), name.clone(), kind)) {
                        continue;
                    }
                    sink(ResolvedDomain::new(job_id, ip.clone(), name, kind))?;
                    stored += 1;
                }
            }
        }
        info!(%job_id, hosts = selected.len(), domains = stored, "domain resolution finished");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::PortScanData;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Table {
        kind: DomainType,
        answers: HashMap<&'static str, Vec<&'static str>>,
        calls: AtomicUsize,
    }

    impl Table {
        fn new(kind: DomainType, answers: &[(&'static str, Vec<&'static str>)]) -> Arc<Self> {
            Arc::new(Table { kind, answers: answers.iter().cloned().collect(), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl DomainStrategy for Table {
        fn name(&self) -> &str {
            "table"
        }
        fn kind(&self) -> DomainType {
            self.kind
        }
        async fn discover(&self, host: &DiscoveredIp) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .answers
                .get(host.ip_address.as_str())
                .map(|v| v.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default())
        }
    }

    struct Broken;

    #[async_trait]
    impl DomainStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn kind(&self) -> DomainType {
            DomainType::SslCert
        }
        async fn discover(&self, _host: &DiscoveredIp) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("handshake failure")
        }
    }

    struct Slow;

    #[async_trait]
    impl DomainStrategy for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn kind(&self) -> DomainType {
            DomainType::ReverseDns
        }
        async fn discover(&self, _host: &DiscoveredIp) -> anyhow::Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec!["late.example.com".into()])
        }
    }

    fn host(ip: &str) -> DiscoveredIp {
        DiscoveredIp::new(
            Uuid::now_v7(),
            ip,
            PortScanData { open_ports: vec![443], services: vec!["https".into()], scan_time: 0, scan_method: "tcp_connect".into() },
        )
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_domain("WWW.Example.COM.").as_deref(), Some("www.example.com"));
        assert_eq!(normalize_domain("*.cdn.example.com").as_deref(), Some("cdn.example.com"));
        assert_eq!(normalize_domain(" one.one.one.one ").as_deref(), Some("one.one.one.one"));
        assert_eq!(normalize_domain("localhost"), None);
        assert_eq!(normalize_domain("192.0.2.1"), None);
        assert_eq!(normalize_domain("bad..example.com"), None);
        assert_eq!(normalize_domain("-x.example.com"), None);
        assert_eq!(normalize_domain("sp ace.example.com"), None);
    }

    #[tokio::test]
    async fn names_are_tagged_and_deduplicated() {
        let ptr = Table::new(DomainType::ReverseDns, &[("192.0.2.1", vec!["host1.example.net.", "HOST1.example.net"])]);
        let cert = Table::new(DomainType::SslCert, &[("192.0.2.1", vec!["*.example.net", "host1.example.net"])]);
        let resolver = DomainResolver::new(vec![ptr, cert], DomainOptions::default());
        let mut rows = Vec::new();
        let n = resolver
            .resolve_hosts(Uuid::now_v7(), &[host("192.0.2.1")], &CancellationToken::new(), |d| {
                rows.push((d.domain_name, d.domain_type));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(n, 3);
        rows.sort_by(|a, b| (a.1.as_str(), &a.0).cmp(&(b.1.as_str(), &b.0)));
        assert_eq!(
            rows,
            vec![
                ("host1.example.net".to_string(), DomainType::ReverseDns),
                ("example.net".to_string(), DomainType::SslCert),
                ("host1.example.net".to_string(), DomainType::SslCert),
            ]
        );
    }

    #[tokio::test]
    async fn failing_strategy_does_not_stop_others() {
        let ptr = Table::new(DomainType::ReverseDns, &[("198.51.100.7", vec!["edge.example.org"])]);
        let resolver = DomainResolver::new(vec![Arc::new(Broken), ptr], DomainOptions::default());
        let mut names = Vec::new();
        resolver
            .resolve_hosts(Uuid::now_v7(), &[host("198.51.100.7")], &CancellationToken::new(), |d| {
                names.push(d.domain_name);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(names, vec!["edge.example.org"]);
    }

    #[tokio::test]
    async fn only_the_first_hosts_are_resolved() {
        let ptr = Table::new(DomainType::ReverseDns, &[]);
        let resolver = DomainResolver::new(vec![ptr.clone()], DomainOptions { max_hosts: 3, ..DomainOptions::default() });
        let hosts: Vec<_> = (1..=10).map(|i| host(&format!("203.0.113.{i}"))).collect();
        let n = resolver.resolve_hosts(Uuid::now_v7(), &hosts, &CancellationToken::new(), |_| Ok(())).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(ptr.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_strategy_times_out() {
        let opts = DomainOptions { timeout_per_strategy: Duration::from_millis(50), ..DomainOptions::default() };
        let resolver = DomainResolver::new(vec![Arc::new(Slow)], opts);
        let n = resolver.resolve_hosts(Uuid::now_v7(), &[host("192.0.2.9")], &CancellationToken::new(), |_| Ok(())).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn sink_failure_is_fatal() {
        let ptr = Table::new(DomainType::ReverseDns, &[("192.0.2.1", vec!["a.example.com"])]);
        let resolver = DomainResolver::new(vec![ptr], DomainOptions::default());
        let err = resolver
            .resolve_hosts(Uuid::now_v7(), &[host("192.0.2.1")], &CancellationToken::new(), |_| {
                Err(RepositoryError::msg("constraint failed"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::Repository(_)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_resolution() {
        let resolver = DomainResolver::new(vec![Arc::new(Slow)], DomainOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver.resolve_hosts(Uuid::now_v7(), &[host("192.0.2.1")], &cancel, |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, ReconError::Cancelled));
    }

    #[tokio::test]
    async fn resolution_runs_on_a_spawned_task() {
        let ptr = Table::new(DomainType::ReverseDns, &[("192.0.2.44", vec!["mx.example.com"])]);
        let resolver = Arc::new(DomainResolver::new(vec![ptr], DomainOptions::default()));
        let hosts = vec![host("192.0.2.44")];
        let task = tokio::spawn(async move {
            let mut names = Vec::new();
            let cancel = CancellationToken::new();
            let n = resolver
                .resolve_hosts(Uuid::now_v7(), &hosts, &cancel, |d| {
                    names.push(d.domain_name);
                    Ok(())
                })
                .await?;
            Ok::<_, ReconError>((n, names))
        });
        let (n, names) = task.await.unwrap().unwrap();
        assert_eq!(n, 1);
        assert_eq!(names, vec!["mx.example.com"]);
    }

    #[tokio::test]
    async fn no_hosts_is_not_an_error() {
        let resolver = DomainResolver::new(vec![Arc::new(Broken)], DomainOptions::default());
        let n = resolver.resolve_hosts(Uuid::now_v7(), &[], &CancellationToken::new(), |_| Ok(())).await.unwrap();
        assert_eq!(n, 0);
    }
}
