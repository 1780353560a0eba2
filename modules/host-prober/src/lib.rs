//! Stage 2: find live hosts inside the resolved prefixes.
//!
//! Each prefix contributes a small deterministic sample of addresses. Every
//! candidate is probed on a fixed port list by a bounded worker pool; hosts
//! with at least one open port are handed to the caller as they are found.

pub mod banner;
pub mod ports;
mod sample;
mod tcp;
pub mod tls;

pub use ports::{parse_ports, well_known_service, DEFAULT_PROBE_PORTS};
pub use sample::sample_hosts;
pub use tcp::{identify_service, port_open, TcpServiceProbe};

use async_trait::async_trait;
use recon_core::ratelimiter::RateLimiter;
use recon_core::{now_ms, CidrRange, DiscoveredIp, PortScanData, ReconError, RepositoryError};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SCAN_METHOD: &str = "tcp_connect";

/// Open ports on one host and the service seen on each, index-aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub open_ports: Vec<u16>,
    pub services: Vec<String>,
}

/// Liveness probe for a single address. `None` means nothing answered.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn probe(&self, ip: IpAddr) -> Option<HostReport>;
}

#[derive(Debug, Clone)]
pub struct ProberOptions {
    pub sample_size: usize,
    pub concurrency: usize,
    /// Probes started per second; unpaced when `None`.
    pub qps: Option<u32>,
}

impl Default for ProberOptions {
    fn default() -> Self {
        ProberOptions { sample_size: 10, concurrency: 64, qps: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSummary {
    pub candidates: usize,
    pub live: usize,
}

type Found = (IpAddr, HostReport, i64);

pub struct HostProber {
    probe: Arc<dyn HostProbe>,
    opts: ProberOptions,
}

impl HostProber {
    pub fn new(probe: Arc<dyn HostProbe>, opts: ProberOptions) -> Self {
        HostProber { probe, opts }
    }

    pub fn options(&self) -> &ProberOptions {
        &self.opts
    }

    /// Sampled candidates across all prefixes, first occurrence wins.
    pub fn candidates(&self, cidrs: &[CidrRange]) -> Vec<IpAddr> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for range in cidrs {
            match sample_hosts(&range.cidr, self.opts.sample_size) {
                Ok(hosts) => {
                    for ip in hosts.into_iter().map(IpAddr::V4) {
                        if seen.insert(ip) {
                            out.push(ip);
                        }
                    }
                }
                Err(e) => warn!(cidr = %range.cidr, "skipping prefix: {e:#}"),
            }
        }
        out
    }

    /// Probe the sampled candidates of `cidrs` and pass every live host to
    /// `sink` as soon as it is confirmed. A sink failure aborts the stage.
    pub async fn probe_ranges<F>(
        &self,
        job_id: Uuid,
        cidrs: &[CidrRange],
        cancel: &CancellationToken,
        mut sink: F,
    ) -> Result<ProbeSummary, ReconError>
    where
        F: FnMut(DiscoveredIp) -> Result<(), RepositoryError> + Send,
    {
        if cidrs.is_empty() {
            return Err(ReconError::StageExhausted("no CIDR ranges to probe".into()));
        }
        let candidates = self.candidates(cidrs);
        let total = candidates.len();
        debug!(%job_id, prefixes = cidrs.len(), candidates = total, "probing sampled hosts");

        let workers = self.opts.concurrency.max(1);
        let limiter = self.opts.qps.map(RateLimiter::new);
        let (tx, mut rx) = mpsc::channel::<Found>(workers);
        let producer = tokio::spawn(feed(self.probe.clone(), candidates, workers, limiter, cancel.clone(), tx));

        let mut live = 0usize;
        while let Some((ip, report, scan_time)) = rx.recv().await {
            let data = PortScanData {
                open_ports: report.open_ports,
                services: report.services,
                scan_time,
                scan_method: SCAN_METHOD.to_string(),
            };
            if let Err(e) = sink(DiscoveredIp::new(job_id, ip.to_string(), data)) {
                producer.abort();
                return Err(e.into());
            }
            live += 1;
        }
        if cancel.is_cancelled() {
            return Err(ReconError::Cancelled);
        }
        info!(%job_id, candidates = total, live, "host probing finished");
        Ok(ProbeSummary { candidates: total, live })
    }
}

async fn feed(
    probe: Arc<dyn HostProbe>,
    candidates: Vec<IpAddr>,
    workers: usize,
    limiter: Option<RateLimiter>,
    cancel: CancellationToken,
    tx: mpsc::Sender<Found>,
) {
    let sem = Arc::new(Semaphore::new(workers));
    let mut set = JoinSet::new();
    for ip in candidates {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return,
            p = sem.clone().acquire_owned() => match p {
                Ok(p) => p,
                Err(_) => return,
            },
        };
        if let Some(rl) = &limiter {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = rl.acquire() => {}
            }
        }
        let probe = probe.clone();
        let tx = tx.clone();
        set.spawn(async move {
            let _permit = permit;
            if let Some(report) = probe.probe(ip).await {
                let _ = tx.send((ip, report, now_ms())).await;
            }
        });
    }
    drop(tx);
    // Dropping the set on cancel aborts in-flight probes.
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = async { while set.join_next().await.is_some() {} } => {}
    }
}
