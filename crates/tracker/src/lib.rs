//! Job orchestration: accepts ASN submissions, runs the three discovery
//! stages for each job on its own task, and answers status queries.

mod pipeline;

pub use pipeline::Pipeline;

use cidr_resolver::{AsnMetadataSource, CidrResolver};
use domain_resolver::DomainResolver;
use host_prober::HostProber;
use recon_core::{
    validate_asn, AsnInfo, AsnRecord, CidrRange, DiscoveredIp, JobRepository, ReconError, ResolvedDomain, TrackingJob,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job_id: Uuid,
    pub asn_info: AsnRecord,
}

/// Snapshot of one job and the results gathered so far.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub job: TrackingJob,
    pub asn: Option<AsnRecord>,
    pub cidr_ranges: Vec<CidrRange>,
    pub discovered_ips: Vec<DiscoveredIp>,
    pub resolved_domains: Vec<ResolvedDomain>,
}

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Cap on discovered IPs and resolved domains returned by `get_status`.
    pub status_limit: usize,
    pub metadata_timeout: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        TrackerOptions { status_limit: 100, metadata_timeout: Duration::from_secs(5) }
    }
}

pub struct Tracker {
    pipeline: Arc<Pipeline>,
    metadata: Arc<dyn AsnMetadataSource>,
    opts: TrackerOptions,
    root: CancellationToken,
    jobs: TaskTracker,
}

impl Tracker {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        metadata: Arc<dyn AsnMetadataSource>,
        cidrs: CidrResolver,
        prober: HostProber,
        domains: DomainResolver,
        opts: TrackerOptions,
    ) -> Self {
        Tracker {
            pipeline: Arc::new(Pipeline::new(repo, cidrs, prober, domains)),
            metadata,
            opts,
            root: CancellationToken::new(),
            jobs: TaskTracker::new(),
        }
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.pipeline.repo
    }

    /// Validate the ASN, register the job and start it in the background.
    /// Returns as soon as the job row exists.
    pub async fn submit(&self, asn_number: i64) -> Result<Submission, ReconError> {
        let asn = validate_asn(asn_number)?;
        if self.root.is_cancelled() {
            return Err(ReconError::Cancelled);
        }
        let record = self.ensure_asn(asn).await?;
        let job = self.pipeline.repo.create_job(asn)?;
        info!(job_id = %job.id, asn, "job submitted");

        let pipeline = self.pipeline.clone();
        let cancel = self.root.child_token();
        let asn_record = record.clone();
        let job_id = job.id;
        self.jobs.spawn(async move { pipeline.run(job_id, asn_record, cancel).await });
        Ok(Submission { job_id, asn_info: record })
    }

    async fn ensure_asn(&self, asn: u32) -> Result<AsnRecord, ReconError> {
        if let Some(existing) = self.pipeline.repo.find_asn(asn)? {
            return Ok(existing);
        }
        let info = match timeout(self.opts.metadata_timeout, self.metadata.lookup(asn)).await {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                warn!(asn, "ASN metadata lookup failed, storing placeholder: {e:#}");
                AsnInfo::placeholder(asn)
            }
            Err(_) => {
                warn!(asn, "ASN metadata lookup timed out, storing placeholder");
                AsnInfo::placeholder(asn)
            }
        };
        debug!(asn, org = %info.organization, country = %info.country, "registering ASN");
        Ok(self.pipeline.repo.create_asn(&info)?)
    }

    pub fn get_status(&self, job_id: Uuid) -> Result<StatusReport, ReconError> {
        status_report(self.pipeline.repo.as_ref(), job_id, self.opts.status_limit)
    }

    /// Cancel every running job and wait for their tasks to record the outcome.
    pub async fn shutdown(&self) {
        self.root.cancel();
        self.jobs.close();
        self.jobs.wait().await;
    }
}

/// Jobs outlive the handle only long enough to record that they were cancelled.
impl Drop for Tracker {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Read a job, every CIDR of its ASN and up to `limit` IPs and domains.
pub fn status_report(repo: &dyn JobRepository, job_id: Uuid, limit: usize) -> Result<StatusReport, ReconError> {
    let job = repo.get_job(job_id)?.ok_or(ReconError::NotFound(job_id))?;
    let asn = repo.find_asn(job.asn_number)?;
    let cidr_ranges = match &asn {
        Some(a) => repo.list_cidrs(a.id)?,
        None => Vec::new(),
    };
    let discovered_ips = repo.list_discovered_ips(job_id, limit)?;
    let resolved_domains = repo.list_resolved_domains(job_id, limit)?;
    Ok(StatusReport { job, asn, cidr_ranges, discovered_ips, resolved_domains })
}
