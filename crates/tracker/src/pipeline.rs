use cidr_resolver::CidrResolver;
use domain_resolver::DomainResolver;
use host_prober::HostProber;
use recon_core::{AsnRecord, JobRepository, JobUpdate, ReconError, Stage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The three stages and the repository they write to, shared by all jobs.
pub struct Pipeline {
    pub(crate) repo: Arc<dyn JobRepository>,
    cidrs: CidrResolver,
    prober: HostProber,
    domains: DomainResolver,
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    cidrs: u64,
    ips: u64,
    domains: u64,
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), ReconError> {
    if cancel.is_cancelled() {
        return Err(ReconError::Cancelled);
    }
    Ok(())
}

impl Pipeline {
    pub fn new(repo: Arc<dyn JobRepository>, cidrs: CidrResolver, prober: HostProber, domains: DomainResolver) -> Self {
        Pipeline { repo, cidrs, prober, domains }
    }

    /// Drive one job to a terminal state. Errors end up in the job row.
    pub async fn run(&self, job_id: Uuid, asn: AsnRecord, cancel: CancellationToken) {
        match self.execute(job_id, &asn, &cancel).await {
            Ok(t) => info!(%job_id, asn = asn.asn_number, cidrs = t.cidrs, ips = t.ips, domains = t.domains, "job completed"),
            Err(e) => {
                warn!(%job_id, asn = asn.asn_number, "job failed: {e}");
                if let Err(store_err) = self.repo.update_job(job_id, &JobUpdate::failed(e.to_string())) {
                    error!(%job_id, "could not record job failure: {store_err}");
                }
            }
        }
    }

    async fn execute(&self, job_id: Uuid, asn: &AsnRecord, cancel: &CancellationToken) -> Result<Totals, ReconError> {
        let repo = &self.repo;
        let mut totals = Totals::default();

        repo.update_job(job_id, &JobUpdate::enter(Stage::CidrDiscovery))?;
        check_cancel(cancel)?;
        let cidrs = self.cidrs.resolve(asn.asn_number, asn.id, cancel).await?;
        for c in &cidrs {
            repo.append_cidr(asn.id, c)?;
        }
        totals.cidrs = cidrs.len() as u64;

        check_cancel(cancel)?;
        repo.update_job(job_id, &JobUpdate::enter(Stage::IpDiscovery).with_totals(Some(totals.cidrs), None, None))?;
        let mut live = Vec::new();
        self.prober
            .probe_ranges(job_id, &cidrs, cancel, |ip| {
                repo.append_discovered_ip(job_id, &ip)?;
                live.push(ip);
                Ok(())
            })
            .await?;
        totals.ips = live.len() as u64;

        check_cancel(cancel)?;
        repo.update_job(job_id, &JobUpdate::enter(Stage::DomainResolution).with_totals(None, Some(totals.ips), None))?;
        let stored = self
            .domains
            .resolve_hosts(job_id, &live, cancel, |d| repo.append_resolved_domain(job_id, &d))
            .await?;
        totals.domains = stored as u64;

        repo.update_job(job_id, &JobUpdate::completed().with_totals(None, None, Some(totals.domains)))?;
        Ok(totals)
    }
}
