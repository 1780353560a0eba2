use uuid::Uuid;

use crate::error::RepositoryError;
use crate::model::{
    AsnInfo, AsnRecord, CidrRange, DiscoveredIp, JobUpdate, ResolvedDomain, TrackingJob,
};

/// Durable store for jobs and their per-stage results.
///
/// Result rows are append-only. `update_job` must reject updates to a job that
/// already reached a terminal status. `append_cidr` ignores a prefix already
/// stored for the same ASN.
pub trait JobRepository: Send + Sync {
    fn create_asn(&self, info: &AsnInfo) -> Result<AsnRecord, RepositoryError>;
    fn find_asn(&self, asn_number: u32) -> Result<Option<AsnRecord>, RepositoryError>;

    fn create_job(&self, asn_number: u32) -> Result<TrackingJob, RepositoryError>;
    fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<(), RepositoryError>;
    fn get_job(&self, id: Uuid) -> Result<Option<TrackingJob>, RepositoryError>;

    fn append_cidr(&self, asn_id: Uuid, cidr: &CidrRange) -> Result<(), RepositoryError>;
    fn list_cidrs(&self, asn_id: Uuid) -> Result<Vec<CidrRange>, RepositoryError>;

    fn append_discovered_ip(&self, job_id: Uuid, ip: &DiscoveredIp) -> Result<(), RepositoryError>;
    fn list_discovered_ips(&self, job_id: Uuid, limit: usize) -> Result<Vec<DiscoveredIp>, RepositoryError>;

    fn append_resolved_domain(&self, job_id: Uuid, domain: &ResolvedDomain) -> Result<(), RepositoryError>;
    fn list_resolved_domains(&self, job_id: Uuid, limit: usize) -> Result<Vec<ResolvedDomain>, RepositoryError>;
}
