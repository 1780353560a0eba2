use crate::Db;
use recon_core::{
    AsnInfo, AsnRecord, CidrRange, DiscoveredIp, JobRepository, JobUpdate, RepositoryError, ResolvedDomain,
    TrackingJob,
};
use uuid::Uuid;

impl JobRepository for Db {
    fn create_asn(&self, info: &AsnInfo) -> Result<AsnRecord, RepositoryError> {
        Ok(self.insert_asn(info)?)
    }

    fn find_asn(&self, asn_number: u32) -> Result<Option<AsnRecord>, RepositoryError> {
        Ok(self.asn_by_number(asn_number)?)
    }

    fn create_job(&self, asn_number: u32) -> Result<TrackingJob, RepositoryError> {
        Ok(self.insert_job(asn_number)?)
    }

    fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<(), RepositoryError> {
        Ok(self.apply_job_update(id, update)?)
    }

    fn get_job(&self, id: Uuid) -> Result<Option<TrackingJob>, RepositoryError> {
        Ok(self.job_by_id(id)?)
    }

    fn append_cidr(&self, asn_id: Uuid, cidr: &CidrRange) -> Result<(), RepositoryError> {
        if !self.insert_cidr(asn_id, cidr)? {
            tracing::debug!(cidr = %cidr.cidr, "prefix already stored for this ASN");
        }
        Ok(())
    }

    fn list_cidrs(&self, asn_id: Uuid) -> Result<Vec<CidrRange>, RepositoryError> {
        Ok(self.cidrs_for_asn(asn_id)?)
    }

    fn append_discovered_ip(&self, job_id: Uuid, ip: &DiscoveredIp) -> Result<(), RepositoryError> {
        Ok(self.insert_discovered_ip(job_id, ip)?)
    }

    fn list_discovered_ips(&self, job_id: Uuid, limit: usize) -> Result<Vec<DiscoveredIp>, RepositoryError> {
        Ok(self.ips_for_job(job_id, limit)?)
    }

    fn append_resolved_domain(&self, job_id: Uuid, domain: &ResolvedDomain) -> Result<(), RepositoryError> {
        Ok(self.insert_resolved_domain(job_id, domain)?)
    }

    fn list_resolved_domains(&self, job_id: Uuid, limit: usize) -> Result<Vec<ResolvedDomain>, RepositoryError> {
        Ok(self.domains_for_job(job_id, limit)?)
    }
}
