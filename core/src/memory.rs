//! In-process repository, used by tests and short-lived CLI runs.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::model::{AsnInfo, AsnRecord, CidrRange, DiscoveredIp, JobUpdate, ResolvedDomain, TrackingJob};
use crate::now_ms;
use crate::repository::JobRepository;

#[derive(Default)]
struct Tables {
    asns: HashMap<u32, AsnRecord>,
    jobs: HashMap<Uuid, TrackingJob>,
    cidrs: Vec<CidrRange>,
    ips: Vec<DiscoveredIp>,
    domains: Vec<ResolvedDomain>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.read().map(|t| t.jobs.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, RepositoryError> {
        self.tables.read().map_err(|_| RepositoryError::msg("memory repository lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, RepositoryError> {
        self.tables.write().map_err(|_| RepositoryError::msg("memory repository lock poisoned"))
    }
}

impl JobRepository for MemoryRepository {
    fn create_asn(&self, info: &AsnInfo) -> Result<AsnRecord, RepositoryError> {
        let mut t = self.write()?;
        let rec = t.asns.entry(info.asn_number).or_insert_with(|| AsnRecord::new(info));
        Ok(rec.clone())
    }

    fn find_asn(&self, asn_number: u32) -> Result<Option<AsnRecord>, RepositoryError> {
        Ok(self.read()?.asns.get(&asn_number).cloned())
    }

    fn create_job(&self, asn_number: u32) -> Result<TrackingJob, RepositoryError> {
        let job = TrackingJob::new(asn_number);
        self.write()?.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<(), RepositoryError> {
        let mut t = self.write()?;
        let job = t.jobs.get_mut(&id).ok_or_else(|| RepositoryError::msg(format!("job {id} does not exist")))?;
        if job.status.is_terminal() {
            return Err(RepositoryError::msg(format!("job {id} is already {}", job.status)));
        }
        update.apply(job, now_ms());
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> Result<Option<TrackingJob>, RepositoryError> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    fn append_cidr(&self, asn_id: Uuid, cidr: &CidrRange) -> Result<(), RepositoryError> {
        let mut t = self.write()?;
        if t.cidrs.iter().any(|c| c.asn_id == asn_id && c.cidr == cidr.cidr) {
            return Ok(());
        }
        t.cidrs.push(CidrRange { asn_id, ..cidr.clone() });
        Ok(())
    }

    fn list_cidrs(&self, asn_id: Uuid) -> Result<Vec<CidrRange>, RepositoryError> {
        Ok(self.read()?.cidrs.iter().filter(|c| c.asn_id == asn_id).cloned().collect())
    }

    fn append_discovered_ip(&self, job_id: Uuid, ip: &DiscoveredIp) -> Result<(), RepositoryError> {
        self.write()?.ips.push(DiscoveredIp { job_id, ..ip.clone() });
        Ok(())
    }

    fn list_discovered_ips(&self, job_id: Uuid, limit: usize) -> Result<Vec<DiscoveredIp>, RepositoryError> {
        Ok(self.read()?.ips.iter().filter(|i| i.job_id == job_id).take(limit).cloned().collect())
    }

    fn append_resolved_domain(&self, job_id: Uuid, domain: &ResolvedDomain) -> Result<(), RepositoryError> {
        self.write()?.domains.push(ResolvedDomain { job_id, ..domain.clone() });
        Ok(())
    }

    fn list_resolved_domains(&self, job_id: Uuid, limit: usize) -> Result<Vec<ResolvedDomain>, RepositoryError> {
        Ok(self.read()?.domains.iter().filter(|d| d.job_id == job_id).take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DomainType, JobStatus, PortScanData, Stage};

    #[test]
    fn create_asn_is_unique_per_number() {
        let repo = MemoryRepository::new();
        let a = repo.create_asn(&AsnInfo::placeholder(13335)).unwrap();
        let b = repo.create_asn(&AsnInfo::placeholder(13335)).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(repo.find_asn(13335).unwrap().unwrap().id, a.id);
        assert!(repo.find_asn(15169).unwrap().is_none());
    }

    #[test]
    fn cidr_append_ignores_duplicates() {
        let repo = MemoryRepository::new();
        let asn = repo.create_asn(&AsnInfo::placeholder(1)).unwrap();
        repo.append_cidr(asn.id, &CidrRange::new(asn.id, "10.0.0.0/16")).unwrap();
        repo.append_cidr(asn.id, &CidrRange::new(asn.id, "10.0.0.0/16")).unwrap();
        let rows = repo.list_cidrs(asn.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ip_count, 65536);
    }

    #[test]
    fn terminal_jobs_reject_updates() {
        let repo = MemoryRepository::new();
        let job = repo.create_job(64512).unwrap();
        repo.update_job(job.id, &JobUpdate::enter(Stage::CidrDiscovery)).unwrap();
        repo.update_job(job.id, &JobUpdate::completed()).unwrap();
        assert!(repo.update_job(job.id, &JobUpdate::failed("late")).is_err());
        let stored = repo.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.error_message, None);
    }

    #[test]
    fn unknown_job_update_fails() {
        let repo = MemoryRepository::new();
        assert!(repo.update_job(Uuid::now_v7(), &JobUpdate::completed()).is_err());
    }

    #[test]
    fn listings_are_scoped_and_limited() {
        let repo = MemoryRepository::new();
        let a = repo.create_job(1).unwrap();
        let b = repo.create_job(2).unwrap();
        let data = PortScanData { open_ports: vec![80], services: vec!["http".into()], scan_time: 0, scan_method: "tcp_connect".into() };
        for i in 0..5 {
            repo.append_discovered_ip(a.id, &DiscoveredIp::new(a.id, format!("10.0.0.{i}"), data.clone())).unwrap();
        }
        repo.append_discovered_ip(b.id, &DiscoveredIp::new(b.id, "10.0.1.1", data)).unwrap();
        repo.append_resolved_domain(a.id, &ResolvedDomain::new(a.id, "10.0.0.1", "a.example", DomainType::ReverseDns)).unwrap();

        let ips = repo.list_discovered_ips(a.id, 3).unwrap();
        assert_eq!(ips.len(), 3);
        assert_eq!(ips[0].ip_address, "10.0.0.0");
        assert_eq!(repo.list_discovered_ips(b.id, 100).unwrap().len(), 1);
        assert_eq!(repo.list_resolved_domains(a.id, 100).unwrap().len(), 1);
        assert!(repo.list_resolved_domains(b.id, 100).unwrap().is_empty());
    }
}
