use crate::Db;
use anyhow::{bail, Context, Result};
use recon_core::{now_ms, AsnInfo, AsnRecord, CidrRange, DiscoveredIp, JobUpdate, ResolvedDomain, TrackingJob};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

impl Db {
    /// Insert the ASN if unseen; returns the stored row either way.
    pub fn insert_asn(&self, info: &AsnInfo) -> Result<AsnRecord> {
        let rec = AsnRecord::new(info);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO asn_info(id,asn_number,organization,country,created_at,updated_at) VALUES (?,?,?,?,?,?)
             ON CONFLICT(asn_number) DO NOTHING",
            params![rec.id.to_string(), i64::from(rec.asn_number), rec.organization, rec.country, rec.created_at, rec.updated_at],
        )?;
        drop(conn);
        self.asn_by_number(info.asn_number)?
            .with_context(|| format!("asn_info row for AS{} missing after insert", info.asn_number))
    }

    pub fn insert_job(&self, asn_number: u32) -> Result<TrackingJob> {
        let job = TrackingJob::new(asn_number);
        self.conn()?.execute(
            "INSERT INTO tracking_jobs(id,asn_number,status,current_step,progress,error_message,total_cidrs,total_ips,total_domains,created_at,updated_at)
             VALUES (?,?,?,?,?,?,?,?,?,?,?)",
            params![
                job.id.to_string(), i64::from(job.asn_number), job.status.as_str(), job.current_step, job.progress,
                job.error_message, job.total_cidrs as i64, job.total_ips as i64, job.total_domains as i64,
                job.created_at, job.updated_at
            ],
        ).context("insert tracking_jobs")?;
        Ok(job)
    }

    pub fn apply_job_update(&self, id: Uuid, update: &JobUpdate) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tracking_jobs SET
               status=COALESCE(?1,status),
               current_step=COALESCE(?2,current_step),
               progress=COALESCE(?3,progress),
               error_message=COALESCE(?4,error_message),
               total_cidrs=COALESCE(?5,total_cidrs),
               total_ips=COALESCE(?6,total_ips),
               total_domains=COALESCE(?7,total_domains),
               updated_at=?8
             WHERE id=?9 AND status NOT IN ('completed','failed')",
            params![
                update.status.map(|s| s.as_str()),
                update.current_step,
                update.progress.map(|p| p.min(100)),
                update.error_message,
                update.total_cidrs.map(|n| n as i64),
                update.total_ips.map(|n| n as i64),
                update.total_domains.map(|n| n as i64),
                now_ms(),
                id.to_string(),
            ],
        )?;
        if changed == 0 {
            let status: Option<String> = conn
                .query_row("SELECT status FROM tracking_jobs WHERE id=?", [id.to_string()], |r| r.get(0))
                .optional()?;
            match status {
                Some(s) => bail!("job {id} is already {s}"),
                None => bail!("job {id} does not exist"),
            }
        }
        Ok(())
    }

    pub fn insert_cidr(&self, asn_id: Uuid, cidr: &CidrRange) -> Result<bool> {
        let n = self.conn()?.execute(
            "INSERT INTO cidr_ranges(id,asn_id,cidr_range,ip_count,created_at) VALUES (?,?,?,?,?)
             ON CONFLICT(asn_id,cidr_range) DO NOTHING",
            params![cidr.id.to_string(), asn_id.to_string(), cidr.cidr, cidr.ip_count as i64, cidr.created_at],
        ).context("insert cidr_ranges")?;
        Ok(n > 0)
    }

    pub fn insert_discovered_ip(&self, job_id: Uuid, ip: &DiscoveredIp) -> Result<()> {
        let data = serde_json::to_string(&ip.port_scan_data)?;
        self.conn()?.execute(
            "INSERT INTO discovered_ips(id,job_id,ip_address,is_active,port_scan_data,created_at) VALUES (?,?,?,?,?,?)",
            params![ip.id.to_string(), job_id.to_string(), ip.ip_address, ip.is_active, data, ip.created_at],
        ).context("insert discovered_ips")?;
        Ok(())
    }

    pub fn insert_resolved_domain(&self, job_id: Uuid, d: &ResolvedDomain) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO resolved_domains(id,job_id,ip_address,domain_name,domain_type,created_at) VALUES (?,?,?,?,?,?)
             ON CONFLICT(job_id,ip_address,domain_name,domain_type) DO NOTHING",
            params![d.id.to_string(), job_id.to_string(), d.ip_address, d.domain_name, d.domain_type.as_str(), d.created_at],
        ).context("insert resolved_domains")?;
        Ok(())
    }
}
