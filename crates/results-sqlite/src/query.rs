use crate::models::*;
use crate::Db;
use anyhow::Result;
use recon_core::{AsnRecord, CidrRange, DiscoveredIp, ResolvedDomain, TrackingJob};
use rusqlite::OptionalExtension;
use uuid::Uuid;

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn()?.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn asn_by_number(&self, asn_number: u32) -> Result<Option<AsnRecord>> {
        let sql = format!("SELECT {ASN_COLUMNS} FROM asn_info WHERE asn_number=?");
        Ok(self.conn()?.query_row(&sql, [i64::from(asn_number)], asn_from_row).optional()?)
    }

    pub fn job_by_id(&self, id: Uuid) -> Result<Option<TrackingJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM tracking_jobs WHERE id=?");
        Ok(self.conn()?.query_row(&sql, [id.to_string()], job_from_row).optional()?)
    }

    pub fn cidrs_for_asn(&self, asn_id: Uuid) -> Result<Vec<CidrRange>> {
        let sql = format!("SELECT {CIDR_COLUMNS} FROM cidr_ranges WHERE asn_id=? ORDER BY rowid");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([asn_id.to_string()], cidr_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn ips_for_job(&self, job_id: Uuid, limit: usize) -> Result<Vec<DiscoveredIp>> {
        let sql = format!("SELECT {IP_COLUMNS} FROM discovered_ips WHERE job_id=? ORDER BY rowid LIMIT ?");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![job_id.to_string(), sql_limit(limit)], ip_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn domains_for_job(&self, job_id: Uuid, limit: usize) -> Result<Vec<ResolvedDomain>> {
        let sql = format!("SELECT {DOMAIN_COLUMNS} FROM resolved_domains WHERE job_id=? ORDER BY rowid LIMIT ?");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![job_id.to_string(), sql_limit(limit)], domain_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
