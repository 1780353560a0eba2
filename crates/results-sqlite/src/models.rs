//! Row <-> model mapping.

use recon_core::{AsnRecord, CidrRange, DiscoveredIp, DomainType, JobStatus, ResolvedDomain, TrackingJob};
use rusqlite::types::Type;
use rusqlite::Row;
use uuid::Uuid;

pub(crate) const ASN_COLUMNS: &str = "id, asn_number, organization, country, created_at, updated_at";
pub(crate) const JOB_COLUMNS: &str = "id, asn_number, status, current_step, progress, error_message, total_cidrs, total_ips, total_domains, created_at, updated_at";
pub(crate) const CIDR_COLUMNS: &str = "id, asn_id, cidr_range, ip_count, created_at";
pub(crate) const IP_COLUMNS: &str = "id, job_id, ip_address, is_active, port_scan_data, created_at";
pub(crate) const DOMAIN_COLUMNS: &str = "id, job_id, ip_address, domain_name, domain_type, created_at";

fn conversion(idx: usize, ty: Type, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, e.into())
}

fn uuid_at(r: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = r.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion(idx, Type::Text, e))
}

fn u32_at(r: &Row, idx: usize) -> rusqlite::Result<u32> {
    let v: i64 = r.get(idx)?;
    u32::try_from(v).map_err(|e| conversion(idx, Type::Integer, e))
}

fn u64_at(r: &Row, idx: usize) -> rusqlite::Result<u64> {
    let v: i64 = r.get(idx)?;
    u64::try_from(v).map_err(|e| conversion(idx, Type::Integer, e))
}

fn u8_at(r: &Row, idx: usize) -> rusqlite::Result<u8> {
    let v: i64 = r.get(idx)?;
    u8::try_from(v).map_err(|e| conversion(idx, Type::Integer, e))
}

pub(crate) fn asn_from_row(r: &Row) -> rusqlite::Result<AsnRecord> {
    Ok(AsnRecord {
        id: uuid_at(r, 0)?,
        asn_number: u32_at(r, 1)?,
        organization: r.get(2)?,
        country: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

pub(crate) fn job_from_row(r: &Row) -> rusqlite::Result<TrackingJob> {
    let status: String = r.get(2)?;
    Ok(TrackingJob {
        id: uuid_at(r, 0)?,
        asn_number: u32_at(r, 1)?,
        status: status.parse::<JobStatus>().map_err(|e| conversion(2, Type::Text, e))?,
        current_step: u8_at(r, 3)?,
        progress: u8_at(r, 4)?,
        error_message: r.get(5)?,
        total_cidrs: u64_at(r, 6)?,
        total_ips: u64_at(r, 7)?,
        total_domains: u64_at(r, 8)?,
        created_at: r.get(9)?,
        updated_at: r.get(10)?,
    })
}

pub(crate) fn cidr_from_row(r: &Row) -> rusqlite::Result<CidrRange> {
    Ok(CidrRange {
        id: uuid_at(r, 0)?,
        asn_id: uuid_at(r, 1)?,
        cidr: r.get(2)?,
        ip_count: u64_at(r, 3)?,
        created_at: r.get(4)?,
    })
}

pub(crate) fn ip_from_row(r: &Row) -> rusqlite::Result<DiscoveredIp> {
    let data: String = r.get(4)?;
    Ok(DiscoveredIp {
        id: uuid_at(r, 0)?,
        job_id: uuid_at(r, 1)?,
        ip_address: r.get(2)?,
        is_active: r.get::<_, i64>(3)? != 0,
        port_scan_data: serde_json::from_str(&data).map_err(|e| conversion(4, Type::Text, e))?,
        created_at: r.get(5)?,
    })
}

pub(crate) fn domain_from_row(r: &Row) -> rusqlite::Result<ResolvedDomain> {
    let kind: String = r.get(4)?;
    Ok(ResolvedDomain {
        id: uuid_at(r, 0)?,
        job_id: uuid_at(r, 1)?,
        ip_address: r.get(2)?,
        domain_name: r.get(3)?,
        domain_type: kind.parse::<DomainType>().map_err(|e| conversion(4, Type::Text, e))?,
        created_at: r.get(5)?,
    })
}
