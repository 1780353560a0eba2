//! Jobs and the rows each pipeline stage appends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::now_ms;

/// Organization metadata for an ASN, as returned by a metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnInfo {
    pub asn_number: u32,
    pub organization: String,
    pub country: String,
}

impl AsnInfo {
    /// Stored when the metadata lookup for a first-seen ASN fails.
    pub fn placeholder(asn_number: u32) -> Self {
        AsnInfo { asn_number, organization: format!("AS{asn_number}"), country: "unknown".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnRecord {
    pub id: Uuid,
    pub asn_number: u32,
    pub organization: String,
    pub country: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AsnRecord {
    pub fn new(info: &AsnInfo) -> Self {
        let now = now_ms();
        AsnRecord {
            id: Uuid::now_v7(),
            asn_number: info.asn_number,
            organization: info.organization.clone(),
            country: info.country.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// `pending -> running -> {completed | failed}`; `running -> running` covers
    /// stage changes.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Running) | (Running, Completed) | (Running, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CidrDiscovery,
    IpDiscovery,
    DomainResolution,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::CidrDiscovery, Stage::IpDiscovery, Stage::DomainResolution];

    pub fn step(self) -> u8 {
        match self {
            Stage::CidrDiscovery => 1,
            Stage::IpDiscovery => 2,
            Stage::DomainResolution => 3,
        }
    }

    /// Progress value written when the stage starts.
    pub fn checkpoint(self) -> u8 {
        match self {
            Stage::CidrDiscovery => 20,
            Stage::IpDiscovery => 50,
            Stage::DomainResolution => 75,
        }
    }
}

pub const STEP_COMPLETED: u8 = 4;

pub fn step_name(step: u8) -> &'static str {
    match step {
        0 => "asn_lookup",
        1 => "cidr_discovery",
        2 => "ip_discovery",
        3 => "domain_resolution",
        _ => "completed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingJob {
    pub id: Uuid,
    pub asn_number: u32,
    pub status: JobStatus,
    pub current_step: u8,
    pub progress: u8,
    pub error_message: Option<String>,
    pub total_cidrs: u64,
    pub total_ips: u64,
    pub total_domains: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TrackingJob {
    pub fn new(asn_number: u32) -> Self {
        let now = now_ms();
        TrackingJob {
            id: Uuid::now_v7(),
            asn_number,
            status: JobStatus::Pending,
            current_step: 0,
            progress: 0,
            error_message: None,
            total_cidrs: 0,
            total_ips: 0,
            total_domains: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step_name(&self) -> &'static str {
        step_name(self.current_step)
    }
}

/// Partial update of a job row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub current_step: Option<u8>,
    pub progress: Option<u8>,
    pub error_message: Option<String>,
    pub total_cidrs: Option<u64>,
    pub total_ips: Option<u64>,
    pub total_domains: Option<u64>,
}

impl JobUpdate {
    pub fn enter(stage: Stage) -> Self {
        JobUpdate {
            status: Some(JobStatus::Running),
            current_step: Some(stage.step()),
            progress: Some(stage.checkpoint()),
            ..Default::default()
        }
    }

    pub fn completed() -> Self {
        JobUpdate {
            status: Some(JobStatus::Completed),
            current_step: Some(STEP_COMPLETED),
            progress: Some(100),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        JobUpdate {
            status: Some(JobStatus::Failed),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_totals(mut self, cidrs: Option<u64>, ips: Option<u64>, domains: Option<u64>) -> Self {
        self.total_cidrs = cidrs.or(self.total_cidrs);
        self.total_ips = ips.or(self.total_ips);
        self.total_domains = domains.or(self.total_domains);
        self
    }

    pub fn apply(&self, job: &mut TrackingJob, now: i64) {
        if let Some(s) = self.status {
            job.status = s;
        }
        if let Some(step) = self.current_step {
            job.current_step = step;
        }
        if let Some(p) = self.progress {
            job.progress = p.min(100);
        }
        if let Some(m) = &self.error_message {
            job.error_message = Some(m.clone());
        }
        if let Some(n) = self.total_cidrs {
            job.total_cidrs = n;
        }
        if let Some(n) = self.total_ips {
            job.total_ips = n;
        }
        if let Some(n) = self.total_domains {
            job.total_domains = n;
        }
        job.updated_at = now;
    }
}

/// Number of IPv4 addresses covered by a prefix: `2^(32 - len)`.
/// A missing or out-of-range length yields 0.
pub fn ip_count(cidr: &str) -> u64 {
    let Some((_, len)) = cidr.trim().rsplit_once('/') else { return 0 };
    match len.parse::<u8>() {
        Ok(p) if p <= 32 => 1u64 << (32 - u32::from(p)),
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidrRange {
    pub id: Uuid,
    pub asn_id: Uuid,
    pub cidr: String,
    pub ip_count: u64,
    pub created_at: i64,
}

impl CidrRange {
    pub fn new(asn_id: Uuid, cidr: impl Into<String>) -> Self {
        let cidr = cidr.into();
        CidrRange { id: Uuid::now_v7(), asn_id, ip_count: ip_count(&cidr), cidr, created_at: now_ms() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortScanData {
    pub open_ports: Vec<u16>,
    pub services: Vec<String>,
    pub scan_time: i64,
    pub scan_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredIp {
    pub id: Uuid,
    pub job_id: Uuid,
    pub ip_address: String,
    pub is_active: bool,
    pub port_scan_data: PortScanData,
    pub created_at: i64,
}

impl DiscoveredIp {
    pub fn new(job_id: Uuid, ip_address: impl Into<String>, port_scan_data: PortScanData) -> Self {
        DiscoveredIp {
            id: Uuid::now_v7(),
            job_id,
            ip_address: ip_address.into(),
            is_active: true,
            port_scan_data,
            created_at: now_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    ReverseDns,
    MailServer,
    WebServer,
    SslCert,
}

impl DomainType {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainType::ReverseDns => "reverse_dns",
            DomainType::MailServer => "mail_server",
            DomainType::WebServer => "web_server",
            DomainType::SslCert => "ssl_cert",
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reverse_dns" => Ok(DomainType::ReverseDns),
            "mail_server" => Ok(DomainType::MailServer),
            "web_server" => Ok(DomainType::WebServer),
            "ssl_cert" => Ok(DomainType::SslCert),
            other => Err(format!("unknown domain type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDomain {
    pub id: Uuid,
    pub job_id: Uuid,
    pub ip_address: String,
    pub domain_name: String,
    pub domain_type: DomainType,
    pub created_at: i64,
}

impl ResolvedDomain {
    pub fn new(
        job_id: Uuid,
        ip_address: impl Into<String>,
        domain_name: impl Into<String>,
        domain_type: DomainType,
    ) -> Self {
        ResolvedDomain {
            id: Uuid::now_v7(),
            job_id,
            ip_address: ip_address.into(),
            domain_name: domain_name.into(),
            domain_type,
            created_at: now_ms(),
        }
    }
}
