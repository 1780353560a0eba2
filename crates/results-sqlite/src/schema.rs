pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE asn_info (
  id              TEXT PRIMARY KEY,
  asn_number      INTEGER NOT NULL UNIQUE CHECK (asn_number > 0),
  organization    TEXT NOT NULL,
  country         TEXT NOT NULL,
  created_at      INTEGER NOT NULL,
  updated_at      INTEGER NOT NULL
);

CREATE TABLE tracking_jobs (
  id              TEXT PRIMARY KEY,
  asn_number      INTEGER NOT NULL,
  status          TEXT NOT NULL CHECK (status IN ('pending','running','completed','failed')),
  current_step    INTEGER NOT NULL DEFAULT 0 CHECK (current_step BETWEEN 0 AND 4),
  progress        INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
  error_message   TEXT,
  total_cidrs     INTEGER NOT NULL DEFAULT 0,
  total_ips       INTEGER NOT NULL DEFAULT 0,
  total_domains   INTEGER NOT NULL DEFAULT 0,
  created_at      INTEGER NOT NULL,
  updated_at      INTEGER NOT NULL
);

CREATE TABLE cidr_ranges (
  id              TEXT PRIMARY KEY,
  asn_id          TEXT NOT NULL REFERENCES asn_info(id) ON DELETE CASCADE,
  cidr_range      TEXT NOT NULL,
  ip_count        INTEGER NOT NULL DEFAULT 0,
  created_at      INTEGER NOT NULL,
  UNIQUE (asn_id, cidr_range)
);

CREATE TABLE discovered_ips (
  id              TEXT PRIMARY KEY,
  job_id          TEXT NOT NULL REFERENCES tracking_jobs(id) ON DELETE CASCADE,
  ip_address      TEXT NOT NULL,
  is_active       INTEGER NOT NULL CHECK (is_active IN (0,1)) DEFAULT 1,
  port_scan_data  TEXT NOT NULL,
  created_at      INTEGER NOT NULL
);

CREATE TABLE resolved_domains (
  id              TEXT PRIMARY KEY,
  job_id          TEXT NOT NULL REFERENCES tracking_jobs(id) ON DELETE CASCADE,
  ip_address      TEXT NOT NULL,
  domain_name     TEXT NOT NULL,
  domain_type     TEXT NOT NULL CHECK (domain_type IN ('reverse_dns','mail_server','web_server','ssl_cert')),
  created_at      INTEGER NOT NULL,
  UNIQUE (job_id, ip_address, domain_name, domain_type)
);

CREATE INDEX idx_jobs_asn ON tracking_jobs(asn_number);
CREATE INDEX idx_cidrs_asn ON cidr_ranges(asn_id);
CREATE INDEX idx_ips_job ON discovered_ips(job_id);
CREATE INDEX idx_domains_job ON resolved_domains(job_id);
CREATE INDEX idx_domains_ip ON resolved_domains(ip_address);

COMMIT;
"#
;
