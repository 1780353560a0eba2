use anyhow::{bail, Result};
use arrow::array::{ArrayRef, BooleanBuilder, Int64Builder, StringBuilder};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use recon_core::{DiscoveredIp, ResolvedDomain};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::{arrow_schemas, Db};

const CHUNK: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTable {
    DiscoveredIps,
    ResolvedDomains,
}

impl FromStr for ExportTable {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "discovered_ips" => Ok(ExportTable::DiscoveredIps),
            "resolved_domains" => Ok(ExportTable::ResolvedDomains),
            other => bail!("unsupported table: {other}"),
        }
    }
}

/// Write one job's rows of `table` to a ZSTD-compressed Parquet file.
/// Returns the number of rows written.
pub fn export_job_table(db: &Db, job_id: Uuid, table: ExportTable, out: &std::path::Path) -> Result<usize> {
    let schema = Arc::new(match table {
        ExportTable::DiscoveredIps => arrow_schemas::discovered_ips_schema(),
        ExportTable::ResolvedDomains => arrow_schemas::resolved_domains_schema(),
    });
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
        .build();
    let file = std::fs::File::create(out)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let total = match table {
        ExportTable::DiscoveredIps => {
            let rows = db.ips_for_job(job_id, usize::MAX)?;
            for chunk in rows.chunks(CHUNK) {
                writer.write(&RecordBatch::try_new(schema.clone(), ip_columns(chunk))?)?;
            }
            rows.len()
        }
        ExportTable::ResolvedDomains => {
            let rows = db.domains_for_job(job_id, usize::MAX)?;
            for chunk in rows.chunks(CHUNK) {
                writer.write(&RecordBatch::try_new(schema.clone(), domain_columns(chunk))?)?;
            }
            rows.len()
        }
    };

    writer.close()?;
    tracing::info!(%job_id, ?table, rows = total, path = %out.display(), "exported parquet");
    Ok(total)
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
}

fn ip_columns(rows: &[DiscoveredIp]) -> Vec<ArrayRef> {
    let mut id = StringBuilder::new();
    let mut job = StringBuilder::new();
    let mut ip = StringBuilder::new();
    let mut active = BooleanBuilder::new();
    let mut ports = StringBuilder::new();
    let mut services = StringBuilder::new();
    let mut scan_time = Int64Builder::new();
    let mut method = StringBuilder::new();
    let mut created = Int64Builder::new();
    for r in rows {
        id.append_value(r.id.to_string());
        job.append_value(r.job_id.to_string());
        ip.append_value(&r.ip_address);
        active.append_value(r.is_active);
        ports.append_value(join(&r.port_scan_data.open_ports));
        services.append_value(join(&r.port_scan_data.services));
        scan_time.append_value(r.port_scan_data.scan_time);
        method.append_value(&r.port_scan_data.scan_method);
        created.append_value(r.created_at);
    }
    vec![
        Arc::new(id.finish()),
        Arc::new(job.finish()),
        Arc::new(ip.finish()),
        Arc::new(active.finish()),
        Arc::new(ports.finish()),
        Arc::new(services.finish()),
        Arc::new(scan_time.finish()),
        Arc::new(method.finish()),
        Arc::new(created.finish()),
    ]
}

fn domain_columns(rows: &[ResolvedDomain]) -> Vec<ArrayRef> {
    let mut id = StringBuilder::new();
    let mut job = StringBuilder::new();
    let mut ip = StringBuilder::new();
    let mut name = StringBuilder::new();
    let mut kind = StringBuilder::new();
    let mut created = Int64Builder::new();
    for r in rows {
        id.append_value(r.id.to_string());
        job.append_value(r.job_id.to_string());
        ip.append_value(&r.ip_address);
        name.append_value(&r.domain_name);
        kind.append_value(r.domain_type.as_str());
        created.append_value(r.created_at);
    }
    vec![
        Arc::new(id.finish()),
        Arc::new(job.finish()),
        Arc::new(ip.finish()),
        Arc::new(name.finish()),
        Arc::new(kind.finish()),
        Arc::new(created.finish()),
    ]
}
