use anyhow::{bail, Result};
use cidr_resolver::{CidrResolver, CidrSource, CymruMetadataSource, RadbWhoisSource, RipeStatSource, RADB_HOST, RIPESTAT_BASE_URL};
use clap::{Args, Parser, Subcommand, ValueEnum};
use domain_resolver::{
    CrtShStrategy, DomainOptions, DomainResolver, DomainStrategy, HttpRedirectStrategy, ReverseDnsStrategy,
    SmtpBannerStrategy, TlsCertificateStrategy, CRTSH_BASE_URL,
};
use host_prober::{parse_ports, HostProber, ProberOptions, TcpServiceProbe, DEFAULT_PROBE_PORTS};
use recon_core::{parse_asn, JobRepository, JobStatus, TrackingJob};
use results_sqlite::{export_job_table, Db, ExportTable};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracker::{status_report, StatusReport, Tracker, TrackerOptions};
use uuid::Uuid;

mod config;

use config::Config;

const DEFAULT_DB: &str = "asnrecon.db";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Parser)]
#[command(name = "asnrecon", version, about = "Map an autonomous system to its prefixes, live hosts and domain names")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./asnrecon.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database holding jobs and results (default: asnrecon.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct TrackArgs {
    /// ASN to investigate, e.g. 13335 or AS13335
    #[arg(allow_hyphen_values = true)]
    asn: String,
    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    poll_ms: u64,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Probe ports: comma/range list (e.g., 80,443,8000-8010)
    #[arg(long)]
    ports: Option<String>,
    /// Addresses sampled per prefix
    #[arg(long)]
    sample_size: Option<usize>,
    /// Max concurrent host probes
    #[arg(long)]
    concurrency: Option<usize>,
    /// Host probes started per second; 0 disables pacing
    #[arg(long)]
    qps: Option<u32>,
    /// Skip the certificate-transparency lookup
    #[arg(long)]
    no_crtsh: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Submit an ASN and follow the job until it finishes
    Track(TrackArgs),
    /// Show a stored job and its results
    Status {
        job_id: Uuid,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Max rows shown per result list
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export one job's results to a Parquet file
    Export {
        #[arg(long)]
        job: Uuid,
        /// discovered_ips or resolved_domains
        #[arg(long, default_value = "discovered_ips")]
        table: String,
        #[arg(long)]
        out: PathBuf,
    },
}

fn ms(v: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(v.unwrap_or(default))
}

fn build_tracker(cfg: &Config, args: &TrackArgs, repo: Arc<dyn JobRepository>) -> Result<Tracker> {
    let src = &cfg.sources;
    let source_timeout = ms(src.timeout_ms, 10_000);
    let sources: Vec<Arc<dyn CidrSource>> = vec![
        Arc::new(RipeStatSource::new(src.ripestat_url.clone().unwrap_or_else(|| RIPESTAT_BASE_URL.to_string()), source_timeout)?),
        Arc::new(RadbWhoisSource::new(
            src.radb_host.clone().unwrap_or_else(|| RADB_HOST.to_string()),
            src.radb_port.unwrap_or(43),
            source_timeout,
        )),
    ];
    let metadata = Arc::new(CymruMetadataSource::new(ms(src.metadata_timeout_ms, 5_000)));

    let probe_cfg = &cfg.probe;
    let ports = match args.ports.as_deref().or(probe_cfg.ports.as_deref()) {
        Some(list) => parse_ports(list)?,
        None => DEFAULT_PROBE_PORTS.to_vec(),
    };
    let connect_timeout = ms(probe_cfg.timeout_ms, 1_000);
    let mut probe = TcpServiceProbe::new(ports, connect_timeout);
    if probe_cfg.banners == Some(false) {
        probe = probe.without_banners();
    }
    let qps = args.qps.or(probe_cfg.qps).filter(|q| *q > 0);
    let prober_opts = ProberOptions {
        sample_size: args.sample_size.or(probe_cfg.sample_size).unwrap_or(10),
        concurrency: args.concurrency.or(probe_cfg.concurrency).unwrap_or(64),
        qps,
    };

    let dom = &cfg.domains;
    let dns_timeout = ms(dom.timeout_ms, 5_000);
    let mut strategies: Vec<Arc<dyn DomainStrategy>> = vec![
        Arc::new(ReverseDnsStrategy::new(dns_timeout)),
        Arc::new(TlsCertificateStrategy::new(dns_timeout)),
        Arc::new(SmtpBannerStrategy::new(dns_timeout)),
        Arc::new(HttpRedirectStrategy::new(dns_timeout)),
    ];
    if !args.no_crtsh && dom.crtsh != Some(false) {
        let url = dom.crtsh_url.clone().unwrap_or_else(|| CRTSH_BASE_URL.to_string());
        strategies.push(Arc::new(CrtShStrategy::new(url, dns_timeout * 3)?));
    }
    let domain_opts = DomainOptions {
        max_hosts: dom.max_hosts.unwrap_or(20),
        concurrency: dom.concurrency.unwrap_or(8),
        timeout_per_strategy: dns_timeout * 4,
    };

    let cidrs = CidrResolver::new(sources, source_timeout + Duration::from_secs(5));
    info!(sources = ?cidrs.source_names(), "CIDR sources ready");
    Ok(Tracker::new(
        repo,
        metadata,
        cidrs,
        HostProber::new(Arc::new(probe), prober_opts),
        DomainResolver::new(strategies, domain_opts),
        TrackerOptions {
            status_limit: cfg.status.limit.unwrap_or(100),
            metadata_timeout: ms(src.metadata_timeout_ms, 5_000) + Duration::from_secs(1),
        },
    ))
}

fn print_progress(job: &TrackingJob) {
    println!(
        "[{}] step {}/4 {} ({}%) cidrs={} ips={} domains={}",
        job.status,
        job.current_step,
        job.step_name(),
        job.progress,
        job.total_cidrs,
        job.total_ips,
        job.total_domains
    );
}

fn print_report(report: &StatusReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let job = &report.job;
    println!("job {} for AS{}", job.id, job.asn_number);
    print_progress(job);
    if let Some(msg) = &job.error_message {
        println!("error: {msg}");
    }
    if let Some(asn) = &report.asn {
        println!("organization: {} ({})", asn.organization, asn.country);
    }
    println!("prefixes ({}):", report.cidr_ranges.len());
    for c in &report.cidr_ranges {
        println!("  {:<20} {} addresses", c.cidr, c.ip_count);
    }
    println!("live hosts ({}):", report.discovered_ips.len());
    for ip in &report.discovered_ips {
        let ports: Vec<String> = ip.port_scan_data.open_ports.iter().map(|p| p.to_string()).collect();
        println!("  {:<16} ports={} services={}", ip.ip_address, ports.join(","), ip.port_scan_data.services.join(", "));
    }
    println!("domains ({}):", report.resolved_domains.len());
    for d in &report.resolved_domains {
        println!("  {:<16} {} [{}]", d.ip_address, d.domain_name, d.domain_type);
    }
    Ok(())
}

async fn cmd_track(cfg: &Config, args: &TrackArgs, db: Db) -> Result<()> {
    let asn = parse_asn(&args.asn)?;
    let tracker = build_tracker(cfg, args, Arc::new(db))?;
    let sub = tracker.submit(i64::from(asn)).await?;
    info!(job_id = %sub.job_id, asn, org = %sub.asn_info.organization, "tracking started");

    let mut ticker = tokio::time::interval(Duration::from_millis(args.poll_ms.max(100)));
    let mut last: Option<(JobStatus, u8)> = None;
    let report = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!(job_id = %sub.job_id, "interrupted, cancelling job");
                tracker.shutdown().await;
            }
        }
        let report = tracker.get_status(sub.job_id)?;
        let seen = (report.job.status, report.job.current_step);
        if last != Some(seen) && args.format == OutputFormat::Text {
            print_progress(&report.job);
        }
        last = Some(seen);
        if report.job.status.is_terminal() {
            break report;
        }
    };
    print_report(&report, args.format)?;
    if report.job.status == JobStatus::Failed {
        bail!("job {} failed", report.job.id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(cli.config.as_deref())?;
    let db_path = cli.db.clone().or_else(|| cfg.store.path.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_DB));

    match cli.command {
        Commands::Version => {
            println!("asnrecon {} (core {})", env!("CARGO_PKG_VERSION"), recon_core::version());
        }
        Commands::Track(args) => {
            let db = Db::open_or_create(&db_path)?;
            cmd_track(&cfg, &args, db).await?;
        }
        Commands::Status { job_id, format, limit } => {
            let db = Db::open_or_create(&db_path)?;
            let limit = limit.or(cfg.status.limit).unwrap_or(100);
            let report = status_report(&db, job_id, limit)?;
            print_report(&report, format)?;
        }
        Commands::Export { job, table, out } => {
            let db = Db::open_or_create(&db_path)?;
            let table: ExportTable = table.parse()?;
            let rows = export_job_table(&db, job, table, &out)?;
            println!("wrote {rows} rows to {}", out.display());
        }
    }
    Ok(())
}
