use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "asnrecon.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    pub ripestat_url: Option<String>,
    pub radb_host: Option<String>,
    pub radb_port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub metadata_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    pub ports: Option<String>,
    pub sample_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub qps: Option<u32>,
    pub banners: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DomainsConfig {
    pub max_hosts: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub crtsh: Option<bool>,
    pub crtsh_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StatusConfig {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sources: SourcesConfig,
    pub probe: ProbeConfig,
    pub domains: DomainsConfig,
    pub status: StatusConfig,
    pub store: StoreConfig,
}

pub fn parse_config(text: &str) -> Result<Config> {
    if text.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

/// Load `path`, or `./asnrecon.yaml` when no path is given and the file exists.
/// An explicitly named file must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(Config::default()); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&s).with_context(|| format!("parsing config {}", path.display()))
}
