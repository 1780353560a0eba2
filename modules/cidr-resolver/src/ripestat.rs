//! BGP announced prefixes from the RIPEstat data API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::CidrSource;

pub const DEFAULT_BASE_URL: &str = "https://stat.ripe.net";

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    data: AnnouncedPrefixes,
}

#[derive(Debug, Deserialize)]
struct AnnouncedPrefixes {
    #[serde(default)]
    prefixes: Vec<Prefix>,
}

#[derive(Debug, Deserialize)]
struct Prefix {
    prefix: String,
}

pub struct RipeStatSource {
    client: Client,
    base_url: String,
}

impl RipeStatSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("asnrecon/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .context("building RIPEstat HTTP client")?;
        Ok(RipeStatSource { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

/// Keep the IPv4 prefixes of an `announced-prefixes` response.
pub(crate) fn parse_announced_prefixes(body: &str) -> Result<Vec<String>> {
    let env: Envelope = serde_json::from_str(body).context("decoding announced-prefixes response")?;
    if let Some(status) = env.status.as_deref() {
        if status != "ok" {
            bail!("RIPEstat returned status {status}");
        }
    }
    Ok(env.data.prefixes.into_iter().map(|p| p.prefix).filter(|p| !p.contains(':')).collect())
}

#[async_trait]
impl CidrSource for RipeStatSource {
    fn name(&self) -> &str {
        "ripestat"
    }

    async fn prefixes(&self, asn: u32) -> Result<Vec<String>> {
        let url = format!("{}/data/announced-prefixes/data.json", self.base_url);
        let body = self
            .client
            .get(&url)
            .query(&[("resource", format!("AS{asn}"))])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_announced_prefixes(&body)
    }
}
