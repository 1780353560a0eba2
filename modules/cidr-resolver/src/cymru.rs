//! ASN organization/country via Team Cymru's `AS<n>.asn.cymru.com` TXT records.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use recon_core::AsnInfo;
use std::time::Duration;

use crate::AsnMetadataSource;

pub struct CymruMetadataSource {
    resolver: TokioAsyncResolver,
}

impl CymruMetadataSource {
    pub fn new(query_timeout: Duration) -> Self {
        let (config, mut opts) =
            read_system_conf().unwrap_or_else(|_| (ResolverConfig::default(), ResolverOpts::default()));
        opts.timeout = query_timeout;
        opts.attempts = 1;
        CymruMetadataSource { resolver: TokioAsyncResolver::tokio(config, opts) }
    }
}

/// Parse `13335 | US | arin | 2010-07-14 | CLOUDFLARENET - Cloudflare, Inc., US`.
pub(crate) fn parse_asn_txt(asn: u32, txt: &str) -> Result<AsnInfo> {
    let fields: Vec<&str> = txt.split('|').map(str::trim).collect();
    if fields.len() < 5 {
        return Err(anyhow!("unexpected ASN TXT record: {txt:?}"));
    }
    let listed: u32 = fields[0].parse().with_context(|| format!("bad ASN field in {txt:?}"))?;
    if listed != asn {
        return Err(anyhow!("TXT record describes AS{listed}, expected AS{asn}"));
    }
    let country = if fields[1].is_empty() { "unknown".to_string() } else { fields[1].to_uppercase() };
    Ok(AsnInfo { asn_number: asn, organization: fields[4].to_string(), country })
}

#[async_trait]
impl AsnMetadataSource for CymruMetadataSource {
    async fn lookup(&self, asn: u32) -> Result<AsnInfo> {
        let name = format!("AS{asn}.asn.cymru.com.");
        let answer = self.resolver.txt_lookup(name.as_str()).await?;
        let txt = answer
            .iter()
            .next()
            .ok_or_else(|| anyhow!("no TXT record for {name}"))?;
        let text: String = txt.txt_data().iter().map(|seg| String::from_utf8_lossy(seg)).collect();
        parse_asn_txt(asn, &text)
    }
}
