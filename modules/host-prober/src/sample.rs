//! Bounded, deterministic sampling of candidate addresses from a prefix.

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// First usable host and number of usable hosts. /31 and /32 have no
/// network/broadcast addresses to skip.
fn usable_range(net: &Ipv4Net) -> (u32, u64) {
    let base = u32::from(net.network());
    match net.prefix_len() {
        32 => (base, 1),
        31 => (base, 2),
        p => (base + 1, (1u64 << (32 - u32::from(p))) - 2),
    }
}

/// Pick at most `n` host addresses spread evenly across the prefix.
/// Prefixes with `n` or fewer usable hosts are returned whole.
pub fn sample_hosts(cidr: &str, n: usize) -> Result<Vec<Ipv4Addr>> {
    let net: Ipv4Net = cidr.trim().parse().with_context(|| format!("not an IPv4 prefix: {cidr}"))?;
    let (first, count) = usable_range(&net);
    if n == 0 {
        return Ok(Vec::new());
    }
    let n = n as u64;
    let offsets: Vec<u64> = if count <= n {
        (0..count).collect()
    } else {
        let step = count / n;
        (0..n).map(|i| i * step).collect()
    };
    Ok(offsets.into_iter().map(|o| Ipv4Addr::from(first.wrapping_add(o as u32))).collect())
}
