//! Core types shared by the reconnaissance pipeline: the job/result data model,
//! the error taxonomy, the repository seam and small runtime helpers.

pub mod error;
pub mod memory;
pub mod model;
pub mod ratelimiter;
pub mod repository;

pub use error::{ReconError, RepositoryError};
pub use memory::MemoryRepository;
pub use model::*;
pub use repository::JobRepository;

use time::OffsetDateTime;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Wall clock in unix milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Validate a numeric ASN as received from a caller.
pub fn validate_asn(asn_number: i64) -> Result<u32, ReconError> {
    if asn_number <= 0 {
        return Err(ReconError::InvalidInput(format!(
            "ASN must be a positive integer, got {asn_number}"
        )));
    }
    u32::try_from(asn_number).map_err(|_| {
        ReconError::InvalidInput(format!("ASN {asn_number} is out of range"))
    })
}

/// Parse user input such as `13335`, `AS13335` or `as13335`.
pub fn parse_asn(input: &str) -> Result<u32, ReconError> {
    let s = input.trim();
    let digits = match s.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("as") => &s[2..],
        _ => s,
    };
    let n: i64 = digits
        .trim()
        .parse()
        .map_err(|_| ReconError::InvalidInput(format!("not an ASN: {input:?}")))?;
    validate_asn(n)
}
