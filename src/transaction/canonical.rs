//! Canonical digest encoding for ledger data.
//!
//! Every value is fed to SHA-256 in a fixed order with an unambiguous binary
//! framing: integers as little-endian `u64`, strings length-prefixed, optional
//! values behind a presence byte, floats as their IEEE-754 bit pattern and
//! timestamps in one RFC 3339 form. Nothing depends on map iteration order or
//! JSON formatting, so a block re-read from storage digests to the same bytes
//! it was sealed with.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Render a timestamp the one way the ledger ever digests it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Types that contribute to a block digest.
pub trait CanonicalEncode {
    fn encode(&self, hasher: &mut CanonicalHasher);
}

#[derive(Clone, Default)]
pub struct CanonicalHasher {
    hasher: Sha256,
}

impl CanonicalHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    pub fn f64(&mut self, value: f64) {
        self.hasher.update(value.to_bits().to_le_bytes());
    }

    pub fn str(&mut self, value: &str) {
        self.u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    pub fn opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                self.hasher.update([1u8]);
                self.str(s);
            }
            None => self.hasher.update([0u8]),
        }
    }

    pub fn opt_f64(&mut self, value: Option<f64>) {
        match value {
            Some(v) => {
                self.hasher.update([1u8]);
                self.f64(v);
            }
            None => self.hasher.update([0u8]),
        }
    }

    pub fn timestamp(&mut self, ts: &DateTime<Utc>) {
        self.str(&format_timestamp(ts));
    }

    pub fn opt_timestamp(&mut self, ts: Option<&DateTime<Utc>>) {
        match ts {
            Some(ts) => {
                self.hasher.update([1u8]);
                self.timestamp(ts);
            }
            None => self.hasher.update([0u8]),
        }
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
