//! Structural hashing.
//!
//! Hashes are SHA-256 digests over a canonical, separator-delimited field
//! encoding, folded to the first eight bytes as a big-endian `i64` so they
//! fit an ordinary integer column in every supported database.

use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: u8 = 0x1f;

/// Incremental builder for a structural hash.
///
/// Every field is tagged so that `None` and `Some("")`, or `false` and an
/// empty string, never encode to the same bytes.
#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, value: &str) -> &mut Self {
        self.hasher.update(b"s");
        self.hasher.update(value.as_bytes());
        self.hasher.update([FIELD_SEPARATOR]);
        self
    }

    pub fn optional(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => {
                self.hasher.update(b"+");
                self.text(v)
            }
            None => {
                self.hasher.update(b"-");
                self.hasher.update([FIELD_SEPARATOR]);
                self
            }
        }
    }

    pub fn number(&mut self, value: i64) -> &mut Self {
        self.hasher.update(b"n");
        self.hasher.update(value.to_be_bytes());
        self.hasher.update([FIELD_SEPARATOR]);
        self
    }

    pub fn flag(&mut self, value: bool) -> &mut Self {
        self.hasher.update(if value { b"T" } else { b"F" });
        self.hasher.update([FIELD_SEPARATOR]);
        self
    }

    /// Consumes the builder and returns the folded hash.
    pub fn finish(self) -> i64 {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        i64::from_be_bytes(bytes)
    }
}
