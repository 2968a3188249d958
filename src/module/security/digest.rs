//! Entry digests and the signed digest listing
//!
//! A signer's content entry (`META-INF/<signer>.SF`) is a digest listing:
//!
//! ```text
//! # optional comment
//! 5f70bf18a086007016e948b04aed3b82103a36bea41755b6cddfaf10ace3c6ef  hello/World
//! ```
//!
//! one SHA-256 (hex) and entry path per line, separated by two spaces.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

/// SHA-256 of `data`
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let hash = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// A listed entry whose scanned digest does not match the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestMismatch {
    /// Entry path from the listing
    pub entry: String,
    /// What went wrong
    pub reason: String,
}

/// Parsed digest listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestManifest {
    entries: Vec<(String, [u8; 32])>,
}

impl DigestManifest {
    /// Create an empty listing
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the digest of an entry
    pub fn add(&mut self, path: impl Into<String>, data: &[u8]) {
        self.entries.push((path.into(), sha256(data)));
    }

    /// Listed (path, digest) pairs
    pub fn entries(&self) -> &[(String, [u8; 32])] {
        &self.entries
    }

    /// Whether nothing is listed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a listing; non-UTF-8 content lists nothing, malformed lines are skipped
    pub fn parse(bytes: &[u8]) -> Self {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => return Self::new(),
        };

        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((digest_hex, path)) = line.split_once("  ") else {
                debug!("Skipping malformed digest line: {}", line);
                continue;
            };
            let mut digest = [0u8; 32];
            if hex::decode_to_slice(digest_hex, &mut digest).is_err() {
                debug!("Skipping digest line with bad hex: {}", line);
                continue;
            }
            entries.push((path.to_string(), digest));
        }
        Self { entries }
    }

    /// Serialize in listing format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (path, digest) in &self.entries {
            out.push_str(&hex::encode(digest));
            out.push_str("  ");
            out.push_str(path);
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Check every listed entry against the digests computed while scanning
    pub fn check(&self, scanned: &HashMap<String, [u8; 32]>) -> Result<(), DigestMismatch> {
        for (path, expected) in &self.entries {
            match scanned.get(path) {
                None => {
                    return Err(DigestMismatch {
                        entry: path.clone(),
                        reason: "listed entry missing from bundle".to_string(),
                    })
                }
                Some(actual) if actual != expected => {
                    return Err(DigestMismatch {
                        entry: path.clone(),
                        reason: format!(
                            "digest mismatch: listed {}, found {}",
                            hex::encode(expected),
                            hex::encode(actual)
                        ),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_roundtrip_and_check() {
        let mut manifest = DigestManifest::new();
        manifest.add("hello/World", b"unit");
        let parsed = DigestManifest::parse(&manifest.to_bytes());
        assert_eq!(parsed, manifest);

        let mut scanned = HashMap::new();
        scanned.insert("hello/World".to_string(), sha256(b"unit"));
        assert!(parsed.check(&scanned).is_ok());

        scanned.insert("hello/World".to_string(), sha256(b"tampered"));
        let err = parsed.check(&scanned).unwrap_err();
        assert_eq!(err.entry, "hello/World");
    }

    #[test]
    fn test_missing_listed_entry() {
        let mut manifest = DigestManifest::new();
        manifest.add("gone", b"x");
        let err = manifest.check(&HashMap::new()).unwrap_err();
        assert!(err.reason.contains("missing"));
    }

    #[test]
    fn test_parse_skips_noise() {
        let text = format!(
            "# header\n\nnot a digest line\nzz  bad/hex\n{}  ok/entry\n",
            sha256_hex(b"x")
        );
        let parsed = DigestManifest::parse(text.as_bytes());
        assert_eq!(parsed.entries().len(), 1);
        assert_eq!(parsed.entries()[0].0, "ok/entry");
    }

    #[test]
    fn test_non_utf8_lists_nothing() {
        assert!(DigestManifest::parse(&[0xff, 0xfe, 0x00]).is_empty());
    }
}
