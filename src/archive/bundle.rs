//! Bundles: one archive source plus its identity
//!
//! A [`Bundle`] owns the live archive handle. Anything handed out to callers
//! is a [`BundleInfo`], a plain descriptor that cannot be used to reach the
//! handle.
//!
//! Verification records the SHA-256 of every entry it scanned. Later reads go
//! through [`Bundle::read_verified`], which rejects bytes that differ from
//! what was verified.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::archive::{read_entry, ArchiveError, ArchiveSource, ZipArchiveSource};
use crate::utils::{with_read_lock, with_write_lock};

/// Digests of every entry as seen by a successful verification
pub(crate) type EntryDigests = HashMap<String, [u8; 32]>;

/// Read-only descriptor of a loaded bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleInfo {
    /// Path the bundle was opened from (or the label of an in-memory bundle)
    pub path: PathBuf,
    /// Locator prefix for entries of this bundle, e.g. `bundle:file:///p/a.zip!/`
    pub base_locator: String,
}

impl BundleInfo {
    /// Locator of an entry inside this bundle
    pub fn locator(&self, entry: &str) -> String {
        format!("{}{}", self.base_locator, entry.trim_start_matches('/'))
    }
}

/// One opened archive source
pub struct Bundle {
    info: BundleInfo,
    archive: Box<dyn ArchiveSource>,
    verified: RwLock<Option<EntryDigests>>,
}

impl Bundle {
    /// Open a zip bundle from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let archive = ZipArchiveSource::open(path.as_ref())?;
        Ok(Self::from_archive(path.as_ref(), Box::new(archive)))
    }

    /// Wrap an already opened archive source
    pub fn from_archive(path: impl Into<PathBuf>, archive: Box<dyn ArchiveSource>) -> Self {
        let path = path.into();
        let absolute = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
        let base_locator = format!("bundle:file://{}!/", absolute.display());
        Self {
            info: BundleInfo { path, base_locator },
            archive,
            verified: RwLock::new(None),
        }
    }

    /// Descriptor for this bundle
    pub fn info(&self) -> &BundleInfo {
        &self.info
    }

    /// Path the bundle was opened from
    pub fn path(&self) -> &Path {
        &self.info.path
    }

    /// The archive capability
    pub fn archive(&self) -> &dyn ArchiveSource {
        self.archive.as_ref()
    }

    /// Whether a verifier has accepted this bundle
    pub fn is_verified(&self) -> bool {
        with_read_lock(&self.verified, |v| v.is_some())
    }

    /// Record the entry digests of a successful verification
    pub(crate) fn mark_verified(&self, digests: EntryDigests) {
        with_write_lock(&self.verified, |v| *v = Some(digests));
    }

    /// Read an entry and check it against the verified digests
    ///
    /// Entries that did not exist at verification time are rejected like
    /// changed ones.
    pub fn read_verified(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let expected = with_read_lock(&self.verified, |v| {
            v.as_ref().map(|digests| digests.get(name).copied())
        })
        .ok_or(ArchiveError::Unverified)?
        .ok_or_else(|| ArchiveError::DigestMismatch(name.to_string()))?;

        let data = read_entry(self.archive(), name)?;
        if Sha256::digest(&data).as_slice() != expected.as_slice() {
            return Err(ArchiveError::DigestMismatch(name.to_string()));
        }
        Ok(data)
    }

    /// Release the archive handle
    pub fn close(&self) -> Result<(), ArchiveError> {
        self.archive.close()
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle").field("info", &self.info).finish()
    }
}
