//! Archive capability used by the loader
//!
//! The loader never parses container structure itself. Everything it needs
//! from a bundle goes through [`ArchiveSource`]: enumerate entries, open an
//! entry as a byte stream, ask for an entry's size.
//!
//! Two sources ship with the crate:
//! - [`ZipArchiveSource`] for `.zip` bundles on disk
//! - [`MemoryArchive`] for bundles already held in memory

pub mod bundle;
pub mod memory;
pub mod zip_source;

use std::io::{self, Read};
use thiserror::Error;

pub use bundle::{Bundle, BundleInfo};
pub use memory::MemoryArchive;
pub use zip_source::ZipArchiveSource;

/// One entry as reported by [`ArchiveSource::entries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path inside the archive (always `/`-separated)
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
}

/// Byte stream over a single archive entry
///
/// `close` exists so sources backed by real handles can report release
/// failures; the loader accumulates those on shutdown.
pub trait EntryStream: Read + Send {
    /// Release the underlying handle
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl EntryStream for io::Cursor<Vec<u8>> {}

/// Sequential-access capability over one bundle
pub trait ArchiveSource: Send + Sync {
    /// Enumerate every entry in container order
    fn entries(&self) -> Result<Vec<ArchiveEntry>, ArchiveError>;

    /// Open an entry for reading, `None` if the archive has no such entry
    fn open(&self, name: &str) -> Result<Option<Box<dyn EntryStream>>, ArchiveError>;

    /// Size of an entry, `None` if the archive has no such entry
    fn size(&self, name: &str) -> Option<u64>;

    /// Whether the archive contains `name`
    fn contains(&self, name: &str) -> bool {
        self.size(name).is_some()
    }

    /// Release the archive handle
    fn close(&self) -> Result<(), ArchiveError> {
        Ok(())
    }
}

/// Archive access errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error("archive entry not found: {0}")]
    EntryNotFound(String),

    #[error("archive is closed")]
    Closed,

    #[error("bundle has not been verified")]
    Unverified,

    #[error("entry {0} does not match the bundle as verified")]
    DigestMismatch(String),
}

/// Upper bound on buffer space reserved from an entry's advertised size
///
/// Sizes come from container headers and are untrusted until the bytes have
/// been read, so larger entries grow the buffer as data actually arrives.
pub(crate) const PREALLOC_LIMIT: u64 = 64 * 1024;

/// Read an entry fully into memory
///
/// The read stops one byte past the advertised size. Either mismatch is
/// reported: a stream that ends early or runs long means the container lied
/// about the entry.
pub fn read_entry(source: &dyn ArchiveSource, name: &str) -> Result<Vec<u8>, ArchiveError> {
    let expected = source
        .size(name)
        .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
    let mut stream = source
        .open(name)?
        .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;

    let mut buffer = Vec::with_capacity(expected.min(PREALLOC_LIMIT) as usize);
    stream
        .by_ref()
        .take(expected.saturating_add(1))
        .read_to_end(&mut buffer)?;
    stream.close()?;

    if buffer.len() as u64 != expected {
        return Err(ArchiveError::Malformed(format!(
            "entry {} read {} bytes, expected {}",
            name,
            buffer.len(),
            expected
        )));
    }
    Ok(buffer)
}
