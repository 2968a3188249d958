//! Zip-backed archive source
//!
//! Entries are decompressed fully on `open`; the zip reader validates each
//! entry's CRC32 at end of stream, so a corrupted entry surfaces as an I/O
//! error from `open` rather than as silently wrong bytes.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::archive::{ArchiveEntry, ArchiveError, ArchiveSource, EntryStream, PREALLOC_LIMIT};
use crate::utils::lock_recover;

/// Archive source over a zip file on disk
pub struct ZipArchiveSource {
    path: PathBuf,
    archive: Mutex<Option<ZipArchive<File>>>,
    index: Vec<ArchiveEntry>,
    sizes: HashMap<String, u64>,
}

impl ZipArchiveSource {
    /// Open and index a zip file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file).map_err(zip_error)?;

        let mut index = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(zip_error)?;
            if entry.is_dir() {
                continue;
            }
            index.push(ArchiveEntry {
                name: entry.name().to_string(),
                size: entry.size(),
            });
        }
        let sizes = index.iter().map(|e| (e.name.clone(), e.size)).collect();

        debug!("Opened zip bundle {:?} ({} entries)", path, index.len());
        Ok(Self {
            path,
            archive: Mutex::new(Some(archive)),
            index,
            sizes,
        })
    }

    /// Path of the underlying zip file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<ZipArchive<File>>> {
        lock_recover(&self.archive)
    }
}

impl ArchiveSource for ZipArchiveSource {
    fn entries(&self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        if self.lock().is_none() {
            return Err(ArchiveError::Closed);
        }
        Ok(self.index.clone())
    }

    fn open(&self, name: &str) -> Result<Option<Box<dyn EntryStream>>, ArchiveError> {
        let mut guard = self.lock();
        let archive = guard.as_mut().ok_or(ArchiveError::Closed)?;

        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(zip_error(e)),
        };

        let mut data = Vec::with_capacity(entry.size().min(PREALLOC_LIMIT) as usize);
        entry.read_to_end(&mut data)?;
        Ok(Some(Box::new(Cursor::new(data))))
    }

    fn size(&self, name: &str) -> Option<u64> {
        self.sizes.get(name).copied()
    }

    fn close(&self) -> Result<(), ArchiveError> {
        if self.lock().take().is_some() {
            debug!("Closed zip bundle {:?}", self.path);
        }
        Ok(())
    }
}

fn zip_error(e: ZipError) -> ArchiveError {
    match e {
        ZipError::Io(io) => ArchiveError::Io(io),
        other => ArchiveError::Malformed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_zip_source_reads_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        write_zip(&path, &[("hello/World", &b"unit bytes"[..]), ("res/data.txt", &b"x"[..])]);

        let source = ZipArchiveSource::open(&path).unwrap();
        let names: Vec<_> = source.entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["hello/World", "res/data.txt"]);
        assert_eq!(source.size("hello/World"), Some(10));
        assert!(!source.contains("missing"));

        let mut stream = source.open("hello/World").unwrap().unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"unit bytes");
        assert!(source.open("missing").unwrap().is_none());
    }

    #[test]
    fn test_zip_source_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        write_zip(&path, &[("x", &b"1"[..])]);

        let source = ZipArchiveSource::open(&path).unwrap();
        source.close().unwrap();
        assert!(matches!(source.open("x"), Err(ArchiveError::Closed)));
        assert!(matches!(source.entries(), Err(ArchiveError::Closed)));
    }

    #[test]
    fn test_zip_source_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        assert!(ZipArchiveSource::open(&path).is_err());
    }
}
