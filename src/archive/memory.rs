//! In-memory archive source
//!
//! Entries keep insertion order, which is also the order `entries()`
//! reports them in.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::archive::{ArchiveEntry, ArchiveError, ArchiveSource, EntryStream};

/// Archive held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: Vec<(String, Vec<u8>)>,
    closed: AtomicBool,
}

impl MemoryArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry (replaces an existing entry of the same name in place)
    pub fn with_entry(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert(name, data);
        self
    }

    /// Add or replace an entry
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = data,
            None => self.entries.push((name, data)),
        }
    }

    /// Build from a list of (name, bytes) pairs
    pub fn from_entries<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        let mut archive = Self::new();
        for (name, data) in entries {
            archive.insert(name, data);
        }
        archive
    }

    fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    fn ensure_open(&self) -> Result<(), ArchiveError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ArchiveError::Closed);
        }
        Ok(())
    }
}

impl ArchiveSource for MemoryArchive {
    fn entries(&self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        self.ensure_open()?;
        Ok(self
            .entries
            .iter()
            .map(|(name, data)| ArchiveEntry {
                name: name.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    fn open(&self, name: &str) -> Result<Option<Box<dyn EntryStream>>, ArchiveError> {
        self.ensure_open()?;
        Ok(self
            .get(name)
            .map(|data| Box::new(Cursor::new(data.to_vec())) as Box<dyn EntryStream>))
    }

    fn size(&self, name: &str) -> Option<u64> {
        self.get(name).map(|data| data.len() as u64)
    }

    fn close(&self) -> Result<(), ArchiveError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
