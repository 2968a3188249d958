//! Open resource stream registry
//!
//! Every stream handed out by the loader is registered here until the
//! caller closes or drops it. Closing the loader closes whatever is still
//! registered, and a caller still holding such a handle gets an I/O error
//! on the next read.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

use crate::archive::EntryStream;
use crate::module::traits::LoaderError;
use crate::utils::{lock_recover, with_lock};

type StreamSlot = Mutex<Option<Box<dyn EntryStream>>>;

#[derive(Default)]
struct RegistryInner {
    streams: Mutex<HashMap<u64, (String, Arc<StreamSlot>)>>,
    next_id: AtomicU64,
}

/// Tracks streams opened through the loader
#[derive(Default)]
pub(crate) struct ResourceRegistry {
    inner: Arc<RegistryInner>,
}

impl ResourceRegistry {
    /// Register `stream` and wrap it in a caller-facing handle
    pub(crate) fn register(&self, path: &str, stream: Box<dyn EntryStream>) -> ResourceStream {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Mutex::new(Some(stream)));
        with_lock(&self.inner.streams, |streams| {
            streams.insert(id, (path.to_string(), Arc::clone(&slot)));
        });
        debug!("Opened resource stream {} for {}", id, path);
        ResourceStream {
            id,
            path: path.to_string(),
            slot,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Number of streams not yet closed or dropped
    pub(crate) fn open_count(&self) -> usize {
        with_lock(&self.inner.streams, |streams| streams.len())
    }

    /// Close every registered stream, collecting failures
    pub(crate) fn close_all(&self) -> Vec<LoaderError> {
        let drained: Vec<_> = with_lock(&self.inner.streams, |streams| streams.drain().collect());
        let mut errors = Vec::new();
        for (id, (path, slot)) in drained {
            let stream = lock_recover(&slot).take();
            if let Some(mut stream) = stream {
                if let Err(e) = stream.close() {
                    warn!("Failed to close resource stream {} for {}: {}", id, path, e);
                    errors.push(LoaderError::Io(io::Error::new(
                        e.kind(),
                        format!("closing resource {}: {}", path, e),
                    )));
                }
            }
        }
        errors
    }
}

/// Readable handle to a bundle resource
///
/// Dropping the handle closes the stream and deregisters it.
pub struct ResourceStream {
    id: u64,
    path: String,
    slot: Arc<StreamSlot>,
    registry: Weak<RegistryInner>,
}

impl ResourceStream {
    /// Entry path the stream reads
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Close the stream, reporting any release failure
    pub fn close(self) -> io::Result<()> {
        let stream = lock_recover(&self.slot).take();
        match stream {
            Some(mut stream) => stream.close(),
            None => Ok(()),
        }
    }
}

impl Read for ResourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut slot = lock_recover(&self.slot);
        match slot.as_mut() {
            Some(stream) => stream.read(buf),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("resource stream for {} is closed", self.path),
            )),
        }
    }
}

impl Drop for ResourceStream {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            with_lock(&registry.streams, |streams| {
                streams.remove(&self.id);
            });
        }
        let stream = lock_recover(&self.slot).take();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.close() {
                debug!("Error closing dropped resource stream {}: {}", self.path, e);
            }
        }
    }
}

impl fmt::Debug for ResourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStream")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
