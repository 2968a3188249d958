//! Local resolver: units defined by the loader's own bundles
//!
//! Maps a logical name to an entry path, searches the bundles in order, and
//! hands the first match's bytes to the host runtime. Bytes are checked
//! against the digests recorded at verification before the host sees them.
//! Materialized units are cached per name so repeated lookups return the
//! same unit.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::archive::Bundle;
use crate::config::ResolutionConfig;
use crate::module::resolver::Resolver;
use crate::module::traits::{HostRuntime, LoaderError, ProvenanceProvider, UnitRef};
use crate::utils::{with_read_lock, with_write_lock};

/// Resolver over the loader's verified bundles
pub struct LocalResolver {
    bundles: Arc<Vec<Bundle>>,
    host: Arc<dyn HostRuntime>,
    naming: ResolutionConfig,
    provenance: Option<Arc<dyn ProvenanceProvider>>,
    cache: RwLock<HashMap<String, UnitRef>>,
}

impl LocalResolver {
    /// Create a resolver over `bundles`, searched in order
    pub fn new(
        bundles: Arc<Vec<Bundle>>,
        host: Arc<dyn HostRuntime>,
        naming: ResolutionConfig,
    ) -> Self {
        Self {
            bundles,
            host,
            naming,
            provenance: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a provenance provider consulted before each materialization
    pub fn with_provenance(mut self, provider: Arc<dyn ProvenanceProvider>) -> Self {
        self.provenance = Some(provider);
        self
    }

    /// Entry path a logical name maps to
    pub fn entry_path(&self, name: &str) -> String {
        self.naming.entry_path(name)
    }

    /// Number of cached units
    pub fn cached_count(&self) -> usize {
        with_read_lock(&self.cache, |cache| cache.len())
    }

    fn cached(&self, name: &str) -> Option<UnitRef> {
        with_read_lock(&self.cache, |cache| cache.get(name).cloned())
    }
}

impl Resolver for LocalResolver {
    fn resolve(&self, name: &str) -> Result<Option<UnitRef>, LoaderError> {
        if let Some(unit) = self.cached(name) {
            return Ok(Some(unit));
        }

        let path = self.entry_path(name);
        let Some(bundle) = self.bundles.iter().find(|b| b.archive().contains(&path)) else {
            return Ok(None);
        };

        let bytes = bundle
            .read_verified(&path)
            .map_err(|e| LoaderError::load_failure(name, e))?;
        let provenance = self
            .provenance
            .as_ref()
            .and_then(|p| p.provenance(name, bundle.info(), &path));
        debug!(
            "Materializing {} from {} ({} bytes)",
            name,
            bundle.info().locator(&path),
            bytes.len()
        );
        let unit = self
            .host
            .materialize(name, bytes, provenance)
            .map_err(|e| LoaderError::load_failure(name, e))?;

        // First writer wins if two callers raced past the cache check
        let unit = with_write_lock(&self.cache, |cache| {
            cache.entry(name.to_string()).or_insert(unit).clone()
        });
        Ok(Some(unit))
    }

    fn close(&self) -> Result<(), LoaderError> {
        with_write_lock(&self.cache, |cache| cache.clear());

        let mut first_error = None;
        for bundle in self.bundles.iter() {
            if let Err(e) = bundle.close() {
                warn!("Failed to close bundle {}: {}", bundle.path().display(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn kind(&self) -> &str {
        "local"
    }
}
