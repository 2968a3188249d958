//! Module loader implementation
//!
//! Handles bundle verification at construction, name resolution through the
//! resolver chain, resource access, and shutdown.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::archive::{Bundle, BundleInfo};
use crate::config::{LoaderConfig, ResolutionConfig};
use crate::module::loader::name_lock::NameLocks;
use crate::module::loader::resources::{ResourceRegistry, ResourceStream};
use crate::module::resolver::{
    LocalResolver, ParentResolver, Resolver, ResolverChain, ResolverId, DEFAULT_PRIORITY,
};
use crate::module::security::{SignatureVerifier, SubjectPolicy};
use crate::module::traits::{
    HostRuntime, LoaderError, ParentEnvironment, ProvenanceProvider, UnitRef,
};
use crate::utils::{with_read_lock, with_write_lock};

/// Where a bundle comes from
enum BundleSource {
    Path(PathBuf),
    Opened(Bundle),
}

/// Builder for [`ModuleLoader`]
///
/// Bundles are searched in the order they are added.
pub struct ModuleLoaderBuilder {
    verifier: SignatureVerifier,
    host: Arc<dyn HostRuntime>,
    parent: Arc<dyn ParentEnvironment>,
    sources: Vec<BundleSource>,
    resolution: ResolutionConfig,
    provenance: Option<Arc<dyn ProvenanceProvider>>,
}

impl ModuleLoaderBuilder {
    /// Add a bundle on disk
    pub fn bundle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(BundleSource::Path(path.into()));
        self
    }

    /// Add several bundles on disk
    pub fn bundle_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.sources
            .extend(paths.into_iter().map(|p| BundleSource::Path(p.into())));
        self
    }

    /// Add an already opened bundle
    pub fn bundle(mut self, bundle: Bundle) -> Self {
        self.sources.push(BundleSource::Opened(bundle));
        self
    }

    /// Name-to-entry mapping options
    pub fn resolution(mut self, resolution: ResolutionConfig) -> Self {
        self.resolution = resolution;
        self
    }

    /// Provenance provider for materialized units
    pub fn provenance(mut self, provider: Arc<dyn ProvenanceProvider>) -> Self {
        self.provenance = Some(provider);
        self
    }

    /// Open and verify every bundle, then assemble the loader
    ///
    /// Fails on the first bundle that cannot be opened or verified; bundles
    /// opened before it are closed again.
    pub fn build(self) -> Result<ModuleLoader, LoaderError> {
        let mut bundles: Vec<Bundle> = Vec::with_capacity(self.sources.len());
        for source in self.sources {
            let bundle = match source {
                BundleSource::Path(path) => {
                    debug!("Opening bundle {}", path.display());
                    match Bundle::open(&path) {
                        Ok(bundle) => bundle,
                        Err(e) => {
                            warn!("Failed to open bundle {}: {}", path.display(), e);
                            release(&bundles);
                            return Err(e.into());
                        }
                    }
                }
                BundleSource::Opened(bundle) => bundle,
            };

            if let Err(e) = self.verifier.verify(&bundle) {
                bundles.push(bundle);
                release(&bundles);
                return Err(e.into());
            }
            bundles.push(bundle);
        }
        info!("Verified {} bundle(s)", bundles.len());

        let bundles = Arc::new(bundles);
        let mut local = LocalResolver::new(Arc::clone(&bundles), self.host, self.resolution);
        if let Some(provider) = self.provenance {
            local = local.with_provenance(provider);
        }

        let mut chain = ResolverChain::new();
        let local_id = chain.add(Arc::new(local), DEFAULT_PRIORITY);
        let parent_id = chain.add(Arc::new(ParentResolver::new(self.parent)), DEFAULT_PRIORITY);

        Ok(ModuleLoader {
            bundles,
            chain: RwLock::new(chain),
            local_id,
            parent_id,
            locked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            name_locks: NameLocks::default(),
            resources: ResourceRegistry::default(),
        })
    }
}

fn release(bundles: &[Bundle]) {
    for bundle in bundles {
        if let Err(e) = bundle.close() {
            debug!("Error releasing bundle {}: {}", bundle.path().display(), e);
        }
    }
}

/// Trust-gated loader over an ordered list of bundles
///
/// Lifecycle: `Open -> Locked -> Closed`, with `Open -> Closed` also
/// allowed. Lookups work while open or locked; the chain can only change
/// while open.
pub struct ModuleLoader {
    bundles: Arc<Vec<Bundle>>,
    chain: RwLock<ResolverChain>,
    local_id: ResolverId,
    parent_id: ResolverId,
    locked: AtomicBool,
    closed: AtomicBool,
    name_locks: NameLocks,
    resources: ResourceRegistry,
}

impl ModuleLoader {
    /// Start building a loader
    pub fn builder(
        verifier: SignatureVerifier,
        host: Arc<dyn HostRuntime>,
        parent: Arc<dyn ParentEnvironment>,
    ) -> ModuleLoaderBuilder {
        ModuleLoaderBuilder {
            verifier,
            host,
            parent,
            sources: Vec::new(),
            resolution: ResolutionConfig::default(),
            provenance: None,
        }
    }

    /// Open and verify `paths` in order
    pub fn open<I, P>(
        paths: I,
        verifier: SignatureVerifier,
        host: Arc<dyn HostRuntime>,
        parent: Arc<dyn ParentEnvironment>,
    ) -> Result<Self, LoaderError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::builder(verifier, host, parent).bundle_paths(paths).build()
    }

    /// Build a loader from configuration, trusting per `config.trust`
    pub fn from_config(
        config: &LoaderConfig,
        host: Arc<dyn HostRuntime>,
        parent: Arc<dyn ParentEnvironment>,
    ) -> Result<Self, LoaderError> {
        let verifier = SignatureVerifier::new(SubjectPolicy::from(&config.trust));
        Self::builder(verifier, host, parent)
            .bundle_paths(config.bundles.iter().cloned())
            .resolution(config.resolution.clone())
            .build()
    }

    /// Resolve `name` through the chain
    ///
    /// Resolvers are consulted in priority order until one defines the name.
    /// A resolver error does not stop the walk; it is kept and attached to
    /// the final not-found error if nothing else matches. With `eager`, the
    /// unit is linked before it is returned. Linking happens after the
    /// name's lock is released, so a unit may resolve its own name while
    /// linking.
    pub fn resolve(&self, name: &str, eager: bool) -> Result<UnitRef, LoaderError> {
        self.ensure_open()?;

        let unit = {
            let lease = self.name_locks.lease(name);
            let _guard = lease.acquire();
            self.walk_chain(name)?
        };

        if eager {
            unit.link().map_err(|e| LoaderError::load_failure(name, e))?;
        }
        Ok(unit)
    }

    fn walk_chain(&self, name: &str) -> Result<UnitRef, LoaderError> {
        let resolvers = with_read_lock(&self.chain, |chain| chain.snapshot());
        let mut last_error = None;
        for registration in resolvers.iter() {
            let resolver = registration.resolver();
            match resolver.resolve(name) {
                Ok(Some(unit)) => {
                    debug!("Resolved {} via {} resolver", name, resolver.kind());
                    return Ok(unit);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("{} resolver failed for {}: {}", resolver.kind(), name, e);
                    last_error = Some(e);
                }
            }
        }

        info!("Unit not found: {}", name);
        Err(LoaderError::NotFound {
            name: name.to_string(),
            source: last_error.map(Box::new),
        })
    }

    /// Open a resource from the first bundle containing `path`
    ///
    /// The entry is read in full and checked against the bundle's verified
    /// digests before the stream is handed out.
    pub fn get_resource_stream(&self, path: &str) -> Result<Option<ResourceStream>, LoaderError> {
        self.ensure_open()?;
        let Some(bundle) = self.bundles.iter().find(|b| b.archive().contains(path)) else {
            return Ok(None);
        };
        let data = bundle.read_verified(path)?;
        Ok(Some(self.resources.register(path, Box::new(Cursor::new(data)))))
    }

    /// Locator of the first bundle entry matching `path`
    pub fn find_resource(&self, path: &str) -> Option<String> {
        self.bundles
            .iter()
            .find(|b| b.archive().contains(path))
            .map(|b| b.info().locator(path))
    }

    /// Descriptors of the loaded bundles, in search order
    pub fn bundles(&self) -> Vec<BundleInfo> {
        self.bundles.iter().map(|b| b.info().clone()).collect()
    }

    /// Add a resolver at its own priority
    pub fn add_resolver(&self, resolver: Arc<dyn Resolver>) -> Result<ResolverId, LoaderError> {
        let priority = resolver.priority();
        self.add_resolver_with_priority(resolver, priority)
    }

    /// Add a resolver at an explicit priority
    pub fn add_resolver_with_priority(
        &self,
        resolver: Arc<dyn Resolver>,
        priority: i32,
    ) -> Result<ResolverId, LoaderError> {
        with_write_lock(&self.chain, |chain| {
            self.ensure_mutable()?;
            let kind = resolver.kind().to_string();
            let id = chain.add(resolver, priority);
            info!("Added {} resolver {} at priority {}", kind, id, priority);
            Ok(id)
        })
    }

    /// Change the priority of a registered resolver
    pub fn set_priority(&self, id: ResolverId, priority: i32) -> Result<(), LoaderError> {
        with_write_lock(&self.chain, |chain| {
            self.ensure_mutable()?;
            chain.set_priority(id, priority)?;
            debug!("Resolver {} moved to priority {}", id, priority);
            Ok(())
        })
    }

    /// Current priority of a registered resolver
    pub fn priority(&self, id: ResolverId) -> Option<i32> {
        with_read_lock(&self.chain, |chain| chain.priority_of(id))
    }

    /// Id of the built-in local resolver
    pub fn local_resolver_id(&self) -> ResolverId {
        self.local_id
    }

    /// Id of the built-in parent resolver
    pub fn parent_resolver_id(&self) -> ResolverId {
        self.parent_id
    }

    /// Freeze the resolver chain; idempotent
    pub fn lock(&self) {
        with_write_lock(&self.chain, |_| {
            if !self.locked.swap(true, Ordering::AcqRel) {
                info!("Module loader locked");
            }
        });
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resource streams still open
    pub fn open_resource_count(&self) -> usize {
        self.resources.open_count()
    }

    /// Close every resolver, then every open resource stream
    ///
    /// Every release is attempted. Failures are reported together as
    /// [`LoaderError::AggregateClose`], first failure as primary. Closing
    /// an already closed loader is a no-op.
    pub fn close(&self) -> Result<(), LoaderError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut errors = Vec::new();
        let resolvers = with_read_lock(&self.chain, |chain| chain.snapshot());
        for registration in resolvers.iter() {
            if let Err(e) = registration.resolver().close() {
                warn!(
                    "Failed to close {} resolver {}: {}",
                    registration.resolver().kind(),
                    registration.id(),
                    e
                );
                errors.push(e);
            }
        }
        errors.extend(self.resources.close_all());

        if errors.is_empty() {
            info!("Module loader closed");
            return Ok(());
        }
        let primary = errors.remove(0);
        Err(LoaderError::AggregateClose {
            primary: Box::new(primary),
            suppressed: errors,
        })
    }

    fn ensure_open(&self) -> Result<(), LoaderError> {
        if self.is_closed() {
            return Err(LoaderError::Closed);
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), LoaderError> {
        self.ensure_open()?;
        if self.is_locked() {
            return Err(LoaderError::Locked);
        }
        Ok(())
    }
}

impl ParentEnvironment for ModuleLoader {
    fn resolve(&self, name: &str) -> Result<Option<UnitRef>, LoaderError> {
        match ModuleLoader::resolve(self, name, false) {
            Ok(unit) => Ok(Some(unit)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ModuleLoader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing module loader on drop: {}", e);
        }
    }
}
