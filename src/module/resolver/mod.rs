//! Resolver chain
//!
//! A resolver is anything that can turn a logical name into a unit. The
//! loader keeps its resolvers in a chain ordered by ascending priority
//! (lower value wins); equal priorities keep registration order.
//!
//! Priorities belong to the chain's registrations rather than to the
//! resolvers, so freezing the chain freezes them too.

pub mod local;
pub mod parent;

use std::fmt;
use std::sync::Arc;

use crate::module::traits::{LoaderError, UnitRef};

pub use local::LocalResolver;
pub use parent::ParentResolver;

/// Priority of the default resolvers and of resolvers that don't pick one
pub const DEFAULT_PRIORITY: i32 = 5;

/// Lookup capability consulted by the loader
pub trait Resolver: Send + Sync {
    /// Resolve `name`; `Ok(None)` means this resolver does not define it
    fn resolve(&self, name: &str) -> Result<Option<UnitRef>, LoaderError>;

    /// Priority used when the resolver is added to a chain
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Release anything the resolver holds
    fn close(&self) -> Result<(), LoaderError> {
        Ok(())
    }

    /// Short label for logs
    fn kind(&self) -> &str {
        "custom"
    }
}

/// Handle identifying one registration in a loader's chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolverId(u64);

impl fmt::Display for ResolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resolver#{}", self.0)
    }
}

/// One resolver in the chain
#[derive(Clone)]
pub struct ResolverRegistration {
    id: ResolverId,
    priority: i32,
    resolver: Arc<dyn Resolver>,
}

impl ResolverRegistration {
    /// Registration id
    pub fn id(&self) -> ResolverId {
        self.id
    }

    /// Current priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The resolver
    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }
}

impl fmt::Debug for ResolverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistration")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("kind", &self.resolver.kind())
            .finish()
    }
}

/// Ordered registrations; ids double as registration sequence numbers
#[derive(Debug, Default)]
pub(crate) struct ResolverChain {
    registrations: Vec<ResolverRegistration>,
    ordered: Arc<[ResolverRegistration]>,
    next_id: u64,
}

impl ResolverChain {
    pub(crate) fn new() -> Self {
        Self {
            registrations: Vec::new(),
            ordered: Arc::from(Vec::new()),
            next_id: 0,
        }
    }

    /// Append a registration and re-sort
    pub(crate) fn add(&mut self, resolver: Arc<dyn Resolver>, priority: i32) -> ResolverId {
        let id = ResolverId(self.next_id);
        self.next_id += 1;
        self.registrations.push(ResolverRegistration {
            id,
            priority,
            resolver,
        });
        self.reorder();
        id
    }

    /// Change a registration's priority and re-sort
    pub(crate) fn set_priority(
        &mut self,
        id: ResolverId,
        priority: i32,
    ) -> Result<(), LoaderError> {
        let registration = self
            .registrations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| LoaderError::UnknownResolver(id.to_string()))?;
        registration.priority = priority;
        self.reorder();
        Ok(())
    }

    /// Current order, cheap to clone and safe to iterate without the lock
    pub(crate) fn snapshot(&self) -> Arc<[ResolverRegistration]> {
        Arc::clone(&self.ordered)
    }

    pub(crate) fn priority_of(&self, id: ResolverId) -> Option<i32> {
        self.registrations.iter().find(|r| r.id == id).map(|r| r.priority)
    }

    fn reorder(&mut self) {
        let mut ordered = self.registrations.clone();
        ordered.sort_by_key(|r| (r.priority, r.id));
        self.ordered = Arc::from(ordered);
    }
}
