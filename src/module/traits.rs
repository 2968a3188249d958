//! Module system traits and interfaces
//!
//! Defines the seams between the loader and the host application: the unit
//! type the host materializes, the host runtime that does the
//! materialization, the outer environment consulted by the parent resolver,
//! and the error types shared across the module system.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::archive::{ArchiveError, BundleInfo};

/// A named, loadable definition materialized by the host runtime
pub trait Unit: Send + Sync + fmt::Debug {
    /// Logical name the unit was resolved under
    fn name(&self) -> &str;

    /// Provenance tag supplied at materialization time, if any
    fn provenance(&self) -> Option<&ProvenanceTag>;

    /// Force full linkage/initialization
    ///
    /// Called when a caller resolves with `eager = true`. Must be idempotent:
    /// a cached unit can be linked many times.
    fn link(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Shared handle to a materialized unit; identity is pointer identity
pub type UnitRef = Arc<dyn Unit>;

/// Provenance/protection information attached to a unit at materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceTag {
    /// Bundle the unit's bytes came from
    pub bundle: BundleInfo,
    /// Entry path inside the bundle
    pub entry: String,
    /// Host-defined attributes (permissions, code source labels, ...)
    pub attributes: BTreeMap<String, String>,
}

impl ProvenanceTag {
    /// Create a tag with no attributes
    pub fn new(bundle: BundleInfo, entry: impl Into<String>) -> Self {
        Self {
            bundle,
            entry: entry.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Extension point deciding the provenance tag of a unit
///
/// The default loader has no provider, so units carry no tag.
pub trait ProvenanceProvider: Send + Sync {
    /// Tag for `name`, about to be materialized from `entry` of `bundle`
    fn provenance(&self, name: &str, bundle: &BundleInfo, entry: &str) -> Option<ProvenanceTag>;
}

/// Host runtime service turning verified bytes into units
pub trait HostRuntime: Send + Sync {
    /// Build a unit from bytes read out of a verified bundle
    fn materialize(
        &self,
        name: &str,
        bytes: Vec<u8>,
        provenance: Option<ProvenanceTag>,
    ) -> anyhow::Result<UnitRef>;
}

/// Outer environment consulted by the parent resolver
pub trait ParentEnvironment: Send + Sync {
    /// Resolve `name`, `Ok(None)` when the environment does not define it
    fn resolve(&self, name: &str) -> Result<Option<UnitRef>, LoaderError>;
}

/// Parent environment that defines nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParent;

impl ParentEnvironment for NoParent {
    fn resolve(&self, _name: &str) -> Result<Option<UnitRef>, LoaderError> {
        Ok(None)
    }
}

/// Bundle verification errors
///
/// Any of these aborts loader construction.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("archive integrity failure in {bundle} at {entry}: {reason}")]
    ArchiveIntegrity {
        bundle: String,
        entry: String,
        reason: String,
    },

    #[error("incomplete signature for signer {signer} in {bundle}")]
    IncompleteSignature { bundle: String, signer: String },

    #[error("invalid signature for signer {signer} in {bundle}: {reason}")]
    InvalidSignature {
        bundle: String,
        signer: String,
        reason: String,
    },

    #[error("bundle {bundle} rejected by trust policy: {reason}")]
    PolicyRejected { bundle: String, reason: String },

    #[error("bundle archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Module loader errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("unit not found: {name}")]
    NotFound {
        name: String,
        #[source]
        source: Option<Box<LoaderError>>,
    },

    #[error("failed to load unit {name}: {source}")]
    LoadFailure {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("loader is locked")]
    Locked,

    #[error("unknown resolver: {0}")]
    UnknownResolver(String),

    #[error("loader is closed")]
    Closed,

    #[error("close failed: {} ({} suppressed)", .primary, .suppressed.len())]
    AggregateClose {
        #[source]
        primary: Box<LoaderError>,
        suppressed: Vec<LoaderError>,
    },

    #[error("bundle archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LoaderError {
    /// Not-found error without an underlying cause
    pub fn not_found(name: impl Into<String>) -> Self {
        LoaderError::NotFound {
            name: name.into(),
            source: None,
        }
    }

    /// Load failure wrapping any error
    pub fn load_failure(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        LoaderError::LoadFailure {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Whether this is a not-found outcome rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoaderError::NotFound { .. })
    }
}

impl From<toml::de::Error> for LoaderError {
    fn from(e: toml::de::Error) -> Self {
        LoaderError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_carries_source() {
        let cause = LoaderError::load_failure("a.B", anyhow::anyhow!("bad bytes"));
        let err = LoaderError::NotFound {
            name: "a.B".to_string(),
            source: Some(Box::new(cause)),
        };
        assert!(err.is_not_found());
        let source = err.source().unwrap();
        assert!(source.to_string().contains("bad bytes"));
    }

    #[test]
    fn test_aggregate_display() {
        let err = LoaderError::AggregateClose {
            primary: Box::new(LoaderError::Closed),
            suppressed: vec![LoaderError::Locked],
        };
        assert_eq!(err.to_string(), "close failed: loader is closed (1 suppressed)");
    }

    #[test]
    fn test_no_parent_finds_nothing() {
        assert!(NoParent.resolve("anything").unwrap().is_none());
    }
}
