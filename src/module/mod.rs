//! Module system for the bundle loader
//!
//! ## Architecture
//!
//! - **Verification at construction**: every bundle passes the trust gate
//!   before the loader exists
//! - **Resolver chain**: lookups walk priority-ordered resolvers, local
//!   bundles and the parent environment by default
//! - **Host materialization**: the loader reads verified bytes; the host
//!   runtime turns them into units
//! - **Scoped resources**: every stream handed out is tracked and released
//!   on close

pub mod loader;
pub mod resolver;
pub mod security;
pub mod traits;

pub use loader::{ModuleLoader, ModuleLoaderBuilder, ResourceStream};
pub use resolver::{LocalResolver, ParentResolver, Resolver, ResolverId, DEFAULT_PRIORITY};
pub use security::{
    BundleSigner, Certificate, SignatureBlock, SignatureVerifier, SubjectPolicy, TrustPolicy,
    VerificationContext,
};
pub use traits::{
    HostRuntime, LoaderError, NoParent, ParentEnvironment, ProvenanceProvider, ProvenanceTag,
    Unit, UnitRef, VerificationError,
};
