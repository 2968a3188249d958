//! Bundle Loader - trust-gated loading of named units from signed bundles
//!
//! This crate loads named, executable units out of an ordered list of
//! archive bundles. Every bundle is cryptographically verified, with a
//! caller-supplied trust policy making the final decision, before any unit
//! or resource is served from it.
//!
//! ## Architecture
//!
//! 1. **Archive** (`archive`): entry enumeration and streaming over zip or
//!    in-memory bundles
//! 2. **Trust gate** (`module::security`): digest listings, detached
//!    secp256k1 signature blocks, trust policy callbacks
//! 3. **Resolution** (`module::resolver`): priority-ordered resolver chain
//!    with local (bundle) and parent delegation
//! 4. **Loader** (`module::loader`): lifecycle, per-name serialization,
//!    resource streams, aggregated shutdown
//!
//! ## Design Principles
//!
//! 1. **Fail Fast**: a bundle that fails verification aborts construction
//! 2. **Host Agnostic**: turning bytes into units is the host's job
//! 3. **Stable Identity**: one name resolves to one unit per loader

pub mod archive;
pub mod config;
pub mod module;
pub mod utils;

pub use archive::{ArchiveSource, Bundle, BundleInfo, MemoryArchive, ZipArchiveSource};
pub use config::{LoaderConfig, LoggingConfig, ResolutionConfig, TrustConfig};
pub use module::{
    BundleSigner, Certificate, HostRuntime, LoaderError, ModuleLoader, ModuleLoaderBuilder,
    NoParent, ParentEnvironment, ProvenanceProvider, ProvenanceTag, ResolverId, Resolver,
    ResourceStream, SignatureVerifier, SubjectPolicy, TrustPolicy, Unit, UnitRef,
    VerificationContext, VerificationError,
};
