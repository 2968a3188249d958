//! Trust gate for bundles
//!
//! Provides signature verification, the trust policy callback, and the
//! signing side that produces verifiable bundles.

pub mod digest;
pub mod policy;
pub mod signature;
pub mod signer;
pub mod verifier;

pub use digest::DigestManifest;
pub use policy::{SubjectPolicy, TrustPolicy, VerificationContext};
pub use signature::{verify_chain_links, Certificate, SignatureBlock, SignatureError, SignerInfo};
pub use signer::{write_zip, BundleSigner, SigningError};
pub use verifier::SignatureVerifier;
