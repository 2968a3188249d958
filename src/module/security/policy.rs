//! Trust decision callbacks
//!
//! The verifier fixes the calling order (`create_context`, `start`, one
//! `verify` per verified signer, `end`) and the final gate on
//! [`VerificationContext::is_verified`]. Everything else is policy.
//!
//! Signers are visited in no particular order, so a policy must reach the
//! same verdict whatever order its `verify` calls arrive in.

use std::any::Any;
use std::collections::HashSet;
use tracing::debug;

use crate::config::TrustConfig;
use crate::module::security::signature::{verify_chain_links, Certificate};

/// Per-pass mutable state owned by the trust policy
///
/// `verified` starts out `false`; nothing in the verifier ever sets it.
#[derive(Debug, Default)]
pub struct VerificationContext {
    verified: bool,
    extension: Option<Box<dyn Any + Send>>,
}

impl VerificationContext {
    /// Fresh context with `verified = false`
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the policy has accepted the bundle so far
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Set the verdict
    pub fn set_verified(&mut self, verified: bool) {
        self.verified = verified;
    }

    /// Attach policy-defined state, replacing any previous state
    pub fn set_extension<T: Any + Send>(&mut self, state: T) {
        self.extension = Some(Box::new(state));
    }

    /// Policy-defined state, if present and of type `T`
    pub fn extension<T: Any + Send>(&self) -> Option<&T> {
        self.extension.as_ref().and_then(|b| b.downcast_ref::<T>())
    }

    /// Mutable policy-defined state, if present and of type `T`
    pub fn extension_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.extension.as_mut().and_then(|b| b.downcast_mut::<T>())
    }
}

/// Caller-supplied trust decision callback
pub trait TrustPolicy: Send + Sync {
    /// Create the context for one verification pass
    fn create_context(&self) -> VerificationContext {
        VerificationContext::new()
    }

    /// Called once after the entry scan, before any signer is checked
    fn start(&self, context: &mut VerificationContext);

    /// Inspect one cryptographically valid signer's chain (leaf first)
    ///
    /// Returning an error rejects the bundle outright.
    fn verify(
        &self,
        context: &mut VerificationContext,
        chain: &[Certificate],
    ) -> anyhow::Result<()>;

    /// Called once after every signer group has been checked
    fn end(&self, context: &mut VerificationContext);
}

#[derive(Debug, Default)]
struct SubjectTally {
    seen: usize,
    trusted: usize,
}

/// Stock policy trusting a fixed set of leaf subjects
///
/// Unsigned bundles pass only with `allow_unsigned`. A signed bundle passes
/// when every signer's leaf subject is trusted (and, with
/// `require_chain_links`, every chain verifies link by link).
#[derive(Debug, Clone, Default)]
pub struct SubjectPolicy {
    trusted_subjects: HashSet<String>,
    allow_unsigned: bool,
    require_chain_links: bool,
}

impl SubjectPolicy {
    /// Policy trusting the given subjects
    pub fn new<I, S>(trusted_subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted_subjects: trusted_subjects.into_iter().map(Into::into).collect(),
            allow_unsigned: false,
            require_chain_links: false,
        }
    }

    /// Accept bundles carrying no signer groups at all
    pub fn with_allow_unsigned(mut self, allow: bool) -> Self {
        self.allow_unsigned = allow;
        self
    }

    /// Require every chain to verify link by link
    pub fn with_require_chain_links(mut self, require: bool) -> Self {
        self.require_chain_links = require;
        self
    }

    fn is_trusted(&self, chain: &[Certificate]) -> bool {
        let Some(leaf) = chain.first() else {
            return false;
        };
        if !self.trusted_subjects.contains(&leaf.subject) {
            return false;
        }
        !self.require_chain_links || verify_chain_links(chain)
    }
}

impl From<&TrustConfig> for SubjectPolicy {
    fn from(config: &TrustConfig) -> Self {
        SubjectPolicy::new(config.trusted_subjects.iter().cloned())
            .with_allow_unsigned(config.allow_unsigned)
            .with_require_chain_links(config.require_chain_links)
    }
}

impl TrustPolicy for SubjectPolicy {
    fn start(&self, context: &mut VerificationContext) {
        context.set_verified(self.allow_unsigned);
        context.set_extension(SubjectTally::default());
    }

    fn verify(
        &self,
        context: &mut VerificationContext,
        chain: &[Certificate],
    ) -> anyhow::Result<()> {
        let trusted = self.is_trusted(chain);
        debug!(
            "Signer {:?} trusted: {}",
            chain.first().map(|c| c.subject.as_str()),
            trusted
        );
        if let Some(tally) = context.extension_mut::<SubjectTally>() {
            tally.seen += 1;
            if trusted {
                tally.trusted += 1;
            }
        }
        Ok(())
    }

    fn end(&self, context: &mut VerificationContext) {
        let verdict = match context.extension::<SubjectTally>() {
            Some(tally) if tally.seen > 0 => tally.trusted == tally.seen,
            _ => self.allow_unsigned,
        };
        context.set_verified(verdict);
    }
}
