//! Bundle signature verification
//!
//! One pass over a bundle: read every entry fully (so container-level
//! corruption surfaces before anything is trusted), group
//! `META-INF/<signer>.(SF|RSA|EC)` entries per signer, verify each group's
//! detached signature, hand each verified chain to the trust policy, and
//! finally require the policy to have marked the bundle verified.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::archive::{read_entry, ArchiveError, Bundle};
use crate::module::security::digest::{sha256, DigestManifest};
use crate::module::security::policy::TrustPolicy;
use crate::module::security::signature::SignatureBlock;
use crate::module::traits::VerificationError;

const SIGNATURE_DIR: &str = "META-INF/";

/// Role of a `META-INF` signature entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureEntryKind {
    /// `.SF`: the signed content (a digest listing)
    Content,
    /// `.RSA` / `.EC`: the detached signature block
    Signature,
}

/// One signer's (content, signature) entry pair, built during a pass
#[derive(Debug, Default)]
struct SignerGroup {
    content: Option<String>,
    signature: Option<String>,
}

/// Match `META-INF/<signer>.(SF|RSA|EC)`, case-insensitively
///
/// Returns the lowercased signer id and the entry's role.
fn parse_signature_entry(name: &str) -> Option<(String, SignatureEntryKind)> {
    let prefix = name.get(..SIGNATURE_DIR.len())?;
    if !prefix.eq_ignore_ascii_case(SIGNATURE_DIR) {
        return None;
    }
    let file = &name[SIGNATURE_DIR.len()..];
    if file.contains('/') {
        return None;
    }
    let (signer, ext) = file.rsplit_once('.')?;
    if signer.is_empty() {
        return None;
    }
    let kind = match ext.to_ascii_lowercase().as_str() {
        "sf" => SignatureEntryKind::Content,
        "rsa" | "ec" => SignatureEntryKind::Signature,
        _ => return None,
    };
    Some((signer.to_lowercase(), kind))
}

/// Verifies bundles against a caller-supplied trust policy
#[derive(Clone)]
pub struct SignatureVerifier {
    policy: Arc<dyn TrustPolicy>,
}

impl SignatureVerifier {
    /// Create a verifier around `policy`
    pub fn new<P: TrustPolicy + 'static>(policy: P) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    /// Create a verifier around a shared policy
    pub fn with_policy(policy: Arc<dyn TrustPolicy>) -> Self {
        Self { policy }
    }

    /// Verify one bundle; any error rejects the whole bundle
    pub fn verify(&self, bundle: &Bundle) -> Result<(), VerificationError> {
        let label = bundle.path().display().to_string();
        let archive = bundle.archive();

        let mut groups: HashMap<String, SignerGroup> = HashMap::new();
        let mut digests: HashMap<String, [u8; 32]> = HashMap::new();

        // Scan: full read of every entry, grouping signature entries as we go
        for entry in archive.entries()? {
            if let Some((signer, kind)) = parse_signature_entry(&entry.name) {
                let group = groups.entry(signer).or_default();
                match kind {
                    SignatureEntryKind::Content => group.content = Some(entry.name.clone()),
                    SignatureEntryKind::Signature => group.signature = Some(entry.name.clone()),
                }
            }
            let data = read_entry(archive, &entry.name)
                .map_err(|e| integrity_error(&label, &entry.name, e))?;
            digests.insert(entry.name, sha256(&data));
        }
        debug!(
            "Scanned {} entries in {}, {} signer group(s)",
            digests.len(),
            label,
            groups.len()
        );

        let mut context = self.policy.create_context();
        self.policy.start(&mut context);

        for (signer, group) in &groups {
            let (Some(content_name), Some(signature_name)) = (&group.content, &group.signature)
            else {
                warn!("Signer {} in {} has an unpaired signature entry", signer, label);
                return Err(VerificationError::IncompleteSignature {
                    bundle: label,
                    signer: signer.clone(),
                });
            };

            let content = read_entry(archive, content_name)
                .map_err(|e| integrity_error(&label, content_name, e))?;
            let signature = read_entry(archive, signature_name)
                .map_err(|e| integrity_error(&label, signature_name, e))?;

            let chains = SignatureBlock::from_bytes(&signature)
                .and_then(|block| block.verify(&content))
                .map_err(|e| {
                    warn!("Signature of {} in {} failed: {}", signer, label, e);
                    VerificationError::InvalidSignature {
                        bundle: label.clone(),
                        signer: signer.clone(),
                        reason: e.to_string(),
                    }
                })?;

            DigestManifest::parse(&content)
                .check(&digests)
                .map_err(|m| VerificationError::ArchiveIntegrity {
                    bundle: label.clone(),
                    entry: m.entry,
                    reason: m.reason,
                })?;

            for chain in &chains {
                debug!(
                    "Signer {} in {} verified, leaf subject {:?}",
                    signer,
                    label,
                    chain.first().map(|c| c.subject.as_str())
                );
                self.policy
                    .verify(&mut context, chain)
                    .map_err(|e| VerificationError::PolicyRejected {
                        bundle: label.clone(),
                        reason: e.to_string(),
                    })?;
            }
        }

        self.policy.end(&mut context);

        if !context.is_verified() {
            warn!("Bundle {} rejected by trust policy", label);
            return Err(VerificationError::PolicyRejected {
                bundle: label,
                reason: "trust policy did not mark the bundle verified".to_string(),
            });
        }

        info!("Bundle {} verified ({} signer group(s))", label, groups.len());
        bundle.mark_verified(digests);
        Ok(())
    }
}

fn integrity_error(bundle: &str, entry: &str, error: ArchiveError) -> VerificationError {
    VerificationError::ArchiveIntegrity {
        bundle: bundle.to_string(),
        entry: entry.to_string(),
        reason: error.to_string(),
    }
}
