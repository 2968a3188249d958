//! Detached bundle signatures
//!
//! A signature entry (`META-INF/<signer>.EC` or `.RSA`) holds a
//! [`SignatureBlock`]: one or more signer infos, each a compact secp256k1
//! ECDSA signature over `SHA-256(content)` plus the signer's certificate
//! chain, leaf first.
//!
//! Certificates carry a subject, an issuer, a compressed public key, and the
//! issuer's signature over those three fields. Whether a chain is trusted is
//! decided by the trust policy.

use bincode::Options;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::security::digest::sha256;

/// Upper bound on an encoded signature block
const MAX_SIGNATURE_BLOCK_BYTES: u64 = 1024 * 1024;

/// Signature decoding and verification errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature block: {0}")]
    Malformed(String),

    #[error("unsupported signature block version {0}")]
    UnsupportedVersion(u8),

    #[error("signature block has no signers")]
    NoSigners,

    #[error("signer has an empty certificate chain")]
    EmptyChain,

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("signature does not verify for signer {0}")]
    Mismatch(String),
}

/// Minimal certificate binding a subject name to a public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    /// Subject name, e.g. `"ACME"`
    pub subject: String,
    /// Issuer name; equal to `subject` for a self-signed root
    pub issuer: String,
    /// Compressed secp256k1 public key (33 bytes)
    pub public_key: Vec<u8>,
    /// Issuer's compact ECDSA signature over the to-be-signed fields
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Self-signed certificate for `subject`
    pub fn self_signed(subject: impl Into<String>, secret_key: &SecretKey) -> Self {
        let secp = Secp256k1::new();
        let subject = subject.into();
        let public_key = PublicKey::from_secret_key(&secp, secret_key).serialize().to_vec();
        let signature = sign_digest(&tbs_bytes(&subject, &subject, &public_key), secret_key);
        Self {
            issuer: subject.clone(),
            subject,
            public_key,
            signature,
        }
    }

    /// Certificate for `subject_key`, issued by `issuer` (signed with `issuer_key`)
    pub fn issue(
        subject: impl Into<String>,
        subject_key: &PublicKey,
        issuer: &Certificate,
        issuer_key: &SecretKey,
    ) -> Self {
        let subject = subject.into();
        let public_key = subject_key.serialize().to_vec();
        let signature = sign_digest(&tbs_bytes(&subject, &issuer.subject, &public_key), issuer_key);
        Self {
            subject,
            issuer: issuer.subject.clone(),
            public_key,
            signature,
        }
    }

    /// Parsed public key
    pub fn public_key(&self) -> Result<PublicKey, SignatureError> {
        PublicKey::from_slice(&self.public_key)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))
    }

    /// Whether subject and issuer are the same name
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// Whether `issuer` names and signed this certificate
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        if self.issuer != issuer.subject {
            return false;
        }
        match issuer.public_key() {
            Ok(key) => verify_digest(
                &tbs_bytes(&self.subject, &self.issuer, &self.public_key),
                &self.signature,
                &key,
            ),
            Err(_) => false,
        }
    }
}

/// Check that every certificate in `chain` is signed by the next one
///
/// A self-issued last certificate must also verify against itself. An
/// empty chain has no links and is rejected.
pub fn verify_chain_links(chain: &[Certificate]) -> bool {
    if chain.is_empty() {
        return false;
    }
    let links_ok = chain.windows(2).all(|pair| pair[0].is_signed_by(&pair[1]));
    let last = &chain[chain.len() - 1];
    links_ok && (!last.is_self_issued() || last.is_signed_by(last))
}

/// One signer inside a signature block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Certificate chain, leaf (the signing key) first
    pub certificates: Vec<Certificate>,
    /// Compact ECDSA signature over `SHA-256(content)`
    pub signature: Vec<u8>,
}

/// Encoded content of a signature entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Format version, currently [`SignatureBlock::VERSION`]
    pub version: u8,
    /// Signers over the same content
    pub signers: Vec<SignerInfo>,
}

impl SignatureBlock {
    /// Current format version
    pub const VERSION: u8 = 1;

    /// Empty block
    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            signers: Vec::new(),
        }
    }

    /// Sign `content` with `secret_key`; `chain[0]` must certify that key
    pub fn with_signer(
        mut self,
        content: &[u8],
        secret_key: &SecretKey,
        chain: Vec<Certificate>,
    ) -> Self {
        self.signers.push(SignerInfo {
            certificates: chain,
            signature: sign_digest(content, secret_key),
        });
        self
    }

    /// Encode for storage in a signature entry
    pub fn to_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        codec()
            .serialize(self)
            .map_err(|e| SignatureError::Malformed(e.to_string()))
    }

    /// Decode a signature entry
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let block: SignatureBlock = codec()
            .deserialize(bytes)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        if block.version != Self::VERSION {
            return Err(SignatureError::UnsupportedVersion(block.version));
        }
        Ok(block)
    }

    /// Verify every signer over `content`, returning their chains in block order
    pub fn verify(&self, content: &[u8]) -> Result<Vec<Vec<Certificate>>, SignatureError> {
        if self.signers.is_empty() {
            return Err(SignatureError::NoSigners);
        }

        let mut chains = Vec::with_capacity(self.signers.len());
        for signer in &self.signers {
            let leaf = signer.certificates.first().ok_or(SignatureError::EmptyChain)?;
            let key = leaf.public_key()?;
            if !verify_digest(content, &signer.signature, &key) {
                return Err(SignatureError::Mismatch(leaf.subject.clone()));
            }
            chains.push(signer.certificates.clone());
        }
        Ok(chains)
    }
}

impl Default for SignatureBlock {
    fn default() -> Self {
        Self::new()
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_SIGNATURE_BLOCK_BYTES)
}

fn tbs_bytes(subject: &str, issuer: &str, public_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + subject.len() + issuer.len() + public_key.len());
    out.extend_from_slice(&(subject.len() as u32).to_le_bytes());
    out.extend_from_slice(subject.as_bytes());
    out.extend_from_slice(&(issuer.len() as u32).to_le_bytes());
    out.extend_from_slice(issuer.as_bytes());
    out.extend_from_slice(public_key);
    out
}

fn sign_digest(data: &[u8], secret_key: &SecretKey) -> Vec<u8> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(sha256(data));
    secp.sign_ecdsa(&message, secret_key).serialize_compact().to_vec()
}

fn verify_digest(data: &[u8], signature: &[u8], public_key: &PublicKey) -> bool {
    if signature.len() != 64 {
        return false;
    }
    let Ok(sig) = Signature::from_compact(signature) else {
        return false;
    };
    let secp = Secp256k1::verification_only();
    let message = Message::from_digest(sha256(data));
    secp.verify_ecdsa(&message, &sig, public_key).is_ok()
}
