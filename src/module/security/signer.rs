//! Bundle signing
//!
//! Produces the `META-INF/<signer>.SF` / `META-INF/<signer>.EC` pair the
//! verifier expects: a digest listing of every non-signature entry, and a
//! detached signature block over that listing.

use secp256k1::SecretKey;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::archive::{read_entry, ArchiveError, ArchiveSource, MemoryArchive};
use crate::module::security::digest::DigestManifest;
use crate::module::security::signature::{Certificate, SignatureBlock, SignatureError};

/// Bundle signing errors
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("archive error while signing: {0}")]
    Archive(#[from] ArchiveError),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("I/O error while writing bundle: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error while writing bundle: {0}")]
    Zip(String),
}

impl From<zip::result::ZipError> for SigningError {
    fn from(e: zip::result::ZipError) -> Self {
        SigningError::Zip(e.to_string())
    }
}

/// Signs bundle contents as one signer identity
#[derive(Debug, Clone)]
pub struct BundleSigner {
    signer_id: String,
    secret_key: SecretKey,
    chain: Vec<Certificate>,
    block_extension: String,
}

impl BundleSigner {
    /// Signer writing `META-INF/<signer_id>.*`, `chain[0]` certifying `secret_key`
    pub fn new(
        signer_id: impl Into<String>,
        secret_key: SecretKey,
        chain: Vec<Certificate>,
    ) -> Self {
        Self {
            signer_id: signer_id.into(),
            secret_key,
            chain,
            block_extension: "EC".to_string(),
        }
    }

    /// Extension of the signature block entry, `EC` unless changed (`RSA` is also recognized)
    pub fn with_block_extension(mut self, extension: impl Into<String>) -> Self {
        self.block_extension = extension.into();
        self
    }

    /// Name of the content (digest listing) entry
    pub fn content_entry(&self) -> String {
        format!("META-INF/{}.SF", self.signer_id)
    }

    /// Name of the signature block entry
    pub fn signature_entry(&self) -> String {
        format!("META-INF/{}.{}", self.signer_id, self.block_extension)
    }

    /// Build the signature entries covering `entries`
    ///
    /// Existing signature entries (`META-INF/*.SF|RSA|EC`) are not listed.
    pub fn signature_entries(
        &self,
        entries: &[(String, Vec<u8>)],
    ) -> Result<Vec<(String, Vec<u8>)>, SigningError> {
        let mut listing = DigestManifest::new();
        for (name, data) in entries {
            if is_signature_entry(name) {
                continue;
            }
            listing.add(name.clone(), data);
        }
        let content = listing.to_bytes();
        let block = SignatureBlock::new()
            .with_signer(&content, &self.secret_key, self.chain.clone())
            .to_bytes()?;

        debug!(
            "Signed {} entries as {}",
            listing.entries().len(),
            self.signer_id
        );
        Ok(vec![
            (self.content_entry(), content),
            (self.signature_entry(), block),
        ])
    }

    /// Sign an in-memory archive in place
    pub fn sign_archive(&self, archive: &mut MemoryArchive) -> Result<(), SigningError> {
        let mut entries = Vec::new();
        for entry in archive.entries()? {
            let data = read_entry(archive, &entry.name)?;
            entries.push((entry.name, data));
        }
        for (name, data) in self.signature_entries(&entries)? {
            archive.insert(name, data);
        }
        Ok(())
    }

    /// Write `entries` plus this signer's signature entries as a zip bundle
    pub fn write_zip<P: AsRef<Path>>(
        &self,
        path: P,
        entries: &[(String, Vec<u8>)],
    ) -> Result<(), SigningError> {
        let signature_entries = self.signature_entries(entries)?;
        write_zip(path, entries.iter().chain(signature_entries.iter()))
    }
}

/// Write an unsigned zip bundle
pub fn write_zip<'a, P, I>(path: P, entries: I) -> Result<(), SigningError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a (String, Vec<u8>)>,
{
    let file = File::create(path.as_ref())?;
    let mut writer = ZipWriter::new(file);
    for (name, data) in entries {
        writer.start_file(name.as_str(), SimpleFileOptions::default())?;
        writer.write_all(data)?;
    }
    writer.finish()?;
    Ok(())
}

fn is_signature_entry(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with("META-INF/")
        && !upper["META-INF/".len()..].contains('/')
        && (upper.ends_with(".SF") || upper.ends_with(".RSA") || upper.ends_with(".EC"))
}
