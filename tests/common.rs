//! Shared fixtures for loader integration tests
#![allow(dead_code)]

use bundle_loader::module::security::{BundleSigner, Certificate};
use bundle_loader::{
    HostRuntime, LoaderError, ParentEnvironment, ProvenanceTag, Resolver, SignatureVerifier,
    SubjectPolicy, Unit, UnitRef,
};
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Unit handed out by [`TestHost`]
#[derive(Debug)]
pub struct TestUnit {
    pub name: String,
    pub bytes: Vec<u8>,
    pub provenance: Option<ProvenanceTag>,
}

impl Unit for TestUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn provenance(&self) -> Option<&ProvenanceTag> {
        self.provenance.as_ref()
    }
}

/// Host runtime that counts and records materializations
#[derive(Default)]
pub struct TestHost {
    calls: AtomicUsize,
    materialized: Mutex<Vec<(String, Vec<u8>)>>,
    delay: Option<Duration>,
}

impl TestHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Host that sleeps inside every materialization, widening race windows
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Bytes the host received for `name`, most recent first
    pub fn bytes_for(&self, name: &str) -> Option<Vec<u8>> {
        self.materialized
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
    }
}

impl HostRuntime for TestHost {
    fn materialize(
        &self,
        name: &str,
        bytes: Vec<u8>,
        provenance: Option<ProvenanceTag>,
    ) -> anyhow::Result<UnitRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if bytes.starts_with(b"INVALID") {
            anyhow::bail!("malformed unit {}", name);
        }
        self.materialized
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.clone()));
        Ok(Arc::new(TestUnit {
            name: name.to_string(),
            bytes,
            provenance,
        }))
    }
}

/// Parent environment backed by a fixed map
#[derive(Default)]
pub struct MapParent {
    units: HashMap<String, UnitRef>,
}

impl MapParent {
    pub fn with_unit(mut self, name: &str) -> Self {
        self.units.insert(
            name.to_string(),
            Arc::new(TestUnit {
                name: name.to_string(),
                bytes: b"parent".to_vec(),
                provenance: None,
            }),
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<UnitRef> {
        self.units.get(name).cloned()
    }
}

impl ParentEnvironment for MapParent {
    fn resolve(&self, name: &str) -> Result<Option<UnitRef>, LoaderError> {
        Ok(self.get(name))
    }
}

/// Resolver that defines nothing and fails to close
pub struct FailingCloseResolver {
    pub label: &'static str,
}

impl Resolver for FailingCloseResolver {
    fn resolve(&self, _name: &str) -> Result<Option<UnitRef>, LoaderError> {
        Ok(None)
    }

    fn close(&self) -> Result<(), LoaderError> {
        Err(LoaderError::Config(format!("{} refused to close", self.label)))
    }

    fn kind(&self) -> &str {
        self.label
    }
}

/// Resolver that always errors
pub struct BrokenResolver;

impl Resolver for BrokenResolver {
    fn resolve(&self, name: &str) -> Result<Option<UnitRef>, LoaderError> {
        Err(LoaderError::load_failure(name, anyhow::anyhow!("backend offline")))
    }

    fn priority(&self) -> i32 {
        1
    }
}

pub fn secret_key(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).unwrap()
}

/// Self-signed signer for `subject` writing `META-INF/<id>.*`
pub fn signer(id: &str, subject: &str, seed: u8) -> BundleSigner {
    let sk = secret_key(seed);
    BundleSigner::new(id, sk, vec![Certificate::self_signed(subject, &sk)])
}

/// Signer whose leaf is issued by a separate root
pub fn chained_signer(id: &str, subject: &str, root_subject: &str) -> BundleSigner {
    let secp = Secp256k1::new();
    let leaf_sk = secret_key(0x21);
    let root_sk = secret_key(0x22);
    let root = Certificate::self_signed(root_subject, &root_sk);
    let leaf = Certificate::issue(
        subject,
        &PublicKey::from_secret_key(&secp, &leaf_sk),
        &root,
        &root_sk,
    );
    BundleSigner::new(id, leaf_sk, vec![leaf, root])
}

pub fn acme_signer() -> BundleSigner {
    signer("acme", "ACME", 0x11).with_block_extension("RSA")
}

pub fn acme_verifier() -> SignatureVerifier {
    SignatureVerifier::new(SubjectPolicy::new(["ACME"]))
}

pub fn permissive_verifier() -> SignatureVerifier {
    SignatureVerifier::new(SubjectPolicy::default().with_allow_unsigned(true))
}

pub fn entries(items: &[(&str, &str)]) -> Vec<(String, Vec<u8>)> {
    items
        .iter()
        .map(|(n, d)| (n.to_string(), d.as_bytes().to_vec()))
        .collect()
}

/// Temporary directory holding bundle files
pub struct BundleFixture {
    pub dir: TempDir,
}

impl BundleFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Write a bundle signed by `signer`
    pub fn signed(&self, file: &str, signer: &BundleSigner, items: &[(&str, &str)]) -> PathBuf {
        let path = self.dir.path().join(file);
        signer.write_zip(&path, &entries(items)).unwrap();
        path
    }

    /// Write a bundle with no signature entries
    pub fn unsigned(&self, file: &str, items: &[(&str, &str)]) -> PathBuf {
        let path = self.dir.path().join(file);
        bundle_loader::module::security::write_zip(&path, &entries(items)).unwrap();
        path
    }

    /// Write a bundle from raw entries, signature entries included as given
    pub fn raw(&self, file: &str, items: &[(String, Vec<u8>)]) -> PathBuf {
        let path = self.dir.path().join(file);
        bundle_loader::module::security::write_zip(&path, items).unwrap();
        path
    }
}
