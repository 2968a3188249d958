//! Concurrent resolution tests

mod common;

use bundle_loader::{HostRuntime, ModuleLoader, NoParent, ProvenanceTag, Unit, UnitRef};
use common::*;
use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Barrier, OnceLock, Weak};
use std::thread;
use std::time::Duration;

const THREADS: usize = 16;

#[test]
fn test_concurrent_resolve_materializes_once() {
    let fixture = BundleFixture::new();
    let bundle = fixture.signed("A.pkg", &acme_signer(), &[("hot/Unit", "payload")]);
    let host = TestHost::slow(Duration::from_millis(20));
    let loader = Arc::new(
        ModuleLoader::open([bundle], acme_verifier(), host.clone(), Arc::new(NoParent)).unwrap(),
    );

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let loader = Arc::clone(&loader);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                loader.resolve("hot.Unit", false).unwrap()
            })
        })
        .collect();

    let units: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(host.calls(), 1);
    for unit in &units[1..] {
        assert!(Arc::ptr_eq(&units[0], unit));
    }
}

#[test]
fn test_distinct_names_resolve_in_parallel() {
    let fixture = BundleFixture::new();
    let items: Vec<(String, String)> = (0..THREADS)
        .map(|i| (format!("pkg/Unit{}", i), format!("body {}", i)))
        .collect();
    let borrowed: Vec<(&str, &str)> = items.iter().map(|(n, d)| (n.as_str(), d.as_str())).collect();
    let bundle = fixture.signed("A.pkg", &acme_signer(), &borrowed);
    let host = TestHost::new();
    let loader = Arc::new(
        ModuleLoader::open([bundle], acme_verifier(), host.clone(), Arc::new(NoParent)).unwrap(),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let loader = Arc::clone(&loader);
            thread::spawn(move || {
                let name = format!("pkg.Unit{}", i);
                let first = loader.resolve(&name, false).unwrap();
                let second = loader.resolve(&name, true).unwrap();
                assert!(Arc::ptr_eq(&first, &second));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(host.calls(), THREADS);
}

#[test]
fn test_close_while_resolving() {
    let fixture = BundleFixture::new();
    let bundle = fixture.signed("A.pkg", &acme_signer(), &[("x/Y", "data")]);
    let loader = Arc::new(
        ModuleLoader::open([bundle], acme_verifier(), TestHost::new(), Arc::new(NoParent)).unwrap(),
    );

    let worker = {
        let loader = Arc::clone(&loader);
        thread::spawn(move || {
            for _ in 0..200 {
                match loader.resolve("x.Y", false) {
                    Ok(_) => {}
                    Err(bundle_loader::LoaderError::Closed) => return,
                    // A lookup already past the open check can see released bundles
                    Err(_) if loader.is_closed() => return,
                    Err(e) => panic!("unexpected error {}", e),
                }
            }
        })
    };
    loader.close().unwrap();
    worker.join().unwrap();
    assert!(loader.is_closed());
}

type LoaderSlot = Arc<OnceLock<Weak<ModuleLoader>>>;

/// Unit whose linkage looks up its own name, like a recursive definition
struct Recursive {
    name: String,
    loader: LoaderSlot,
}

impl fmt::Debug for Recursive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recursive").field("name", &self.name).finish()
    }
}

impl Unit for Recursive {
    fn name(&self) -> &str {
        &self.name
    }

    fn provenance(&self) -> Option<&ProvenanceTag> {
        None
    }

    fn link(&self) -> anyhow::Result<()> {
        let loader = self
            .loader
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow::anyhow!("loader dropped"))?;
        loader.resolve(&self.name, false)?;
        Ok(())
    }
}

struct RecursiveHost {
    loader: LoaderSlot,
}

impl HostRuntime for RecursiveHost {
    fn materialize(
        &self,
        name: &str,
        _bytes: Vec<u8>,
        _provenance: Option<ProvenanceTag>,
    ) -> anyhow::Result<UnitRef> {
        Ok(Arc::new(Recursive {
            name: name.to_string(),
            loader: Arc::clone(&self.loader),
        }))
    }
}

#[test]
fn test_eager_link_may_resolve_own_name() {
    let fixture = BundleFixture::new();
    let bundle = fixture.signed("A.pkg", &acme_signer(), &[("hello/World", "recursive")]);
    let slot = LoaderSlot::default();
    let host = Arc::new(RecursiveHost {
        loader: Arc::clone(&slot),
    });
    let loader = Arc::new(
        ModuleLoader::open([bundle], acme_verifier(), host, Arc::new(NoParent)).unwrap(),
    );
    assert!(slot.set(Arc::downgrade(&loader)).is_ok());

    let (tx, rx) = mpsc::channel();
    let worker = {
        let loader = Arc::clone(&loader);
        thread::spawn(move || {
            let first = loader.resolve("hello.World", true).map(|u| u.name().to_string());
            let again = loader.resolve("hello.World", true).map(|u| u.name().to_string());
            let _ = tx.send((first.is_ok(), again.is_ok()));
        })
    };

    let outcome = rx.recv_timeout(Duration::from_secs(5));
    assert_eq!(outcome.ok(), Some((true, true)), "eager resolution did not return");
    worker.join().unwrap();
}
