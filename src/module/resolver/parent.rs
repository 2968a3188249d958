//! Parent resolver: delegation to the outer environment

use std::sync::Arc;

use crate::module::resolver::Resolver;
use crate::module::traits::{LoaderError, ParentEnvironment, UnitRef};

/// Forwards lookups to the loader's parent environment
pub struct ParentResolver {
    parent: Arc<dyn ParentEnvironment>,
}

impl ParentResolver {
    pub fn new(parent: Arc<dyn ParentEnvironment>) -> Self {
        Self { parent }
    }
}

impl Resolver for ParentResolver {
    fn resolve(&self, name: &str) -> Result<Option<UnitRef>, LoaderError> {
        self.parent.resolve(name)
    }

    fn kind(&self) -> &str {
        "parent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::traits::NoParent;

    #[test]
    fn test_forwards_to_parent() {
        let resolver = ParentResolver::new(Arc::new(NoParent));
        assert!(resolver.resolve("java.lang.Object").unwrap().is_none());
        assert_eq!(resolver.kind(), "parent");
        assert!(resolver.close().is_ok());
    }
}
