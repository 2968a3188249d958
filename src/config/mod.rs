//! Configuration management for the bundle loader
//!
//! Handles loading the bundle list, name mapping options, trust settings,
//! and logging filter from TOML.
//!
//! ```toml
//! bundles = ["plugins/acme.zip", "plugins/extra.zip"]
//!
//! [resolution]
//! unit_extension = ".unit"
//!
//! [trust]
//! trusted_subjects = ["ACME"]
//!
//! [logging]
//! filter = "bundle_loader=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::module::traits::LoaderError;

/// How logical names map to entry paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Suffix appended to every entry path (e.g. ".unit")
    #[serde(default)]
    pub unit_extension: Option<String>,

    /// Character replacing `.` in names instead of `/`
    ///
    /// Lets names that already contain `/` keep it as a literal path part.
    #[serde(default)]
    pub separator_substitute: Option<char>,
}

impl ResolutionConfig {
    /// Entry path for a logical name
    pub fn entry_path(&self, name: &str) -> String {
        let separator = self.separator_substitute.unwrap_or('/');
        let mut path: String = name
            .chars()
            .map(|c| if c == '.' { separator } else { c })
            .collect();
        if let Some(extension) = &self.unit_extension {
            path.push_str(extension);
        }
        path
    }
}

/// Trust settings for the stock subject policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Leaf certificate subjects whose signatures are trusted
    #[serde(default)]
    pub trusted_subjects: Vec<String>,

    /// Accept bundles with no signer at all
    #[serde(default = "default_false")]
    pub allow_unsigned: bool,

    /// Require each certificate chain to verify link by link
    #[serde(default = "default_false")]
    pub require_chain_links: bool,
}

fn default_false() -> bool {
    false
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    #[serde(default)]
    pub filter: Option<String>,
}

/// Loader configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Bundles in search order
    #[serde(default)]
    pub bundles: Vec<PathBuf>,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub trust: TrustConfig,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl LoaderConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, LoaderError> {
        let config: LoaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// Relative bundle paths are resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            for bundle in config.bundles.iter_mut() {
                if bundle.is_relative() {
                    *bundle = base.join(&*bundle);
                }
            }
        }
        Ok(config)
    }

    /// Serialize configuration to TOML text
    pub fn to_toml_string(&self) -> Result<String, LoaderError> {
        toml::to_string_pretty(self).map_err(|e| LoaderError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<(), LoaderError> {
        if self.resolution.separator_substitute == Some('.') {
            return Err(LoaderError::Config(
                "separator_substitute cannot be '.'".to_string(),
            ));
        }
        if let Some(ext) = &self.resolution.unit_extension {
            if ext.contains('/') {
                return Err(LoaderError::Config(format!(
                    "unit_extension {:?} cannot contain '/'",
                    ext
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = LoaderConfig::from_toml_str("").unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert!(!config.trust.allow_unsigned);
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_full_toml() {
        let config = LoaderConfig::from_toml_str(
            r#"
            bundles = ["a.zip", "/abs/b.zip"]

            [resolution]
            unit_extension = ".unit"
            separator_substitute = "$"

            [trust]
            trusted_subjects = ["ACME"]
            require_chain_links = true

            [logging]
            filter = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.bundles.len(), 2);
        assert_eq!(config.resolution.entry_path("a.B"), "a$B.unit");
        assert_eq!(config.trust.trusted_subjects, vec!["ACME".to_string()]);
        assert!(config.trust.require_chain_links);
        assert_eq!(config.logging.unwrap().filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_substitute_rejected() {
        let err = LoaderConfig::from_toml_str("[resolution]\nseparator_substitute = \".\"\n")
            .unwrap_err();
        assert!(matches!(err, LoaderError::Config(_)));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = LoaderConfig::from_toml_str("bundles = [").unwrap_err();
        assert!(matches!(err, LoaderError::Config(_)));
    }

    #[test]
    fn test_from_file_resolves_relative_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.toml");
        std::fs::write(&path, "bundles = [\"a.zip\", \"/abs/b.zip\"]\n").unwrap();

        let config = LoaderConfig::from_file(&path).unwrap();
        assert_eq!(config.bundles[0], dir.path().join("a.zip"));
        assert_eq!(config.bundles[1], PathBuf::from("/abs/b.zip"));
    }

    #[test]
    fn test_toml_roundtrip_preserves_fields() {
        let mut config = LoaderConfig::default();
        config.trust.trusted_subjects.push("ACME".to_string());
        config.resolution.unit_extension = Some(".unit".to_string());
        let text = config.to_toml_string().unwrap();
        assert_eq!(LoaderConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_entry_path_default() {
        assert_eq!(ResolutionConfig::default().entry_path("hello.World"), "hello/World");
    }
}
