//! Runtime configuration (`strata.toml`)
//!
//! ```toml
//! reserved_prefixes = ["strata.", "host."]
//! verify_checksums = true
//!
//! [native]
//! search_paths = ["/opt/app/lib"]
//! library_prefix = "lib"
//! library_suffix = ".so"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantically invalid value
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Process-wide runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Name prefixes only a root loader may define
    #[serde(default = "default_reserved_prefixes")]
    pub reserved_prefixes: Vec<String>,

    /// Verify type image checksums before defining
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Native library lookup
    #[serde(default)]
    pub native: NativeConfig,
}

/// Native library lookup settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NativeConfig {
    /// Directories searched by short library name, in order
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Prefix of a platform library file name
    #[serde(default = "default_library_prefix")]
    pub library_prefix: String,

    /// Suffix of a platform library file name
    #[serde(default = "default_library_suffix")]
    pub library_suffix: String,
}

fn default_reserved_prefixes() -> Vec<String> {
    vec!["strata.".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_library_prefix() -> String {
    if cfg!(windows) { "" } else { "lib" }.to_string()
}

fn default_library_suffix() -> String {
    if cfg!(target_os = "macos") {
        ".dylib"
    } else if cfg!(windows) {
        ".dll"
    } else {
        ".so"
    }
    .to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reserved_prefixes: default_reserved_prefixes(),
            verify_checksums: true,
            native: NativeConfig::default(),
        }
    }
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            library_prefix: default_library_prefix(),
            library_suffix: default_library_suffix(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for prefix in &self.reserved_prefixes {
            if prefix.is_empty() {
                return Err(ConfigError::Validation(
                    "Reserved prefix cannot be empty".to_string(),
                ));
            }
        }
        if self.native.library_suffix.contains('/') || self.native.library_prefix.contains('/') {
            return Err(ConfigError::Validation(
                "Library prefix and suffix cannot contain path separators".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `name` falls under a reserved prefix
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

impl NativeConfig {
    /// Platform file name for a short library name
    pub fn map_library_name(&self, name: &str) -> String {
        format!("{}{}{}", self.library_prefix, name, self.library_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.verify_checksums);
        assert!(config.is_reserved("strata.lang.Object"));
        assert!(!config.is_reserved("app.Main"));
        assert!(config.native.search_paths.is_empty());
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
reserved_prefixes = ["core.", "host."]
verify_checksums = false

[native]
search_paths = ["/opt/lib", "vendor"]
library_prefix = ""
library_suffix = ".plugin"
"#;
        let config = RuntimeConfig::from_toml_str(toml).unwrap();
        assert!(!config.verify_checksums);
        assert!(config.is_reserved("host.Bridge"));
        assert!(!config.is_reserved("strata.Core"));
        assert_eq!(config.native.search_paths.len(), 2);
        assert_eq!(config.native.map_library_name("gfx"), "gfx.plugin");
    }

    #[test]
    fn test_rejects_unknown_and_invalid() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("verbose = true"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_toml_str(r#"reserved_prefixes = [""]"#),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(&path, "verify_checksums = false\n").unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        assert!(!config.verify_checksums);

        assert!(matches!(
            RuntimeConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
