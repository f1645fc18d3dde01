//! Tracer configuration.
//!
//! Configuration is read from TOML, every field is optional:
//!
//! ```toml
//! specialize_symnodes = true
//! materialize_sys_modules = false
//! ```
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file '{file}': {source}")]
    ParseError {
        source: toml::de::Error,
        file: String,
    },
}

/// Policies of the container subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracerConfig {
    /// Specialize symbolic integers to their hint when they are used as keys
    /// (guarded). When disabled such keys are rejected as unhashable.
    pub specialize_symnodes: bool,

    /// Allow operations of the module-table adapter that have no per-key
    /// semantics to materialize the whole registry.
    pub materialize_sys_modules: bool,

    /// Accept user-defined routines as default factories.
    pub allow_user_default_factory: bool,

    /// Refuse plain-data records whose only populated field is not tensor-like.
    pub record_single_field_check: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            specialize_symnodes: true,
            materialize_sys_modules: true,
            allow_user_default_factory: true,
            record_single_field_check: true,
        }
    }
}

impl TracerConfig {
    /// Parse a configuration from a TOML document.
    ///
    /// ```rust
    /// # use hytrace::config::TracerConfig;
    /// let config = TracerConfig::from_toml_str("materialize_sys_modules = false").unwrap();
    /// assert!(!config.materialize_sys_modules);
    /// assert!(config.specialize_symnodes);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::parse(source, "<inline>")
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source, &path.display().to_string())
    }

    fn parse(source: &str, file: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::ParseError {
            source,
            file: file.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = TracerConfig::from_toml_str("").unwrap();
        assert_eq!(config, TracerConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TracerConfig::from_toml_str("include_none = true").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("<inline>"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = TracerConfig::load("/nonexistent/hytrace.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
