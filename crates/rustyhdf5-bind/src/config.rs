//! Binding configuration.
//!
//! ```toml
//! default_string_width = 64
//! verify_existing = true
//! create_intermediate_groups = false
//! missing_on_readonly = "skip"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to do with a missing, non-readonly field when the target group
/// cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Leave the field unbound.
    #[default]
    Skip,
    /// Fail the whole binding with `InvalidState`.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Width in bytes of string arrays and attributes created without an
    /// explicit width.
    pub default_string_width: usize,
    /// Reject existing nodes whose element type or rank disagree with the
    /// declared field.
    pub verify_existing: bool,
    /// Create missing parents of multi-segment field locations.
    pub create_intermediate_groups: bool,
    pub missing_on_readonly: MissingPolicy,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            default_string_width: 256,
            verify_existing: true,
            create_intermediate_groups: false,
            missing_on_readonly: MissingPolicy::Skip,
        }
    }
}

impl BindConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: BindConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        // A string element needs room for at least the terminator.
        if self.default_string_width < 1 {
            return Err(Error::Config("default_string_width must be at least 1".into()));
        }
        Ok(())
    }
}
