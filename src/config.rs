//! Runtime settings.
//!
//! Settings are plain values handed to the loaders and validation entry
//! points. There is no process-wide state, so tests can build whatever
//! combination they need per case.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How validation treats records that break the table rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Run validation at all. `false` skips every check.
    pub enabled: bool,
    /// Log a warning for every dropped or flagged row.
    pub verbose: bool,
    /// Drop invalid rows instead of failing.
    pub drop_invalid: bool,
    /// When not dropping, add a boolean `is_valid` column instead of failing.
    pub flag_invalid: bool,
    /// Prune header and data to their common ids when loading a collection
    /// instead of failing on misalignment.
    pub auto_align: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            verbose: true,
            drop_invalid: true,
            flag_invalid: false,
            auto_align: true,
        }
    }
}

impl ValidationSettings {
    /// Validation switched off entirely.
    pub fn skip() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Fail on the first invalid row and never auto-align.
    pub fn strict() -> Self {
        Self {
            enabled: true,
            verbose: true,
            drop_invalid: false,
            flag_invalid: false,
            auto_align: false,
        }
    }
}

/// Top-level settings, loadable from a JSON file.
///
/// ```json
/// { "validation": { "drop_invalid": false, "auto_align": false }, "text_columns": ["lith"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub validation: ValidationSettings,
    /// Columns read as text whatever their cells look like. Id columns are
    /// always text.
    pub text_columns: Vec<String>,
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&text)?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }
}
