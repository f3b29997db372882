//! Reconciliation settings.
//!
//! ```toml
//! dry-run = false
//! excluded-tables = ["suite_mapping"]
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ReconcileConfig {
    /// Render and report statements without executing them.
    pub dry_run: bool,
    /// Catalog tables never rewritten, even when present.
    pub excluded_tables: BTreeSet<String>,
}

impl ReconcileConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let config = ReconcileConfig::from_toml_str("").expect("parses");
        assert_eq!(config, ReconcileConfig::default());
        assert!(!config.dry_run);
    }

    #[test]
    fn parses_kebab_case_keys() {
        let config = ReconcileConfig::from_toml_str(
            "dry-run = true\nexcluded-tables = [\"link\", \"code\"]\n",
        )
        .expect("parses");
        assert!(config.dry_run);
        assert_eq!(
            config.excluded_tables.iter().collect::<Vec<_>>(),
            vec!["code", "link"]
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ReconcileConfig::from_toml_str("parallel = true").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ReconcileConfig::load("/nonexistent/schema-changer.toml").expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/schema-changer.toml"));
    }
}
