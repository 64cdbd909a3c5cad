// ⚙️ Configuration - optional TOML file, every field has a default
//
// [export]      group_thousands, title_header, no_data
// [columns]     years = [2023, 2024]   (empty = periods present in the ledger)
// [ingest]      key_strategy = "title" | "slug" | "item_key"
// [audit]       database = "selections.db", actor
// [extraction]  endpoint, token_env
// [server]      bind

use crate::error::{ReconError, Result};
use crate::export::ExportOptions;
use crate::period::Period;
use crate::wire::KeyStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub export: ExportOptions,
    pub columns: ColumnsConfig,
    pub ingest: IngestConfig,
    pub audit: AuditConfig,
    pub extraction: ExtractionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    pub years: Vec<i32>,
}

impl ColumnsConfig {
    /// Fixed columns from the configured years, or None to follow the ledger
    pub fn periods(&self) -> Option<Vec<Period>> {
        if self.years.is_empty() {
            None
        } else {
            Some(Period::months_of_years(&self.years))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub key_strategy: KeyStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// SQLite file for selection events; None disables the audit log
    pub database: Option<PathBuf>,

    /// Recorded as the actor of every logged selection
    pub actor: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            database: None,
            actor: "user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub endpoint: Option<String>,

    /// Environment variable holding the bearer token
    pub token_env: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            endpoint: None,
            token_env: "EXTRACTION_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl ReconConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ReconError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Load when a path is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconConfig::default();
        assert!(config.export.group_thousands);
        assert_eq!(config.export.title_header, "Metric");
        assert_eq!(config.columns.periods(), None);
        assert_eq!(config.ingest.key_strategy, KeyStrategy::Title);
        assert_eq!(config.audit.database, None);
        assert_eq!(config.audit.actor, "user");
        assert_eq!(config.extraction.token_env, "EXTRACTION_TOKEN");
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_partial_file() {
        let config = ReconConfig::from_toml(
            r#"
            [export]
            group_thousands = false

            [columns]
            years = [2024, 2023]

            [ingest]
            key_strategy = "slug"

            [audit]
            database = "selections.db"
            actor = "analyst"
            "#,
        )
        .unwrap();

        assert!(!config.export.group_thousands);
        assert_eq!(config.export.title_header, "Metric");
        assert_eq!(config.columns.periods().unwrap().len(), 24);
        assert_eq!(config.ingest.key_strategy, KeyStrategy::Slug);
        assert_eq!(config.audit.database, Some(PathBuf::from("selections.db")));
        assert_eq!(config.audit.actor, "analyst");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let err = ReconConfig::from_toml("[export]\ngroup_thousands = \"maybe\"").unwrap_err();
        assert!(matches!(err, ReconError::Config(_)));
    }
}
