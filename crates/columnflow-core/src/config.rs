//! Configuration schema (columnflow.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQL dialect configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// PostgreSQL SQL dialect
    Postgres,

    /// Generic ANSI SQL
    #[serde(alias = "ansi")]
    Generic,

    /// BigQuery SQL dialect
    BigQuery,

    /// Snowflake SQL dialect
    Snowflake,

    /// MySQL SQL dialect
    MySql,

    /// Hive SQL dialect
    Hive,

    /// DuckDB SQL dialect
    DuckDb,

    /// Redshift SQL dialect
    Redshift,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self::Postgres
    }
}

impl DialectConfig {
    /// Stable lowercase name, matching the TOML spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Generic => "generic",
            Self::BigQuery => "bigquery",
            Self::Snowflake => "snowflake",
            Self::MySql => "mysql",
            Self::Hive => "hive",
            Self::DuckDb => "duckdb",
            Self::Redshift => "redshift",
        }
    }
}

impl std::fmt::Display for DialectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_fallback_dialects() -> Vec<DialectConfig> {
    vec![
        DialectConfig::Generic,
        DialectConfig::BigQuery,
        DialectConfig::Snowflake,
        DialectConfig::MySql,
        DialectConfig::Hive,
    ]
}

fn default_true() -> bool {
    true
}

/// Controls how the batch report is assembled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Re-key a statement under `schema.name` when another statement reads it that way
    #[serde(default = "default_true")]
    pub guess_schema_names: bool,

    /// Emit leaf records for base tables that no statement defines
    #[serde(default = "default_true")]
    pub synthesize_base_tables: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            guess_schema_names: true,
            synthesize_base_tables: true,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Dialect tried first for every statement
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Dialects tried, in order, when the primary dialect fails to parse
    #[serde(default = "default_fallback_dialects")]
    pub fallback_dialects: Vec<DialectConfig>,

    /// Wall-clock budget for one statement, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_budget_ms: Option<u64>,

    /// Optional JSON catalog file (relation name -> column names)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,

    /// Report assembly options
    #[serde(default)]
    pub output: OutputConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectConfig::default(),
            fallback_dialects: default_fallback_dialects(),
            statement_budget_ms: None,
            catalog: None,
            output: OutputConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Primary dialect followed by the fallbacks, without repeats
    pub fn dialect_order(&self) -> Vec<DialectConfig> {
        let mut order = vec![self.dialect];
        for dialect in &self.fallback_dialects {
            if !order.contains(dialect) {
                order.push(*dialect);
            }
        }
        order
    }

    /// Per-statement budget, if one is configured
    pub fn statement_budget(&self) -> Option<Duration> {
        self.statement_budget_ms.map(Duration::from_millis)
    }

    /// Catalog path resolved against the project root
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.project_root.join(path)
            }
        })
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.dialect, DialectConfig::Postgres);
        assert!(config.output.synthesize_base_tables);
        assert_eq!(config.statement_budget(), None);
    }

    #[test]
    fn dialect_order_skips_repeats() {
        let config = Config {
            dialect: DialectConfig::BigQuery,
            ..Config::default()
        };

        assert_eq!(
            config.dialect_order(),
            vec![
                DialectConfig::BigQuery,
                DialectConfig::Generic,
                DialectConfig::Snowflake,
                DialectConfig::MySql,
                DialectConfig::Hive,
            ]
        );
    }

    #[test]
    fn parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            dialect = "snowflake"
            fallback_dialects = ["ansi", "duckdb"]
            statement_budget_ms = 250

            [output]
            guess_schema_names = false
            "#,
        )
        .unwrap();

        assert_eq!(config.dialect, DialectConfig::Snowflake);
        assert_eq!(config.fallback_dialects, vec![DialectConfig::Generic, DialectConfig::DuckDb]);
        assert_eq!(config.statement_budget(), Some(Duration::from_millis(250)));
        assert!(!config.output.guess_schema_names);
        assert!(config.output.synthesize_base_tables);
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        let err = Config::from_toml("dialect = \"oracle\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.dialect, parsed.dialect);
        assert_eq!(config.fallback_dialects, parsed.fallback_dialects);
    }

    #[test]
    fn relative_catalog_path_uses_project_root() {
        let config = Config {
            catalog: Some(PathBuf::from("catalog.json")),
            project_root: PathBuf::from("/srv/warehouse"),
            ..Config::default()
        };

        assert_eq!(config.catalog_path(), Some(PathBuf::from("/srv/warehouse/catalog.json")));
    }
}
