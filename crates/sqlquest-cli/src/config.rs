use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlquest_core::UniformCatalog;
use sqlquest_engine::EngineConfig;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "sqlquest.toml";
pub const IN_MEMORY_DATABASE: &str = ":memory:";
pub const LOG_LEVEL_ENV: &str = "SQLQUEST_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// SQLite file path, or `:memory:` for a throwaway in-process store.
    pub database: String,
    pub log_level: Option<String>,
    pub catalog: UniformCatalog,
    pub engine: EngineConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: "sqlquest.db".to_string(),
            log_level: None,
            catalog: UniformCatalog::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl CliConfig {
    pub fn uses_memory_store(&self) -> bool {
        self.database == IN_MEMORY_DATABASE
    }
}

/// Loads the config file. A missing default file means defaults; a missing file the user
/// named explicitly is an error.
pub fn load_config(path: &Path, explicit: bool) -> Result<CliConfig> {
    if !path.exists() && !explicit {
        return Ok(CliConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path.display()))
}

/// `--debug` wins, then the environment, then the config file, then `info`.
pub fn resolve_log_level(debug: bool, env_level: Option<String>, config: &CliConfig) -> String {
    if debug {
        return "debug".to_string();
    }
    env_level
        .filter(|level| !level.trim().is_empty())
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
database = ":memory:"

[catalog]
levels = 4

[engine]
rng_seed = 42
"#,
        )
        .expect("parse");
        assert!(config.uses_memory_store());
        assert_eq!(config.catalog.levels, 4);
        assert_eq!(config.catalog.questions_per_level, 10);
        assert_eq!(config.engine.rng_seed, Some(42));
        assert_eq!(config.engine.review_max_interval_days, 30);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn missing_default_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        assert_eq!(
            load_config(&path, false).expect("defaults"),
            CliConfig::default()
        );
        assert!(load_config(&path, true).is_err());
    }

    #[test]
    fn file_on_disk_is_parsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom.toml");
        fs::write(&path, "log_level = \"warn\"\ndatabase = \"progress.db\"\n").expect("write");
        let config = load_config(&path, true).expect("load");
        assert_eq!(config.database, "progress.db");
        assert_eq!(config.log_level.as_deref(), Some("warn"));

        fs::write(&path, "database = [").expect("write");
        assert!(load_config(&path, true).is_err());
    }

    #[test]
    fn log_level_precedence() {
        let mut config = CliConfig::default();
        assert_eq!(resolve_log_level(false, None, &config), "info");
        config.log_level = Some("warn".to_string());
        assert_eq!(resolve_log_level(false, None, &config), "warn");
        assert_eq!(
            resolve_log_level(false, Some("trace".to_string()), &config),
            "trace"
        );
        assert_eq!(
            resolve_log_level(false, Some(" ".to_string()), &config),
            "warn"
        );
        assert_eq!(
            resolve_log_level(true, Some("trace".to_string()), &config),
            "debug"
        );
    }
}
