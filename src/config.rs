use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, WorkflowError};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Configuration surface for an [`crate::executor::Executor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the bounded async worker pool.
    pub max_workers: usize,
    /// Minimum level the [`crate::logger::Logger`] will record.
    pub log_level: String,
    /// Connection parameters for the external persistence backend. `None`
    /// disables persistence; all `StateStore` operations become no-ops.
    pub state_store: Option<StateStoreConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            log_level: "info".to_string(),
            state_store: None,
        }
    }
}

impl EngineConfig {
    /// Load config from a specific `dagflow.toml` file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| WorkflowError::Configuration(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `./dagflow.toml` if it exists, otherwise return defaults.
    ///
    /// A parse or validation failure is logged at warning level once and
    /// falls back to defaults rather than propagating — a misconfigured
    /// config file must never prevent the engine from starting.
    pub fn load_or_default() -> Self {
        let path = PathBuf::from("dagflow.toml");
        if path.exists() {
            match Self::load(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(%e, "failed to load dagflow.toml, falling back to defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        }
    }

    /// Validate the config and return an actionable error message.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(WorkflowError::Configuration(
                "max_workers must be > 0".into(),
            ));
        }
        if parse_log_level(&self.log_level).is_none() {
            return Err(WorkflowError::Configuration(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        if let Some(store) = &self.state_store {
            store.validate()?;
        }
        Ok(())
    }
}

fn parse_log_level(s: &str) -> Option<crate::logger::LogLevel> {
    crate::logger::LogLevel::parse(s)
}

// ---------------------------------------------------------------------------
// StateStore connection parameters
// ---------------------------------------------------------------------------

/// Connection parameters for an external key/list store backing
/// [`crate::store::StateStore`]. The core never dials this itself — it is
/// handed to whatever concrete `StateStore` implementation the caller wires
/// in; this struct exists so that configuration round-trips through TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateStoreConfig {
    pub host: String,
    pub port: u16,
    pub credential: Option<String>,
    pub database_index: u32,
    pub timeout_ms: u64,
    pub key_prefix: String,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            credential: None,
            database_index: 0,
            timeout_ms: 5_000,
            key_prefix: "workflow".to_string(),
        }
    }
}

impl StateStoreConfig {
    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(WorkflowError::Configuration(
                "state_store.host must not be empty".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(WorkflowError::Configuration(
                "state_store.timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.state_store.is_none());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.max_workers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_log_level_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_from_toml() {
        let toml_src = r#"
            max_workers = 8
            log_level = "debug"

            [state_store]
            host = "cache.internal"
            port = 6380
        "#;
        let cfg: EngineConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.max_workers, 8);
        assert_eq!(cfg.log_level, "debug");
        let store = cfg.state_store.unwrap();
        assert_eq!(store.host, "cache.internal");
        assert_eq!(store.port, 6380);
        // Fields absent from the TOML fall back to StateStoreConfig::default().
        assert_eq!(store.database_index, 0);
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dagflow.toml");
        std::fs::write(&path, "max_workers = 2\nlog_level = \"warning\"\n").unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.max_workers, 2);
        assert_eq!(cfg.log_level, "warning");
    }

    #[test]
    fn load_invalid_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dagflow.toml");
        std::fs::write(&path, "max_workers = \"not a number\"\n").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
