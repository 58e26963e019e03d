//! CLI configuration file
//!
//! ```toml
//! database = "fritest.db"
//! log_filter = "fritest_engine=debug"
//!
//! [engine]
//! rounding = "reconcile"
//! parallel_sampling = true
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use fritest_engine::EngineConfig;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "fritest.toml";

pub const DEFAULT_DATABASE: &str = "fritest.db";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub database: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub engine: EngineConfig,
}

impl CliConfig {
    /// Load an explicit config file, or `fritest.toml` if one exists, or
    /// fall back to defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&source)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if let Some(filter) = &config.log_filter {
            EnvFilter::try_new(filter).with_context(|| {
                format!("Invalid log_filter '{filter}' in config file {}", path.display())
            })?;
        }
        Ok(config)
    }

    /// Command-line value first, then the file, then the default
    pub fn database_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fritest_engine::RoundingPolicy;
    use std::io::Write;

    #[test]
    fn full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "database = \"/tmp/fri.db\"\nlog_filter = \"debug\"\n\n[engine]\nrounding = \"preserve\"\n"
        )
        .unwrap();

        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database, Some(PathBuf::from("/tmp/fri.db")));
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.engine.rounding, RoundingPolicy::Preserve);
        assert!(config.engine.parallel_sampling);
    }

    #[test]
    fn flag_overrides_file_database() {
        let config = CliConfig {
            database: Some(PathBuf::from("from-file.db")),
            ..CliConfig::default()
        };
        assert_eq!(
            config.database_path(Some(Path::new("flag.db"))),
            PathBuf::from("flag.db")
        );
        assert_eq!(config.database_path(None), PathBuf::from("from-file.db"));
        assert_eq!(
            CliConfig::default().database_path(None),
            PathBuf::from(DEFAULT_DATABASE)
        );
    }

    #[test]
    fn invalid_log_filter_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "log_filter = \"fritest_engine=loud\"\n").unwrap();

        let err = CliConfig::load(Some(file.path())).unwrap_err();
        assert!(
            err.to_string().contains("Invalid log_filter 'fritest_engine=loud'"),
            "{err:#}"
        );
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = CliConfig::load(Some(Path::new("/nonexistent/fritest.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fritest.toml"));
    }
}
