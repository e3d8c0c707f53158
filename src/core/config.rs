//! Configuration loading and resolution.
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. Environment variables
//! 2. Config file (TOML)
//! 3. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `SOCIALPULSE_CREDENTIAL_TTL_SECS`: credential cache TTL in seconds
//! - `SOCIALPULSE_TIMEOUT_SECS`: per-group fetch timeout override
//! - `SOCIALPULSE_CACHE_DB`: path to the cache database
//! - `SOCIALPULSE_CONFIG`: override config file path

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::credentials::DEFAULT_CREDENTIAL_TTL;
use crate::error::{PulseError, Result};
use crate::storage::paths::AppPaths;

/// Environment variable for credential cache TTL in seconds.
pub const ENV_CREDENTIAL_TTL: &str = "SOCIALPULSE_CREDENTIAL_TTL_SECS";
/// Environment variable for per-group timeout in seconds.
pub const ENV_TIMEOUT: &str = "SOCIALPULSE_TIMEOUT_SECS";
/// Environment variable for the cache database path.
pub const ENV_CACHE_DB: &str = "SOCIALPULSE_CACHE_DB";
/// Environment variable to override the config file path.
pub const ENV_CONFIG: &str = "SOCIALPULSE_CONFIG";

// =============================================================================
// Config File
// =============================================================================

/// On-disk configuration file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigFile {
    pub credential_ttl_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub cache_db: Option<PathBuf>,
}

impl ConfigFile {
    /// Load from a TOML file. A missing file is an empty config.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            PulseError::Config(format!("parse {}: {e}", path.display()))
        })
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration for the aggregation layer.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Credential cache TTL.
    pub credential_ttl: Duration,
    /// Per-group fetch timeout override; `None` means each platform's
    /// default.
    pub timeout: Option<Duration>,
    /// Path to the cache database.
    pub cache_db_path: PathBuf,
}

impl AggregatorConfig {
    /// Resolve configuration from environment variables, the config file,
    /// and built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is invalid or a resolved value
    /// fails validation.
    pub fn resolve() -> Result<Self> {
        let config_path = env_var(ENV_CONFIG)
            .map_or_else(|| AppPaths::new().config_file(), PathBuf::from);
        let file = ConfigFile::load(&config_path)?;
        Self::resolve_with_file(&file)
    }

    /// Resolve from an already-loaded config file (used by tests).
    ///
    /// # Errors
    ///
    /// Returns an error if a resolved value fails validation.
    pub fn resolve_with_file(file: &ConfigFile) -> Result<Self> {
        let credential_ttl_secs = env_parsed::<u64>(ENV_CREDENTIAL_TTL)?
            .or(file.credential_ttl_secs)
            .unwrap_or(DEFAULT_CREDENTIAL_TTL.as_secs());

        let timeout_secs = env_parsed::<u64>(ENV_TIMEOUT)?.or(file.timeout_secs);

        let cache_db_path = env_var(ENV_CACHE_DB)
            .map(PathBuf::from)
            .or_else(|| file.cache_db.clone())
            .unwrap_or_else(|| AppPaths::new().cache_db_file());

        let config = Self {
            credential_ttl: Duration::from_secs(credential_ttl_secs),
            timeout: timeout_secs.map(Duration::from_secs),
            cache_db_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate resolved values.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero TTL or an out-of-range timeout.
    pub fn validate(&self) -> Result<()> {
        if self.credential_ttl.is_zero() {
            return Err(PulseError::Config(
                "credential TTL must be greater than 0".to_string(),
            ));
        }
        if let Some(timeout) = self.timeout
            && !(1..=120).contains(&timeout.as_secs())
        {
            return Err(PulseError::Config(format!(
                "timeout must be between 1 and 120 seconds, got {}",
                timeout.as_secs()
            )));
        }
        Ok(())
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            timeout: None,
            cache_db_path: AppPaths::new().cache_db_file(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    env_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| PulseError::Config(format!("invalid value for {name}: '{raw}'")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[allow(unsafe_code)]
    fn with_env_var(key: &str, value: &str, f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap();
        let prior = std::env::var(key).ok();
        unsafe {
            std::env::set_var(key, value);
        }
        f();
        match prior {
            Some(val) => unsafe {
                std::env::set_var(key, val);
            },
            None => unsafe {
                std::env::remove_var(key);
            },
        }
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = AggregatorConfig::resolve_with_file(&ConfigFile::default()).expect("resolve");
        assert_eq!(config.credential_ttl, DEFAULT_CREDENTIAL_TTL);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn file_values_apply() {
        let _guard = ENV_LOCK.lock().unwrap();
        let file = ConfigFile {
            credential_ttl_secs: Some(120),
            timeout_secs: Some(20),
            cache_db: Some(PathBuf::from("/tmp/metrics.sqlite")),
        };
        let config = AggregatorConfig::resolve_with_file(&file).expect("resolve");

        assert_eq!(config.credential_ttl, Duration::from_secs(120));
        assert_eq!(config.timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.cache_db_path, PathBuf::from("/tmp/metrics.sqlite"));
    }

    #[test]
    fn env_overrides_file() {
        with_env_var(ENV_CREDENTIAL_TTL, "60", || {
            let file = ConfigFile {
                credential_ttl_secs: Some(120),
                ..Default::default()
            };
            let config = AggregatorConfig::resolve_with_file(&file).expect("resolve");
            assert_eq!(config.credential_ttl, Duration::from_secs(60));
        });
    }

    #[test]
    fn invalid_env_value_is_an_error() {
        with_env_var(ENV_TIMEOUT, "soon", || {
            let result = AggregatorConfig::resolve_with_file(&ConfigFile::default());
            assert!(result.is_err());
        });
    }

    #[test]
    fn zero_ttl_fails_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        let file = ConfigFile {
            credential_ttl_secs: Some(0),
            ..Default::default()
        };
        assert!(AggregatorConfig::resolve_with_file(&file).is_err());
    }

    #[test]
    fn out_of_range_timeout_fails_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        let file = ConfigFile {
            timeout_secs: Some(600),
            ..Default::default()
        };
        assert!(AggregatorConfig::resolve_with_file(&file).is_err());
    }

    #[test]
    fn config_file_parses_toml() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "credentialTtlSecs = 90\ntimeoutSecs = 12\n").expect("write");

        let file = ConfigFile::load(&path).expect("load");
        assert_eq!(file.credential_ttl_secs, Some(90));
        assert_eq!(file.timeout_secs, Some(12));
    }

    #[test]
    fn missing_config_file_is_empty() {
        let file = ConfigFile::load(Path::new("/nonexistent/config.toml")).expect("load");
        assert!(file.credential_ttl_secs.is_none());
    }
}
