use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "STOW_";

/// Application settings.
///
/// Layered, lowest priority first: built-in defaults, the user's
/// `config.toml` in the platform config directory, an explicit `--config`
/// file, then `STOW_*` environment variables (`__` separates nesting levels,
/// e.g. `STOW_TRANSFER__BATCH=500`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding the job tables.
    pub database: PathBuf,
    /// Directory for run artifacts and the log file.
    pub log_dir: PathBuf,
    pub backend: BackendConfig,
    pub transfer: TransferConfig,
    pub monitor: MonitorConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("stow.sqlite3"),
            log_dir: PathBuf::from("logs"),
            backend: BackendConfig::S3,
            transfer: TransferConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Which object store to upload into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// S3-compatible service; endpoint and credentials come from the environment.
    S3,
    /// A local directory, one sub-directory per container.
    Local { root: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Wait `delay` between every attempt.
    Fixed,
    /// Double the wait after every attempt, up to `max_delay`.
    Exponential,
}

/// How a segmented file's parts are tied together remotely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestMode {
    /// Upload a JSON manifest listing every segment with its ETag and size.
    Static,
    /// No manifest object: segments are found by their shared name prefix.
    Prefix,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Job ids claimed per lease.
    pub batch: u32,
    /// Files larger than this (bytes) are segmented.
    pub file_limit: u64,
    /// Size (bytes) of every segment but the last.
    pub segment_size: u64,
    /// Upload attempts per object before giving up on it.
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub delay_ms: u64,
    pub max_delay_ms: u64,
    /// Where segment files are staged.
    pub temp_dir: PathBuf,
    pub manifest: ManifestMode,
}
impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch: 1000,
            file_limit: 500_000_000,
            segment_size: 100_000_000,
            max_attempts: 5,
            backoff: BackoffKind::Fixed,
            delay_ms: 1000,
            max_delay_ms: 60_000,
            temp_dir: PathBuf::from("temp"),
            manifest: ManifestMode::Static,
        }
    }
}
impl TransferConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How often throughput is sampled and the status file rewritten.
    pub interval_ms: u64,
}
impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: 5000 }
    }
}
impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// `explicit` is a file named on the command line; unlike the user's
    /// default config file, it must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let user_file = ProjectDirs::from("", "", "stow").map(|dirs| dirs.config_dir().join("config.toml"));
        Self::from_sources(user_file.as_deref(), explicit)
    }

    fn from_sources(user_file: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = user_file {
            tracing::trace!(path = %path.display(), "merging user configuration (if present)");
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::FileNotFound(path.to_path_buf()));
            }
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Config = figment.extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let transfer = &self.transfer;
        let problem = if transfer.batch == 0 {
            Some("transfer.batch must be at least 1".to_string())
        } else if transfer.max_attempts == 0 {
            Some("transfer.max_attempts must be at least 1".to_string())
        } else if transfer.segment_size == 0 {
            Some("transfer.segment_size must be at least 1".to_string())
        } else if transfer.segment_size > transfer.file_limit {
            Some(format!(
                "transfer.segment_size ({}) must not exceed transfer.file_limit ({})",
                transfer.segment_size, transfer.file_limit
            ))
        } else if self.monitor.interval_ms == 0 {
            Some("monitor.interval_ms must be at least 1".to_string())
        } else if let BackendConfig::Local { root } = &self.backend
            && !root.is_absolute()
        {
            Some(format!("backend.root must be an absolute path: {}", root.display()))
        } else {
            None
        };
        match problem {
            Some(problem) => exn::bail!(ErrorKind::Invalid(problem)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::from_sources(None, None).unwrap();
            assert_eq!(config, Config::default());
            assert_eq!(config.transfer.batch, 1000);
            assert_eq!(config.transfer.delay(), Duration::from_secs(1));
            assert_eq!(config.monitor.interval(), Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "stow.toml",
                r#"
                    database = "/var/lib/stow/jobs.sqlite3"

                    [transfer]
                    batch = 250
                    backoff = "exponential"
                    manifest = "prefix"

                    [backend]
                    kind = "local"
                    root = "/mnt/scratch"
                "#,
            )?;
            jail.set_env("STOW_TRANSFER__BATCH", "50");
            jail.set_env("STOW_MONITOR__INTERVAL_MS", "100");
            let config = Config::from_sources(None, Some(Path::new("stow.toml"))).unwrap();
            assert_eq!(config.database, PathBuf::from("/var/lib/stow/jobs.sqlite3"));
            assert_eq!(config.transfer.batch, 50);
            assert_eq!(config.transfer.backoff, BackoffKind::Exponential);
            assert_eq!(config.transfer.manifest, ManifestMode::Prefix);
            assert_eq!(config.transfer.max_attempts, 5);
            assert_eq!(config.monitor.interval_ms, 100);
            assert_eq!(config.backend, BackendConfig::Local { root: PathBuf::from("/mnt/scratch") });
            Ok(())
        });
    }

    #[test]
    fn test_user_file_is_optional() {
        Jail::expect_with(|jail| {
            let missing = jail.directory().join("nope/config.toml");
            assert!(Config::from_sources(Some(&missing), None).is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file() {
        Jail::expect_with(|jail| {
            jail.create_file("stow.yaml", "transfer:\n  max_attempts: 9\n")?;
            let config = Config::from_sources(None, Some(Path::new("stow.yaml"))).unwrap();
            assert_eq!(config.transfer.max_attempts, 9);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_must_exist() {
        Jail::expect_with(|_jail| {
            let err = Config::from_sources(None, Some(Path::new("missing.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_format() {
        Jail::expect_with(|jail| {
            jail.create_file("stow.ini", "batch=1")?;
            let err = Config::from_sources(None, Some(Path::new("stow.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_garbage_value() {
        Jail::expect_with(|jail| {
            jail.set_env("STOW_TRANSFER__BATCH", "lots");
            let err = Config::from_sources(None, None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("STOW_TRANSFER__BATCH", "0")]
    #[case("STOW_TRANSFER__MAX_ATTEMPTS", "0")]
    #[case("STOW_TRANSFER__SEGMENT_SIZE", "0")]
    #[case("STOW_TRANSFER__SEGMENT_SIZE", "600000000")]
    #[case("STOW_MONITOR__INTERVAL_MS", "0")]
    fn test_validation_rejects(#[case] key: &str, #[case] value: &str) {
        Jail::expect_with(|jail| {
            jail.set_env(key, value);
            let err = Config::from_sources(None, None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)), "{key}={value}");
            Ok(())
        });
    }

    #[test]
    fn test_relative_local_root_rejected() {
        let config = Config { backend: BackendConfig::Local { root: PathBuf::from("scratch") }, ..Config::default() };
        assert!(config.validate().is_err());
    }
}
