//! Layered configuration for quire.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. `quire.toml`, `quire.yaml` or `quire.json` in the platform config
//!    directory,
//! 3. an explicitly named file (format picked by extension),
//! 4. `QUIRE_*` environment variables, with `__` separating nested keys
//!    (`QUIRE_LOCK__ATTEMPTS=5`).

pub mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use quire_storage::RetryPolicy;
use quire_sync::BookmarkPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};

const APPLICATION: &str = "quire";
const ENV_PREFIX: &str = "QUIRE_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the library on disk.
    pub library: PathBuf,
    /// Reading state document, relative to the library root.
    pub state_file: PathBuf,
    /// Upper bound on extracting one cover, in seconds.
    pub cover_timeout_secs: u64,
    pub lock: LockConfig,
    pub bookmark_policy: BookmarkPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: project_dirs()
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("library")),
            state_file: PathBuf::from("state.json"),
            cover_timeout_secs: 10,
            lock: LockConfig::default(),
            bookmark_policy: BookmarkPolicy::default(),
        }
    }
}

/// Retry budget for the per-path state lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            attempts: retry.attempts,
            delay_ms: u64::try_from(retry.delay.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Config {
    /// Load from every source and validate the result.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config_dir = project_dirs().map(|dirs| dirs.config_dir().to_path_buf());
        Self::from_figment(&figment(config_dir.as_deref(), file)?)
    }

    /// Extract and validate a configuration from prepared sources.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load("could not merge sources".into()))?;
        config.validate()?;
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cover_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("cover_timeout_secs must be at least 1".into()));
        }
        if self.lock.attempts == 0 {
            exn::bail!(ErrorKind::Invalid("lock.attempts must be at least 1".into()));
        }
        if self.state_file.is_absolute() || quire_storage::validate_path(&self.state_file).is_err() {
            exn::bail!(ErrorKind::Invalid(format!(
                "state_file must be a path inside the library, got {}",
                self.state_file.display()
            )));
        }
        Ok(())
    }

    pub fn cover_timeout(&self) -> Duration {
        Duration::from_secs(self.cover_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.lock.attempts,
            delay: Duration::from_millis(self.lock.delay_ms),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

/// Stack the configuration sources.
///
/// Files in `config_dir` are optional. An explicit `file` must exist and have
/// a `.toml`, `.yaml`, `.yml` or `.json` extension.
pub fn figment(config_dir: Option<&Path>, file: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(dir) = config_dir {
        figment = figment
            .merge(Toml::file(dir.join(format!("{APPLICATION}.toml"))))
            .merge(Yaml::file(dir.join(format!("{APPLICATION}.yaml"))))
            .merge(Json::file(dir.join(format!("{APPLICATION}.json"))));
    }
    if let Some(file) = file {
        if !file.is_file() {
            exn::bail!(ErrorKind::Load(format!("configuration file not found: {}", file.display())));
        }
        let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
        figment = match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(file)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
            Some("json") => figment.merge(Json::file(file)),
            _ => exn::bail!(ErrorKind::Load(format!("unsupported configuration format: {}", file.display()))),
        };
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}
