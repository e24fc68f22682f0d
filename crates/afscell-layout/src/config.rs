use crate::layout::{Binary, BinaryPath, DeploymentLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unknown binary '{0}' in [binaries]")]
    UnknownBinary(String),
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Optional `afscell.toml`: path overrides and tunables.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub binaries: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub files: FileOverrides,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub run: RunSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileOverrides {
    #[serde(default)]
    pub keytab: Option<PathBuf>,
    #[serde(default)]
    pub cellservdb_server: Option<PathBuf>,
    #[serde(default)]
    pub cellservdb_client: Option<PathBuf>,
    #[serde(default)]
    pub cacheinfo: Option<PathBuf>,
    #[serde(default)]
    pub krb5_conf: Option<PathBuf>,
    #[serde(default)]
    pub kadm5_acl: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    #[serde(default = "default_stop_attempts")]
    pub stop_attempts: u32,
    #[serde(default = "default_stop_interval_ms")]
    pub stop_interval_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            stop_attempts: default_stop_attempts(),
            stop_interval_ms: default_stop_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_size_kb")]
    pub size_kb: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            size_kb: default_cache_size_kb(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            lock_file: default_lock_file(),
        }
    }
}

fn default_session_timeout() -> u64 {
    120
}

fn default_stop_attempts() -> u32 {
    5
}

fn default_stop_interval_ms() -> u64 {
    100
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/openafs")
}

fn default_cache_size_kb() -> u64 {
    50_000
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/var/lock/afscell.lock")
}

impl ProvisionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(unknown) = self.binaries.keys().find(|k| Binary::from_key(k).is_none()) {
            return Err(ConfigError::UnknownBinary(unknown.clone()));
        }
        if self.session.timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("session.timeout_secs"));
        }
        if self.supervisor.stop_attempts == 0 {
            return Err(ConfigError::ZeroValue("supervisor.stop_attempts"));
        }
        if self.supervisor.stop_interval_ms == 0 {
            return Err(ConfigError::ZeroValue("supervisor.stop_interval_ms"));
        }
        if self.cache.size_kb == 0 {
            return Err(ConfigError::ZeroValue("cache.size_kb"));
        }
        Ok(())
    }

    #[inline]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session.timeout_secs)
    }

    #[inline]
    pub fn stop_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor.stop_interval_ms)
    }

    /// Replace the variant defaults with every override in this config.
    pub fn apply_to(&self, mut layout: DeploymentLayout) -> Result<DeploymentLayout, ConfigError> {
        for (key, path) in &self.binaries {
            let binary =
                Binary::from_key(key).ok_or_else(|| ConfigError::UnknownBinary(key.clone()))?;
            layout.binaries.set(binary, BinaryPath::new(path));
        }

        let files = &self.files;
        let targets = [
            (&files.keytab, &mut layout.files.keytab),
            (&files.cellservdb_server, &mut layout.files.cellservdb_server),
            (&files.cellservdb_client, &mut layout.files.cellservdb_client),
            (&files.cacheinfo, &mut layout.files.cacheinfo),
            (&files.krb5_conf, &mut layout.files.krb5_conf),
            (&files.kadm5_acl, &mut layout.files.kadm5_acl),
        ];
        for (src, dst) in targets {
            if let Some(path) = src {
                dst.clone_from(path);
            }
        }
        Ok(layout)
    }
}

pub fn parse_config_str(input: &str) -> Result<ProvisionConfig, ConfigError> {
    let config: ProvisionConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<ProvisionConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
