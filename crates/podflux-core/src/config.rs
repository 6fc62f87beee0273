use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use podflux_parser::{DataloggerFormat, HubFormat, IntervalSpec};
use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::feed::{render_pattern, FeedKind};

pub const DEFAULT_CONFIG_PATH: &str = "podflux.toml";
const REDACTED: &str = "**********";

/// A credential that never prints its value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub interval: IntervalSpec,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub pods: Vec<PodEntry>,
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,
    #[serde(default)]
    pub formats: FormatsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds a trigger may fire late and still run.
    pub misfire_grace_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            misfire_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub directory: PathBuf,
    pub file_prefix: String,
    pub rotation: LogRotation,
    pub max_files: usize,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from("logs"),
            file_prefix: "podflux.log".to_string(),
            rotation: LogRotation::Daily,
            max_files: 10,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Remote whose top-level directories are the PODs.
    pub remote: String,
    /// Destination for PODs that do not name their own.
    pub destination: String,
    #[serde(default)]
    pub default_feed: FeedKind,
    #[serde(default = "default_filename_patterns")]
    pub filename_patterns: Vec<String>,
}

fn default_filename_patterns() -> Vec<String> {
    vec!["*%Y%m%d*".to_string(), "*%Y-%m-%d*".to_string()]
}

/// Source Registry entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PodEntry {
    pub id: String,
    #[serde(default)]
    pub feed: FeedKind,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Sftp,
    Local,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Sftp => f.write_str("sftp"),
            Protocol::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub protocol: Protocol,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<Secret>,
    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    /// Directory the session is rooted at.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_port() -> u16 {
    22
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl RemoteConfig {
    /// Inline password first, then the named environment variable.
    pub fn resolve_password(&self, name: &str) -> Result<Secret> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        let Some(var) = &self.password_env else {
            return Err(PipelineError::Config(format!(
                "remote '{name}' has neither password nor password_env"
            )));
        };
        std::env::var(var).map(Secret::new).map_err(|_| {
            PipelineError::Config(format!(
                "remote '{name}': environment variable '{var}' is not set"
            ))
        })
    }

    /// `host:port` for sftp remotes, the root directory for local ones.
    pub fn describe(&self) -> String {
        match self.protocol {
            Protocol::Sftp => format!("{}@{}:{}", self.username, self.host, self.port),
            Protocol::Local => self.root.display().to_string(),
        }
    }
}

/// Parser configuration shared by every POD of a feed type unless the POD overrides it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormatsConfig {
    pub datalogger: DataloggerFormat,
    pub hub: HubFormat,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), pods = config.pods.len(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let minutes = self.interval.minutes;
        if minutes == 0 || 60 % minutes != 0 {
            return Err(PipelineError::Config(format!(
                "interval minutes must be a positive divisor of 60, got {minutes}"
            )));
        }

        self.remote(&self.source.remote)?;
        self.remote(&self.source.destination)?;

        if self.source.filename_patterns.is_empty() {
            return Err(PipelineError::Config(
                "source.filename_patterns must not be empty".to_string(),
            ));
        }
        let probe = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN);
        for pattern in &self.source.filename_patterns {
            let rendered = render_pattern(pattern, probe).ok_or_else(|| {
                PipelineError::Config(format!("filename pattern '{pattern}' has an invalid date token"))
            })?;
            glob::Pattern::new(&rendered).map_err(|err| {
                PipelineError::Config(format!("filename pattern '{pattern}' is not a glob: {err}"))
            })?;
        }

        let mut seen = BTreeSet::new();
        for pod in &self.pods {
            if pod.id.trim().is_empty() {
                return Err(PipelineError::Config("POD id must not be empty".to_string()));
            }
            if !seen.insert(pod.id.as_str()) {
                return Err(PipelineError::Config(format!("duplicate POD id '{}'", pod.id)));
            }
            if let Some(destination) = &pod.destination {
                self.remote(destination)?;
            }
        }

        for (name, remote) in &self.remotes {
            match remote.protocol {
                Protocol::Sftp => {
                    if remote.host.is_empty() || remote.username.is_empty() {
                        return Err(PipelineError::Config(format!(
                            "sftp remote '{name}' needs host and username"
                        )));
                    }
                    remote.resolve_password(name)?;
                }
                Protocol::Local => {
                    if remote.root.as_os_str().is_empty() {
                        return Err(PipelineError::Config(format!(
                            "local remote '{name}' needs a root directory"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn remote(&self, name: &str) -> Result<&RemoteConfig> {
        self.remotes
            .get(name)
            .ok_or_else(|| PipelineError::Config(format!("remote '{name}' is not configured")))
    }

    pub fn pod(&self, id: &str) -> Option<&PodEntry> {
        self.pods.iter().find(|pod| pod.id == id)
    }

    /// Feed type and destination remote for a POD directory found on the source.
    pub fn route(&self, pod_id: &str) -> (&FeedKind, &str) {
        match self.pod(pod_id) {
            Some(entry) => (
                &entry.feed,
                entry
                    .destination
                    .as_deref()
                    .unwrap_or(self.source.destination.as_str()),
            ),
            None => (&self.source.default_feed, self.source.destination.as_str()),
        }
    }
}
