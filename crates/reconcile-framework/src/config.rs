//! Engine configuration: per-phase deadlines and poll pacing.
//!
//! ```toml
//! poll_interval = 5
//!
//! [timeouts]
//! create = 1800
//! read = 300
//! update = 1800
//! delete = 1800
//! ```
//!
//! Durations are whole seconds. Missing keys keep their defaults; unknown keys are an error.

use crate::error::Phase;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing engine configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Deadlines for each engine phase.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(deserialize_with = "seconds")]
    pub create: Duration,
    #[serde(deserialize_with = "seconds")]
    pub read: Duration,
    #[serde(deserialize_with = "seconds")]
    pub update: Duration,
    #[serde(deserialize_with = "seconds")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    pub fn uniform(deadline: Duration) -> Self {
        Self {
            create: deadline,
            read: deadline,
            update: deadline,
            delete: deadline,
        }
    }

    /// The deadline for a phase. Import is a read.
    pub fn for_phase(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Create => self.create,
            Phase::Read | Phase::Import => self.read,
            Phase::Update => self.update,
            Phase::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub timeouts: Timeouts,
    /// Initial delay between polls of a long-running operation.
    #[serde(deserialize_with = "seconds")]
    pub poll_interval: Duration,
    /// Upper bound for the poll backoff.
    #[serde(deserialize_with = "seconds")]
    pub max_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            poll_interval: Duration::from_secs(5),
            max_poll_interval: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Tight deadlines and no poll delay, for tests and local fakes.
    pub fn immediate() -> Self {
        Self {
            timeouts: Timeouts::uniform(Duration::from_secs(10)),
            poll_interval: Duration::ZERO,
            max_poll_interval: Duration::ZERO,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

fn seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_deadlines() {
        let config = EngineConfig::default();
        assert_eq!(config.timeouts.create, Duration::from_secs(1800));
        assert_eq!(config.timeouts.for_phase(Phase::Import), Duration::from_secs(300));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config =
            EngineConfig::from_toml_str("poll_interval = 1\n[timeouts]\ndelete = 60\n").unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.timeouts.delete, Duration::from_secs(60));
        assert_eq!(config.timeouts.create, Duration::from_secs(1800));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("[timeouts]\nforever = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\nupdate = 90").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.timeouts.update, Duration::from_secs(90));

        let missing = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
