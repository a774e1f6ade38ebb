//! Engine configuration.
//!
//! Configuration is TOML. A default file is embedded in the binary and used
//! when no override is given; override files may omit any section.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backup::RetentionClass;

const EMBEDDED_ENGINE_CONFIG: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/engine.toml"));

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub rollback: RollbackConfig,
    pub timeouts: TimeoutConfig,
    pub pool: PoolConfig,
    pub backup: BackupConfig,
    pub post_validate: PostValidateConfig,
    pub drift: DriftConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries per adapter call, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    pub max_attempts: u32,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Device operations with their own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Fetch,
    Stage,
    Validate,
    Commit,
    PostValidate,
    Ha,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub fetch: f64,
    pub stage: f64,
    pub validate: f64,
    pub commit: f64,
    pub post_validate: f64,
    pub ha: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch: 30.0,
            stage: 60.0,
            validate: 60.0,
            commit: 120.0,
            post_validate: 180.0,
            ha: 600.0,
        }
    }
}

impl TimeoutConfig {
    /// Negative and NaN values mean no time at all; values past what a
    /// `Duration` holds mean no limit.
    pub fn for_transition(&self, transition: Transition) -> Duration {
        let secs = self.seconds(transition);
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    fn seconds(&self, transition: Transition) -> f64 {
        match transition {
            Transition::Fetch => self.fetch,
            Transition::Stage => self.stage,
            Transition::Validate => self.validate,
            Transition::Commit => self.commit,
            Transition::PostValidate => self.post_validate,
            Transition::Ha => self.ha,
        }
    }

    fn validate(&self) -> Result<(), String> {
        let named = [
            ("fetch", Transition::Fetch),
            ("stage", Transition::Stage),
            ("validate", Transition::Validate),
            ("commit", Transition::Commit),
            ("post_validate", Transition::PostValidate),
            ("ha", Transition::Ha),
        ];
        for (name, transition) in named {
            let secs = self.seconds(transition);
            if secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                return Err(format!(
                    "timeouts.{name} must be a finite, non-negative number of seconds, got {secs}"
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_in_flight: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_in_flight: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub required_before_deploy: bool,
    pub gate_class: RetentionClass,
    pub daily_days: i64,
    pub weekly_days: i64,
    pub monthly_days: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            required_before_deploy: true,
            gate_class: RetentionClass::Daily,
            daily_days: 7,
            weekly_days: 35,
            monthly_days: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostValidateConfig {
    pub checks: Vec<String>,
}

impl Default for PostValidateConfig {
    fn default() -> Self {
        Self {
            checks: vec!["control_plane".to_string(), "ha_state".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Diff ignore patterns (`kind` or `kind:name`) for volatile objects.
    pub ignore: Vec<String>,
}

/// Longest retention accepted for any class.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

impl BackupConfig {
    fn validate(&self) -> Result<(), String> {
        for (name, days) in [
            ("daily_days", self.daily_days),
            ("weekly_days", self.weekly_days),
            ("monthly_days", self.monthly_days),
        ] {
            if !(0..=MAX_RETENTION_DAYS).contains(&days) {
                return Err(format!(
                    "backup.{name} must be between 0 and {MAX_RETENTION_DAYS}, got {days}"
                ));
            }
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Reject values that cannot be turned into durations or retention windows.
    pub fn validate(&self) -> Result<(), String> {
        self.timeouts.validate()?;
        self.backup.validate()?;
        let multiplier = self.retry.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(format!(
                "retry.multiplier must be a finite number of at least 1, got {multiplier}"
            ));
        }
        Ok(())
    }
}

/// Load the engine configuration, falling back to the embedded default.
pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, ConfigLoadError> {
    load_engine_config_with_source(path).map(|(config, _)| config)
}

/// Like [`load_engine_config`], also reporting `"embedded"` or `"file:<path>"`.
pub fn load_engine_config_with_source(
    path: Option<&Path>,
) -> Result<(EngineConfig, String), ConfigLoadError> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let config = parse_engine_config(&raw).map_err(|source| ConfigLoadError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            config
                .validate()
                .map_err(|message| ConfigLoadError::Invalid {
                    path: path.display().to_string(),
                    message,
                })?;
            Ok((config, format!("file:{}", path.display())))
        }
        None => {
            let config =
                parse_engine_config(EMBEDDED_ENGINE_CONFIG).map_err(|source| {
                    ConfigLoadError::Parse {
                        path: "embedded".to_string(),
                        source,
                    }
                })?;
            Ok((config, "embedded".to_string()))
        }
    }
}

fn parse_engine_config(raw: &str) -> Result<EngineConfig, toml::de::Error> {
    toml::from_str::<EngineConfig>(raw)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{load_engine_config_with_source, ConfigLoadError, EngineConfig, Transition};
    use crate::backup::RetentionClass;

    #[test]
    fn embedded_config_matches_defaults() {
        let (config, source) = load_engine_config_with_source(None).expect("embedded");
        assert_eq!(source, "embedded");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn override_file_may_omit_sections() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        fs::write(
            &path,
            r#"
[pool]
max_in_flight = 1

[timeouts]
stage = 0.5

[backup]
gate_class = "weekly"
"#,
        )
        .expect("write config");

        let (config, source) = load_engine_config_with_source(Some(&path)).expect("override");
        assert!(source.starts_with("file:"));
        assert_eq!(config.pool.max_in_flight, 1);
        assert_eq!(
            config.timeouts.for_transition(Transition::Stage),
            Duration::from_millis(500)
        );
        assert_eq!(config.timeouts.commit, 120.0);
        assert_eq!(config.backup.gate_class, RetentionClass::Weekly);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        fs::write(&path, "[pool]\nmax_in_flight = \"many\"\n").expect("write config");
        let err = load_engine_config_with_source(Some(&path)).expect_err("bad type");
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn unusable_timeouts_and_retention_are_rejected_at_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("engine.toml");
        for (body, field) in [
            ("[timeouts]\nstage = inf\n", "timeouts.stage"),
            ("[timeouts]\nha = 1e300\n", "timeouts.ha"),
            ("[timeouts]\ncommit = -1.0\n", "timeouts.commit"),
            ("[backup]\ndaily_days = 9223372036854775807\n", "backup.daily_days"),
            ("[retry]\nmultiplier = nan\n", "retry.multiplier"),
        ] {
            fs::write(&path, body).expect("write config");
            let err = load_engine_config_with_source(Some(&path)).expect_err(body);
            assert!(
                matches!(err, ConfigLoadError::Invalid { ref message, .. } if message.contains(field)),
                "{body}: {err}"
            );
        }
    }

    #[test]
    fn out_of_range_timeouts_never_panic() {
        let mut config = EngineConfig::default();
        config.timeouts.stage = f64::INFINITY;
        config.timeouts.fetch = f64::NAN;
        config.timeouts.commit = -3.0;
        assert_eq!(config.timeouts.for_transition(Transition::Stage), Duration::MAX);
        assert_eq!(config.timeouts.for_transition(Transition::Fetch), Duration::ZERO);
        assert_eq!(config.timeouts.for_transition(Transition::Commit), Duration::ZERO);
    }
}
