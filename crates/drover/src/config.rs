//! Daemon configuration.
//!
//! Settings come from a TOML file, by default `<home>/etc/drover.toml`
//! where `<home>` is `$DROVER_HOME` (see [`drover_logging::drover_home`]).
//! Validation failures are the only fatal errors in the daemon.

use crate::error::{DroverError, Result};
use crate::stability::DirProbe;
use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed format of the optional `since` timestamp, interpreted in local time.
pub const SINCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Daemon settings as loaded from the TOML config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Source tree to scan. Relative paths resolve against the drover home.
    pub source: PathBuf,
    /// Destination tree for copied records.
    pub output: PathBuf,
    /// Harvest cadence in seconds.
    pub interval_secs: u64,
    /// Retention window in days; destination entries older than this go.
    pub hold_days: u32,
    /// Optional lower bound on source modification times,
    /// `YYYY-MM-DD HH:MM:SS` in local time.
    #[serde(default)]
    pub since: Option<String>,
    /// Cap on concurrent copy workers.
    pub max_workers: usize,
    #[serde(default)]
    pub stability: StabilitySettings,
}

/// Tuning for the write-stability probe.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StabilitySettings {
    /// Pause between samples of a directory, in milliseconds.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// How long a directory must stay unchanged to count as quiet.
    #[serde(default = "default_quiet_window_secs")]
    pub quiet_window_secs: u64,
    /// Upper bound on one probe; exceeding it skips the record this cycle.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_sample_interval_ms() -> u64 {
    500
}

fn default_quiet_window_secs() -> u64 {
    10
}

fn default_max_wait_secs() -> u64 {
    600
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            quiet_window_secs: default_quiet_window_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl Settings {
    /// Load and validate settings, resolving relative paths against `home`.
    pub fn load_from(path: &Path, home: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            DroverError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let mut settings: Settings = toml::from_str(&raw)
            .map_err(|err| DroverError::Config(format!("{}: {err}", path.display())))?;
        settings.validate()?;
        settings.source = resolve(home, &settings.source);
        settings.output = resolve(home, &settings.output);
        Ok(settings)
    }

    /// Load settings with paths resolved against the drover home directory.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_from(path, &drover_logging::drover_home())
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(DroverError::Config("interval_secs must be positive".into()));
        }
        if self.hold_days == 0 {
            return Err(DroverError::Config("hold_days must be positive".into()));
        }
        if self.max_workers == 0 {
            return Err(DroverError::Config("max_workers must be positive".into()));
        }
        if self.stability.sample_interval_ms == 0 {
            return Err(DroverError::Config(
                "stability.sample_interval_ms must be positive".into(),
            ));
        }
        if self.stability.quiet_window_secs == 0 {
            return Err(DroverError::Config(
                "stability.quiet_window_secs must be positive".into(),
            ));
        }
        if self.stability.max_wait_secs <= self.stability.quiet_window_secs {
            return Err(DroverError::Config(
                "stability.max_wait_secs must exceed stability.quiet_window_secs".into(),
            ));
        }
        if let Some(raw) = self.since.as_deref() {
            parse_since(raw)?;
        }
        Ok(())
    }

    /// The validated `since` floor, if configured.
    pub fn since_floor(&self) -> Option<DateTime<Local>> {
        self.since.as_deref().and_then(|raw| parse_since(raw).ok())
    }

    /// Probe parameters for the copy pipeline.
    pub fn probe(&self) -> DirProbe {
        DirProbe::new(
            Duration::from_millis(self.stability.sample_interval_ms),
            Duration::from_secs(self.stability.quiet_window_secs),
            Duration::from_secs(self.stability.max_wait_secs),
        )
    }
}

/// Default config file location: `<home>/etc/drover.toml`.
pub fn default_config_path() -> PathBuf {
    drover_logging::drover_home().join("etc").join("drover.toml")
}

fn resolve(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

fn parse_since(raw: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(raw, SINCE_FORMAT).map_err(|err| {
        DroverError::Config(format!("invalid since timestamp {raw:?}: {err}"))
    })?;
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Ok(t),
        LocalResult::None => Err(DroverError::Config(format!(
            "since timestamp {raw:?} does not exist in the local timezone"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
            source = "/srv/incoming"
            output = "/srv/archive"
            interval_secs = 60
            hold_days = 30
            max_workers = 4
        "#
        .to_string()
    }

    fn load_str(raw: &str) -> Result<Settings> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drover.toml");
        fs::write(&path, raw).unwrap();
        Settings::load_from(&path, dir.path())
    }

    #[test]
    fn loads_minimal_config_with_stability_defaults() {
        let settings = load_str(&base_toml()).unwrap();
        assert_eq!(settings.source, Path::new("/srv/incoming"));
        assert_eq!(settings.hold_days, 30);
        assert_eq!(settings.stability.sample_interval_ms, 500);
        assert_eq!(settings.stability.quiet_window_secs, 10);
        assert_eq!(settings.stability.max_wait_secs, 600);
        assert!(settings.since_floor().is_none());
    }

    #[test]
    fn relative_paths_resolve_against_home() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drover.toml");
        let raw = base_toml().replace("/srv/incoming", "incoming");
        fs::write(&path, raw).unwrap();
        let settings = Settings::load_from(&path, dir.path()).unwrap();
        assert_eq!(settings.source, dir.path().join("incoming"));
    }

    #[test]
    fn zero_hold_days_is_fatal() {
        let raw = base_toml().replace("hold_days = 30", "hold_days = 0");
        let err = load_str(&raw).unwrap_err();
        assert!(err.to_string().contains("hold_days"));
    }

    #[test]
    fn zero_workers_is_fatal() {
        let raw = base_toml().replace("max_workers = 4", "max_workers = 0");
        assert!(load_str(&raw).is_err());
    }

    #[test]
    fn since_must_match_the_fixed_format() {
        let raw = format!("{}\nsince = \"2023-01-01T00:00:00\"", base_toml());
        assert!(load_str(&raw).is_err());

        let raw = format!("{}\nsince = \"2023-01-01 00:00:00\"", base_toml());
        let settings = load_str(&raw).unwrap();
        let floor = settings.since_floor().unwrap();
        assert_eq!(floor.naive_local().to_string(), "2023-01-01 00:00:00");
    }

    #[test]
    fn max_wait_must_cover_the_quiet_window() {
        let raw = format!(
            "{}\n[stability]\nquiet_window_secs = 30\nmax_wait_secs = 5",
            base_toml()
        );
        assert!(load_str(&raw).is_err());
    }
}
