use crate::core::allocator::Schedule;
use crate::core::incident::IncidentPolicy;
use crate::core::jitter::DEFAULT_JITTER_SECONDS;
use crate::core::timestamp::{parse_hms, TimeParseError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_MAX_DIMENSION: u32 = 2000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {field}: {source}")]
    MalformedTime {
        field: &'static str,
        #[source]
        source: TimeParseError,
    },

    #[error("jitter_seconds out of range: {value}")]
    JitterOutOfRange { value: i64 },

    #[error("Schedule exceeds the representable time range")]
    ScheduleOverflow,

    #[error("At least one location is required")]
    NoLocations,

    #[error("No configuration file found (looked in {searched:?})")]
    NotFound { searched: Vec<PathBuf> },
}

/// Run configuration as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(alias = "FOLDER_PATH")]
    pub folder_path: PathBuf,

    #[serde(alias = "START_TIME")]
    pub start_time: String,

    #[serde(alias = "DURATION_BEFORE_WORKS", default = "default_duration_before")]
    pub duration_before_works: String,

    #[serde(alias = "DURATION")]
    pub duration: String,

    #[serde(alias = "LOCATIONS")]
    pub locations: Vec<String>,

    #[serde(default = "default_jitter")]
    pub jitter_seconds: i64,

    #[serde(default)]
    pub incident_policy: IncidentPolicy,

    #[serde(default)]
    pub font_path: Option<PathBuf>,

    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

fn default_duration_before() -> String {
    "00:00:00".to_string()
}

fn default_jitter() -> i64 {
    DEFAULT_JITTER_SECONDS
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folder_path: PathBuf::from("photos"),
            start_time: "08:00:00".to_string(),
            duration_before_works: "00:30:00".to_string(),
            duration: "04:00:00".to_string(),
            locations: vec!["Site address\nLat 0.000000 Lon 0.000000".to_string()],
            jitter_seconds: DEFAULT_JITTER_SECONDS,
            incident_policy: IncidentPolicy::default(),
            font_path: None,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// Validated, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub schedule: Schedule,
    pub jitter_seconds: i64,
    pub locations: Vec<String>,
    pub policy: IncidentPolicy,
    pub font_path: Option<PathBuf>,
    pub max_dimension: u32,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `./config.json`, then the per-user config directory.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fieldstamp").join(CONFIG_FILE_NAME));
        }
        paths
    }

    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let searched = Self::search_paths();
        match searched.iter().find(|p| p.is_file()) {
            Some(path) => Self::load(path),
            None => Err(ConfigError::NotFound { searched }),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate and convert into [`Settings`].
    ///
    /// All time strings are parsed here so a malformed one stops the run
    /// before any folder is touched.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let time = |field: &'static str, value: &str| {
            parse_hms(value).map_err(|source| ConfigError::MalformedTime { field, source })
        };

        let schedule = Schedule {
            start: time("start_time", &self.start_time)?,
            duration_before: time("duration_before_works", &self.duration_before_works)?,
            duration: time("duration", &self.duration)?,
        };

        let jitter_seconds = self
            .jitter_seconds
            .checked_abs()
            .ok_or(ConfigError::JitterOutOfRange {
                value: self.jitter_seconds,
            })?;

        // latest raw second any allocation can reach: every edge jittered once
        jitter_seconds
            .checked_mul(4)
            .and_then(|j| schedule.start.checked_add(j))
            .and_then(|t| t.checked_add(schedule.duration_before))
            .and_then(|t| t.checked_add(schedule.duration))
            .ok_or(ConfigError::ScheduleOverflow)?;

        let locations: Vec<String> = self
            .locations
            .iter()
            .filter(|l| !l.trim().is_empty())
            .cloned()
            .collect();
        if locations.is_empty() {
            return Err(ConfigError::NoLocations);
        }

        Ok(Settings {
            root: self.folder_path.clone(),
            schedule,
            jitter_seconds,
            locations,
            policy: self.incident_policy,
            font_path: self.font_path.clone(),
            max_dimension: self.max_dimension.max(1),
        })
    }
}
