//! Application-level configuration loading: engine timings and seed profiles.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::{
    dao::models::ProfileEntity,
    state::{reveal::RevealTimings, session::GuessTimings},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GAGE_BACK_CONFIG_PATH";

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Delays of the guess pipeline and reveal animation.
    pub timings: GuessTimings,
    /// Profiles loaded into the directory before storage is reachable.
    pub seed_profiles: Vec<ProfileEntity>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        seed_profiles = config.seed_profiles.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file.
struct RawConfig {
    timings: RawTimings,
    seed_profiles: Vec<ProfileEntity>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default)]
/// Timings in milliseconds; any missing entry keeps its default.
struct RawTimings {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    close_miss_feedback_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    wide_miss_delay_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    fade_out_profile_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    show_brand_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    show_brand_with_suffix_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    session_idle_ms: Duration,
}

impl Default for RawTimings {
    fn default() -> Self {
        let timings = GuessTimings::default();
        Self {
            close_miss_feedback_ms: timings.close_miss_feedback,
            wide_miss_delay_ms: timings.wide_miss_delay,
            fade_out_profile_ms: timings.reveal.fade_out_profile,
            show_brand_ms: timings.reveal.show_brand,
            show_brand_with_suffix_ms: timings.reveal.show_brand_with_suffix,
            session_idle_ms: timings.session_idle,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let raw = value.timings;
        Self {
            timings: GuessTimings {
                close_miss_feedback: raw.close_miss_feedback_ms,
                wide_miss_delay: raw.wide_miss_delay_ms,
                reveal: RevealTimings {
                    fade_out_profile: raw.fade_out_profile_ms,
                    show_brand: raw.show_brand_ms,
                    show_brand_with_suffix: raw.show_brand_with_suffix_ms,
                },
                session_idle: raw.session_idle_ms,
            },
            seed_profiles: value.seed_profiles,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
