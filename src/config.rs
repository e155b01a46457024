//! Application-level configuration loading, including round timing and scoring knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::catalog::RoundSettings;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PARTY_ROOMS_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Animation lock between a holder acting and the token moving on.
    pub handoff_delay: Duration,
    /// Bounds for freshly generated round configuration.
    pub rounds: RoundSettings,
    /// Points awarded to every survivor of a flat-bonus round.
    pub flat_bonus: u32,
    /// How much the danger scale grows over a full round.
    pub danger_scale_factor: f32,
    /// Room code generation attempts before giving up on collisions.
    pub code_attempts: usize,
    /// Upper bound for the store work of a single room transition.
    pub store_timeout: Duration,
    /// How long a freshly mounted observer waits for its first snapshot
    /// before falling back to a one-shot read.
    pub mount_fallback: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    app_config
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
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            handoff_delay: Duration::from_millis(300),
            rounds: RoundSettings::default(),
            flat_bonus: 2,
            danger_scale_factor: 4.0,
            code_attempts: 16,
            store_timeout: Duration::from_secs(5),
            mount_fallback: Duration::from_millis(1_500),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    handoff_delay_ms: Option<u64>,
    min_round_secs: Option<u32>,
    max_round_secs: Option<u32>,
    numbers_count: Option<usize>,
    numbers_time_limit_secs: Option<u32>,
    flat_bonus: Option<u32>,
    danger_scale_factor: Option<f32>,
    code_attempts: Option<usize>,
    store_timeout_ms: Option<u64>,
    mount_fallback_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let rounds = RoundSettings {
            min_duration_secs: value
                .min_round_secs
                .unwrap_or(defaults.rounds.min_duration_secs),
            max_duration_secs: value
                .max_round_secs
                .unwrap_or(defaults.rounds.max_duration_secs),
            numbers_count: value.numbers_count.unwrap_or(defaults.rounds.numbers_count),
            numbers_time_limit_secs: value
                .numbers_time_limit_secs
                .unwrap_or(defaults.rounds.numbers_time_limit_secs),
        };

        Self {
            handoff_delay: value
                .handoff_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.handoff_delay),
            rounds,
            flat_bonus: value.flat_bonus.unwrap_or(defaults.flat_bonus),
            danger_scale_factor: value
                .danger_scale_factor
                .unwrap_or(defaults.danger_scale_factor),
            code_attempts: value.code_attempts.unwrap_or(defaults.code_attempts).max(1),
            store_timeout: value
                .store_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            mount_fallback: value
                .mount_fallback_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.mount_fallback),
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
