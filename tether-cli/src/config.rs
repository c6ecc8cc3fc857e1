//! Configuration file support for `tether`.
//!
//! The file is TOML; unknown fields are ignored. A broken default file is reported
//! and skipped, while a broken file named with `--config` is fatal. Settings are
//! layered: defaults < config file < command-line arguments.

use etcetera::BaseStrategy;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::args::CommandLineArgs;
use crate::events::TraceEvent;

/// Signal sent on timeout when neither the command line nor the file names one.
pub const DEFAULT_TIMEOUT_SIGNAL: &str = "TERM";

/// Root configuration structure.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings applied when the child is spawned.
    pub spawn: SpawnConfig,

    /// Settings controlling how a timed-out child is signaled.
    pub kill: KillConfig,

    /// Diagnostic logging settings.
    pub log: LogConfig,
}

/// Settings applied when the child is spawned.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Largest number of arguments accepted; 0 disables the limit.
    #[serde(rename = "max-args")]
    pub max_args: Option<usize>,

    /// Let the child share stderr.
    #[serde(rename = "inherit-stderr")]
    pub inherit_stderr: Option<bool>,

    /// Start the child from an empty environment.
    #[serde(rename = "clear-env")]
    pub clear_env: Option<bool>,
}

/// Settings controlling how a timed-out child is signaled.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct KillConfig {
    /// Signal to send, by name or number.
    pub signal: Option<String>,

    /// Milliseconds to wait before signaling.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

/// Diagnostic logging settings.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Trace events enabled at debug level, in addition to any given with `--debug`.
    pub debug: Vec<TraceEvent>,
}

/// Effective settings for one run, after layering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSettings {
    /// Largest number of arguments accepted; `None` for no limit.
    pub max_args: Option<usize>,
    /// Let the child share stderr.
    pub inherit_stderr: bool,
    /// Start the child from an empty environment.
    pub clear_env: bool,
    /// How long to let the child run before signaling it.
    pub timeout: Option<Duration>,
    /// Signal to send on timeout, unparsed.
    pub timeout_signal: String,
}

impl Config {
    /// Merges the configuration with command-line arguments.
    ///
    /// # Arguments
    ///
    /// * `args` - The parsed command-line arguments; explicitly given values win.
    #[must_use]
    pub fn to_run_settings(&self, args: &CommandLineArgs) -> RunSettings {
        let max_args = match args.max_args.or(self.spawn.max_args) {
            Some(0) => None,
            Some(n) => Some(n),
            None => Some(tether_core::DEFAULT_MAX_ARGS),
        };

        RunSettings {
            max_args,
            inherit_stderr: merge_bool_setting(
                args.inherit_stderr,
                false,
                self.spawn.inherit_stderr,
            ),
            clear_env: merge_bool_setting(args.clear_env, false, self.spawn.clear_env),
            timeout: args
                .timeout_ms
                .or(self.kill.timeout_ms)
                .map(Duration::from_millis),
            timeout_signal: args
                .signal
                .clone()
                .or_else(|| self.kill.signal.clone())
                .unwrap_or_else(|| DEFAULT_TIMEOUT_SIGNAL.to_owned()),
        }
    }
}

/// Merges a boolean flag with its config file value.
///
/// A flag can't distinguish "explicitly false" from "not provided", so a CLI value
/// equal to the default defers to the config file.
const fn merge_bool_setting(
    cli_value: bool,
    cli_default: bool,
    config_value: Option<bool>,
) -> bool {
    if cli_value != cli_default {
        cli_value
    } else if let Some(config) = config_value {
        config
    } else {
        cli_default
    }
}

/// Result of attempting to load a configuration file.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration, or default if loading failed.
    pub config: Config,

    /// The path that was used (or attempted) for loading.
    pub path: Option<PathBuf>,

    /// Any error that occurred during loading.
    pub error: Option<ConfigLoadError>,

    /// Whether the path was given with `--config`. An error is then fatal.
    pub explicit_path: bool,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[source] std::io::Error),

    /// Failed to parse the TOML content.
    #[error("failed to parse config file: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Returns the default configuration file path for the current platform, if the
/// platform's config directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("tether").join("config.toml"))
}

/// Loads configuration from the specified path.
pub fn load_from_path(path: &Path) -> ConfigLoadResult {
    let parsed = std::fs::read_to_string(path)
        .map_err(ConfigLoadError::Io)
        .and_then(|content| toml::from_str(&content).map_err(ConfigLoadError::Parse));

    let (config, error) = match parsed {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    ConfigLoadResult {
        config,
        path: Some(path.to_path_buf()),
        error,
        explicit_path: false,
    }
}

/// Loads configuration based on the provided options.
///
/// # Arguments
///
/// * `disabled` - If true, skip loading and return defaults
/// * `explicit_path` - If provided, use this path instead of the default
pub fn load_config(disabled: bool, explicit_path: Option<&Path>) -> ConfigLoadResult {
    let defaults = |path: Option<PathBuf>| ConfigLoadResult {
        config: Config::default(),
        path,
        error: None,
        explicit_path: false,
    };

    if disabled {
        return defaults(None);
    }

    let Some(path) = explicit_path
        .map(Path::to_path_buf)
        .or_else(default_config_path)
    else {
        return defaults(None);
    };

    // A missing default file is normal.
    if explicit_path.is_none() && !path.exists() {
        return defaults(Some(path));
    }

    let mut result = load_from_path(&path);
    result.explicit_path = explicit_path.is_some();
    result
}
