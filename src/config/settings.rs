//! TOML-based configuration for the inference gateway.
//!
//! Supports a config file (gateway.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! command = "python3"
//! args = ["worker.py"]
//! model = "${MODELS}/model.gguf"
//! startup_timeout = "30s"
//! shutdown_grace = "5s"
//!
//! [calls]
//! max_pending = 256
//! timeout = "60s"
//!
//! [defaults]
//! max_tokens = 2048
//! temperature = 0.7
//! top_p = 0.9
//! model = "default"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::gateway::{GatewayConfig, DEFAULT_MAX_PENDING};
use crate::worker::CallOptions;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "INFERENCE_GATEWAY_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Call admission and deadlines.
    pub calls: CallLimits,

    /// Default generation options.
    pub defaults: OptionDefaults,
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Worker executable (supports ${ENV_VAR} expansion).
    pub command: String,

    /// Extra arguments passed before `--model`.
    pub args: Vec<String>,

    /// Path to the model file (supports ${ENV_VAR} expansion).
    pub model: String,

    /// How long to wait for the ready signal (e.g., "30s").
    pub startup_timeout: String,

    /// How long a worker may take to exit after stdin closes (e.g., "5s").
    pub shutdown_grace: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            command: "inference-worker".to_string(),
            args: Vec::new(),
            model: String::new(),
            startup_timeout: "30s".to_string(),
            shutdown_grace: "5s".to_string(),
        }
    }
}

/// Call limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CallLimits {
    /// Maximum number of calls awaiting a response.
    pub max_pending: usize,

    /// Deadline for calls that do not set one (e.g., "60s").
    pub timeout: Option<String>,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING,
            timeout: None,
        }
    }
}

/// Default generation options sent with every call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptionDefaults {
    pub max_tokens: u32,

    /// Sampling temperature (0.0 to 2.0).
    pub temperature: f64,

    /// Nucleus sampling mass (greater than 0.0, at most 1.0).
    pub top_p: f64,

    pub model: String,
}

impl Default for OptionDefaults {
    fn default() -> Self {
        let options = CallOptions::default();
        Self {
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            model: options.model,
        }
    }
}

impl From<&OptionDefaults> for CallOptions {
    fn from(defaults: &OptionDefaults) -> Self {
        CallOptions {
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            model: defaults.model.clone(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `INFERENCE_GATEWAY_CONFIG`
    /// 2. `./gateway.toml`
    /// 3. `~/.config/inference-gateway/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("gateway.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("inference-gateway").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check value ranges that the TOML types alone cannot express.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.worker.command.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "worker.command must not be empty".to_string(),
            ));
        }
        if self.worker.model.trim().is_empty() {
            return Err(SettingsError::InvalidConfig(
                "worker.model must be set".to_string(),
            ));
        }
        if self.calls.max_pending == 0 {
            return Err(SettingsError::InvalidConfig(
                "calls.max_pending must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(SettingsError::InvalidConfig(format!(
                "defaults.temperature must be between 0 and 2, got {}",
                self.defaults.temperature
            )));
        }
        if !(self.defaults.top_p > 0.0 && self.defaults.top_p <= 1.0) {
            return Err(SettingsError::InvalidConfig(format!(
                "defaults.top_p must be in (0, 1], got {}",
                self.defaults.top_p
            )));
        }
        Ok(())
    }

    /// Build the runtime configuration, expanding environment variables and
    /// parsing durations.
    pub fn gateway_config(&self) -> Result<GatewayConfig, SettingsError> {
        self.validate()?;

        let command = expand_env_vars(&self.worker.command)?;
        let model = expand_env_vars(&self.worker.model)?;
        let args = self
            .worker
            .args
            .iter()
            .map(|arg| expand_env_vars(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let mut config = GatewayConfig::new(command, model)
            .with_args(args)
            .with_startup_timeout(parse_duration(&self.worker.startup_timeout)?)
            .with_shutdown_grace(parse_duration(&self.worker.shutdown_grace)?)
            .with_max_pending(self.calls.max_pending)
            .with_defaults(CallOptions::from(&self.defaults));

        if let Some(timeout) = &self.calls.timeout {
            config = config.with_call_timeout(parse_duration(timeout)?);
        }

        Ok(config)
    }
}

/// Parse a duration such as `"250ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let invalid = || SettingsError::InvalidDuration(s.to_string());

    let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let (number, unit) = s.split_at(split);
    let value: u64 = number.parse().map_err(|_| invalid())?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(invalid()),
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            // Check for ${VAR} or $VAR
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                for ch in chars.by_ref() {
                    if ch == '}' {
                        break;
                    }
                    var_name.push(ch);
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                // $VAR (ends at non-alphanumeric/underscore)
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    // Just a lone $, keep it
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
