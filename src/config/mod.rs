//! Configuration module for the inference gateway.
//!
//! Handles the TOML settings file, environment variables, and the runtime
//! configuration a gateway is built from.

mod gateway;
mod settings;

pub use gateway::{GatewayConfig, DEFAULT_MAX_PENDING, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_TIMEOUT};
pub use settings::{
    expand_env_vars, parse_duration, CallLimits, OptionDefaults, Settings, SettingsError,
    WorkerSettings, CONFIG_ENV_VAR,
};
