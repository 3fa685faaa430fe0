//! Configuration for the gateway.
//!
//! Settings come from env vars with hardcoded defaults. `.env` files are
//! loaded via dotenvy early in startup, so a var set there behaves exactly
//! like one set in the environment.

pub(crate) mod helpers;

use std::path::PathBuf;

use crate::config::helpers::{optional_env, parse_bool_env, parse_optional_env, parse_string_env};
use crate::error::ConfigError;

/// Main configuration for the gateway.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub runner: RunnerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            server: ServerConfig::resolve()?,
            runner: RunnerConfig::resolve()?,
        })
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: parse_string_env("UTM_BIND_ADDR", "127.0.0.1:8080")?,
        })
    }
}

/// Docker runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Docker image that carries the UTM algorithm.
    pub image: String,
    /// Whether to pull the image when it is missing locally.
    pub auto_pull_image: bool,
    /// Memory limit in megabytes for algorithm containers.
    pub memory_limit_mb: u64,
    /// CPU shares (relative weight).
    pub cpu_shares: u32,
    /// Directory for staging container inputs and results.
    /// System temp when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            image: "samuelgerber/utm".to_string(),
            auto_pull_image: true,
            memory_limit_mb: 2048,
            cpu_shares: 1024,
            scratch_dir: None,
        }
    }
}

impl RunnerConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            image: parse_string_env("UTM_IMAGE", "samuelgerber/utm")?,
            auto_pull_image: parse_bool_env("UTM_AUTO_PULL_IMAGE", true)?,
            memory_limit_mb: parse_optional_env("UTM_MEMORY_LIMIT_MB", 2048)?,
            cpu_shares: parse_optional_env("UTM_CPU_SHARES", 1024)?,
            scratch_dir: optional_env("UTM_SCRATCH_DIR")?.map(PathBuf::from),
        })
    }
}
