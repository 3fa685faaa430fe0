//! Env-var parsing helpers shared by the config structs.

use crate::error::ConfigError;

/// Read an env var, treating unset and empty as absent.
pub(crate) fn optional_env(var: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(var) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::Invalid {
            var: var.to_string(),
            reason: "not valid unicode".to_string(),
        }),
    }
}

pub(crate) fn parse_string_env(var: &str, default: &str) -> Result<String, ConfigError> {
    Ok(optional_env(var)?.unwrap_or_else(|| default.to_string()))
}

pub(crate) fn parse_bool_env(var: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(var)? {
        None => Ok(default),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::Invalid {
                var: var.to_string(),
                reason: format!("expected a boolean, got '{}'", other),
            }),
        },
    }
}

/// Parse any `FromStr` value, falling back to `default` when unset.
pub(crate) fn parse_optional_env<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(var)? {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
    }
}
