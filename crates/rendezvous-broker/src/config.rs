//! Broker configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields (store password, fabric API key) are redacted in Debug output.

use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default per-IP live-session quota.
pub const DEFAULT_MAX_TOKENS_PER_IP: u32 = 10;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default key-value store port.
pub const DEFAULT_STORE_PORT: u16 = 6379;

/// Default messaging-fabric REST base URL.
pub const DEFAULT_FABRIC_REST_URL: &str = "https://rest.ably.io";

/// Default background expiry sweep interval in seconds (1 hour).
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 3600;

/// Rendezvous broker configuration.
///
/// Loaded from environment variables. Store password and fabric API key
/// are redacted in Debug output to prevent credential leakage.
#[derive(Clone)]
pub struct Config {
    /// Key-value store host.
    pub store_host: String,

    /// Key-value store port (default: 6379).
    pub store_port: u16,

    /// Key-value store password.
    pub store_password: String,

    /// Messaging-fabric API key in `name:secret` form.
    pub fabric_api_key: String,

    /// Messaging-fabric REST base URL.
    pub fabric_rest_url: String,

    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum live session tokens per client IP (default: 10).
    pub max_tokens_per_ip: u32,

    /// Background expiry sweep interval in seconds (default: 3600).
    pub sweep_interval_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("store_host", &self.store_host)
            .field("store_port", &self.store_port)
            .field("store_password", &"[REDACTED]")
            .field("fabric_api_key", &"[REDACTED]")
            .field("fabric_rest_url", &self.fabric_rest_url)
            .field("bind_address", &self.bind_address)
            .field("max_tokens_per_ip", &self.max_tokens_per_ip)
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid store port configuration: {0}")]
    InvalidStorePort(String),

    #[error("Invalid per-IP token quota configuration: {0}")]
    InvalidTokenQuota(String),

    #[error("Invalid sweep interval configuration: {0}")]
    InvalidSweepInterval(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let store_host = vars
            .get("STORE_HOST")
            .ok_or_else(|| ConfigError::MissingEnvVar("STORE_HOST".to_string()))?
            .clone();

        let store_port = if let Some(value_str) = vars.get("STORE_PORT") {
            value_str.parse().map_err(|e| {
                ConfigError::InvalidStorePort(format!(
                    "STORE_PORT must be a valid port number, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_STORE_PORT
        };

        let store_password = vars
            .get("STORE_PASSWORD")
            .ok_or_else(|| ConfigError::MissingEnvVar("STORE_PASSWORD".to_string()))?
            .clone();

        let fabric_api_key = vars
            .get("FABRIC_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("FABRIC_API_KEY".to_string()))?
            .clone();

        let fabric_rest_url = vars
            .get("FABRIC_REST_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_FABRIC_REST_URL.to_string());

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        // Parse per-IP quota with validation
        let max_tokens_per_ip = if let Some(value_str) = vars.get("MAX_TOKENS_PER_IP") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTokenQuota(format!(
                    "MAX_TOKENS_PER_IP must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidTokenQuota(
                    "MAX_TOKENS_PER_IP must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_MAX_TOKENS_PER_IP
        };

        // Parse sweep interval with validation
        let sweep_interval_seconds = if let Some(value_str) = vars.get("SWEEP_INTERVAL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidSweepInterval(format!(
                    "SWEEP_INTERVAL_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidSweepInterval(
                    "SWEEP_INTERVAL_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_SWEEP_INTERVAL_SECONDS
        };

        Ok(Config {
            store_host,
            store_port,
            store_password,
            fabric_api_key,
            fabric_rest_url,
            bind_address,
            max_tokens_per_ip,
            sweep_interval_seconds,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("STORE_HOST".to_string(), "localhost".to_string()),
            ("STORE_PASSWORD".to_string(), "hunter2".to_string()),
            (
                "FABRIC_API_KEY".to_string(),
                "keyname:keysecret".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = base_vars();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.store_host, "localhost");
        assert_eq!(config.store_port, DEFAULT_STORE_PORT);
        assert_eq!(config.store_password, "hunter2");
        assert_eq!(config.fabric_api_key, "keyname:keysecret");
        assert_eq!(config.fabric_rest_url, DEFAULT_FABRIC_REST_URL);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.max_tokens_per_ip, DEFAULT_MAX_TOKENS_PER_IP);
        assert_eq!(
            config.sweep_interval_seconds,
            DEFAULT_SWEEP_INTERVAL_SECONDS
        );
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("STORE_PORT".to_string(), "6380".to_string());
        vars.insert(
            "FABRIC_REST_URL".to_string(),
            "https://fabric.example.com".to_string(),
        );
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("MAX_TOKENS_PER_IP".to_string(), "5".to_string());
        vars.insert("SWEEP_INTERVAL_SECONDS".to_string(), "60".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.store_port, 6380);
        assert_eq!(config.fabric_rest_url, "https://fabric.example.com");
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.max_tokens_per_ip, 5);
        assert_eq!(config.sweep_interval_seconds, 60);
    }

    #[test]
    fn test_from_vars_missing_store_host() {
        let mut vars = base_vars();
        vars.remove("STORE_HOST");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "STORE_HOST"));
    }

    #[test]
    fn test_from_vars_missing_store_password() {
        let mut vars = base_vars();
        vars.remove("STORE_PASSWORD");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "STORE_PASSWORD"));
    }

    #[test]
    fn test_from_vars_missing_fabric_api_key() {
        let mut vars = base_vars();
        vars.remove("FABRIC_API_KEY");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "FABRIC_API_KEY"));
    }

    #[test]
    fn test_store_port_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("STORE_PORT".to_string(), "sixty-three-seventy-nine".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidStorePort(msg)) if msg.contains("must be a valid port number"))
        );
    }

    #[test]
    fn test_token_quota_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("MAX_TOKENS_PER_IP".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidTokenQuota(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_token_quota_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("MAX_TOKENS_PER_IP".to_string(), "ten".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidTokenQuota(msg)) if msg.contains("must be a valid positive integer"))
        );
    }

    #[test]
    fn test_sweep_interval_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("SWEEP_INTERVAL_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidSweepInterval(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let vars = base_vars();
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("keysecret"));
    }
}
