// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{DEFAULT_MIN_ALLOWED_THRESHOLD, DEFAULT_SEND_TIMEOUT, DEFAULT_STORAGE_DIR};
use crate::credentials::Credentials;
use crate::errors::ConfigError;
use crate::session::AppInfo;
use reqwest::Url;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// What happens to the points counter when a flush attempt reuses a staging file left by
/// an earlier, undelivered attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagedRetryPolicy {
    /// Reset the counter to zero as soon as the staging file is reused. A failing collector
    /// is then retried at most once per threshold's worth of new entries.
    #[default]
    ResetPoints,
    /// Leave the counter alone until the attempt finishes.
    KeepPoints,
}

/// Configuration for the flush service and its delivery client
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Collector endpoint receiving the POSTed batches
    pub server_url: String,
    /// Optional Basic auth credentials
    pub credentials: Option<Credentials>,
    /// Upper bound on one delivery request
    pub send_timeout: Duration,
    /// Number of submitted entries that forces a flush attempt
    pub min_allowed_threshold: usize,
    /// Directory holding the live, staging and session files
    pub storage_dir: PathBuf,
    pub staged_retry_policy: StagedRetryPolicy,
    /// Version and build reported in session metadata
    pub app: AppInfo,
    /// Log level for the shipper's own diagnostics (trace, debug, info, warn, error)
    pub log_level: String,
}

impl ShipperConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            credentials: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            min_allowed_threshold: DEFAULT_MIN_ALLOWED_THRESHOLD,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            staged_retry_policy: StagedRetryPolicy::default(),
            app: AppInfo::default(),
            log_level: "info".to_string(),
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url =
            env::var("LOG_SHIPPER_URL").map_err(|_| ConfigError::Missing("LOG_SHIPPER_URL"))?;
        let credentials = Credentials::from_parts(
            env::var("LOG_SHIPPER_APP_ID").ok(),
            env::var("LOG_SHIPPER_APP_SECRET").ok(),
        );
        let send_timeout = env::var("LOG_SHIPPER_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SEND_TIMEOUT);
        let min_allowed_threshold = env::var("LOG_SHIPPER_THRESHOLD")
            .ok()
            .and_then(|threshold| threshold.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MIN_ALLOWED_THRESHOLD);
        let storage_dir = env::var("LOG_SHIPPER_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_DIR));
        let staged_retry_policy = match env::var("LOG_SHIPPER_KEEP_POINTS_ON_RETRY")
            .map(|val| val.to_lowercase() == "true")
        {
            Ok(true) => StagedRetryPolicy::KeepPoints,
            _ => StagedRetryPolicy::ResetPoints,
        };
        let app = AppInfo {
            version: env::var("LOG_SHIPPER_APP_VERSION").unwrap_or_default(),
            build: env::var("LOG_SHIPPER_APP_BUILD")
                .ok()
                .and_then(|build| build.parse::<i64>().ok())
                .unwrap_or(0),
        };
        let log_level = env::var("LOG_SHIPPER_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            server_url,
            credentials,
            send_timeout,
            min_allowed_threshold,
            storage_dir,
            staged_retry_policy,
            app,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.server_url).map_err(|e| {
            ConfigError::Invalid(format!("server URL '{}' is not valid: {e}", self.server_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "server URL scheme must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.min_allowed_threshold == 0 {
            return Err(ConfigError::Invalid(
                "threshold must be at least 1".to_string(),
            ));
        }

        if self.send_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "send timeout must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 10] = [
        "LOG_SHIPPER_URL",
        "LOG_SHIPPER_APP_ID",
        "LOG_SHIPPER_APP_SECRET",
        "LOG_SHIPPER_TIMEOUT_SECS",
        "LOG_SHIPPER_THRESHOLD",
        "LOG_SHIPPER_STORAGE_DIR",
        "LOG_SHIPPER_KEEP_POINTS_ON_RETRY",
        "LOG_SHIPPER_APP_VERSION",
        "LOG_SHIPPER_APP_BUILD",
        "LOG_SHIPPER_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_new_config_defaults() {
        let config = ShipperConfig::new("https://logs.example.com/ingest");
        assert!(config.validate().is_ok());
        assert_eq!(config.send_timeout, Duration::from_secs(10));
        assert_eq!(config.min_allowed_threshold, 10);
        assert_eq!(config.staged_retry_policy, StagedRetryPolicy::ResetPoints);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        assert!(ShipperConfig::new("not a url").validate().is_err());
        assert!(ShipperConfig::new("ftp://logs.example.com").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold_and_timeout() {
        let config = ShipperConfig {
            min_allowed_threshold: 0,
            ..ShipperConfig::new("http://localhost:8080")
        };
        assert!(config.validate().is_err());

        let config = ShipperConfig {
            send_timeout: Duration::ZERO,
            ..ShipperConfig::new("http://localhost:8080")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = ShipperConfig {
            log_level: "invalid".to_string(),
            ..ShipperConfig::new("http://localhost:8080")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_requires_url() {
        clear_env();
        assert!(matches!(
            ShipperConfig::from_env(),
            Err(ConfigError::Missing("LOG_SHIPPER_URL"))
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_all_settings() {
        clear_env();
        env::set_var("LOG_SHIPPER_URL", "https://logs.example.com/ingest");
        env::set_var("LOG_SHIPPER_APP_ID", "app");
        env::set_var("LOG_SHIPPER_APP_SECRET", "secret");
        env::set_var("LOG_SHIPPER_TIMEOUT_SECS", "3");
        env::set_var("LOG_SHIPPER_THRESHOLD", "25");
        env::set_var("LOG_SHIPPER_STORAGE_DIR", "/var/lib/shipper");
        env::set_var("LOG_SHIPPER_KEEP_POINTS_ON_RETRY", "TRUE");
        env::set_var("LOG_SHIPPER_APP_VERSION", "1.2.5");
        env::set_var("LOG_SHIPPER_APP_BUILD", "563");
        env::set_var("LOG_SHIPPER_LOG_LEVEL", "DEBUG");

        let config = ShipperConfig::from_env().expect("valid config");
        clear_env();

        assert_eq!(config.server_url, "https://logs.example.com/ingest");
        assert_eq!(config.credentials, Some(Credentials::new("app", "secret")));
        assert_eq!(config.send_timeout, Duration::from_secs(3));
        assert_eq!(config.min_allowed_threshold, 25);
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/shipper"));
        assert_eq!(config.staged_retry_policy, StagedRetryPolicy::KeepPoints);
        assert_eq!(config.app.version, "1.2.5");
        assert_eq!(config.app.build, 563);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_on_unparsable_numbers() {
        clear_env();
        env::set_var("LOG_SHIPPER_URL", "http://localhost:9000");
        env::set_var("LOG_SHIPPER_THRESHOLD", "lots");
        env::set_var("LOG_SHIPPER_TIMEOUT_SECS", "-1");

        let config = ShipperConfig::from_env().expect("valid config");
        clear_env();

        assert_eq!(config.min_allowed_threshold, DEFAULT_MIN_ALLOWED_THRESHOLD);
        assert_eq!(config.send_timeout, DEFAULT_SEND_TIMEOUT);
    }
}
