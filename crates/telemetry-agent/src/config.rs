// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry configuration.
//!
//! Every tunable of the pipeline lives here with its default. The host builds a
//! [`TelemetryConfig`] (usually through [`TelemetryConfig::from_env`]) and hands
//! it to [`crate::service::TelemetryService::initialize`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Any non-empty value forces telemetry off, whatever the configuration says.
pub const NO_TELEMETRY_ENV_VAR: &str = "ET_NO_TELEMETRY";

const ENVIRONMENT_ENV_VAR: &str = "ET_TELEMETRY_ENVIRONMENT";
const LOGS_URL_ENV_VAR: &str = "ET_TELEMETRY_LOGS_URL";
const API_KEY_ENV_VAR: &str = "ET_TELEMETRY_API_KEY";
const SENTRY_DSN_ENV_VAR: &str = "ET_TELEMETRY_SENTRY_DSN";

pub const DEFAULT_APPLICATION: &str = "Eternal Terminal";
pub const DEFAULT_ENVIRONMENT: &str = "prod";
pub const DEFAULT_LOGS_INTAKE_URL: &str =
    "https://browser-http-intake.logs.datadoghq.com/v1/input/?ddsource=browser";

/// Records beyond this many pending entries are dropped.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;
/// Pending entries that force a flush before the interval elapses.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound on delivering queued crash events during shutdown.
pub const DEFAULT_CRASH_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration of a [`crate::service::TelemetryService`].
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Master opt-in. Overridden to `false` by [`NO_TELEMETRY_ENV_VAR`].
    pub allow_telemetry: bool,
    /// INI file holding the anonymous installation id.
    pub identity_path: PathBuf,
    /// Deployment environment stamped on every record and crash event.
    pub environment: String,
    pub application: String,
    pub version: String,
    /// Full URL of the log intake, query string included.
    pub logs_intake_url: String,
    /// Static credential sent in the `DD-API-KEY` header.
    pub api_key: String,
    /// Crash backend DSN. `None` keeps the crash reporter inert.
    pub sentry_dsn: Option<String>,
    pub buffer_capacity: usize,
    pub high_water_mark: usize,
    pub flush_interval: Duration,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub crash_flush_timeout: Duration,
    /// zstd level for the request body. `None` sends plain JSON.
    pub compression_level: Option<i32>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            allow_telemetry: true,
            identity_path: crate::identity::default_identity_path(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            application: DEFAULT_APPLICATION.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            logs_intake_url: DEFAULT_LOGS_INTAKE_URL.to_string(),
            api_key: String::new(),
            sentry_dsn: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            crash_flush_timeout: DEFAULT_CRASH_FLUSH_TIMEOUT,
            compression_level: None,
        }
    }
}

impl TelemetryConfig {
    /// Defaults overlaid with the `ET_TELEMETRY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(environment) = non_empty_var(ENVIRONMENT_ENV_VAR) {
            config.environment = environment;
        }
        if let Some(url) = non_empty_var(LOGS_URL_ENV_VAR) {
            config.logs_intake_url = url;
        }
        if let Some(api_key) = non_empty_var(API_KEY_ENV_VAR) {
            config.api_key = api_key;
        }
        config.sentry_dsn = non_empty_var(SENTRY_DSN_ENV_VAR);
        config
    }

    /// Whether telemetry runs at all, after applying the opt-out toggle.
    #[must_use]
    pub fn telemetry_enabled(&self) -> bool {
        self.allow_telemetry && !opted_out()
    }
}

/// True when [`NO_TELEMETRY_ENV_VAR`] is set to a non-empty value.
#[must_use]
pub fn opted_out() -> bool {
    non_empty_var(NO_TELEMETRY_ENV_VAR).is_some()
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.is_empty())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use std::env;

    use super::*;

    #[test]
    #[serial]
    fn test_defaults() {
        let config = TelemetryConfig::default();

        assert!(config.allow_telemetry);
        assert_eq!(config.buffer_capacity, 16384);
        assert_eq!(config.high_water_mark, 1024);
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.application, "Eternal Terminal");
        assert!(config.compression_level.is_none());
    }

    #[test]
    #[serial]
    fn test_opt_out_toggle_disables() {
        env::set_var(NO_TELEMETRY_ENV_VAR, "1");
        let config = TelemetryConfig::default();
        assert!(!config.telemetry_enabled());
        env::remove_var(NO_TELEMETRY_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_empty_opt_out_toggle_is_ignored() {
        env::set_var(NO_TELEMETRY_ENV_VAR, "");
        let config = TelemetryConfig::default();
        assert!(config.telemetry_enabled());
        env::remove_var(NO_TELEMETRY_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_allow_telemetry_false_disables() {
        env::remove_var(NO_TELEMETRY_ENV_VAR);
        let config = TelemetryConfig {
            allow_telemetry: false,
            ..Default::default()
        };
        assert!(!config.telemetry_enabled());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        env::set_var(ENVIRONMENT_ENV_VAR, "staging");
        env::set_var(LOGS_URL_ENV_VAR, "http://127.0.0.1:9999/v1/input");
        env::set_var(API_KEY_ENV_VAR, "_not_a_real_key_");
        env::set_var(SENTRY_DSN_ENV_VAR, "https://public@sentry.example.com/1");

        let config = TelemetryConfig::from_env();

        assert_eq!(config.environment, "staging");
        assert_eq!(config.logs_intake_url, "http://127.0.0.1:9999/v1/input");
        assert_eq!(config.api_key, "_not_a_real_key_");
        assert_eq!(
            config.sentry_dsn.as_deref(),
            Some("https://public@sentry.example.com/1")
        );

        env::remove_var(ENVIRONMENT_ENV_VAR);
        env::remove_var(LOGS_URL_ENV_VAR);
        env::remove_var(API_KEY_ENV_VAR);
        env::remove_var(SENTRY_DSN_ENV_VAR);
    }
}
