// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Immediate forwarding of severe events to the crash backend.
//!
//! Crash events bypass the record buffer entirely: a fatal event is often the
//! last thing a process does, so it cannot wait for the next flush.

use std::sync::Arc;
use std::time::Duration;

use sentry::protocol::Event;
use sentry::types::{Dsn, ParseDsnError};
use tracing::debug;
use uuid::Uuid;

use crate::config::TelemetryConfig;
use crate::record::Severity;

/// Source tag attached to every crash event.
pub const CRASH_SOURCE_TAG: &str = "stderr";

/// The crash backend. Implementations own their transport and persistence.
pub trait CrashReporter: Send + Sync {
    fn capture_event(&self, severity: Severity, source_tag: &str, message: &str);

    /// Associates subsequent events with the anonymous installation id.
    fn set_installation_id(&self, _id: &Uuid) {}

    /// Blocks until queued events are delivered or `timeout` elapses.
    /// Returns `false` when events may have been left behind.
    fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Reporter that drops every event. Used when no crash backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl CrashReporter for NoopReporter {
    fn capture_event(&self, _severity: Severity, _source_tag: &str, _message: &str) {}
}

/// Crash reporter backed by the Sentry SDK.
///
/// Holding the client guard keeps the SDK alive; dropping the reporter flushes
/// pending crash events. The SDK's panic integration reports panics on its own.
pub struct SentryReporter {
    client: Option<Arc<sentry::Client>>,
    _guard: sentry::ClientInitGuard,
}

impl SentryReporter {
    /// Starts the Sentry client. An unparsable DSN is rejected up front.
    pub fn init(dsn: &str, config: &TelemetryConfig) -> Result<Self, ParseDsnError> {
        let dsn: Dsn = dsn.parse()?;
        let guard = sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: Some(release_name(&config.application, &config.version).into()),
            environment: Some(config.environment.clone().into()),
            attach_stacktrace: true,
            ..Default::default()
        });
        if !guard.is_enabled() {
            debug!("Crash reporter client disabled, crash events will be dropped");
        }
        Ok(SentryReporter {
            client: sentry::Hub::current().client(),
            _guard: guard,
        })
    }
}

impl CrashReporter for SentryReporter {
    fn capture_event(&self, severity: Severity, source_tag: &str, message: &str) {
        sentry::capture_event(Event {
            message: Some(message.to_string()),
            level: severity.into(),
            logger: Some(source_tag.to_string()),
            ..Default::default()
        });
    }

    fn set_installation_id(&self, id: &Uuid) {
        sentry::configure_scope(|scope| {
            scope.set_user(Some(sentry::User {
                id: Some(id.to_string()),
                ..Default::default()
            }));
        });
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.client
            .as_ref()
            .map_or(true, |client| client.flush(Some(timeout)))
    }
}

/// Sentry release identifier: `<application without spaces>@<version>`.
fn release_name(application: &str, version: &str) -> String {
    let slug: String = application.split_whitespace().collect();
    format!("{slug}@{version}")
}

/// Forwards severe events to the [`CrashReporter`] while telemetry is enabled.
#[derive(Clone)]
pub struct CrashNotifier {
    reporter: Arc<dyn CrashReporter>,
    enabled: bool,
}

impl CrashNotifier {
    #[must_use]
    pub fn new(reporter: Arc<dyn CrashReporter>, enabled: bool) -> Self {
        CrashNotifier { reporter, enabled }
    }

    pub fn notify(&self, severity: Severity, message: &str) {
        if !self.enabled {
            return;
        }
        self.reporter.capture_event(severity, CRASH_SOURCE_TAG, message);
    }

    /// Gives the reporter up to `timeout` to deliver queued events.
    ///
    /// The reporter's flush blocks, so it runs on the blocking pool.
    pub async fn flush(&self, timeout: Duration) {
        if !self.enabled {
            return;
        }
        let reporter = Arc::clone(&self.reporter);
        match tokio::task::spawn_blocking(move || reporter.flush(timeout)).await {
            Ok(true) => {}
            Ok(false) => debug!("Crash events still queued after {timeout:?}"),
            Err(e) => debug!("Crash reporter flush failed: {e}"),
        }
    }
}

impl std::fmt::Debug for CrashNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashNotifier")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
