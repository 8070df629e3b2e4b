// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The telemetry service: ingestion entry points and lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//!   Disabled                      (opted out at construction, terminal)
//!
//!   Running ──begin_shutdown()──> ShuttingDown ──shutdown().await──> Stopped
//! ```
//!
//! Transitions only move forward. Shutdown runs in two phases:
//!
//! 1. [`TelemetryService::begin_shutdown`] flips the state and cancels the
//!    shutdown token. It is synchronous and cheap, so it can run from a signal
//!    watcher or a `Drop` impl. The flusher stops starting new sends as soon as
//!    it observes the token.
//! 2. [`TelemetryService::shutdown`] additionally waits for the flusher task to
//!    exit on an ordinary async task, marks the service stopped and gives the
//!    crash reporter a bounded window to deliver queued events.
//!
//! The flusher handle stays in the service until it has been joined, so a
//! `shutdown()` future dropped mid-wait leaves the next call able to finish.
//!
//! One service is created per process by the host's composition root and
//! shared behind an [`Arc`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use crate::buffer::{RecordBuffer, RecordContext};
use crate::config::TelemetryConfig;
use crate::crash::{CrashNotifier, CrashReporter, NoopReporter, SentryReporter};
use crate::errors::TelemetryError;
use crate::flusher::{FlushPolicy, Flusher};
use crate::identity;
use crate::record::{LogRecord, Severity};
use crate::transport::{HttpTransport, LogTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Disabled = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Disabled,
            1 => LifecycleState::Running,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Stopped,
        }
    }
}

#[derive(Debug)]
struct Lifecycle(AtomicU8);

impl Lifecycle {
    fn new(state: LifecycleState) -> Self {
        Lifecycle(AtomicU8::new(state as u8))
    }

    fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// The external systems the service ships to.
pub struct Collaborators {
    pub crash_reporter: Arc<dyn CrashReporter>,
    pub transport: Arc<dyn LogTransport>,
}

impl Collaborators {
    /// Sentry (when a DSN is configured) and the HTTP log intake.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let crash_reporter: Arc<dyn CrashReporter> = match config.sentry_dsn.as_deref() {
            Some(dsn) => Arc::new(SentryReporter::init(dsn, config)?),
            None => Arc::new(NoopReporter),
        };
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Collaborators {
            crash_reporter,
            transport,
        })
    }
}

pub struct TelemetryService {
    state: Lifecycle,
    buffer: Arc<RecordBuffer>,
    crash: CrashNotifier,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
    crash_flush_timeout: Duration,
    installation_id: Option<Uuid>,
}

impl TelemetryService {
    /// Starts telemetry with the production collaborators.
    ///
    /// Must be called from within a tokio runtime when telemetry is enabled:
    /// the flusher is spawned on it.
    pub fn initialize(config: &TelemetryConfig) -> Result<Arc<Self>, TelemetryError> {
        if !config.telemetry_enabled() {
            return Ok(Arc::new(Self::disabled(config)));
        }
        let collaborators = Collaborators::from_config(config)?;
        Self::initialize_with(config, collaborators)
    }

    /// Starts telemetry with caller-supplied collaborators.
    pub fn initialize_with(
        config: &TelemetryConfig,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>, TelemetryError> {
        if !config.telemetry_enabled() {
            debug!("Telemetry disabled");
            return Ok(Arc::new(Self::disabled(config)));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TelemetryError::NoRuntime);
        }

        let installation_id = identity::load_or_create(&config.identity_path, &config.application)
            .inspect_err(|e| error!("Telemetry bootstrap failed: {e}"))?;
        collaborators
            .crash_reporter
            .set_installation_id(&installation_id);

        let buffer = Arc::new(RecordBuffer::new(
            config.buffer_capacity,
            record_context(config),
        ));
        let shutdown = CancellationToken::new();
        let flusher = Flusher::new(
            Arc::clone(&buffer),
            collaborators.transport,
            shutdown.clone(),
            FlushPolicy::from(config),
        )
        .spawn();
        debug!("Telemetry started for installation {installation_id}");

        Ok(Arc::new(TelemetryService {
            state: Lifecycle::new(LifecycleState::Running),
            buffer,
            crash: CrashNotifier::new(collaborators.crash_reporter, true),
            shutdown,
            flusher: Mutex::new(Some(flusher)),
            crash_flush_timeout: config.crash_flush_timeout,
            installation_id: Some(installation_id),
        }))
    }

    fn disabled(config: &TelemetryConfig) -> Self {
        TelemetryService {
            state: Lifecycle::new(LifecycleState::Disabled),
            buffer: Arc::new(RecordBuffer::new(0, record_context(config))),
            crash: CrashNotifier::new(Arc::new(NoopReporter), false),
            shutdown: CancellationToken::new(),
            flusher: Mutex::new(None),
            crash_flush_timeout: config.crash_flush_timeout,
            installation_id: None,
        }
    }

    /// Captures one log line.
    ///
    /// Error and Fatal lines reach the crash reporter immediately. Every line
    /// is buffered for the log intake while the service is running.
    pub fn record(&self, severity: Severity, message: &str) {
        let state = self.state();
        if state == LifecycleState::Disabled {
            return;
        }
        if severity.is_severe() {
            self.crash.notify(severity, message);
        }
        if state == LifecycleState::Running {
            self.buffer.append(LogRecord::new(severity, message));
        }
    }

    /// Sends an event straight to the crash reporter.
    pub fn notify(&self, severity: Severity, message: &str) {
        self.crash.notify(severity, message);
    }

    /// First shutdown phase: stop new sends. Idempotent.
    pub fn begin_shutdown(&self) {
        if self
            .state
            .transition(LifecycleState::Running, LifecycleState::ShuttingDown)
        {
            debug!("Shutting down telemetry");
            self.shutdown.cancel();
        }
    }

    /// Full shutdown: stops new sends, waits for the flusher to exit, then
    /// flushes the crash reporter.
    ///
    /// Safe to call any number of times, from any task, and safe to cancel:
    /// every call that runs to completion returns with the service stopped.
    pub async fn shutdown(&self) {
        if self.state() == LifecycleState::Disabled {
            return;
        }
        self.begin_shutdown();

        let mut flusher = self.flusher.lock().await;
        let Some(handle) = flusher.as_mut() else {
            return;
        };
        if let Err(e) = handle.await {
            debug!("Log flusher task ended abnormally: {e}");
        }
        *flusher = None;
        self.state
            .transition(LifecycleState::ShuttingDown, LifecycleState::Stopped);
        debug!("Telemetry stopped");

        self.crash.flush(self.crash_flush_timeout).await;
    }

    /// Resolves once shutdown has begun. Never resolves for a disabled service.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await;
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state() != LifecycleState::Disabled
    }

    #[must_use]
    pub fn installation_id(&self) -> Option<Uuid> {
        self.installation_id
    }

    /// Records currently waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.size()
    }
}

impl Drop for TelemetryService {
    fn drop(&mut self) {
        if self.state() == LifecycleState::Running {
            error!("Telemetry service destroyed without a shutdown");
            self.begin_shutdown();
        }
    }
}

impl std::fmt::Debug for TelemetryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryService")
            .field("state", &self.state())
            .field("buffered", &self.buffered())
            .field("installation_id", &self.installation_id)
            .finish_non_exhaustive()
    }
}

fn record_context(config: &TelemetryConfig) -> RecordContext {
    RecordContext {
        environment: config.environment.clone(),
        application: config.application.clone(),
        version: config.version.clone(),
    }
}
