// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process termination hooks.
//!
//! Termination signals are received through `tokio::signal`, whose OS-level
//! handler only records the delivery. The watcher task then runs the service
//! shutdown on an ordinary task, where waiting for the flusher is allowed.
//!
//! Fault signals (SIGSEGV, SIGILL, SIGFPE) and SIGKILL cannot be handled this
//! way. Panics reach the crash backend through its panic integration, and the
//! service's `Drop` covers a normal process exit.

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::service::TelemetryService;

/// Why the watcher stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM, SIGHUP or SIGQUIT.
    Terminated,
    /// SIGINT or Ctrl+C.
    UserInterrupt,
    /// The service was shut down by the host.
    GracefulShutdown,
    /// Signal handlers could not be registered.
    FatalError,
}

/// Spawns a task that shuts `service` down on the first termination signal.
///
/// Handlers are registered before this returns, so a signal delivered right
/// after the call is already caught. The task resolves once the service is
/// stopped, with the reason it stopped. The host decides what to do with the
/// process afterwards.
pub fn install(service: Arc<TelemetryService>) -> JoinHandle<ShutdownReason> {
    let signals = service.is_enabled().then(TerminationSignals::register);
    tokio::spawn(async move {
        let reason = match signals {
            Some(signals) => wait_with(&service, signals).await,
            None => ShutdownReason::GracefulShutdown,
        };
        service.shutdown().await;
        reason
    })
}

/// Waits for a termination signal or for the service to start shutting down.
pub async fn wait_for_shutdown_signal(service: &TelemetryService) -> ShutdownReason {
    if !service.is_enabled() {
        return ShutdownReason::GracefulShutdown;
    }
    wait_with(service, TerminationSignals::register()).await
}

async fn wait_with(
    service: &TelemetryService,
    signals: io::Result<TerminationSignals>,
) -> ShutdownReason {
    let mut signals = match signals {
        Ok(signals) => signals,
        Err(e) => {
            error!("Failed to listen for termination signals: {e}");
            return ShutdownReason::FatalError;
        }
    };
    tokio::select! {
        () = service.shutdown_requested() => {
            debug!("Shutdown requested by host");
            ShutdownReason::GracefulShutdown
        }
        reason = signals.recv() => {
            info!("Received termination signal, shutting down telemetry");
            reason
        }
    }
}

#[cfg(unix)]
struct TerminationSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TerminationSignals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(TerminationSignals {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> ShutdownReason {
        tokio::select! {
            _ = self.interrupt.recv() => ShutdownReason::UserInterrupt,
            _ = self.terminate.recv() => ShutdownReason::Terminated,
            _ = self.hangup.recv() => ShutdownReason::Terminated,
            _ = self.quit.recv() => ShutdownReason::Terminated,
        }
    }
}

#[cfg(windows)]
struct TerminationSignals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl TerminationSignals {
    fn register() -> io::Result<Self> {
        Ok(TerminationSignals {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(&mut self) -> ShutdownReason {
        self.ctrl_c.recv().await;
        ShutdownReason::UserInterrupt
    }
}
