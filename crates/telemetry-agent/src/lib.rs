// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process crash and error-log telemetry.
//!
//! Severe log lines from the host application are forwarded to a crash
//! backend as they happen, and every captured line is buffered and shipped to
//! an HTTP log intake in batches, by size or by age. Shutdown is two-phase so
//! that no network I/O starts once the process has begun terminating.
//!
//! ```text
//! tracing event -> TelemetryLayer -> DispatchAdapter -> TelemetryService::record
//!                                                        |-> CrashNotifier (Error/Fatal)
//!                                                        '-> RecordBuffer -> Flusher -> LogTransport
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod config;
pub mod crash;
pub mod dispatch;
pub mod errors;
pub mod flusher;
pub mod identity;
pub mod logger;
pub mod record;
pub mod service;
pub mod signals;
pub mod transport;

pub use config::TelemetryConfig;
pub use dispatch::{DispatchAdapter, TelemetryLayer};
pub use errors::TelemetryError;
pub use record::{LogRecord, Severity};
pub use service::{Collaborators, LifecycleState, TelemetryService};
