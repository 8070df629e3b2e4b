// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bridge from the host's `tracing` events to the telemetry service.
//!
//! [`TelemetryLayer`] is installed next to the host's formatting layer. It
//! renders the events its [`LogListener`] wants and hands them over; the
//! [`DispatchAdapter`] listener keeps only Error and Fatal lines from
//! application targets and records them.
//!
//! ```rust,ignore
//! let service = TelemetryService::initialize(&config)?;
//! tracing_subscriber::registry()
//!     .with(fmt_layer)
//!     .with(TelemetryLayer::new(DispatchAdapter::new(&service)))
//!     .init();
//! ```

use std::fmt::{self, Write as _};
use std::sync::{Arc, Weak};

use tracing_core::field::{Field, Visit};
use tracing_core::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::record::Severity;
use crate::service::TelemetryService;

/// Target of log lines meant only for the local console. Never shipped.
pub const LOCAL_ECHO_TARGET: &str = "stdout";

/// Boolean event field promoting an ERROR event to [`Severity::Fatal`].
pub const FATAL_FIELD: &str = "fatal";

// Events emitted by this crate are never fed back into it.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// One rendered log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEvent<'a> {
    pub severity: Severity,
    /// Where the line came from: the `tracing` target.
    pub source_id: &'a str,
    pub message: &'a str,
}

pub trait LogListener: Send + Sync {
    fn on_log_event(&self, event: &LogEvent<'_>);

    /// Whether events of `severity` are worth rendering for this listener.
    fn wants(&self, _severity: Severity) -> bool {
        true
    }
}

/// Listener feeding severe application log lines into a [`TelemetryService`].
///
/// Holds the service weakly: once the host drops it, events are ignored.
#[derive(Debug, Clone)]
pub struct DispatchAdapter {
    service: Weak<TelemetryService>,
}

impl DispatchAdapter {
    #[must_use]
    pub fn new(service: &Arc<TelemetryService>) -> Self {
        DispatchAdapter {
            service: Arc::downgrade(service),
        }
    }
}

impl LogListener for DispatchAdapter {
    fn wants(&self, severity: Severity) -> bool {
        severity.is_severe()
    }

    fn on_log_event(&self, event: &LogEvent<'_>) {
        if !event.severity.is_severe() || is_ignored_source(event.source_id) {
            return;
        }
        let Some(service) = self.service.upgrade() else {
            return;
        };
        if !service.is_enabled() {
            return;
        }
        service.record(event.severity, event.message);
    }
}

fn is_ignored_source(source_id: &str) -> bool {
    source_id == LOCAL_ECHO_TARGET
        || source_id
            .strip_prefix(OWN_TARGET)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// [`Layer`] rendering each `tracing` event and passing it to a listener.
///
/// The rendered text is the `message` field followed by the other fields as
/// `key=value`, in recording order.
#[derive(Debug, Clone)]
pub struct TelemetryLayer<L> {
    listener: L,
}

impl<L: LogListener> TelemetryLayer<L> {
    #[must_use]
    pub fn new(listener: L) -> Self {
        TelemetryLayer { listener }
    }

    fn wants_level(&self, level: Level) -> bool {
        match level {
            Level::ERROR => {
                self.listener.wants(Severity::Error) || self.listener.wants(Severity::Fatal)
            }
            _ => self.listener.wants(severity_of(level, false)),
        }
    }
}

impl<S, L> Layer<S> for TelemetryLayer<L>
where
    S: Subscriber,
    L: LogListener + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.wants_level(*metadata.level()) {
            return;
        }
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let severity = severity_of(*metadata.level(), visitor.fatal);
        self.listener.on_log_event(&LogEvent {
            severity,
            source_id: metadata.target(),
            message: &visitor.into_text(),
        });
    }
}

fn severity_of(level: Level, fatal: bool) -> Severity {
    match level {
        Level::ERROR if fatal => Severity::Fatal,
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warning,
        Level::INFO => Severity::Info,
        _ => Severity::Debug,
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: String,
    fatal: bool,
}

impl EventVisitor {
    fn into_text(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }
}

impl Visit for EventVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == FATAL_FIELD {
            self.fatal = value;
            return;
        }
        self.push_field(field, format_args!("{value}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field, format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field, format_args!("{value:?}"));
        }
    }
}
