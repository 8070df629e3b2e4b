// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record types shared by every stage of the pipeline.
//!
//! A [`LogRecord`] is a flat `field -> value` string map. Keys are kept sorted
//! so the serialized form is stable across runs, which keeps the intake payload
//! easy to diff when debugging.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::Serialize;

/// Field carrying the rendered log text.
pub const MESSAGE_FIELD: &str = "message";
/// Field carrying the [`Severity`] display name.
pub const LEVEL_FIELD: &str = "level";
/// Context field stamped on every record by the buffer.
pub const ENVIRONMENT_FIELD: &str = "Environment";
/// Context field stamped on every record by the buffer.
pub const APPLICATION_FIELD: &str = "Application";
/// Context field stamped on every record by the buffer.
pub const VERSION_FIELD: &str = "Version";

/// Severity of a log line or crash event.
///
/// The display names (`"Debug"`, `"Info"`, ...) are the values shipped in the
/// `level` field of each record.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Whether events of this severity are forwarded to the crash reporter.
    #[must_use]
    pub fn is_severe(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl From<Severity> for sentry::Level {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Debug => sentry::Level::Debug,
            Severity::Info => sentry::Level::Info,
            Severity::Warning => sentry::Level::Warning,
            Severity::Error => sentry::Level::Error,
            Severity::Fatal => sentry::Level::Fatal,
        }
    }
}

/// A single structured log record waiting to be shipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: BTreeMap<String, String>,
}

impl LogRecord {
    /// Builds the `{message, level}` record produced for every captured log line.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        let mut record = Self::default();
        record.insert(MESSAGE_FIELD, message);
        record.insert(LEVEL_FIELD, severity.to_string());
        record
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for LogRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
