// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded buffer of pending log records.
//!
//! Application threads append, the flusher drains. Once the buffer holds
//! `capacity` records every further append is dropped until the next drain:
//! telemetry must never block or grow without bound inside the host.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::record::{LogRecord, APPLICATION_FIELD, ENVIRONMENT_FIELD, VERSION_FIELD};

/// Process-wide fields stamped on every appended record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordContext {
    pub environment: String,
    pub application: String,
    pub version: String,
}

#[derive(Debug)]
pub struct RecordBuffer {
    records: Mutex<Vec<LogRecord>>,
    capacity: usize,
    context: RecordContext,
}

impl RecordBuffer {
    #[must_use]
    pub fn new(capacity: usize, context: RecordContext) -> Self {
        RecordBuffer {
            records: Mutex::new(Vec::new()),
            capacity,
            context,
        }
    }

    /// Appends `record` with the context fields, or drops it when full.
    pub fn append(&self, mut record: LogRecord) {
        let mut records = self.lock();
        if records.len() >= self.capacity {
            trace!("Record buffer full ({} records), dropping record", self.capacity);
            return;
        }
        record.insert(ENVIRONMENT_FIELD, self.context.environment.as_str());
        record.insert(APPLICATION_FIELD, self.context.application.as_str());
        record.insert(VERSION_FIELD, self.context.version.as_str());
        records.push(record);
    }

    /// Takes every pending record, oldest first, leaving the buffer empty.
    pub fn drain_all(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.lock())
    }

    /// Pending record count. Stale as soon as it returns.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the lock cannot leave the Vec half-written, so a
    // poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
