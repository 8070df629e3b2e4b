// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background task shipping buffered records to the log intake.
//!
//! # Triggers
//!
//! The flusher wakes up every poll interval and ships the whole buffer when it
//! is non-empty and either
//!
//! - it holds at least `high_water_mark` records (bounds memory), or
//! - the next scheduled flush time has passed (bounds staleness).
//!
//! Each flush reschedules the next one `flush_interval` later.
//!
//! # Shutdown
//!
//! The HTTP stack is not safe to start using once the process is tearing down,
//! so the shutdown token is checked again right before every send. A batch
//! drained after shutdown began is dropped rather than sent. A send already in
//! flight is left to finish or time out.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::buffer::RecordBuffer;
use crate::config::TelemetryConfig;
use crate::transport::{LogTransport, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    pub high_water_mark: usize,
    pub flush_interval: Duration,
    pub poll_interval: Duration,
}

impl From<&TelemetryConfig> for FlushPolicy {
    fn from(config: &TelemetryConfig) -> Self {
        FlushPolicy {
            high_water_mark: config.high_water_mark,
            flush_interval: config.flush_interval,
            poll_interval: config.poll_interval,
        }
    }
}

/// Size and time conditions deciding when the buffer is shipped.
#[derive(Debug, Clone, Copy)]
pub struct FlushTrigger {
    next_flush: Instant,
    high_water_mark: usize,
    flush_interval: Duration,
}

impl FlushTrigger {
    /// The first time-based flush is due one interval after `now`.
    #[must_use]
    pub fn new(policy: &FlushPolicy, now: Instant) -> Self {
        FlushTrigger {
            next_flush: now + policy.flush_interval,
            high_water_mark: policy.high_water_mark,
            flush_interval: policy.flush_interval,
        }
    }

    #[must_use]
    pub fn should_flush(&self, size: usize, now: Instant) -> bool {
        size > 0 && (size >= self.high_water_mark || now >= self.next_flush)
    }

    pub fn reschedule(&mut self, now: Instant) {
        self.next_flush = now + self.flush_interval;
    }

    #[cfg(test)]
    fn next_flush(&self) -> Instant {
        self.next_flush
    }
}

/// What a single poll of the buffer ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No trigger fired.
    Idle,
    /// A batch of this many records was accepted by the transport.
    Sent(usize),
    /// A batch of this many records was dropped: the send failed.
    Failed(usize),
    /// A batch of this many records was dropped: shutdown began before sending.
    Aborted(usize),
}

pub struct Flusher {
    buffer: Arc<RecordBuffer>,
    transport: Arc<dyn LogTransport>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    trigger: FlushTrigger,
}

impl Flusher {
    #[must_use]
    pub fn new(
        buffer: Arc<RecordBuffer>,
        transport: Arc<dyn LogTransport>,
        shutdown: CancellationToken,
        policy: FlushPolicy,
    ) -> Self {
        Flusher {
            buffer,
            transport,
            shutdown,
            poll_interval: policy.poll_interval,
            trigger: FlushTrigger::new(&policy, Instant::now()),
        }
    }

    /// Spawns [`Flusher::run`] on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Polls the buffer until the shutdown token is cancelled.
    pub async fn run(mut self) {
        debug!("Log flusher started");
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = sleep(self.poll_interval) => {}
            }
            self.poll_once().await;
        }
        debug!("Log flusher stopped");
    }

    pub async fn poll_once(&mut self) -> FlushOutcome {
        let now = Instant::now();
        if !self.trigger.should_flush(self.buffer.size(), now) {
            return FlushOutcome::Idle;
        }

        let records = self.buffer.drain_all();
        self.trigger.reschedule(now);
        let count = records.len();

        let payload = match Payload::from_records(&records) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Dropping batch of {count} records: {e}");
                return FlushOutcome::Failed(count);
            }
        };
        drop(records);

        if self.shutdown.is_cancelled() {
            debug!("Shutdown in progress, dropping batch of {count} records");
            return FlushOutcome::Aborted(count);
        }

        match self.transport.post(payload).await {
            Ok(()) => {
                debug!("Flushed {count} records");
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                debug!("Failed to flush {count} records, batch dropped: {e}");
                FlushOutcome::Failed(count)
            }
        }
    }
}
