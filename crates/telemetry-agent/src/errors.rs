// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use sentry::types::ParseDsnError;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::transport::TransportError;

/// Failures that prevent the telemetry service from starting.
///
/// Once running, nothing in the service fails towards the host: `record`,
/// `notify` and `shutdown` swallow their errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("invalid crash reporter DSN: {0}")]
    CrashReporter(#[from] ParseDsnError),
    #[error("failed to build log transport: {0}")]
    Transport(#[from] TransportError),
    #[error("telemetry must be initialized from within a tokio runtime")]
    NoRuntime,
}
