// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use telemetry_agent::{
    logger::Formatter,
    signals::{self, ShutdownReason},
    DispatchAdapter, TelemetryConfig, TelemetryLayer, TelemetryService,
};

const HOST_TARGET: &str = "host";
const FATAL_PREFIX: &str = "FATAL ";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("ET_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    // The telemetry layer needs the service, which logs while starting up.
    let (telemetry_layer, telemetry_handle) =
        reload::Layer::new(None::<TelemetryLayer<DispatchAdapter>>);

    #[allow(clippy::expect_used)]
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"))
        .with(fmt::layer().event_format(Formatter))
        .with(telemetry_layer)
        .try_init()
        .expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = TelemetryConfig::from_env();
    let service = match TelemetryService::initialize(&config) {
        Ok(service) => service,
        Err(e) => {
            error!("Error starting telemetry: {e}");
            process::exit(1);
        }
    };
    if let Err(e) =
        telemetry_handle.reload(Some(TelemetryLayer::new(DispatchAdapter::new(&service))))
    {
        error!("Unable to attach telemetry to the log pipeline: {e}");
    }
    info!("Telemetry {}", if service.is_enabled() { "enabled" } else { "disabled" });

    let mut watcher = signals::install(Arc::clone(&service));
    let reason = tokio::select! {
        result = &mut watcher => result.unwrap_or(ShutdownReason::FatalError),
        () = forward_stdin() => {
            debug!("stdin closed");
            service.shutdown().await;
            watcher.await.unwrap_or(ShutdownReason::FatalError)
        }
    };
    debug!("Telemetry host stopping: {reason:?}");
    // Closes the crash reporter client, delivering whatever is still queued.
    drop(service);

    // The blocking stdin reader would otherwise hold the runtime open.
    let code = match reason {
        ShutdownReason::FatalError => 1,
        _ => 0,
    };
    process::exit(code);
}

/// Logs every stdin line as an application error. Lines starting with
/// `FATAL ` are logged as fatal.
async fn forward_stdin() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.strip_prefix(FATAL_PREFIX) {
                Some(message) => error!(target: HOST_TARGET, fatal = true, "{message}"),
                None => error!(target: HOST_TARGET, "{line}"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        }
    }
}
