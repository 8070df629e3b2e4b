// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockito::{Matcher, Server};
use serial_test::serial;
use telemetry_agent::config::NO_TELEMETRY_ENV_VAR;
use telemetry_agent::crash::CrashReporter;
use telemetry_agent::transport::HttpTransport;
use telemetry_agent::{
    Collaborators, DispatchAdapter, LifecycleState, Severity, TelemetryConfig, TelemetryLayer,
    TelemetryService,
};
use tracing_subscriber::layer::SubscriberExt;

#[derive(Default)]
struct CollectingReporter {
    events: Mutex<Vec<(Severity, String)>>,
}

impl CrashReporter for CollectingReporter {
    fn capture_event(&self, severity: Severity, _source_tag: &str, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

fn config(url: String, identity_dir: &tempfile::TempDir) -> TelemetryConfig {
    TelemetryConfig {
        identity_path: identity_dir.path().join("et").join("telemetry.ini"),
        environment: "integration".to_string(),
        logs_intake_url: url,
        api_key: "mock-api-key".to_string(),
        high_water_mark: 3,
        poll_interval: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn start(config: &TelemetryConfig) -> (Arc<TelemetryService>, Arc<CollectingReporter>) {
    let reporter = Arc::new(CollectingReporter::default());
    let transport = Arc::new(HttpTransport::new(config).unwrap());
    let service = TelemetryService::initialize_with(
        config,
        Collaborators {
            crash_reporter: Arc::clone(&reporter) as Arc<dyn CrashReporter>,
            transport,
        },
    )
    .unwrap();
    (service, reporter)
}

async fn wait_until_drained(service: &TelemetryService) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.buffered() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
#[serial]
async fn test_severe_events_reach_both_backends() {
    std::env::remove_var(NO_TELEMETRY_ENV_VAR);
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/input")
        .match_header("DD-API-KEY", "mock-api-key")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""message":"disk full path=/var""#.to_string()),
            Matcher::Regex(r#""level":"Fatal""#.to_string()),
            Matcher::Regex(r#""Environment":"integration""#.to_string()),
        ]))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(format!("{}/v1/input", server.url()), &dir);
    let (service, reporter) = start(&config);
    let subscriber =
        tracing_subscriber::registry().with(TelemetryLayer::new(DispatchAdapter::new(&service)));

    tracing::subscriber::with_default(subscriber, || {
        tracing::warn!(target: "session", "reconnecting");
        tracing::error!(target: "session", path = "/var", "disk full");
        tracing::error!(target: "session", "socket closed");
        tracing::error!(target: "session", fatal = true, "terminating");
    });
    wait_until_drained(&service).await;
    service.shutdown().await;

    mock.assert_async().await;
    let events = reporter.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (Severity::Error, "disk full path=/var".to_string()),
            (Severity::Error, "socket closed".to_string()),
            (Severity::Fatal, "terminating".to_string()),
        ]
    );
    assert!(dir.path().join("et").join("telemetry.ini").exists());
    assert_eq!(service.state(), LifecycleState::Stopped);
}

#[tokio::test]
#[serial]
async fn test_nothing_is_sent_after_shutdown() {
    std::env::remove_var(NO_TELEMETRY_ENV_VAR);
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/input")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(format!("{}/v1/input", server.url()), &dir);
    let (service, reporter) = start(&config);

    service.shutdown().await;
    for i in 0..2000 {
        service.record(Severity::Error, &format!("late {i}"));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    mock.assert_async().await;
    assert_eq!(reporter.events.lock().unwrap().len(), 2000);
    assert_eq!(service.buffered(), 0);
}

#[tokio::test]
#[serial]
async fn test_failed_intake_drops_batch_and_keeps_running() {
    std::env::remove_var(NO_TELEMETRY_ENV_VAR);
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/input")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(format!("{}/v1/input", server.url()), &dir);
    let (service, _reporter) = start(&config);

    for i in 0..3 {
        service.record(Severity::Error, &format!("batch {i}"));
    }
    wait_until_drained(&service).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    mock.assert_async().await;
    assert_eq!(service.state(), LifecycleState::Running);
    service.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_opted_out_service_touches_nothing() {
    std::env::set_var(NO_TELEMETRY_ENV_VAR, "yes");
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/input")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = config(format!("{}/v1/input", server.url()), &dir);
    let (service, reporter) = start(&config);
    std::env::remove_var(NO_TELEMETRY_ENV_VAR);

    for i in 0..100 {
        service.record(Severity::Fatal, &format!("ignored {i}"));
    }
    service.shutdown().await;

    mock.assert_async().await;
    assert!(reporter.events.lock().unwrap().is_empty());
    assert!(!dir.path().join("et").exists());
    assert_eq!(service.state(), LifecycleState::Disabled);
}
