// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of serialized batches to the log intake.
//!
//! The flusher only knows about [`LogTransport`]: one call, one attempt, a
//! success or a failure. [`HttpTransport`] is the production implementation on
//! top of `reqwest`; the connect and request timeouts bound how long a stalled
//! collector can hold up the flusher.

use std::io::Write;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::error;
use zstd::stream::write::Encoder;

use crate::config::TelemetryConfig;
use crate::record::LogRecord;

pub const API_KEY_HEADER: &str = "DD-API-KEY";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),
    #[error("no API key available for the log intake")]
    MissingApiKey,
    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("intake rejected batch with status {0}")]
    Status(StatusCode),
}

/// A batch ready to ship: the serialized JSON array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: Vec<u8>,
}

impl Payload {
    /// Serializes `records` as one JSON array, preserving their order.
    pub fn from_records(records: &[LogRecord]) -> Result<Self, TransportError> {
        Ok(Payload {
            body: serde_json::to_vec(records)?,
        })
    }
}

#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Sends one batch. Exactly one attempt is made.
    async fn post(&self, payload: Payload) -> Result<(), TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
    compression_level: Option<i32>,
}

impl HttpTransport {
    pub fn new(config: &TelemetryConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(HttpTransport {
            client,
            url: config.logs_intake_url.clone(),
            api_key: config.api_key.clone(),
            compression_level: config.compression_level,
        })
    }

    fn headers(&self) -> Result<HeaderMap, TransportError> {
        if self.api_key.is_empty() {
            return Err(TransportError::MissingApiKey);
        }
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(&self.api_key)?;
        api_key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if self.compression_level.is_some() {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
        }
        Ok(headers)
    }

    fn encode(&self, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let Some(level) = self.compression_level else {
            return Ok(body);
        };
        let mut encoder = Encoder::new(Vec::new(), level)?;
        encoder.write_all(&body)?;
        Ok(encoder.finish()?)
    }
}

impl std::fmt::Debug for HttpTransport {
    // never print the key itself
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("compression_level", &self.compression_level)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LogTransport for HttpTransport {
    async fn post(&self, payload: Payload) -> Result<(), TransportError> {
        let headers = self.headers()?;
        let body = self.encode(payload.body)?;
        let resp = self
            .client
            .post(&self.url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            error!("Log intake denied the batch: verify that the API key is valid");
        }
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::Severity;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn test_config(url: String) -> TelemetryConfig {
        TelemetryConfig {
            logs_intake_url: url,
            api_key: "mock-api-key".to_string(),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn payload(n: usize) -> Payload {
        let records: Vec<_> = (0..n)
            .map(|i| LogRecord::new(Severity::Error, format!("message {i}")))
            .collect();
        Payload::from_records(&records).unwrap()
    }

    #[test]
    fn test_payload_is_ordered_json_array() {
        let payload = payload(3);
        let parsed: serde_json::Value = serde_json::from_slice(&payload.body).unwrap();

        let messages: Vec<_> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, vec!["message 0", "message 1", "message 2"]);
    }

    #[test]
    fn test_empty_payload_is_empty_array() {
        let payload = Payload::from_records(&[]).unwrap();
        assert_eq!(payload.body, b"[]");
    }

    #[tokio::test]
    async fn test_post_sends_required_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/input")
            .match_header("DD-API-KEY", "mock-api-key")
            .match_header("Content-Type", "application/json")
            .match_body(Matcher::Regex(r#""message":"message 0""#.to_string()))
            .with_status(202)
            .create_async()
            .await;

        let config = test_config(format!("{}/v1/input", server.url()));
        let transport = HttpTransport::new(&config).unwrap();

        let result = transport.post(payload(1)).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_non_success_is_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/input")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let config = test_config(format!("{}/v1/input", server.url()));
        let transport = HttpTransport::new(&config).unwrap();

        let result = transport.post(payload(1)).await;

        assert!(matches!(
            result,
            Err(TransportError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        ));
        // single attempt, no retry
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_without_api_key_skips_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/input")
            .expect(0)
            .create_async()
            .await;

        let mut config = test_config(format!("{}/v1/input", server.url()));
        config.api_key = String::new();
        let transport = HttpTransport::new(&config).unwrap();

        let result = transport.post(payload(1)).await;

        assert!(matches!(result, Err(TransportError::MissingApiKey)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_compressed_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/input")
            .match_header("Content-Encoding", "zstd")
            .with_status(200)
            .create_async()
            .await;

        let mut config = test_config(format!("{}/v1/input", server.url()));
        config.compression_level = Some(3);
        let transport = HttpTransport::new(&config).unwrap();

        assert!(transport.post(payload(2)).await.is_ok());
        mock.assert_async().await;
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = test_config("http://127.0.0.1:1/".to_string());
        let transport = HttpTransport::new(&config).unwrap();
        assert!(!format!("{transport:?}").contains("mock-api-key"));
    }

    #[test]
    fn test_encode_round_trips_through_zstd() {
        let mut config = test_config("http://127.0.0.1:1/v1/input".to_string());
        config.compression_level = Some(3);
        let transport = HttpTransport::new(&config).unwrap();
        let body = payload(4).body;

        let compressed = transport.encode(body.clone()).unwrap();

        let mut decoder = zstd::stream::read::Decoder::new(&compressed[..]).unwrap();
        let mut decompressed = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decompressed).unwrap();
        assert_eq!(decompressed, body);
    }
}
