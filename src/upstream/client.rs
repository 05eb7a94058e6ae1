// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER};
use reqwest::StatusCode;
use uuid::Uuid;

use super::payload::build_thread_payload;
use super::{LineStream, SessionProvider, ThreadKind, Transport, UpstreamError};
use crate::config::{cookie_header, UpstreamConfig};
use crate::stream::ndjson_lines;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

const THREAD_PATH: &str = "/api/v3/saveTransactionsFanout";
const INFERENCE_PATH: &str = "/api/v3/runInferenceTranscript";

/// Longest slice of an error body quoted back in `UpstreamError::Request`.
const ERROR_BODY_PREVIEW: usize = 300;

// ---------------------------------------------------------------------------
// ReqwestUpstreamClient
// ---------------------------------------------------------------------------

/// Session provider and transport backed by one shared reqwest client.
///
/// The connection pool lives inside `reqwest::Client`; clones of this value
/// share it.
#[derive(Clone)]
pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
    config: Arc<UpstreamConfig>,
    headers: HeaderMap,
}

impl ReqwestUpstreamClient {
    pub fn new(client: reqwest::Client, config: Arc<UpstreamConfig>) -> Result<Self, UpstreamError> {
        let headers = build_headers(&config)?;
        Ok(Self {
            client,
            config,
            headers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Fetch the upstream home page once so the first real request does not
    /// pay for connection setup. Failure is logged and otherwise ignored.
    pub async fn warm_up(&self) {
        let mut headers = self.headers.clone();
        headers.remove(ACCEPT);
        let result = self
            .client
            .get(self.url("/"))
            .headers(headers)
            .timeout(self.config.thread_timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("upstream session warm-up succeeded");
            }
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "upstream session warm-up failed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "upstream session warm-up failed");
            }
        }
    }
}

#[async_trait]
impl SessionProvider for ReqwestUpstreamClient {
    async fn create_thread(&self, kind: ThreadKind) -> Result<String, UpstreamError> {
        let thread_id = Uuid::new_v4().to_string();
        let created_ms = chrono::Utc::now().timestamp_millis();
        let payload = build_thread_payload(&self.config, &thread_id, kind, created_ms);

        tracing::info!(thread_id = %thread_id, kind = kind.as_str(), "creating upstream thread");

        let resp = self
            .client
            .post(self.url(THREAD_PATH))
            .headers(self.headers.clone())
            .json(&payload)
            .timeout(self.config.thread_timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        check_status(resp).await?;
        tracing::info!(thread_id = %thread_id, "upstream thread created");
        Ok(thread_id)
    }
}

#[async_trait]
impl Transport for ReqwestUpstreamClient {
    async fn post_streaming(&self, payload: serde_json::Value) -> Result<LineStream, UpstreamError> {
        let request = self
            .client
            .post(self.url(INFERENCE_PATH))
            .headers(self.headers.clone())
            .json(&payload)
            .send();

        // Bounds connect and response headers only; body reads are bounded
        // by the normalizer's total read timeout.
        let resp = tokio::time::timeout(self.config.request_timeout, request)
            .await
            .map_err(|_| {
                UpstreamError::Timeout(format!(
                    "no response headers within {}s",
                    self.config.request_timeout.as_secs()
                ))
            })?
            .map_err(map_send_error)?;

        let resp = check_status(resp).await?;

        let body = resp
            .bytes_stream()
            .map_err(|e| UpstreamError::Transport(e.to_string()))
            .boxed();
        let lines: LineStream = Box::pin(ndjson_lines(body));
        Ok(lines)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_headers(config: &UpstreamConfig) -> Result<HeaderMap, UpstreamError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/x-ndjson"));
    headers.insert(COOKIE, header_value("cookie", &cookie_header(&config.cookie))?);
    headers.insert(
        HeaderName::from_static("x-notion-space-id"),
        header_value("space id", &config.space_id)?,
    );
    headers.insert(
        HeaderName::from_static("x-notion-active-user-header"),
        header_value("user id", &config.user_id)?,
    );
    headers.insert(
        HeaderName::from_static("x-notion-client-version"),
        header_value("client version", &config.client_version)?,
    );
    headers.insert(
        HeaderName::from_static("notion-audit-log-platform"),
        HeaderValue::from_static("web"),
    );
    headers.insert(ORIGIN, HeaderValue::from_static("https://www.notion.so"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.notion.so/"));
    headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    Ok(headers)
}

fn header_value(what: &str, value: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(value)
        .map_err(|_| UpstreamError::Transport(format!("{what} is not a valid header value")))
}

fn map_send_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout(e.to_string())
    } else {
        UpstreamError::Transport(e.to_string())
    }
}

/// Map non-success statuses onto the error taxonomy, passing the response
/// through on success.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = preview(&body);
    tracing::error!(status = status.as_u16(), body = %message, "upstream returned an error status");

    Err(match status {
        StatusCode::UNAUTHORIZED => UpstreamError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimit(message),
        _ => UpstreamError::Request {
            status: status.as_u16(),
            message,
        },
    })
}

fn preview(body: &str) -> String {
    let body = body.trim();
    if body.len() <= ERROR_BODY_PREVIEW {
        return body.to_string();
    }
    let mut end = ERROR_BODY_PREVIEW;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
