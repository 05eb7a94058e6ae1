// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Chat completions endpoint, streaming (SSE) and non-streaming
// - Bearer API-key check and per-client rate limiting
// - Model listing, health and banner endpoints
// - OpenAI-style JSON error bodies
// - 404 for unknown paths

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_stream::StreamExt;

use crate::config::{Config, ModelConfig};
use crate::message::ChatRequest;
use crate::normalize::ArtifactSanitizer;
use crate::ratelimit::{FixedWindowRateLimiter, RateDecision, RateLimiter, Unlimited};
use crate::stream::{NdjsonClassifier, SseEncoder, StreamError, StreamNormalizer};
use crate::upstream::{
    build_inference_payload, InferenceParams, SessionProvider, ThreadKind, Transport,
    UpstreamError,
};

/// Largest request body accepted on `/v1/chat/completions`.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to clients as `{"error":{"message","type","code"}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("request body is empty")]
    EmptyBody,

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("model not supported: {0}")]
    InvalidModel(String),

    #[error("failed to create conversation thread: {0}")]
    ThreadCreation(UpstreamError),

    #[error("{0}")]
    Upstream(UpstreamError),

    #[error("{0}")]
    Stream(StreamError),

    #[error("unknown path: {0}")]
    NotFound(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            ApiError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
            ApiError::EmptyBody | ApiError::BodyRead(_) | ApiError::MalformedJson(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            ApiError::InvalidModel(_) => (StatusCode::BAD_REQUEST, "invalid_model"),
            ApiError::ThreadCreation(e) => match e {
                UpstreamError::Authentication(_) | UpstreamError::RateLimit(_) => {
                    upstream_status(e)
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "thread_creation_error"),
            },
            ApiError::Upstream(e) => upstream_status(e),
            ApiError::Stream(StreamError::Timeout(_)) => (StatusCode::GATEWAY_TIMEOUT, "request_error"),
            ApiError::Stream(StreamError::Upstream(_)) => (StatusCode::BAD_GATEWAY, "request_error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        }
    }
}

fn upstream_status(e: &UpstreamError) -> (StatusCode, &'static str) {
    match e {
        UpstreamError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
        UpstreamError::RateLimit(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
        UpstreamError::Request { .. } | UpstreamError::Transport(_) => {
            (StatusCode::BAD_GATEWAY, "request_error")
        }
        UpstreamError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "request_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_type();
        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
                "code": status.as_u16(),
            }
        });
        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionProvider>,
    pub transport: Arc<dyn Transport>,
    pub normalizer: StreamNormalizer,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// Wire the default normalizer and rate limiter from config around the
    /// given upstream collaborators.
    pub fn new(
        config: Arc<Config>,
        sessions: Arc<dyn SessionProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let sanitizer = ArtifactSanitizer::new(config.sanitizer.leak_patterns.clone());
        let normalizer = StreamNormalizer::new(
            Arc::new(NdjsonClassifier::new()),
            Arc::new(sanitizer),
            config.upstream.stream_read_timeout,
        );
        let rate_limiter: Arc<dyn RateLimiter> = if config.rate_limit.enabled {
            Arc::new(FixedWindowRateLimiter::new(config.rate_limit.requests_per_minute))
        } else {
            Arc::new(Unlimited)
        };
        Self {
            config,
            sessions,
            transport,
            normalizer,
            rate_limiter,
        }
    }
}

// ---------------------------------------------------------------------------
// Request guards
// ---------------------------------------------------------------------------

/// Check `Authorization: Bearer <key>` when an API key is configured.
fn authorize(config: &Config, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = config.server.required_key() else {
        return Ok(());
    };

    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !value.to_ascii_lowercase().contains("bearer") {
        return Err(ApiError::Unauthorized("bearer token required".into()));
    }
    let token = value.rsplit(' ').next().unwrap_or_default();
    if token != expected {
        return Err(ApiError::Unauthorized("invalid API key".into()));
    }
    Ok(())
}

/// Client identity for rate limiting: the peer IP, or "unknown".
fn client_key<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn resolve_model<'a>(config: &'a Config, requested: Option<&str>) -> Result<&'a ModelConfig, ApiError> {
    let name = requested.unwrap_or(&config.models.default_model);
    config
        .models
        .find(name)
        .ok_or_else(|| ApiError::InvalidModel(name.to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/chat/completions
///
/// Pre-stream failures (auth, rate limit, bad request, thread creation,
/// upstream status) are returned as plain HTTP errors. Once the SSE body has
/// started, failures arrive as an error chunk followed by `[DONE]`.
pub async fn chat_completions(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    authorize(&state.config, request.headers())?;

    let client = client_key(&request);
    if let RateDecision::Limited { retry_after } = state.rate_limiter.check(&client) {
        tracing::warn!(client = %client, "rate limit exceeded");
        return Err(ApiError::RateLimited {
            retry_after_secs: retry_after.as_secs().max(1),
        });
    }

    let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BodyRead(e.to_string()))?;
    if body.is_empty() {
        return Err(ApiError::EmptyBody);
    }
    let chat: ChatRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::MalformedJson(e.to_string()))?;

    let model = resolve_model(&state.config, chat.model.as_deref())?;
    let kind = ThreadKind::for_backend(&model.backend);
    let request_id = format!("chatcmpl-{}", uuid::Uuid::new_v4());

    tracing::info!(
        request_id = %request_id,
        model = %model.name,
        backend = %model.backend,
        stream = chat.stream,
        include_reasoning = chat.include_reasoning,
        messages = chat.messages.len(),
        turns = chat.conversation().count(),
        "chat completion request"
    );

    let thread_id = state
        .sessions
        .create_thread(kind)
        .await
        .map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "thread creation failed");
            ApiError::ThreadCreation(e)
        })?;

    let payload = build_inference_payload(
        &state.config.upstream,
        &InferenceParams {
            thread_id: &thread_id,
            backend: &model.backend,
            kind,
            block_id: chat.notion_block_id.as_deref(),
            messages: &chat.messages,
            now: chrono::Local::now().fixed_offset(),
        },
    );

    let lines = state.transport.post_streaming(payload).await.map_err(|e| {
        tracing::error!(request_id = %request_id, thread_id = %thread_id, error = %e, "upstream inference failed");
        ApiError::Upstream(e)
    })?;

    let created = chrono::Utc::now().timestamp();

    if chat.stream {
        let encoder = SseEncoder::new(request_id, model.name.clone(), created);
        let chunks = state
            .normalizer
            .normalize_stream(lines, chat.include_reasoning)
            .map(move |chunk| Ok::<_, Infallible>(encoder.encode(&chunk)));

        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(chunks),
        )
            .into_response());
    }

    let completion = state
        .normalizer
        .normalize_complete(lines, chat.include_reasoning)
        .await
        .map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "upstream stream failed");
            ApiError::Stream(e)
        })?;

    tracing::info!(
        request_id = %request_id,
        answer_len = completion.answer.len(),
        reasoning_len = completion.reasoning.len(),
        "chat completion finished"
    );

    let mut message = json!({"role": "assistant", "content": completion.answer});
    if chat.include_reasoning && !completion.reasoning.is_empty() {
        message["reasoning_content"] = json!(completion.reasoning);
    }

    Ok(Json(json!({
        "id": request_id,
        "object": "chat.completion",
        "created": created,
        "model": model.name,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0},
    }))
    .into_response())
}

/// GET /v1/models
pub async fn list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state.config, &headers)?;
    let created = chrono::Utc::now().timestamp();
    let data: Vec<_> = state
        .config
        .models
        .available
        .iter()
        .map(|m| {
            json!({
                "id": m.name,
                "object": "model",
                "created": created,
                "owned_by": state.config.models.owned_by,
            })
        })
        .collect();
    Ok(Json(json!({"object": "list", "data": data})))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

/// GET /
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("chatbridge v{}", env!("CARGO_PKG_VERSION")),
        "status": "running",
        "endpoints": {
            "chat": "/v1/chat/completions",
            "models": "/v1/models",
            "health": "/health",
        }
    }))
}

async fn not_found(request: Request<Body>) -> ApiError {
    ApiError::NotFound(request.uri().path().to_string())
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. Collaborators are injected through `state`; the
/// router itself opens no connections.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, StringSource};
    use crate::upstream::LineStream;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt; // for oneshot

    const TEST_YAML: &str = r#"chatbridge: v1
upstream:
  cookie: "abc"
  space_id: "space-1"
  user_id: "user-1"
models:
  default: "fast"
  available:
    - name: "fast"
      backend: "openai-turbo"
    - name: "flash"
      backend: "vertex-gemini-2.5-flash"
"#;

    const NO_RATE_LIMIT: &str = "rate_limit:\n  enabled: false\n";

    fn load(extra: &str) -> Arc<Config> {
        let content = format!("{TEST_YAML}{extra}");
        Arc::new(load_config(&StringSource { content }).unwrap())
    }

    /// Test config with rate limiting off plus `extra` top-level sections.
    fn config_with(extra: &str) -> Arc<Config> {
        load(&format!("{NO_RATE_LIMIT}{extra}"))
    }

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    /// Session provider that hands out sequential ids, or fails.
    struct FakeSessions {
        fail_with: Option<UpstreamError>,
        kinds: Mutex<Vec<ThreadKind>>,
    }

    impl FakeSessions {
        fn ok() -> Self {
            Self {
                fail_with: None,
                kinds: Mutex::new(Vec::new()),
            }
        }

        fn failing(e: UpstreamError) -> Self {
            Self {
                fail_with: Some(e),
                kinds: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionProvider for FakeSessions {
        async fn create_thread(&self, kind: ThreadKind) -> Result<String, UpstreamError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            let mut kinds = self.kinds.lock().unwrap();
            kinds.push(kind);
            Ok(format!("thread-{}", kinds.len()))
        }
    }

    /// Transport that replays canned NDJSON lines and records payloads.
    struct FakeTransport {
        lines: Vec<Result<Bytes, UpstreamError>>,
        fail_with: Option<UpstreamError>,
        payloads: Mutex<Vec<serde_json::Value>>,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn with_lines(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| Ok(Bytes::from(l.to_string()))).collect(),
                fail_with: None,
                payloads: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_items(lines: Vec<Result<Bytes, UpstreamError>>) -> Self {
            Self {
                lines,
                fail_with: None,
                payloads: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(e: UpstreamError) -> Self {
            Self {
                fail_with: Some(e),
                ..Self::with_lines(&[])
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn post_streaming(&self, payload: serde_json::Value) -> Result<LineStream, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payloads.lock().unwrap().push(payload);
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            let lines: LineStream = Box::pin(tokio_stream::iter(self.lines.clone()));
            Ok(lines)
        }
    }

    fn app_with(
        config: Arc<Config>,
        sessions: Arc<FakeSessions>,
        transport: Arc<FakeTransport>,
    ) -> Router {
        build_router(AppState::new(config, sessions, transport))
    }

    fn default_app(transport: Arc<FakeTransport>) -> Router {
        app_with(config_with(""), Arc::new(FakeSessions::ok()), transport)
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        serde_json::from_str(&body_string(resp).await).unwrap()
    }

    /// JSON payloads of every `data:` event except `[DONE]`.
    fn sse_events(body: &str) -> Vec<serde_json::Value> {
        body.split("\n\n")
            .filter_map(|e| e.strip_prefix("data: "))
            .filter(|d| *d != "[DONE]")
            .map(|d| serde_json::from_str(d).unwrap())
            .collect()
    }

    const HELLO_LINES: &[&str] = &[
        r#"{"type":"patch","v":[{"o":"x","p":"/s/2/value","v":"<lang primary=\"en\"/>Hel"}]}"#,
        r#"{"type":"patch","v":[{"o":"x","p":"/s/2/value","v":"lo"}]}"#,
    ];

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn streaming_response_is_well_formed_sse() {
        let app = default_app(Arc::new(FakeTransport::with_lines(HELLO_LINES)));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");

        let body = body_string(resp).await;
        assert!(body.ends_with("data: [DONE]\n\n"));

        let events = sse_events(&body);
        assert_eq!(events.first().unwrap()["choices"][0]["delta"]["role"], "assistant");
        let last = events.last().unwrap();
        assert_eq!(last["choices"][0]["finish_reason"], "stop");

        let content: String = events
            .iter()
            .filter_map(|e| e["choices"][0]["delta"]["content"].as_str())
            .collect();
        assert_eq!(content, "Hello");

        let id = events[0]["id"].as_str().unwrap();
        assert!(id.starts_with("chatcmpl-"));
        assert!(events.iter().all(|e| e["id"] == id && e["model"] == "fast"));
    }

    #[tokio::test]
    async fn streaming_reasoning_only_when_requested() {
        let lines = &[r#"{"type":"markdown-chat","value":"<thinking>plan</thinking>Answer"}"#];

        let app = default_app(Arc::new(FakeTransport::with_lines(lines)));
        let resp = app
            .oneshot(chat_request(
                r#"{"include_reasoning":true,"messages":[{"role":"user","content":"q"}]}"#,
            ))
            .await
            .unwrap();
        let events = sse_events(&body_string(resp).await);
        assert_eq!(events[1]["choices"][0]["delta"]["reasoning_content"], "plan");
        assert_eq!(events[2]["choices"][0]["delta"]["content"], "Answer");

        let app = default_app(Arc::new(FakeTransport::with_lines(lines)));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"q"}]}"#))
            .await
            .unwrap();
        let body = body_string(resp).await;
        assert!(!body.contains("reasoning_content"));
        assert!(!body.contains("plan"));
    }

    #[tokio::test]
    async fn mid_stream_failure_becomes_error_chunk() {
        let transport = FakeTransport::with_items(vec![
            Ok(Bytes::from(HELLO_LINES[0])),
            Err(UpstreamError::Transport("connection reset".into())),
        ]);
        let app = default_app(Arc::new(transport));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_string(resp).await;
        assert!(body.ends_with("data: [DONE]\n\n"));
        let events = sse_events(&body);
        let last = events.last().unwrap();
        assert_eq!(last["error"]["type"], "internal_server_error");
        assert!(last["error"]["message"].as_str().unwrap().contains("connection reset"));
        assert!(!body.contains("\"finish_reason\":\"stop\""));
    }

    // -----------------------------------------------------------------------
    // Non-streaming
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn non_streaming_returns_completion_object() {
        let app = default_app(Arc::new(FakeTransport::with_lines(HELLO_LINES)));
        let resp = app
            .oneshot(chat_request(
                r#"{"model":"fast","stream":false,"messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["object"], "chat.completion");
        assert_eq!(v["model"], "fast");
        assert_eq!(v["choices"][0]["message"]["role"], "assistant");
        assert_eq!(v["choices"][0]["message"]["content"], "Hello");
        assert!(v["choices"][0]["message"].get("reasoning_content").is_none());
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
        assert_eq!(v["usage"]["total_tokens"], 0);
    }

    #[tokio::test]
    async fn non_streaming_includes_reasoning_when_requested() {
        let lines = &[r#"{"type":"markdown-chat","value":"<thought>why</thought>Because."}"#];
        let app = default_app(Arc::new(FakeTransport::with_lines(lines)));
        let resp = app
            .oneshot(chat_request(
                r#"{"stream":false,"include_reasoning":true,"messages":[{"role":"user","content":"q"}]}"#,
            ))
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["choices"][0]["message"]["content"], "Because.");
        assert_eq!(v["choices"][0]["message"]["reasoning_content"], "why");
    }

    #[tokio::test]
    async fn non_streaming_upstream_failure_is_502() {
        let transport = FakeTransport::with_items(vec![Err(UpstreamError::Transport("eof".into()))]);
        let app = default_app(Arc::new(transport));
        let resp = app
            .oneshot(chat_request(r#"{"stream":false,"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    // -----------------------------------------------------------------------
    // Model mapping and payload
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_model_is_400_invalid_model() {
        let transport = Arc::new(FakeTransport::with_lines(HELLO_LINES));
        let app = default_app(transport.clone());
        let resp = app
            .oneshot(chat_request(r#"{"model":"nope","messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = body_json(resp).await;
        assert_eq!(v["error"]["type"], "invalid_model");
        assert_eq!(v["error"]["code"], 400);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn vertex_model_uses_markdown_chat_thread() {
        let sessions = Arc::new(FakeSessions::ok());
        let transport = Arc::new(FakeTransport::with_lines(HELLO_LINES));
        let app = app_with(config_with(""), sessions.clone(), transport.clone());
        let resp = app
            .oneshot(chat_request(
                r#"{"model":"flash","notion_block_id":"0123456789abcdef0123456789abcdef","messages":[{"role":"system","content":"s"},{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let _ = body_string(resp).await;

        assert_eq!(*sessions.kinds.lock().unwrap(), vec![ThreadKind::MarkdownChat]);
        let payloads = transport.payloads.lock().unwrap();
        let p = &payloads[0];
        assert_eq!(p["threadId"], "thread-1");
        assert_eq!(p["threadType"], "markdown-chat");
        assert_eq!(p["transcript"][0]["value"]["model"], "vertex-gemini-2.5-flash");
        assert_eq!(
            p["transcript"][1]["value"]["blockId"],
            "01234567-89ab-cdef-0123-456789abcdef"
        );
        // config + context + one user step; the system message is skipped
        assert_eq!(p["transcript"].as_array().unwrap().len(), 3);
    }

    // -----------------------------------------------------------------------
    // Pre-stream failures
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn thread_creation_auth_failure_is_401_before_stream() {
        let app = app_with(
            config_with(""),
            Arc::new(FakeSessions::failing(UpstreamError::Authentication("bad cookie".into()))),
            Arc::new(FakeTransport::with_lines(HELLO_LINES)),
        );
        let resp = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_ne!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
        let v = body_json(resp).await;
        assert_eq!(v["error"]["type"], "authentication_error");
    }

    #[tokio::test]
    async fn thread_creation_other_failure_is_500() {
        let app = app_with(
            config_with(""),
            Arc::new(FakeSessions::failing(UpstreamError::Transport("dns".into()))),
            Arc::new(FakeTransport::with_lines(HELLO_LINES)),
        );
        let resp = app
            .oneshot(chat_request(r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v = body_json(resp).await;
        assert_eq!(v["error"]["type"], "thread_creation_error");
    }

    #[tokio::test]
    async fn upstream_rate_limit_is_429() {
        let app = default_app(Arc::new(FakeTransport::failing(UpstreamError::RateLimit(
            "slow down".into(),
        ))));
        let resp = app
            .oneshot(chat_request(r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn malformed_json_returns_400() {
        let app = default_app(Arc::new(FakeTransport::with_lines(&[])));
        let resp = app.oneshot(chat_request("this is not json {{{")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_string(resp).await;
        assert!(body.contains("not valid JSON"), "got: {body}");
    }

    #[tokio::test]
    async fn empty_body_returns_400() {
        let app = default_app(Arc::new(FakeTransport::with_lines(&[])));
        let resp = app.oneshot(chat_request("")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_string(resp).await;
        assert!(body.contains("empty"), "got: {body}");
    }

    // -----------------------------------------------------------------------
    // Auth and rate limiting
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn api_key_required_when_configured() {
        let config = config_with("server:\n  api_master_key: \"sk-test\"\n");
        let transport = Arc::new(FakeTransport::with_lines(HELLO_LINES));

        let app = app_with(config.clone(), Arc::new(FakeSessions::ok()), transport.clone());
        let resp = app
            .oneshot(chat_request(r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let app = app_with(config.clone(), Arc::new(FakeSessions::ok()), transport.clone());
        let mut req = chat_request(r#"{"messages":[]}"#);
        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let app = app_with(config, Arc::new(FakeSessions::ok()), transport);
        let mut req = chat_request(r#"{"messages":[]}"#);
        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-test"));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn models_endpoint_also_requires_key() {
        let config = config_with("server:\n  api_master_key: \"sk-test\"\n");
        let app = app_with(
            config,
            Arc::new(FakeSessions::ok()),
            Arc::new(FakeTransport::with_lines(&[])),
        );
        let req = Request::builder()
            .uri("/v1/models")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_client() {
        let config = load("rate_limit:\n  enabled: true\n  requests_per_minute: 2\n");
        let state = AppState::new(
            config,
            Arc::new(FakeSessions::ok()),
            Arc::new(FakeTransport::with_lines(HELLO_LINES)),
        );
        let app = build_router(state);

        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(chat_request(r#"{"messages":[]}"#))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let _ = body_string(resp).await;
        }

        let resp = app
            .clone()
            .oneshot(chat_request(r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key(header::RETRY_AFTER));
        let v = body_json(resp).await;
        assert_eq!(v["error"]["type"], "rate_limit_error");

        // A different peer has its own window.
        let mut req = chat_request(r#"{"messages":[]}"#);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 5555))));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // -----------------------------------------------------------------------
    // Auxiliary endpoints
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn models_lists_configured_models() {
        let app = default_app(Arc::new(FakeTransport::with_lines(&[])));
        let req = Request::builder()
            .uri("/v1/models")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["object"], "list");
        let ids: Vec<&str> = v["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["fast", "flash"]);
        assert_eq!(v["data"][0]["owned_by"], "chatbridge");
        assert_eq!(v["data"][0]["object"], "model");
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let app = default_app(Arc::new(FakeTransport::with_lines(&[])));
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let app = default_app(Arc::new(FakeTransport::with_lines(&[])));
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let v = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(v["endpoints"]["chat"], "/v1/chat/completions");
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let app = default_app(Arc::new(FakeTransport::with_lines(&[])));
        let req = Request::builder()
            .uri("/v1/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let v = body_json(resp).await;
        assert_eq!(v["error"]["type"], "not_found");
    }

    #[test]
    fn api_error_status_mapping() {
        let cases = [
            (ApiError::EmptyBody, StatusCode::BAD_REQUEST),
            (
                ApiError::Upstream(UpstreamError::Timeout("t".into())),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ApiError::Upstream(UpstreamError::Request {
                    status: 503,
                    message: "x".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::Stream(StreamError::Timeout(std::time::Duration::from_secs(1))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_and_type().0, status, "{err}");
        }
    }
}
