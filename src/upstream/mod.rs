// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Upstream conversational service
//
// Two collaborators sit at this boundary: a session provider that creates a
// conversation thread, and a transport that posts an inference transcript
// and yields the response body as raw NDJSON lines. Both are traits so the
// HTTP handlers can be tested against in-memory fakes.

mod client;
mod payload;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

pub use client::{ReqwestUpstreamClient, USER_AGENT};
pub use payload::{build_inference_payload, build_thread_payload, normalize_block_id, InferenceParams};

/// Raw NDJSON lines from an inference response, produced lazily.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The upstream rejected our credentials (HTTP 401).
    #[error("upstream authentication failed: {0}")]
    Authentication(String),

    /// The upstream is throttling us (HTTP 429).
    #[error("upstream rate limit exceeded: {0}")]
    RateLimit(String),

    /// The upstream answered with another non-success status.
    #[error("upstream request failed with HTTP {status}: {message}")]
    Request { status: u16, message: String },

    /// Network or protocol failure before or during the response body.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// No response within the configured bound.
    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

// ---------------------------------------------------------------------------
// Thread kinds
// ---------------------------------------------------------------------------

/// Conversation thread flavor, chosen from the backend model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    /// Direct-snapshot chat threads used by `vertex-` backends.
    MarkdownChat,
    /// Patch-streaming workflow threads used by every other backend.
    Workflow,
}

impl ThreadKind {
    pub fn for_backend(backend: &str) -> Self {
        if backend.starts_with("vertex-") {
            ThreadKind::MarkdownChat
        } else {
            ThreadKind::Workflow
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreadKind::MarkdownChat => "markdown-chat",
            ThreadKind::Workflow => "workflow",
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Creates conversation threads on the upstream.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create a new thread of the given kind and return its id.
    async fn create_thread(&self, kind: ThreadKind) -> Result<String, UpstreamError>;
}

/// Posts an inference transcript and streams back the response lines.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fails before any line is produced on connection errors and on
    /// authentication, rate-limit or other non-success statuses. Failures
    /// after that surface as an `Err` item in the returned stream.
    async fn post_streaming(&self, payload: serde_json::Value) -> Result<LineStream, UpstreamError>;
}
