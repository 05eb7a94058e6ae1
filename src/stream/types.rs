// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Fragments decoded from upstream NDJSON lines, the output chunks the
// normalizer produces, and the errors that end a stream.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// What a fragment does to the accumulated transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// A complete answer snapshot. Replaces everything accumulated so far.
    Final,
    /// Text appended to the running answer.
    Incremental,
    /// Text appended to the running reasoning trace.
    Reasoning,
}

/// One typed unit decoded from an upstream line. `text` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
}

impl Fragment {
    /// Build a fragment, dropping empty payloads at the source.
    pub fn new(kind: FragmentKind, text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            None
        } else {
            Some(Self { kind, text })
        }
    }

    pub fn final_snapshot(text: impl Into<String>) -> Option<Self> {
        Self::new(FragmentKind::Final, text)
    }

    pub fn incremental(text: impl Into<String>) -> Option<Self> {
        Self::new(FragmentKind::Incremental, text)
    }

    pub fn reasoning(text: impl Into<String>) -> Option<Self> {
        Self::new(FragmentKind::Reasoning, text)
    }
}

// ---------------------------------------------------------------------------
// Output chunks
// ---------------------------------------------------------------------------

/// A wire-level unit produced by the normalizer, in emission order.
///
/// A stream always starts with `Role` and ends with exactly one of
/// `Terminal` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    /// Announces the assistant role. Always first.
    Role,
    /// Newly available sanitized answer text.
    Delta(String),
    /// The whole accumulated reasoning trace, sent at most once.
    Reasoning(String),
    /// Normal end of stream with a stop signal.
    Terminal,
    /// Abnormal end of stream. Carries a client-visible message.
    Error(String),
}

impl OutputChunk {
    pub fn is_final(&self) -> bool {
        matches!(self, OutputChunk::Terminal | OutputChunk::Error(_))
    }
}

/// Result of running the pipeline to completion without per-round emission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    /// Sanitized answer text.
    pub answer: String,
    /// Raw accumulated reasoning text (may be empty).
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that end a normalized stream.
///
/// Decode failures never show up here: malformed lines are dropped by the
/// classifier and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The upstream line source failed.
    #[error("upstream stream failed: {0}")]
    Upstream(String),

    /// The upstream stream did not finish within its total read budget.
    #[error("upstream stream exceeded {}s read timeout", .0.as_secs())]
    Timeout(Duration),
}
