// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use super::accumulator::Transcript;
use super::types::OutputChunk;
use crate::normalize::Sanitizer;

/// Turns transcript growth into strictly incremental output chunks.
///
/// Content is emitted by re-sanitizing the whole raw answer and the prefix
/// that was already accounted for, then sending only the difference of the
/// two clean strings. Leak patterns are anchored and may span fragment
/// boundaries, so sanitizing raw deltas on their own would mis-strip.
pub struct ChunkEmitter {
    sanitizer: Arc<dyn Sanitizer>,
    want_reasoning: bool,
    /// Raw answer length (bytes) already accounted for.
    watermark: usize,
    reasoning_sent: bool,
}

impl ChunkEmitter {
    pub fn new(sanitizer: Arc<dyn Sanitizer>, want_reasoning: bool) -> Self {
        Self {
            sanitizer,
            want_reasoning,
            watermark: 0,
            reasoning_sent: false,
        }
    }

    /// Leak phrases are stripped only when reasoning is not surfaced.
    fn strip_reasoning_artifacts(&self) -> bool {
        !self.want_reasoning
    }

    /// Chunks made available by the latest `Transcript::apply`, in order:
    /// the reasoning block (once), then a content delta.
    pub fn emit(&mut self, transcript: &Transcript) -> Vec<OutputChunk> {
        let mut chunks = Vec::new();

        if self.want_reasoning && !self.reasoning_sent && !transcript.reasoning().is_empty() {
            chunks.push(OutputChunk::Reasoning(transcript.reasoning().to_string()));
            self.reasoning_sent = true;
            tracing::debug!(len = transcript.reasoning().len(), "emitting reasoning block");
        }

        if let Some(delta) = self.next_delta(transcript.answer()) {
            chunks.push(OutputChunk::Delta(delta));
        }

        chunks
    }

    fn next_delta(&mut self, raw: &str) -> Option<String> {
        // A shrinking Final snapshot lands here until the raw answer grows
        // past the old watermark again.
        if raw.len() <= self.watermark {
            return None;
        }

        let strip = self.strip_reasoning_artifacts();
        let clean_full = self.sanitizer.sanitize(raw, strip);
        let sent_end = floor_char_boundary(raw, self.watermark);
        let clean_sent = self.sanitizer.sanitize(&raw[..sent_end], strip);

        self.watermark = raw.len();

        if clean_full.len() <= clean_sent.len() {
            return None;
        }
        let start = floor_char_boundary(&clean_full, clean_sent.len());
        Some(clean_full[start..].to_string())
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    pub fn reasoning_sent(&self) -> bool {
        self.reasoning_sent
    }
}

/// Largest index `<= index` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
