// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Stream normalizer
//
// Drives raw upstream lines through classifier -> transcript -> emitter.
// Streaming mode runs on its own task and hands chunks to the caller over a
// bounded channel; complete mode folds the whole stream and sanitizes once.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::accumulator::Transcript;
use super::classifier::EventClassifier;
use super::emitter::ChunkEmitter;
use super::types::{Completion, OutputChunk, StreamError};
use crate::normalize::Sanitizer;

/// Output channel depth between the normalizer task and the HTTP body.
const CHANNEL_CAPACITY: usize = 64;

/// Per-request normalizer for upstream inference streams.
///
/// Holds only shared, read-only collaborators. All per-request state
/// (transcript, watermarks) lives inside `normalize_stream` /
/// `normalize_complete`, so one instance serves any number of concurrent
/// requests.
#[derive(Clone)]
pub struct StreamNormalizer {
    classifier: Arc<dyn EventClassifier>,
    sanitizer: Arc<dyn Sanitizer>,
    read_timeout: Duration,
}

impl StreamNormalizer {
    /// Create a new normalizer with injected dependencies.
    ///
    /// `read_timeout` bounds the total time spent reading one upstream
    /// stream, not the gap between lines.
    pub fn new(
        classifier: Arc<dyn EventClassifier>,
        sanitizer: Arc<dyn Sanitizer>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            sanitizer,
            read_timeout,
        }
    }

    /// Normalize an upstream line stream into output chunks.
    ///
    /// The returned stream always starts with `OutputChunk::Role` and ends
    /// with exactly one `Terminal` or `Error` chunk. If the receiver is
    /// dropped (client disconnect) the task stops reading upstream.
    pub fn normalize_stream<S, E>(&self, lines: S, want_reasoning: bool) -> ReceiverStream<OutputChunk>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let classifier = self.classifier.clone();
        let mut emitter = ChunkEmitter::new(self.sanitizer.clone(), want_reasoning);
        let read_timeout = self.read_timeout;

        let (tx, rx) = mpsc::channel::<OutputChunk>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut lines = Box::pin(lines);
            let deadline = Instant::now() + read_timeout;
            let mut transcript = Transcript::new();

            if tx.send(OutputChunk::Role).await.is_err() {
                return;
            }

            let outcome = loop {
                let line = match timeout_at(deadline, lines.next()).await {
                    Err(_) => break Err(StreamError::Timeout(read_timeout)),
                    Ok(None) => break Ok(()),
                    Ok(Some(Err(e))) => break Err(StreamError::Upstream(e.to_string())),
                    Ok(Some(Ok(line))) => line,
                };

                for fragment in classifier.classify(&line) {
                    transcript.apply(&fragment);
                    for chunk in emitter.emit(&transcript) {
                        if tx.send(chunk).await.is_err() {
                            tracing::debug!("client disconnected, stopping upstream read");
                            return;
                        }
                    }
                }
            };

            let last = match outcome {
                Ok(()) => {
                    tracing::debug!(
                        answer_len = transcript.answer().len(),
                        reasoning_len = transcript.reasoning().len(),
                        "upstream stream finished"
                    );
                    OutputChunk::Terminal
                }
                Err(e) => {
                    tracing::error!(error = %e, "upstream stream ended abnormally");
                    OutputChunk::Error(e.to_string())
                }
            };
            let _ = tx.send(last).await;
        });

        ReceiverStream::new(rx)
    }

    /// Run the same pipeline to completion with no per-round emission.
    ///
    /// Returns the sanitized answer and the accumulated reasoning. Any line
    /// source failure or timeout fails the whole call.
    pub async fn normalize_complete<S, E>(
        &self,
        lines: S,
        want_reasoning: bool,
    ) -> Result<Completion, StreamError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut lines = std::pin::pin!(lines);
        let deadline = Instant::now() + self.read_timeout;
        let mut transcript = Transcript::new();

        loop {
            match timeout_at(deadline, lines.next()).await {
                Err(_) => return Err(StreamError::Timeout(self.read_timeout)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(StreamError::Upstream(e.to_string())),
                Ok(Some(Ok(line))) => {
                    for fragment in self.classifier.classify(&line) {
                        transcript.apply(&fragment);
                    }
                }
            }
        }

        let answer = self.sanitizer.sanitize(transcript.answer(), !want_reasoning);
        if answer.is_empty() {
            tracing::warn!("upstream returned no answer content");
        }

        Ok(Completion {
            answer,
            reasoning: transcript.reasoning().to_string(),
        })
    }
}
