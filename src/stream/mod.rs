// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Streaming response normalizer
//
// Responsibilities:
// - Decode upstream NDJSON lines in three shapes (direct snapshot, patch
//   stream, record snapshot map) into typed fragments
// - Fold fragments into a running answer and reasoning trace
// - Re-sanitize the full answer every round and emit only the new clean text
// - Emit the reasoning block at most once, when requested
// - Frame output as chat-completion chunks: role first, terminal last

mod accumulator;
mod classifier;
mod emitter;
mod lines;
mod processor;
mod types;
mod wire;

pub use accumulator::Transcript;
pub use classifier::{EventClassifier, NdjsonClassifier};
pub use emitter::ChunkEmitter;
pub use lines::{ndjson_lines, LineSplitter};
pub use processor::StreamNormalizer;
pub use types::{Completion, Fragment, FragmentKind, OutputChunk, StreamError};
pub use wire::{SseEncoder, DONE_EVENT};
