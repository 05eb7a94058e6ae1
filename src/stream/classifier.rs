// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Event classifier
//
// Turns one raw NDJSON line from the upstream into zero or more fragments.
// The upstream multiplexes several backend families over one transport and
// its wire format is not contractually stable, so anything outside the known
// shapes decodes to "no fragment" instead of failing the stream.

use serde::Deserialize;
use serde_json::Value;

use super::types::Fragment;
use crate::normalize::extract_reasoning;

// ---------------------------------------------------------------------------
// Trait: EventClassifier
// ---------------------------------------------------------------------------

/// Decodes raw upstream lines into fragments.
///
/// Implementations never fail: malformed input, empty lines and unknown
/// shapes yield an empty vector and are logged.
pub trait EventClassifier: Send + Sync {
    fn classify(&self, line: &[u8]) -> Vec<Fragment>;
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Top-level upstream event, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum UpstreamEvent {
    /// Direct snapshot: `{"type":"markdown-chat","value":"..."}`.
    #[serde(rename = "markdown-chat")]
    MarkdownChat {
        #[serde(default)]
        value: Value,
    },
    /// Patch stream: `{"type":"patch","v":[{"o":..,"p":..,"v":..}, ...]}`.
    #[serde(rename = "patch")]
    Patch {
        #[serde(default)]
        v: Value,
    },
    /// Record snapshot map keyed by message id.
    #[serde(rename = "record-map")]
    RecordMap {
        #[serde(rename = "recordMap", default)]
        record_map: Value,
    },
    #[serde(other)]
    Unknown,
}

/// One patch operation. Fields are loose on purpose: operations that do not
/// fit a known shape are skipped, not rejected.
#[derive(Debug, Deserialize)]
struct PatchOp {
    #[serde(default)]
    o: String,
    #[serde(default)]
    p: String,
    #[serde(default)]
    v: Value,
}

/// What a recognized patch operation contributes.
enum PatchContent<'a> {
    Snapshot(&'a str),
    Delta(&'a str),
}

// ---------------------------------------------------------------------------
// Implementation: NdjsonClassifier
// ---------------------------------------------------------------------------

/// Classifier for the upstream's NDJSON inference stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NdjsonClassifier;

impl NdjsonClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl EventClassifier for NdjsonClassifier {
    fn classify(&self, line: &[u8]) -> Vec<Fragment> {
        let decoded = String::from_utf8_lossy(line);
        let text = decoded.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let json: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, line = %preview(text), "dropping malformed upstream line");
                return Vec::new();
            }
        };

        let event: UpstreamEvent = match serde_json::from_value(json) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::debug!(error = %e, line = %preview(text), "upstream line has no usable shape");
                return Vec::new();
            }
        };

        let mut fragments = Vec::new();
        match event {
            UpstreamEvent::MarkdownChat { value } => {
                if let Some(content) = value.as_str() {
                    push_snapshot(&mut fragments, content);
                }
            }
            UpstreamEvent::Patch { v } => {
                let Some(ops) = v.as_array() else {
                    return fragments;
                };
                for op in ops {
                    let Ok(op) = PatchOp::deserialize(op) else {
                        continue;
                    };
                    match classify_patch_op(&op) {
                        Some(PatchContent::Snapshot(content)) => {
                            push_snapshot(&mut fragments, content)
                        }
                        Some(PatchContent::Delta(content)) => push_delta(&mut fragments, content),
                        None => {}
                    }
                }
            }
            UpstreamEvent::RecordMap { record_map } => {
                if let Some(content) = first_record_content(&record_map) {
                    push_snapshot(&mut fragments, content);
                }
            }
            UpstreamEvent::Unknown => {
                tracing::debug!(line = %preview(text), "ignoring unrecognized upstream event type");
            }
        }

        if !fragments.is_empty() {
            tracing::debug!(count = fragments.len(), "decoded upstream line");
        }
        fragments
    }
}

// ---------------------------------------------------------------------------
// Shape helpers
// ---------------------------------------------------------------------------

fn classify_patch_op(op: &PatchOp) -> Option<PatchContent<'_>> {
    let path = op.p.as_str();
    match op.o.as_str() {
        "a" if path.ends_with("/s/-") => {
            if op.v.get("type").and_then(Value::as_str) == Some("markdown-chat") {
                return op.v.get("value").and_then(Value::as_str).map(PatchContent::Snapshot);
            }
            None
        }
        "a" if path.ends_with("/value/-") => {
            if op.v.get("type").and_then(Value::as_str) == Some("text") {
                return op.v.get("content").and_then(Value::as_str).map(PatchContent::Snapshot);
            }
            None
        }
        "x" if path.contains("/s/") && path.ends_with("/value") => {
            op.v.as_str().map(PatchContent::Delta)
        }
        "x" if path.contains("/value/") => op.v.as_str().map(PatchContent::Delta),
        _ => None,
    }
}

/// Content of the first message in `recordMap.thread_message` whose step
/// carries a non-empty answer.
fn first_record_content(record_map: &Value) -> Option<&str> {
    let messages = record_map.get("thread_message")?.as_object()?;
    messages.values().find_map(|message| {
        let step = message.get("value")?.get("value")?.get("step")?;
        let content = match step.get("type").and_then(Value::as_str)? {
            "markdown-chat" => step.get("value")?.as_str()?,
            "agent-inference" => step
                .get("value")?
                .as_array()?
                .iter()
                .find(|item| item.get("type").and_then(Value::as_str) == Some("text"))?
                .get("content")?
                .as_str()?,
            _ => return None,
        };
        (!content.is_empty()).then_some(content)
    })
}

/// Reasoning fragment (if any) first, then the snapshot itself.
fn push_snapshot(fragments: &mut Vec<Fragment>, content: &str) {
    fragments.extend(Fragment::reasoning(extract_reasoning(content)));
    fragments.extend(Fragment::final_snapshot(content));
}

fn push_delta(fragments: &mut Vec<Fragment>, content: &str) {
    fragments.extend(Fragment::reasoning(extract_reasoning(content)));
    fragments.extend(Fragment::incremental(content));
}

fn preview(text: &str) -> &str {
    const MAX: usize = 200;
    if text.len() <= MAX {
        return text;
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
