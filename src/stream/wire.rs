// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Chat-completion chunk wire format
//
// Serializes output chunks as `data: {json}\n\n` server-sent events. The
// stream is closed with `data: [DONE]\n\n` after the terminal or error chunk.

use bytes::Bytes;
use serde::Serialize;

use super::types::OutputChunk;

pub const DONE_EVENT: &str = "data: [DONE]\n\n";

#[derive(Debug, Serialize)]
struct ChunkBody<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    choices: [ChunkChoice<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChunkChoice<'a> {
    index: u32,
    delta: Delta<'a>,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
struct Delta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_content: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    message: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Encodes one response's chunks with a shared id, model and timestamp.
#[derive(Debug, Clone)]
pub struct SseEncoder {
    id: String,
    model: String,
    created: i64,
}

impl SseEncoder {
    pub fn new(id: impl Into<String>, model: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
        }
    }

    /// Frame one output chunk. Terminal and error chunks are followed by the
    /// `[DONE]` sentinel in the same frame.
    pub fn encode(&self, chunk: &OutputChunk) -> Bytes {
        let json = match chunk {
            OutputChunk::Role => self.chunk_json(
                Delta {
                    role: Some("assistant"),
                    ..Delta::default()
                },
                None,
            ),
            OutputChunk::Delta(text) => self.chunk_json(
                Delta {
                    content: Some(text.as_str()),
                    ..Delta::default()
                },
                None,
            ),
            OutputChunk::Reasoning(text) => self.chunk_json(
                Delta {
                    reasoning_content: Some(text.as_str()),
                    ..Delta::default()
                },
                None,
            ),
            OutputChunk::Terminal => self.chunk_json(Delta::default(), Some("stop")),
            OutputChunk::Error(message) => to_json(&ErrorBody {
                error: ErrorDetail {
                    message,
                    kind: "internal_server_error",
                },
            }),
        };

        let mut frame = format!("data: {json}\n\n");
        if chunk.is_final() {
            frame.push_str(DONE_EVENT);
        }
        Bytes::from(frame)
    }

    fn chunk_json(&self, delta: Delta<'_>, finish_reason: Option<&'static str>) -> String {
        to_json(&ChunkBody {
            id: &self.id,
            object: "chat.completion.chunk",
            created: self.created,
            model: &self.model,
            choices: [ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    // These bodies are plain structs of strings and numbers.
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn encoder() -> SseEncoder {
        SseEncoder::new("chatcmpl-test", "gpt-5", 1_700_000_000)
    }

    fn parse(frame: &Bytes) -> Value {
        let text = std::str::from_utf8(frame).unwrap();
        let first = text.split("\n\n").next().unwrap();
        serde_json::from_str(first.strip_prefix("data: ").unwrap()).unwrap()
    }

    #[test]
    fn role_chunk_shape() {
        let v = parse(&encoder().encode(&OutputChunk::Role));
        assert_eq!(v["id"], "chatcmpl-test");
        assert_eq!(v["object"], "chat.completion.chunk");
        assert_eq!(v["created"], 1_700_000_000);
        assert_eq!(v["model"], "gpt-5");
        assert_eq!(v["choices"][0]["index"], 0);
        assert_eq!(v["choices"][0]["delta"], serde_json::json!({"role": "assistant"}));
        assert!(v["choices"][0]["finish_reason"].is_null());
    }

    #[test]
    fn delta_and_reasoning_chunks() {
        let v = parse(&encoder().encode(&OutputChunk::Delta("Hel".into())));
        assert_eq!(v["choices"][0]["delta"], serde_json::json!({"content": "Hel"}));

        let v = parse(&encoder().encode(&OutputChunk::Reasoning("plan".into())));
        assert_eq!(
            v["choices"][0]["delta"],
            serde_json::json!({"reasoning_content": "plan"})
        );
    }

    #[test]
    fn terminal_chunk_carries_stop_and_done() {
        let frame = encoder().encode(&OutputChunk::Terminal);
        let v = parse(&frame);
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
        assert_eq!(v["choices"][0]["delta"], serde_json::json!({}));
        assert!(std::str::from_utf8(&frame).unwrap().ends_with(DONE_EVENT));
    }

    #[test]
    fn error_chunk_shape() {
        let frame = encoder().encode(&OutputChunk::Error("boom".into()));
        let v = parse(&frame);
        assert_eq!(v["error"]["message"], "boom");
        assert_eq!(v["error"]["type"], "internal_server_error");
        assert!(std::str::from_utf8(&frame).unwrap().ends_with(DONE_EVENT));
    }

    #[test]
    fn non_final_chunks_have_no_done() {
        let frame = encoder().encode(&OutputChunk::Delta("x".into()));
        assert!(!std::str::from_utf8(&frame).unwrap().contains("[DONE]"));
    }
}
