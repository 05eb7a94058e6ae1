// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Chat-completion request types
//
// The request body accepted on `/v1/chat/completions`. Only the fields the
// bridge acts on are modeled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// The role of a message participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    #[serde(other)]
    Other,
}

/// One text part of an array-form message content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message content: a plain string or an array of typed parts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Flatten to plain text. Text parts are joined with a newline; other
    /// part types are dropped.
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ChatMessage {
    pub fn text(&self) -> String {
        self.content.as_ref().map(MessageContent::to_text).unwrap_or_default()
    }
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Streaming is the default when the field is absent.
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Surface reasoning to the client and keep leaked-reasoning phrases.
    #[serde(default)]
    pub include_reasoning: bool,
    /// Page/block context for this request, overriding the configured one.
    #[serde(default)]
    pub notion_block_id: Option<String>,
}

fn default_stream() -> bool {
    true
}

impl ChatRequest {
    /// Messages forwarded upstream: user and assistant turns, in order.
    pub fn conversation(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
    }
}
