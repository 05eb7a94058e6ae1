// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Request bodies for the upstream thread and inference endpoints.

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::ThreadKind;
use crate::config::UpstreamConfig;
use crate::message::{ChatMessage, Role};

/// Fixed space view id the vertex surface expects in its context step.
const VERTEX_SPACE_VIEW_ID: &str = "2008eefa-d0dc-80d5-9e67-000623befd8f";

/// Per-request inputs to the inference payload.
#[derive(Debug, Clone)]
pub struct InferenceParams<'a> {
    pub thread_id: &'a str,
    /// Upstream backend identifier the public model maps to.
    pub backend: &'a str,
    pub kind: ThreadKind,
    /// Request-level block id, taking precedence over the configured one.
    pub block_id: Option<&'a str>,
    pub messages: &'a [ChatMessage],
    pub now: DateTime<FixedOffset>,
}

/// Body for creating a thread record with a single `set` operation.
pub fn build_thread_payload(
    upstream: &UpstreamConfig,
    thread_id: &str,
    kind: ThreadKind,
    created_time_ms: i64,
) -> Value {
    let space_id = upstream.space_id.as_str();
    json!({
        "requestId": Uuid::new_v4().to_string(),
        "transactions": [{
            "id": Uuid::new_v4().to_string(),
            "spaceId": space_id,
            "operations": [{
                "pointer": {"table": "thread", "id": thread_id, "spaceId": space_id},
                "path": [],
                "command": "set",
                "args": {
                    "id": thread_id,
                    "version": 1,
                    "parent_id": space_id,
                    "parent_table": "space",
                    "space_id": space_id,
                    "created_time": created_time_ms,
                    "created_by_id": upstream.user_id,
                    "created_by_table": "notion_user",
                    "messages": [],
                    "data": {},
                    "alive": true,
                    "type": kind.as_str(),
                }
            }]
        }]
    })
}

/// Body for the inference transcript call.
///
/// The transcript is a config step, a context step, then one step per user
/// or assistant message. Vertex backends get an extended config, a richer
/// context and debug overrides.
pub fn build_inference_payload(upstream: &UpstreamConfig, params: &InferenceParams<'_>) -> Value {
    let vertex = params.backend.starts_with("vertex-");
    let now = params.now.to_rfc3339();
    let user_name = upstream.user_name.as_deref().unwrap_or_default();

    let mut context = Map::new();
    context.insert("timezone".into(), json!(upstream.timezone));
    context.insert("spaceId".into(), json!(upstream.space_id));
    context.insert("userId".into(), json!(upstream.user_id));
    context.insert("userEmail".into(), json!(upstream.user_email));
    context.insert("currentDatetime".into(), json!(now));

    let block_id = params
        .block_id
        .filter(|b| !b.trim().is_empty())
        .or(upstream.block_id.as_deref());
    if let Some(block_id) = block_id {
        context.insert("blockId".into(), json!(normalize_block_id(block_id)));
    }

    let config = if vertex {
        context.insert("userName".into(), json!(format!(" {user_name}")));
        context.insert("spaceName".into(), json!(format!("{user_name}的 Notion")));
        context.insert("spaceViewId".into(), json!(VERTEX_SPACE_VIEW_ID));
        context.insert("surface".into(), json!("ai_module"));
        json!({
            "type": params.kind.as_str(),
            "model": params.backend,
            "useWebSearch": true,
            "enableAgentAutomations": false,
            "enableAgentIntegrations": false,
            "enableBackgroundAgents": false,
            "enableCodegenIntegration": false,
            "enableCustomAgents": false,
            "enableExperimentalIntegrations": false,
            "enableLinkedDatabases": false,
            "enableAgentViewVersionHistoryTool": false,
            "searchScopes": [{"type": "everything"}],
            "enableDatabaseAgents": false,
            "enableAgentComments": false,
            "enableAgentForms": false,
            "enableAgentMakesFormulas": false,
            "enableUserSessionContext": false,
            "modelFromUser": true,
            "isCustomAgent": false,
        })
    } else {
        context.insert("userName".into(), json!(upstream.user_name));
        context.insert("surface".into(), json!("workflows"));
        json!({
            "type": params.kind.as_str(),
            "model": params.backend,
            "useWebSearch": true,
        })
    };

    let mut transcript = vec![
        json!({"id": Uuid::new_v4().to_string(), "type": "config", "value": config}),
        json!({"id": Uuid::new_v4().to_string(), "type": "context", "value": Value::Object(context)}),
    ];

    for message in params.messages {
        match message.role {
            Role::User => transcript.push(json!({
                "id": Uuid::new_v4().to_string(),
                "type": "user",
                "value": [[message.text()]],
                "userId": upstream.user_id,
                "createdAt": now,
            })),
            Role::Assistant => transcript.push(json!({
                "id": Uuid::new_v4().to_string(),
                "type": "agent-inference",
                "value": [{"type": "text", "content": message.text()}],
            })),
            _ => {}
        }
    }

    let mut payload = json!({
        "traceId": Uuid::new_v4().to_string(),
        "spaceId": upstream.space_id,
        "transcript": transcript,
        "threadId": params.thread_id,
        "createThread": false,
        "isPartialTranscript": true,
        "asPatchResponse": true,
        "generateTitle": true,
        "saveAllThreadOperations": true,
        "threadType": params.kind.as_str(),
    });

    if vertex {
        payload["debugOverrides"] = json!({
            "emitAgentSearchExtractedResults": true,
            "cachedInferences": {},
            "annotationInferences": {},
            "emitInferences": false,
        });
    }

    payload
}

/// Rewrite a 32-hex-digit block id (dashes ignored) into 8-4-4-4-12 form.
/// Anything else is returned unchanged.
pub fn normalize_block_id(block_id: &str) -> String {
    let compact: String = block_id.trim().chars().filter(|c| *c != '-').collect();
    if compact.len() == 32 && compact.chars().all(|c| c.is_ascii_hexdigit()) {
        format!(
            "{}-{}-{}-{}-{}",
            &compact[0..8],
            &compact[8..12],
            &compact[12..16],
            &compact[16..20],
            &compact[20..32]
        )
    } else {
        block_id.to_string()
    }
}
