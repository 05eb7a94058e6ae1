// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use super::pattern::CompiledPattern;
use super::types::ModelConfig;

/// The default leak-phrase catalogue, embedded at compile time.
const DEFAULT_LEAK_PATTERNS_YAML: &str = include_str!("../../schema/default_leak_patterns.yaml");

/// Upstream host used when `upstream.base_url` is not set.
pub const DEFAULT_BASE_URL: &str = "https://www.notion.so";

/// Client version header sent when `upstream.client_version` is not set.
pub const DEFAULT_CLIENT_VERSION: &str = "23.13.20251011.2037";

pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STREAM_READ_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_THREAD_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 10;
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
pub const DEFAULT_OWNED_BY: &str = "chatbridge";

/// Parse and compile the embedded leak-phrase catalogue.
/// Called once at startup. Panics on invalid regex (these are our own patterns).
pub fn default_leak_patterns() -> Vec<CompiledPattern> {
    let raw: DefaultLeakPatternsYaml = serde_yaml::from_str(DEFAULT_LEAK_PATTERNS_YAML)
        .expect("default leak patterns YAML is invalid");

    raw.leak_patterns
        .into_iter()
        .map(|p| {
            CompiledPattern::compile(&p)
                .unwrap_or_else(|e| panic!("default leak pattern failed to compile: {e}"))
        })
        .collect()
}

#[derive(serde::Deserialize)]
struct DefaultLeakPatternsYaml {
    leak_patterns: Vec<String>,
}

/// Public model names and the backend identifiers they map to, used when the
/// config file has no `models` section.
pub fn default_models() -> Vec<ModelConfig> {
    [
        ("claude-sonnet-4.5", "anthropic-sonnet-alt"),
        ("gpt-5", "openai-turbo"),
        ("claude-opus-4.1", "anthropic-opus-4.1"),
        ("gemini-2.5-flash", "vertex-gemini-2.5-flash"),
        ("gemini-2.5-pro", "vertex-gemini-2.5-pro"),
        ("gpt-4.1", "openai-gpt-4.1"),
    ]
    .into_iter()
    .map(|(name, backend)| ModelConfig {
        name: name.to_string(),
        backend: backend.to_string(),
    })
    .collect()
}

pub const DEFAULT_MODEL: &str = "claude-sonnet-4.5";
