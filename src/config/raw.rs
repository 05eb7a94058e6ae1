// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal).
// Separate from the public Config structs: the public types hold compiled
// regexes and resolved environment variables, neither of which come straight
// out of serde_yaml.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub chatbridge: String,
    pub server: Option<RawServerConfig>,
    pub upstream: RawUpstreamConfig,
    pub models: Option<RawModelsConfig>,
    pub rate_limit: Option<RawRateLimitConfig>,
    pub sanitizer: Option<RawSanitizerConfig>,
    pub environment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_master_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawUpstreamConfig {
    pub base_url: Option<String>,
    pub cookie: Option<String>,
    pub space_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub block_id: Option<String>,
    pub client_version: Option<String>,
    pub timezone: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub stream_read_timeout_secs: Option<u64>,
    pub thread_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawModelsConfig {
    pub default: Option<String>,
    #[serde(default)]
    pub available: Vec<RawModelEntry>,
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawModelEntry {
    pub name: String,
    pub backend: String,
}

#[derive(Debug, Deserialize)]
pub struct RawRateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RawSanitizerConfig {
    /// If false, skip embedding the default leak-phrase catalogue. Default: true.
    pub use_default_leak_patterns: Option<bool>,
    #[serde(default)]
    pub leak_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}
