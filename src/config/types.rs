// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::pattern::CompiledPattern;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level parsed and validated chatbridge config.
///
/// Built once at startup and shared read-only (`Arc<Config>`) by every
/// request handler. Nothing in here is mutated after load.
#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub models: ModelsConfig,
    pub rate_limit: RateLimitConfig,
    pub sanitizer: SanitizerConfig,
    /// Environment label (e.g. "local", "production").
    pub environment: String,
    /// SHA256 hash of the raw YAML: "sha256:{hex}".
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on `/v1/*`. `None` (or the literal "1")
    /// disables the check.
    pub api_master_key: Option<String>,
}

impl ServerConfig {
    /// The key clients must present, if authentication is enabled.
    pub fn required_key(&self) -> Option<&str> {
        match self.api_master_key.as_deref() {
            None | Some("") | Some("1") => None,
            Some(key) => Some(key),
        }
    }
}

/// Credentials and limits for the conversational upstream.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub cookie: String,
    pub space_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    /// Default page/block context, overridable per request.
    pub block_id: Option<String>,
    pub client_version: String,
    pub timezone: String,
    /// Bound on connecting and receiving response headers.
    pub request_timeout: Duration,
    /// Bound on the total duration of reading one streamed answer.
    pub stream_read_timeout: Duration,
    /// Bound on the thread-creation call.
    pub thread_timeout: Duration,
}

/// A public model name and the upstream backend it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub backend: String,
}

impl ModelConfig {
    /// Backends of the `vertex-` family use the direct-snapshot chat thread
    /// type and an extended request config.
    pub fn is_vertex(&self) -> bool {
        self.backend.starts_with("vertex-")
    }
}

#[derive(Debug, Clone)]
pub struct ModelsConfig {
    pub default_model: String,
    pub available: Vec<ModelConfig>,
    pub owned_by: String,
}

impl ModelsConfig {
    /// Look up a model by public name.
    pub fn find(&self, name: &str) -> Option<&ModelConfig> {
        self.available.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: super::defaults::DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

/// Leak-phrase catalogue used when reasoning is not surfaced to the client.
#[derive(Debug, Clone, Default)]
pub struct SanitizerConfig {
    pub leak_patterns: Vec<CompiledPattern>,
}
