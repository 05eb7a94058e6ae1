// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use sha2::{Digest, Sha256};

use super::defaults::{
    default_leak_patterns, default_models, DEFAULT_BASE_URL, DEFAULT_CLIENT_VERSION,
    DEFAULT_MODEL, DEFAULT_OWNED_BY, DEFAULT_PORT, DEFAULT_REQUESTS_PER_MINUTE,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STREAM_READ_TIMEOUT_SECS, DEFAULT_THREAD_TIMEOUT_SECS,
    DEFAULT_TIMEZONE,
};
use super::error::ConfigError;
use super::interpolation::resolve_optional;
use super::pattern::CompiledPattern;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a chatbridge config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version and required fields
/// 5. Resolve `${VAR}` interpolation in credential fields
/// 6. Compile leak-phrase patterns (defaults first, then user patterns)
/// 7. Build typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.chatbridge != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.chatbridge
        )));
    }

    let server = build_server_config(raw.server)?;
    let upstream = build_upstream_config(raw.upstream)?;
    let models = build_models_config(raw.models)?;
    let rate_limit = build_rate_limit_config(raw.rate_limit)?;
    let sanitizer = build_sanitizer_config(raw.sanitizer)?;

    Ok(Config {
        server,
        upstream,
        models,
        rate_limit,
        sanitizer,
        environment: raw.environment.unwrap_or_default(),
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_server_config(raw: Option<raw::RawServerConfig>) -> Result<ServerConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(ServerConfig {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            api_master_key: None,
        });
    };

    Ok(ServerConfig {
        host: raw.host.unwrap_or_else(|| "127.0.0.1".to_string()),
        port: raw.port.unwrap_or(DEFAULT_PORT),
        api_master_key: resolve_optional(raw.api_master_key.as_deref())?,
    })
}

fn build_upstream_config(raw: raw::RawUpstreamConfig) -> Result<UpstreamConfig, ConfigError> {
    let cookie = required_field("upstream.cookie", raw.cookie.as_deref())?;
    let space_id = required_field("upstream.space_id", raw.space_id.as_deref())?;
    let user_id = required_field("upstream.user_id", raw.user_id.as_deref())?;

    let base_url = resolve_optional(raw.base_url.as_deref())?
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    Ok(UpstreamConfig {
        base_url,
        cookie,
        space_id,
        user_id,
        user_name: resolve_optional(raw.user_name.as_deref())?,
        user_email: resolve_optional(raw.user_email.as_deref())?,
        block_id: resolve_optional(raw.block_id.as_deref())?.filter(|b| !b.trim().is_empty()),
        client_version: resolve_optional(raw.client_version.as_deref())?
            .unwrap_or_else(|| DEFAULT_CLIENT_VERSION.to_string()),
        timezone: raw.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        request_timeout: timeout_secs(
            "upstream.request_timeout_secs",
            raw.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?,
        stream_read_timeout: timeout_secs(
            "upstream.stream_read_timeout_secs",
            raw.stream_read_timeout_secs,
            DEFAULT_STREAM_READ_TIMEOUT_SECS,
        )?,
        thread_timeout: timeout_secs(
            "upstream.thread_timeout_secs",
            raw.thread_timeout_secs,
            DEFAULT_THREAD_TIMEOUT_SECS,
        )?,
    })
}

fn build_models_config(raw: Option<raw::RawModelsConfig>) -> Result<ModelsConfig, ConfigError> {
    let (default_model, available, owned_by) = match raw {
        None => (None, default_models(), None),
        Some(r) => {
            let available = if r.available.is_empty() {
                default_models()
            } else {
                r.available
                    .into_iter()
                    .map(|m| ModelConfig {
                        name: m.name,
                        backend: m.backend,
                    })
                    .collect()
            };
            (r.default, available, r.owned_by)
        }
    };

    let default_model = default_model.unwrap_or_else(|| {
        if available.iter().any(|m| m.name == DEFAULT_MODEL) {
            DEFAULT_MODEL.to_string()
        } else {
            available[0].name.clone()
        }
    });

    if !available.iter().any(|m| m.name == default_model) {
        return Err(ConfigError::Validation(format!(
            "models.default \"{default_model}\" is not listed in models.available"
        )));
    }

    for (i, m) in available.iter().enumerate() {
        if m.name.trim().is_empty() || m.backend.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "models.available[{i}] must have a non-empty name and backend"
            )));
        }
        if available[..i].iter().any(|other| other.name == m.name) {
            return Err(ConfigError::Validation(format!(
                "duplicate model name \"{}\" in models.available",
                m.name
            )));
        }
    }

    Ok(ModelsConfig {
        default_model,
        available,
        owned_by: owned_by.unwrap_or_else(|| DEFAULT_OWNED_BY.to_string()),
    })
}

fn build_rate_limit_config(
    raw: Option<raw::RawRateLimitConfig>,
) -> Result<RateLimitConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(RateLimitConfig::default());
    };

    let requests_per_minute = raw
        .requests_per_minute
        .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE);
    if raw.enabled && requests_per_minute == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.requests_per_minute must be greater than 0".to_string(),
        ));
    }

    Ok(RateLimitConfig {
        enabled: raw.enabled,
        requests_per_minute,
    })
}

fn build_sanitizer_config(
    raw: Option<raw::RawSanitizerConfig>,
) -> Result<SanitizerConfig, ConfigError> {
    let (use_defaults, user_patterns) = match raw {
        Some(r) => (r.use_default_leak_patterns != Some(false), r.leak_patterns),
        None => (true, Vec::new()),
    };

    let mut leak_patterns = if use_defaults {
        default_leak_patterns()
    } else {
        Vec::new()
    };

    let user = user_patterns
        .iter()
        .map(|p| CompiledPattern::compile(p))
        .collect::<Result<Vec<_>, _>>()?;
    leak_patterns.extend(user);

    Ok(SanitizerConfig { leak_patterns })
}

fn required_field(name: &str, value: Option<&str>) -> Result<String, ConfigError> {
    let resolved = resolve_optional(value)?.unwrap_or_default();
    if resolved.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{name} is required and must not be empty"
        )));
    }
    Ok(resolved.trim().to_string())
}

fn timeout_secs(name: &str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Validation(format!(
            "{name} must be greater than 0"
        ))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(Duration::from_secs(default)),
    }
}

/// Build the `Cookie` header value from the configured cookie. A bare token
/// becomes `token_v2=<token>`; a value that already looks like a cookie
/// string is passed through.
pub fn cookie_header(cookie: &str) -> String {
    if cookie.contains('=') {
        cookie.to_string()
    } else {
        format!("token_v2={cookie}")
    }
}
