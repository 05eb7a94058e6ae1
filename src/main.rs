// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use chatbridge::config;
use chatbridge::proxy;
use chatbridge::upstream::ReqwestUpstreamClient;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatbridge", about = "OpenAI-compatible chat completions bridge")]
struct Cli {
    /// Path to the chatbridge.yaml config file
    #[arg(long, default_value = "chatbridge.yaml", env = "CHATBRIDGE_CONFIG")]
    config: String,

    /// Port to listen on (overrides server.port)
    #[arg(long, env = "CHATBRIDGE_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides server.host)
    #[arg(long, env = "CHATBRIDGE_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource {
        path: std::path::PathBuf::from(&cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        environment = %config.environment,
        default_model = %config.models.default_model,
        models = config.models.available.len(),
        leak_patterns = config.sanitizer.leak_patterns.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        auth_enabled = config.server.required_key().is_some(),
        config_hash = %config.config_hash,
        "config loaded"
    );

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let ip: IpAddr = match host.parse() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::error!(host = %host, "invalid listen address: {e}");
            std::process::exit(1);
        }
    };
    let addr = SocketAddr::new(ip, port);

    let http = match reqwest::Client::builder()
        .connect_timeout(config.upstream.request_timeout)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let upstream = match ReqwestUpstreamClient::new(http, Arc::new(config.upstream.clone())) {
        Ok(u) => Arc::new(u),
        Err(e) => {
            tracing::error!("invalid upstream credentials: {e}");
            std::process::exit(1);
        }
    };
    upstream.warm_up().await;

    let state = proxy::AppState::new(config, upstream.clone(), upstream);
    let app = proxy::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "chatbridge listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
