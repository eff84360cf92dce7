//! Private Doc Analyzer server.
//!
//! Entry point: logging, configuration, then the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use private_doc_analyzer::config::{AppConfig, load_llm_settings};
use private_doc_analyzer::llm::ChatCompletionsClient;
use private_doc_analyzer::server::start_server;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment
    let _ = dotenv();

    // Initialize tracing (M-LOG-STRUCTURED)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }

    let config = AppConfig::load().context("Failed to load configuration")?;

    let settings = load_llm_settings()
        .map_err(anyhow::Error::msg)
        .context("Configuration error")?;

    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let llm = ChatCompletionsClient::new(settings).context("Failed to build HTTP client")?;

    start_server(config, Arc::new(llm)).await
}
