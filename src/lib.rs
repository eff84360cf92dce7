//! Private Doc Analyzer
//!
//! Upload a document, ask an LLM about it, and have the text forgotten after
//! a fixed lifetime. Nothing is written to disk.
//!
//! # Architecture
//!
//! - **Server**: Axum router with HTMX pages and fragments
//! - **Sessions**: in-memory document store with lazy and periodic expiry
//! - **Rate limiting**: per-client token buckets in front of every route
//! - **LLM**: Chat Completions client behind a trait for testing
//!
//! # Modules
//!
//! - [`session`]: TTL session store
//! - [`security`]: rate limiter, client identity, response headers
//! - [`sweep`]: cancellable background sweepers
//! - [`document`]: text extraction for uploads
//! - [`llm`]: LLM client trait and implementation
//! - [`server`]: routes, handlers and the serving loop

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::map_err_ignore)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod security;
pub mod server;
pub mod session;
pub mod sweep;
pub mod tasks;
pub mod ui;

use crate::config::AppConfig;
use crate::document::DocumentParser;
use crate::llm::LlmClient;
use crate::security::{ForwardedHeaders, RateLimiter};

use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Uploaded documents, keyed by session ID.
    pub sessions: SessionStore,
    /// Per-client request admission.
    pub rate_limiter: RateLimiter,
    /// Which peers may name the client through proxy headers.
    pub forwarded_headers: Arc<ForwardedHeaders>,
    pub parser: DocumentParser,
    pub llm: Arc<dyn LlmClient>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Build state from configuration, with fresh stores.
    pub fn new(config: AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            sessions: SessionStore::with_ttl(config.sessions.ttl()),
            rate_limiter: RateLimiter::new(config.rate_limit.limiter_config()),
            forwarded_headers: Arc::new(config.security.forwarded_headers()),
            parser: DocumentParser::new(config.sessions.max_upload_bytes),
            llm,
            config: Arc::new(config),
        }
    }
}
