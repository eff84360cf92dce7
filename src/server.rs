use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Form, Multipart, Path, Request, State, multipart::MultipartError},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::error::{AppError, htmx_error_middleware};
use crate::llm::LlmClient;
use crate::security::headers::security_headers_middleware;
use crate::security::rate_limit::rate_limit_middleware;
use crate::sweep::spawn_sweeper;
use crate::tasks::TaskKind;
use crate::ui;

/// Longest accepted chat question, in characters.
pub const MAX_QUESTION_CHARS: usize = 1000;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const UPLOAD_FIELD: &str = "document";

/// Start the Axum server with the provided configuration.
///
/// Returns after a shutdown signal once in-flight requests have finished and
/// both sweepers have stopped.
pub async fn start_server(config: AppConfig, llm: Arc<dyn LlmClient>) -> anyhow::Result<()> {
    let state = AppState::new(config, llm);
    let config = Arc::clone(&state.config);

    let session_sweeper = spawn_sweeper(state.sessions.clone(), config.sessions.sweep_interval());
    let limiter_sweeper =
        spawn_sweeper(state.rate_limiter.clone(), config.rate_limit.sweep_interval());

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        rate_limit_enabled = config.rate_limit.enabled,
        session_ttl_secs = config.sessions.ttl_secs,
        "Server started"
    );

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    session_sweeper.shutdown().await;
    limiter_sweeper.shutdown().await;
    info!(name: "server.stopped", "Server stopped");

    served?;
    Ok(())
}

/// Routes and middleware, ready to serve.
///
/// Request path through the layers, outermost first: tracing, rate limit,
/// timeout, body limit, security headers, HTMX error rendering, handler.
pub fn build_router(state: AppState) -> Router {
    let timeout_duration = state.config.server.request_timeout();
    let body_limit = state.config.sessions.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(home))
        .route("/favicon.ico", get(|| async { StatusCode::NOT_FOUND }))
        .route("/healthz", get(healthz))
        .route("/upload", post(upload))
        .route("/analyze/{session}", get(analyze))
        .route("/chat/{session}", post(chat))
        .route("/task/{session}", post(run_task))
        .route("/session/{session}", axum::routing::delete(delete_session))
        .route("/session/{session}/delete", post(delete_session))
        .layer(axum::middleware::from_fn(htmx_error_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| {
                let duration = timeout_duration;
                async move {
                    match tokio::time::timeout(duration, next.run(req)).await {
                        Ok(res) => res,
                        Err(_) => {
                            (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response()
                        }
                    }
                }
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(name: "server.shutdown", signal = "SIGINT", "Shutting down"),
        () = terminate => info!(name: "server.shutdown", signal = "SIGTERM", "Shutting down"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - Upload page.
async fn home(State(state): State<AppState>) -> Html<String> {
    let config = &state.config.sessions;
    Html(ui::home_page(
        state.parser.supported_types(),
        config.max_upload_bytes / (1024 * 1024),
        config.ttl_secs / 60,
    ))
}

/// POST /upload - Parse the `document` field and open a session for it.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let max_mb = state.parser.max_bytes() / (1024 * 1024);
    let multipart_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { max_mb }
        } else {
            AppError::BadRequest(format!("File too large (max {max_mb}MB) or invalid format"))
        }
    };

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload
        .filter(|(filename, _)| !filename.is_empty())
        .ok_or_else(|| AppError::BadRequest("Please select a file to upload".to_string()))?;

    if !state.parser.is_supported(&filename) {
        return Err(AppError::BadRequest(format!(
            "Unsupported file type. Please upload: {}",
            state.parser.supported_types().join(", ")
        )));
    }
    if bytes.is_empty() {
        return Err(AppError::BadRequest("File appears to be empty".to_string()));
    }

    let parser = state.parser.clone();
    let parse_name = filename.clone();
    let text = tokio::task::spawn_blocking(move || parser.parse(&parse_name, &bytes))
        .await
        .map_err(|e| AppError::internal("Failed to read uploaded file", e))??;

    let chars = text.chars().count();
    if chars < state.config.sessions.min_document_chars {
        return Err(AppError::BadRequest(
            "Document contains too little text to analyze".to_string(),
        ));
    }

    let session = state.sessions.create(filename, text)?;
    info!(
        name: "upload.accepted",
        chars,
        active_sessions = state.sessions.count(),
        "Upload accepted"
    );

    Ok(Redirect::to(&format!("/analyze/{}", session.id())))
}

/// GET /analyze/{session} - Analysis page.
async fn analyze(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let session = state.sessions.get(&session_id)?;
    let remaining = session.remaining_at(state.sessions.now());
    let minutes = (remaining.as_secs_f64() / 60.0).round() as u64;

    Ok(Html(ui::analyze_page(
        session.id(),
        session.filename(),
        minutes,
    )))
}

// ─────────────────────────────────────────────────────────────────────────────
// Fragment Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatForm {
    #[serde(default)]
    message: String,
}

/// POST /chat/{session} - Ask a free-form question about the document.
async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Form(form): Form<ChatForm>,
) -> Result<Html<String>, AppError> {
    let session = state.sessions.get(&session_id)?;

    let message = form.message;
    if message.trim().is_empty() {
        return Err(AppError::BadRequest("Please enter a question".to_string()));
    }
    if message.chars().count() > MAX_QUESTION_CHARS {
        return Err(AppError::BadRequest(format!(
            "Question is too long (max {MAX_QUESTION_CHARS} characters)"
        )));
    }

    let answer = state.llm.query(&message, session.content()).await?;
    Ok(Html(ui::chat_fragment(&message, &answer, Local::now())))
}

#[derive(Debug, Deserialize)]
struct TaskForm {
    #[serde(default)]
    task: String,
}

/// POST /task/{session} - Run a canned analysis.
async fn run_task(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Form(form): Form<TaskForm>,
) -> Result<Html<String>, AppError> {
    let task: TaskKind = form
        .task
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid task type".to_string()))?;
    let session = state.sessions.get(&session_id)?;

    let answer = state.llm.query(task.prompt(), session.content()).await?;
    Ok(Html(ui::task_fragment(task, &answer, Local::now())))
}

/// DELETE /session/{session} - Forget the document now.
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    state.sessions.delete(&session_id)?;
    Ok(([("HX-Redirect", "/")], StatusCode::OK).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    sessions: usize,
    rate_limited_clients: usize,
}

/// GET /healthz - Liveness plus store sizes.
async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        sessions: state.sessions.count(),
        rate_limited_clients: state.rate_limiter.len(),
    })
}
