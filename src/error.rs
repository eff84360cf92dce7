//! Request-level error taxonomy.
//!
//! Store and collaborator errors are folded into [`AppError`], which knows
//! its status code and the message shown to the user. HTMX requests get the
//! message as an HTML fragment; everything else gets plain text.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use crate::document::DocumentError;
use crate::llm::LlmError;
use crate::session::SessionError;
use crate::ui;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Session not found or expired. Please upload a new document.")]
    SessionNotFound,

    #[error("File too large (max {max_mb}MB)")]
    PayloadTooLarge { max_mb: usize },

    #[error("Rate limit exceeded. Please wait before making another request.")]
    RateLimited,

    #[error("AI analysis failed. Please try again or rephrase your question.")]
    Upstream(#[source] LlmError),

    #[error("{message}")]
    Internal {
        message: &'static str,
        #[source]
        source: BoxError,
    },
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(message: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            message,
            source: source.into(),
        }
    }

    /// Build the response, as an HTML fragment when `htmx` is set.
    #[must_use]
    pub fn render(&self, htmx: bool) -> Response {
        let message = self.to_string();
        if htmx {
            (self.status(), Html(ui::error_fragment(&message))).into_response()
        } else {
            (self.status(), message).into_response()
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => Self::SessionNotFound,
            SessionError::IdGeneration(_) | SessionError::TtlOutOfRange(_) => {
                Self::internal("Failed to create analysis session", err)
            }
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::TooLarge { max_bytes, .. } => Self::PayloadTooLarge {
                max_mb: max_bytes / (1024 * 1024),
            },
            other => Self::BadRequest(format!("Failed to parse document: {other}")),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        Self::Upstream(err)
    }
}

/// Marker left on error responses so [`htmx_error_middleware`] can re-render
/// them once it knows who asked.
#[derive(Debug, Clone)]
struct ErrorNotice(String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Upstream(source) => {
                tracing::error!(name: "request.upstream_failed", error = %source, "LLM request failed");
            }
            Self::Internal { source, .. } => {
                tracing::error!(name: "request.internal_error", error = ?source, "Internal error");
            }
            _ => {
                tracing::debug!(name: "request.rejected", status = %self.status(), reason = %self, "Request rejected");
            }
        }

        let mut response = self.render(false);
        response
            .extensions_mut()
            .insert(ErrorNotice(self.to_string()));
        response
    }
}

/// Whether the request was issued by htmx.
#[must_use]
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("hx-request")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Turn [`AppError`] responses into HTML fragments for htmx requests.
pub async fn htmx_error_middleware(req: Request, next: Next) -> Response {
    let htmx = is_htmx(req.headers());
    let response = next.run(req).await;
    if !htmx {
        return response;
    }

    let Some(ErrorNotice(message)) = response.extensions().get::<ErrorNotice>().cloned() else {
        return response;
    };

    let (mut parts, _body) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    Response::from_parts(parts, ui::error_fragment(&message).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/missing", get(|| async { Err::<(), _>(AppError::SessionNotFound) }))
            .layer(axum::middleware::from_fn(htmx_error_middleware))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_error() {
        let response = app()
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_text(response).await;
        assert_eq!(body, "Session not found or expired. Please upload a new document.");
    }

    #[tokio::test]
    async fn test_htmx_error_fragment() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/missing")
                    .header("HX-Request", "true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let body = body_text(response).await;
        assert!(body.contains("error-message"));
        assert!(body.contains("Session not found or expired"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::from(SessionError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(DocumentError::TooLarge {
                size: 11 * 1024 * 1024,
                max_bytes: 10 * 1024 * 1024
            })
            .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
