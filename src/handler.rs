//! HTTP surface of the lookup service.
//!
//! One handler, mounted at `/` and at the legacy function path, accepts a JSON body
//! `{ "email": "..." }` with any method and answers with the outcome of a scan.
//!
//! | Outcome        | Status | Body                  |
//! |----------------|--------|-----------------------|
//! | Missing email  | 400    | `{ "error" }`         |
//! | Empty mailbox  | 404    | `{ "message" }`       |
//! | Disney match   | 200    | `{ "alert", "body" }` |
//! | Netflix match  | 200    | `{ "link" }`          |
//! | No match       | 404    | `{ "message" }`       |
//! | Failure        | 500    | `{ "error" }`         |

use crate::error::Error;
use crate::mailbox::MailStore;
use crate::scanner::{MatchResult, NoMatchReason, Scanner};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Legacy serverless function path, served alongside `/`.
pub const FUNCTION_PATH: &str = "/.netlify/functions/getLastEmail";

/// Alert attached to a sign-in code response.
pub const DISNEY_ALERT: &str = "Código de Disney+ encontrado";

/// Error returned when the request names no email.
pub const MISSING_EMAIL: &str = "Falta el campo 'email' en el body";

/// Message returned when the inbox is empty.
pub const EMPTY_MAILBOX: &str = "No hay mensajes en la bandeja";

/// Message returned when no relevant message was found.
pub const NO_RESULT: &str =
    "No se encontró un resultado para tu cuenta, vuelve a intentar nuevamente";

/// Shared state of the lookup routes.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn MailStore>,
    scanner: Arc<Scanner>,
}

impl AppState {
    /// Creates the state from a mail store and a configured scanner.
    pub fn new(store: Arc<dyn MailStore>, scanner: Scanner) -> Self {
        Self {
            store,
            scanner: Arc::new(scanner),
        }
    }
}

/// Lookup request body.
#[derive(Debug, Default, Deserialize)]
pub struct LookupRequest {
    /// Address whose latest code or link is requested.
    #[serde(default)]
    pub email: Option<String>,
}

impl LookupRequest {
    /// Reads a request body; an absent or malformed body counts as empty.
    #[must_use]
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// The trimmed target address, if one was given.
    #[must_use]
    pub fn target_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Lookup response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LookupResponse {
    /// Sign-in code message found.
    Code {
        /// Fixed alert text.
        alert: String,
        /// Message body.
        body: String,
    },
    /// Verification link found.
    Link {
        /// The link.
        link: String,
    },
    /// Nothing to return.
    Message {
        /// Explanation for the user.
        message: String,
    },
    /// The request failed.
    Error {
        /// Error description.
        error: String,
    },
}

impl LookupResponse {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Maps a scan outcome to its status and body.
#[must_use]
pub fn respond(result: MatchResult) -> (StatusCode, LookupResponse) {
    match result {
        MatchResult::Disney { body } => (
            StatusCode::OK,
            LookupResponse::Code {
                alert: DISNEY_ALERT.to_string(),
                body,
            },
        ),
        MatchResult::Netflix { link } => (StatusCode::OK, LookupResponse::Link { link }),
        MatchResult::NoMatch(NoMatchReason::EmptyMailbox) => {
            (StatusCode::NOT_FOUND, LookupResponse::message(EMPTY_MAILBOX))
        }
        MatchResult::NoMatch(NoMatchReason::Exhausted) => {
            (StatusCode::NOT_FOUND, LookupResponse::message(NO_RESULT))
        }
    }
}

/// Builds the router serving the lookup handler.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(handle_lookup))
        .route(FUNCTION_PATH, any(handle_lookup))
        .with_state(state)
}

async fn handle_lookup(State(state): State<AppState>, body: Bytes) -> Response {
    let request = LookupRequest::from_body(&body);
    let (status, response) = lookup(&state, &request).await;
    (status, Json(response)).into_response()
}

/// Runs one lookup and maps the outcome to a status and body.
#[instrument(name = "handler::lookup", skip_all)]
pub async fn lookup(state: &AppState, request: &LookupRequest) -> (StatusCode, LookupResponse) {
    let Some(target_email) = request.target_email() else {
        let e = Error::MissingField { field: "email" };
        warn!(error = %e, category = %e.category(), "Rejected lookup request");
        return (StatusCode::BAD_REQUEST, LookupResponse::error(MISSING_EMAIL));
    };

    match state.scanner.scan(state.store.as_ref(), target_email).await {
        Ok(result) => {
            let (status, response) = respond(result);
            info!(recipient = %target_email, status = status.as_u16(), "Lookup finished");
            (status, response)
        }
        Err(e) => {
            error!(
                recipient = %target_email,
                error = %e,
                category = %e.category(),
                retryable = e.is_retryable(),
                "Lookup failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                LookupResponse::error(e.to_string()),
            )
        }
    }
}
