//! End-to-end lookups through the HTTP router against an in-memory mailbox.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use mailbox_lookup::handler::{self, AppState, DISNEY_ALERT, EMPTY_MAILBOX, MISSING_EMAIL, NO_RESULT};
use mailbox_lookup::{
    DelayRange, Error, LookupConfig, MailSession, MailStore, MessageMeta, RawMessage, Result,
    Scanner,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

// ─────────────────────────────────────────────────────────────────────────────
// In-memory mailbox
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Failure {
    #[default]
    None,
    Open,
    Login,
    Fetch,
    Close,
}

struct MemoryStore {
    messages: Vec<RawMessage>,
    failure: Failure,
    counters: Arc<Counters>,
}

struct MemorySession {
    messages: Vec<RawMessage>,
    failure: Failure,
    counters: Arc<Counters>,
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn open(&self) -> Result<Box<dyn MailSession>> {
        if self.failure == Failure::Open {
            return Err(Error::ConnectTimeout {
                target: "imap.test:993".into(),
                timeout: std::time::Duration::from_secs(10),
            });
        }
        if self.failure == Failure::Login {
            return Err(Error::AuthTimeout {
                email: "shared@gmail.com".into(),
                timeout: std::time::Duration::from_secs(3),
            });
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            messages: self.messages.clone(),
            failure: self.failure,
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[async_trait]
impl MailSession for MemorySession {
    async fn list_messages(&mut self) -> Result<Vec<MessageMeta>> {
        Ok(self
            .messages
            .iter()
            .map(|m| MessageMeta {
                uid: m.uid,
                internal_date: m.internal_date,
            })
            .collect())
    }

    async fn fetch_messages(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>> {
        if self.failure == Failure::Fetch {
            return Err(Error::FetchTimeout {
                uid_set: "1".into(),
                timeout: std::time::Duration::from_secs(30),
            });
        }

        // Server order, not request order
        Ok(self
            .messages
            .iter()
            .filter(|m| uids.contains(&m.uid))
            .cloned()
            .collect())
    }

    async fn close(&mut self) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        if self.failure == Failure::Close {
            return Err(Error::LogoutTimeout {
                timeout: std::time::Duration::from_secs(5),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

fn message(uid: u32, to: &str, subject: &str, date: DateTime<Utc>, content_type: &str, body: &str) -> RawMessage {
    RawMessage {
        uid,
        internal_date: Some(date),
        content: format!(
            "From: notifications@service.test\r\n\
             To: {to}\r\n\
             Subject: {subject}\r\n\
             Date: {}\r\n\
             Content-Type: {content_type}; charset=utf-8\r\n\
             \r\n\
             {body}",
            date.to_rfc2822()
        )
        .into_bytes(),
    }
}

fn app(messages: Vec<RawMessage>, failure: Failure) -> (Router, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let store = MemoryStore {
        messages,
        failure,
        counters: Arc::clone(&counters),
    };
    let scanner = Scanner::new(&LookupConfig {
        search_delay: DelayRange::none(),
        ..LookupConfig::default()
    });

    (handler::router(AppState::new(Arc::new(store), scanner)), counters)
}

async fn send(app: Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: Router, body: &str) -> (StatusCode, Value) {
    send(app, Method::POST, "/", body).await
}

const DISNEY_SUBJECT: &str = "Your one-time passcode for Disney+";
const NETFLIX_SUBJECT: &str = "=?UTF-8?Q?Tu_c=C3=B3digo_de_acceso_temporal_de_Netflix?=";

// ─────────────────────────────────────────────────────────────────────────────
// Lookup Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disney_code_found() {
    let (app, counters) = app(
        vec![message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(2), "text/html", "<b>123456</b>")],
        Failure::None,
    );

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"alert": DISNEY_ALERT, "body": "<b>123456</b>"}));
    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_netflix_link_found() {
    let (app, counters) = app(
        vec![message(
            1,
            "bob@x.com",
            NETFLIX_SUBJECT,
            minutes_ago(1),
            "text/plain",
            "see https://www.netflix.com/password?g=abc123 for details",
        )],
        Failure::None,
    );

    let (status, body) = post(app, r#"{"email":"bob@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"link": "https://www.netflix.com/password?g=abc123"}));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_mailbox() {
    let (app, counters) = app(Vec::new(), Failure::None);

    let (status, body) = post(app, r#"{"email":"anyone@x.com"}"#).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"message": EMPTY_MAILBOX}));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_message_is_ignored() {
    let (app, counters) = app(
        vec![message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(20), "text/html", "<b>123456</b>")],
        Failure::None,
    );

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"message": NO_RESULT}));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_email_never_opens_mailbox() {
    for request_body in ["{}", "", "not json", r#"{"email":"  "}"#] {
        let (app, counters) = app(Vec::new(), Failure::None);

        let (status, body) = post(app, request_body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {request_body:?}");
        assert_eq!(body, json!({"error": MISSING_EMAIL}));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_newest_match_wins() {
    let (app, _) = app(
        vec![
            message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(5), "text/html", "<b>old</b>"),
            message(2, "alice@x.com", DISNEY_SUBJECT, minutes_ago(1), "text/html", "<b>new</b>"),
            message(3, "carol@x.com", DISNEY_SUBJECT, minutes_ago(0), "text/html", "<b>other</b>"),
        ],
        Failure::None,
    );

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"], "<b>new</b>");
}

#[tokio::test]
async fn test_recipient_match_is_case_insensitive() {
    let (app, _) = app(
        vec![message(1, "Alice <ALICE@X.COM>", DISNEY_SUBJECT, minutes_ago(1), "text/html", "<b>1</b>")],
        Failure::None,
    );

    let (status, _) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_netflix_without_link_falls_through_to_older_match() {
    let (app, _) = app(
        vec![
            message(1, "bob@x.com", DISNEY_SUBJECT, minutes_ago(4), "text/html", "<b>999</b>"),
            message(2, "bob@x.com", NETFLIX_SUBJECT, minutes_ago(1), "text/plain", "no link here"),
        ],
        Failure::None,
    );

    let (status, body) = post(app, r#"{"email":"bob@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"], "<b>999</b>");
}

#[tokio::test]
async fn test_unparseable_message_is_skipped() {
    let broken = RawMessage {
        uid: 2,
        internal_date: Some(minutes_ago(0)),
        content: b" stray continuation\r\n\r\nx".to_vec(),
    };
    let (app, counters) = app(
        vec![
            message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(3), "text/html", "<b>777</b>"),
            broken,
        ],
        Failure::None,
    );

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"], "<b>777</b>");
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_netflix_link_from_html_only_message() {
    let (app, _) = app(
        vec![message(
            1,
            "bob@x.com",
            NETFLIX_SUBJECT,
            minutes_ago(1),
            "text/html",
            r#"<a href="https://help.netflix.com">Help</a> <a href="https://www.netflix.com/account/travel/verify?nftoken=abc&amp;g=7">Get code</a>"#,
        )],
        Failure::None,
    );

    let (status, body) = post(app, r#"{"email":"bob@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"link": "https://www.netflix.com/account/travel/verify?nftoken=abc&g=7"})
    );
}

#[tokio::test]
async fn test_only_newest_messages_are_examined() {
    // The match is the oldest of 31 messages, beyond the default limit of 30
    let mut messages = vec![message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(9), "text/html", "<b>1</b>")];
    for uid in 2..=31 {
        messages.push(message(uid, "noise@x.com", "Newsletter", minutes_ago(1), "text/plain", "hi"));
    }
    let (app, _) = app(messages, Failure::None);

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"message": NO_RESULT}));
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_function_path_accepts_any_method() {
    for method in [Method::POST, Method::GET, Method::PUT] {
        let (app, _) = app(
            vec![message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(1), "text/html", "<b>1</b>")],
            Failure::None,
        );

        let (status, _) =
            send(app, method.clone(), handler::FUNCTION_PATH, r#"{"email":"alice@x.com"}"#).await;

        assert_eq!(status, StatusCode::OK, "method: {method}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_failure_is_server_error() {
    let (app, counters) = app(Vec::new(), Failure::Open);

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("timeout"));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_login_failure_does_not_expose_account() {
    let (app, counters) = app(Vec::new(), Failure::Login);

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("authentication timeout"));
    assert!(!error.contains("shared@gmail.com"));
    assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetch_failure_still_closes_session() {
    let (app, counters) = app(
        vec![message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(1), "text/html", "<b>1</b>")],
        Failure::Fetch,
    );

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_failure_does_not_mask_result() {
    let (app, counters) = app(
        vec![message(1, "alice@x.com", DISNEY_SUBJECT, minutes_ago(1), "text/html", "<b>1</b>")],
        Failure::Close,
    );

    let (status, body) = post(app, r#"{"email":"alice@x.com"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["body"], "<b>1</b>");
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}
