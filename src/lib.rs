//! # mailbox-lookup
//!
//! Looks up the latest streaming-service notification delivered to a shared IMAP inbox
//! for one recipient, and serves the lookup over HTTP.
//!
//! Two kinds of notification are recognized by subject:
//! - **Disney+** one-time passcode messages, answered with the message body
//! - **Netflix** verification messages, answered with the verification link
//!
//! A lookup opens one IMAP session, waits a short random interval, examines the newest
//! messages newest first, and returns the first one that is addressed to the target,
//! recent enough, and carries a payload. The session is always closed afterwards.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailbox_lookup::{ImapConfig, ImapMailStore, LookupConfig, MatchResult, Scanner};
//!
//! # async fn example() -> mailbox_lookup::Result<()> {
//! let config = ImapConfig::builder()
//!     .email("shared@gmail.com")
//!     .password("app-password")  // Use app-specific password for Gmail
//!     .build()?;
//!
//! let store = ImapMailStore::new(config);
//! let scanner = Scanner::new(&LookupConfig::default());
//!
//! match scanner.scan(&store, "member@example.com").await? {
//!     MatchResult::Disney { body } => println!("Code message: {body}"),
//!     MatchResult::Netflix { link } => println!("Link: {link}"),
//!     MatchResult::NoMatch(reason) => println!("Nothing found: {reason:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Serving over HTTP
//!
//! ```no_run
//! use mailbox_lookup::handler::{self, AppState};
//! use mailbox_lookup::{ImapMailStore, Scanner, ServiceConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::from_env()?;
//! let scanner = Scanner::new(&config.lookup);
//! let app = handler::router(AppState::new(Arc::new(ImapMailStore::new(config.imap)), scanner));
//!
//! let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Link Extraction
//!
//! ```
//! use mailbox_lookup::matcher::{LinkMatcher, Matcher};
//!
//! let matcher = LinkMatcher::new(["netflix.com/password"]);
//! let text = "Help: https://help.netflix.com Reset: https://www.netflix.com/password?g=1";
//!
//! assert_eq!(
//!     matcher.find_match(text).as_deref(),
//!     Some("https://www.netflix.com/password?g=1")
//! );
//! ```
//!
//! ## Error Handling
//!
//! An empty inbox or a scan without result is not an error; see [`MatchResult::NoMatch`].
//! Everything else surfaces as [`Error`], with [`Error::category`] for logging:
//!
//! ```
//! use mailbox_lookup::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error ({}): {}", error.category(), error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation.
//!
//! ### Span Naming Convention
//!
//! - `handler::lookup` - One HTTP lookup
//! - `Scanner::scan` - Mailbox scan
//! - `ImapClient::connect` - Client connection
//! - `ImapClient::close` - Logout
//! - `session::authenticate` - IMAP authentication
//! - `connection::establish_tls` - TLS connection
//!
//! ### Standard Fields
//!
//! - `email` - Login address of the shared mailbox
//! - `recipient` - Address being looked up
//! - `imap_host` - IMAP server hostname
//! - `uid` - Message UID

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod classifier;
pub mod config;
pub mod error;
pub mod handler;
pub mod mailbox;
pub mod matcher;
pub mod parser;
pub mod scanner;

// Internal modules
mod client;
mod connection;
mod session;

// Re-exports for ergonomic API
pub use classifier::{Classifier, MatchKind, SubjectCatalog};
pub use client::ImapClient;
pub use config::{
    DelayRange, ImapConfig, ImapConfigBuilder, LookupConfig, ServiceConfig, TimeoutConfig,
    TlsConfig,
};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use mailbox::{ImapMailStore, MailSession, MailStore, MessageMeta, RawMessage};
pub use scanner::{MatchResult, NoMatchReason, Scanner};
