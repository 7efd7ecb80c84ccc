//! Error types for the mailbox-lookup crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! An empty mailbox or an exhausted scan is not an error: see
//! [`MatchResult::NoMatch`](crate::scanner::MatchResult::NoMatch).

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a lookup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// A required request field is missing or empty.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (mixed retryability)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout after {timeout:?}")]
    AuthTimeout {
        /// The email address used for authentication; kept out of the message.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Mailbox selection timeout.
    #[error("mailbox selection timeout for '{mailbox}' after {timeout:?}")]
    SelectTimeout {
        /// The mailbox name.
        mailbox: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Message listing timeout.
    #[error("message search timeout after {timeout:?}")]
    SearchTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Message fetch timeout.
    #[error("message fetch timeout for UID set {uid_set} after {timeout:?}")]
    FetchTimeout {
        /// The UID set being fetched.
        uid_set: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Logout timeout (not critical).
    #[error("logout timeout after {timeout:?}")]
    LogoutTimeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE - could be transient server issues)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed")]
    ImapLogin {
        /// The email address used for login; kept out of the message.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select mailbox.
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID set {uid_set}")]
    ImapFetch {
        /// The UID set that failed.
        uid_set: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to fetch message from stream.
    #[error("failed to fetch message from stream")]
    FetchMessage {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Email parsing errors (NOT retryable - malformed content won't change)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse email message.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// The lookup itself never retries; callers (or the user pressing the button again)
    /// decide.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::SearchTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. } => true,

            Error::MissingField { .. }
            | Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::LogoutTimeout { .. }
            | Error::ImapLogout { .. }
            | Error::ParseEmail { .. } => false,
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MissingField { .. } | Error::InvalidEmailFormat { .. } => {
                ErrorCategory::Validation
            }

            Error::InvalidConfig { .. } | Error::InvalidDnsName { .. } => {
                ErrorCategory::Configuration
            }

            Error::TcpConnect { .. } | Error::TlsConnect { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::SelectTimeout { .. }
            | Error::SearchTimeout { .. }
            | Error::FetchTimeout { .. }
            | Error::LogoutTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. }
            | Error::ImapLogout { .. } => ErrorCategory::Protocol,

            Error::ParseEmail { .. } => ErrorCategory::Parse,
        }
    }
}

/// Error categories for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed request input.
    Validation,
    /// Configuration errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Email parsing errors.
    Parse,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Parse => write!(f, "parse"),
        }
    }
}
