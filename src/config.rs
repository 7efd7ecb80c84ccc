//! Configuration for the mailbox connection and the lookup itself.
//!
//! Use [`ImapConfigBuilder`] to create a mailbox configuration with sensible defaults:
//!
//! ```
//! use mailbox_lookup::ImapConfig;
//!
//! let config = ImapConfig::builder()
//!     .email("shared.inbox@gmail.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.server_address(), "imap.gmail.com:993");
//! ```
//!
//! The service binary assembles everything from the process environment with
//! [`ServiceConfig::from_env`].

use crate::error::{Error, Result};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// IMAP host used when none is configured.
pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";

/// Subject fragments of sign-in code notifications answered with the full message body.
pub const DEFAULT_DISNEY_SUBJECTS: &[&str] = &[
    "amazon.com: Sign-in attempt",
    "amazon.com: Intento de inicio de sesión",
    "Your one-time passcode for Disney+",
    "Netflix: Tu código de inicio de sesión",
    "Tu código de acceso único para Disney+",
];

/// Subject fragments of notifications answered with a verification link.
pub const DEFAULT_NETFLIX_SUBJECTS: &[&str] = &[
    "Importante: Cómo actualizar tu Hogar con Netflix",
    "Importante: Cómo cambiar tu Hogar con Netflix",
    "Tu código de acceso temporal de Netflix",
    "Completa tu solicitud de cambio de contraseña",
    "Completa tu solicitud de restablecimiento de contraseña",
];

/// Verification link prefixes, highest priority first.
pub const DEFAULT_NETFLIX_LINKS: &[&str] = &[
    "https://www.netflix.com/account/travel/verify?nftoken=",
    "https://www.netflix.com/account/update-primary-location?nftoken=",
    "https://www.netflix.com/password?g=",
];

/// Configuration for connecting to the shared IMAP mailbox.
///
/// Create using [`ImapConfig::builder()`].
///
/// Note: The `password` field is stored as a [`SecretString`] to prevent
/// accidental logging of sensitive credentials.
#[derive(Clone)]
pub struct ImapConfig {
    email: EmailAddress,
    password: SecretString,
    /// IMAP server hostname.
    pub imap_host: String,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// Transport security settings.
    pub tls: TlsConfig,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("tls", &self.tls)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl ImapConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ImapConfigBuilder {
        ImapConfigBuilder::default()
    }

    /// Returns the login address as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the password as a string slice.
    ///
    /// Only the IMAP LOGIN command should ever see this value.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.imap_host, self.imap_port)
    }
}

/// TLS settings for the IMAP connection.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Skip server certificate verification.
    ///
    /// Only meant for self-hosted servers with self-signed certificates.
    pub accept_invalid_certs: bool,
}

/// Timeout configuration for the IMAP round-trips.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting the mailbox.
    pub select: Duration,
    /// Timeout for listing the mailbox contents.
    pub search: Duration,
    /// Timeout for fetching message content.
    pub fetch: Duration,
    /// Timeout for logout operation.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            auth: Duration::from_secs(3),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`ImapConfig`].
#[derive(Debug, Default)]
pub struct ImapConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    tls: Option<TlsConfig>,
    timeouts: Option<TimeoutConfig>,
}

impl ImapConfigBuilder {
    /// Sets the login address of the shared mailbox (required).
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the password (required).
    ///
    /// For Gmail, use an app-specific password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname (default: `imap.gmail.com`).
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port (default: 993).
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets TLS configuration.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Disables server certificate verification.
    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.tls
            .get_or_insert_with(TlsConfig::default)
            .accept_invalid_certs = accept;
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the authentication timeout.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .auth = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<ImapConfig> {
        let email_raw = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "email is required".into(),
        })?;
        let email = validate_email(&email_raw)?;

        let password_raw = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;

        let imap_host = self
            .imap_host
            .unwrap_or_else(|| DEFAULT_IMAP_HOST.to_string());
        if imap_host.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "IMAP host must not be empty".into(),
            });
        }

        Ok(ImapConfig {
            email,
            password: SecretString::from(password_raw),
            imap_host,
            imap_port: self.imap_port.unwrap_or(993),
            tls: self.tls.unwrap_or_default(),
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Bounds of the randomized pause taken before listing the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Creates a range; `min` must not exceed `max`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidConfig {
                message: format!("search delay minimum {min:?} exceeds maximum {max:?}"),
            });
        }
        Ok(Self { min, max })
    }

    /// A range that never pauses.
    #[must_use]
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Lower bound (inclusive).
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound (inclusive).
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(10),
        }
    }
}

/// Knobs of the message-selection pipeline.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Maximum message age, relative to the lookup time (inclusive).
    pub recency_window: Duration,
    /// Most recent messages examined per lookup.
    pub max_messages: usize,
    /// Randomized pause before the mailbox is listed.
    pub search_delay: DelayRange,
    /// Subject fragments answered with the message body.
    pub disney_subjects: Vec<String>,
    /// Subject fragments answered with a verification link.
    pub netflix_subjects: Vec<String>,
    /// Preferred verification link fragments, highest priority first.
    pub netflix_links: Vec<String>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            recency_window: Duration::from_secs(10 * 60),
            max_messages: 30,
            search_delay: DelayRange::default(),
            disney_subjects: to_owned_list(DEFAULT_DISNEY_SUBJECTS),
            netflix_subjects: to_owned_list(DEFAULT_NETFLIX_SUBJECTS),
            netflix_links: to_owned_list(DEFAULT_NETFLIX_LINKS),
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Everything the service binary needs.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Shared mailbox connection settings.
    pub imap: ImapConfig,
    /// Lookup pipeline settings.
    pub lookup: LookupConfig,
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
}

impl ServiceConfig {
    /// Default HTTP listen address.
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:8888";

    /// Reads the configuration from the process environment, after loading `.env` if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a required variable is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a required variable is missing or a value
    /// cannot be parsed.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| Error::InvalidConfig {
                message: format!("{key} is required"),
            })
        };

        let mut imap = ImapConfig::builder()
            .email(require("GMAIL_USER")?)
            .password(require("GMAIL_APP_PASSWORD")?);
        if let Some(host) = get("IMAP_HOST") {
            imap = imap.imap_host(host);
        }
        if let Some(port) = parse_var::<u16>("IMAP_PORT", get("IMAP_PORT"))? {
            imap = imap.imap_port(port);
        }
        if let Some(accept) =
            parse_var::<bool>("IMAP_ACCEPT_INVALID_CERTS", get("IMAP_ACCEPT_INVALID_CERTS"))?
        {
            imap = imap.accept_invalid_certs(accept);
        }
        if let Some(secs) =
            parse_var::<u64>("IMAP_AUTH_TIMEOUT_SECS", get("IMAP_AUTH_TIMEOUT_SECS"))?
        {
            imap = imap.auth_timeout(Duration::from_secs(secs));
        }

        let mut lookup = LookupConfig::default();
        if let Some(secs) = parse_var::<u64>(
            "LOOKUP_RECENCY_WINDOW_SECS",
            get("LOOKUP_RECENCY_WINDOW_SECS"),
        )? {
            lookup.recency_window = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var::<usize>("LOOKUP_MAX_MESSAGES", get("LOOKUP_MAX_MESSAGES"))? {
            if max == 0 {
                return Err(Error::InvalidConfig {
                    message: "LOOKUP_MAX_MESSAGES must be at least 1".into(),
                });
            }
            lookup.max_messages = max;
        }
        let delay_min = parse_var::<u64>("LOOKUP_DELAY_MIN_MS", get("LOOKUP_DELAY_MIN_MS"))?;
        let delay_max = parse_var::<u64>("LOOKUP_DELAY_MAX_MS", get("LOOKUP_DELAY_MAX_MS"))?;
        if delay_min.is_some() || delay_max.is_some() {
            let defaults = DelayRange::default();
            lookup.search_delay = DelayRange::new(
                delay_min.map_or(defaults.min(), Duration::from_millis),
                delay_max.map_or(defaults.max(), Duration::from_millis),
            )?;
        }
        if let Some(list) = get("LOOKUP_DISNEY_SUBJECTS") {
            lookup.disney_subjects = split_list(&list);
        }
        if let Some(list) = get("LOOKUP_NETFLIX_SUBJECTS") {
            lookup.netflix_subjects = split_list(&list);
        }
        if let Some(list) = get("LOOKUP_NETFLIX_LINKS") {
            lookup.netflix_links = split_list(&list);
        }

        let bind_raw = get("LOOKUP_BIND_ADDR").unwrap_or_else(|| Self::DEFAULT_BIND_ADDR.into());
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|_| Error::InvalidConfig {
            message: format!("LOOKUP_BIND_ADDR is not a socket address: {bind_raw}"),
        })?;

        Ok(Self {
            imap: imap.build()?,
            lookup,
            bind_addr,
        })
    }
}

fn parse_var<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|value| {
        value.trim().parse().map_err(|_| Error::InvalidConfig {
            message: format!("{key} has an invalid value: {value}"),
        })
    })
    .transpose()
}

/// Splits a `|`-separated list, dropping blank entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
