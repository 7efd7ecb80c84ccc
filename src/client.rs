//! IMAP client for the shared mailbox.
//!
//! [`ImapClient`] connects over TLS, authenticates, selects `INBOX`, and then serves
//! as the [`MailSession`] of a single lookup. Every round-trip is bounded by the
//! configured [`TimeoutConfig`](crate::config::TimeoutConfig).

use crate::config::ImapConfig;
use crate::connection;
use crate::error::{Error, Result};
use crate::mailbox::{MailSession, MessageMeta, RawMessage};
use crate::session::{self, AuthConfig, ImapSession};
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, instrument, warn};

const INBOX: &str = "INBOX";

/// Authenticated IMAP connection with `INBOX` selected.
///
/// Create using [`ImapClient::connect`]; end with [`MailSession::close`].
pub struct ImapClient {
    session: Box<ImapSession>,
    config: ImapConfig,
    /// Message count reported when `INBOX` was selected.
    exists: u32,
}

impl ImapClient {
    /// Connects to the IMAP server and selects the inbox.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection cannot be established
    /// - Authentication fails
    /// - Mailbox selection fails
    #[instrument(
        name = "ImapClient::connect",
        skip_all,
        fields(
            email = %config.email(),
            imap_host = %config.imap_host
        )
    )]
    pub async fn connect(config: ImapConfig) -> Result<Self> {
        let (session, exists) = Self::initialize_session(&config).await?;

        debug!(exists, "Client connected and ready");

        Ok(Self {
            session: Box::new(session),
            config,
            exists,
        })
    }

    /// Returns the login address of this connection.
    #[must_use]
    pub fn email(&self) -> &str {
        self.config.email()
    }

    /// Establishes TLS, authenticates and selects the inbox.
    ///
    /// Returns the session with the inbox message count. A failed selection logs the
    /// session out before the error is returned.
    async fn initialize_session(config: &ImapConfig) -> Result<(ImapSession, u32)> {
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&config.imap_host, &target_addr, &config.tls),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let auth_config = AuthConfig {
            email: config.email(),
            password: config.password(),
        };

        let mut session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, &auth_config),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: config.email().to_string(),
            timeout: timeouts.auth,
        })??;

        debug!("Authenticated");

        let selected =
            tokio::time::timeout(timeouts.select, session::select_mailbox(&mut session, INBOX))
                .await
                .map_err(|_| Error::SelectTimeout {
                    mailbox: INBOX.to_string(),
                    timeout: timeouts.select,
                })
                .and_then(|result| result);

        let logout_timeout = timeouts.logout;
        let session_ref = &mut session;
        let exists = logout_on_error(selected, move || async move {
            tokio::time::timeout(logout_timeout, session::logout(session_ref))
                .await
                .map_err(|_| Error::LogoutTimeout {
                    timeout: logout_timeout,
                })?
        })
        .await?;

        debug!("Selected INBOX");

        Ok((session, exists))
    }
}

/// Passes `result` through, running `logout` first when it is an error.
///
/// A failing logout is logged and otherwise ignored.
async fn logout_on_error<T, F, Fut>(result: Result<T>, logout: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if result.is_err() {
        if let Err(e) = logout().await {
            warn!(error = %e, category = %e.category(), "Logout after failed setup failed");
        }
    }
    result
}

#[async_trait]
impl MailSession for ImapClient {
    async fn list_messages(&mut self) -> Result<Vec<MessageMeta>> {
        let timeout = self.config.timeouts.search;

        tokio::time::timeout(timeout, session::list_all(&mut self.session, self.exists))
            .await
            .map_err(|_| Error::SearchTimeout { timeout })?
    }

    async fn fetch_messages(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>> {
        let timeout = self.config.timeouts.fetch;

        tokio::time::timeout(timeout, session::fetch_bodies(&mut self.session, uids))
            .await
            .map_err(|_| Error::FetchTimeout {
                uid_set: session::to_uid_set(uids.iter().copied()),
                timeout,
            })?
    }

    #[instrument(name = "ImapClient::close", skip(self))]
    async fn close(&mut self) -> Result<()> {
        let timeout = self.config.timeouts.logout;

        tokio::time::timeout(timeout, session::logout(&mut self.session))
            .await
            .map_err(|_| Error::LogoutTimeout { timeout })?
    }
}

impl std::fmt::Debug for ImapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapClient")
            .field("email", &self.config.email())
            .field("imap_host", &self.config.imap_host)
            .field("exists", &self.exists)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn select_failure() -> Error {
        Error::SelectTimeout {
            mailbox: INBOX.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_logout_on_error_skips_successful_setup() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result = logout_on_error(Ok(12_u32), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap(), 12);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_on_error_logs_out_once() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<u32> = logout_on_error(Err(select_failure()), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::SelectTimeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_failure_keeps_original_error() {
        let result: Result<u32> = logout_on_error(Err(select_failure()), || async {
            Err(Error::LogoutTimeout {
                timeout: Duration::from_secs(5),
            })
        })
        .await;

        assert!(matches!(result, Err(Error::SelectTimeout { .. })));
    }
}
