//! The mail store seam between the scanner and the IMAP client.
//!
//! [`MailStore`] opens sessions; a [`MailSession`] lists and fetches messages of the
//! selected folder and must be closed by its owner. [`ImapMailStore`] is the
//! production implementation.

use crate::client::ImapClient;
use crate::config::ImapConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Server-side handle of a message, without content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMeta {
    /// IMAP UID.
    pub uid: u32,
    /// Server INTERNALDATE, if reported.
    pub internal_date: Option<DateTime<Utc>>,
}

/// A fetched message: server metadata plus the raw RFC 5322 content.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// IMAP UID.
    pub uid: u32,
    /// Server INTERNALDATE, if reported.
    pub internal_date: Option<DateTime<Utc>>,
    /// Raw message bytes.
    pub content: Vec<u8>,
}

/// An authenticated session with a folder selected.
#[async_trait]
pub trait MailSession: Send {
    /// Lists every message of the selected folder.
    async fn list_messages(&mut self) -> Result<Vec<MessageMeta>>;

    /// Fetches the content of the given messages without marking them as seen.
    ///
    /// The returned order is unspecified; messages the server no longer has are omitted.
    async fn fetch_messages(&mut self, uids: &[u32]) -> Result<Vec<RawMessage>>;

    /// Ends the session.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions against a mail store.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Connects, authenticates and selects the inbox.
    async fn open(&self) -> Result<Box<dyn MailSession>>;
}

/// IMAP-backed [`MailStore`].
#[derive(Debug, Clone)]
pub struct ImapMailStore {
    config: ImapConfig,
}

impl ImapMailStore {
    /// Creates a store for the given mailbox.
    #[must_use]
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }

    /// The mailbox configuration.
    #[must_use]
    pub fn config(&self) -> &ImapConfig {
        &self.config
    }
}

#[async_trait]
impl MailStore for ImapMailStore {
    async fn open(&self) -> Result<Box<dyn MailSession>> {
        let client = ImapClient::connect(self.config.clone()).await?;
        Ok(Box::new(client))
    }
}
