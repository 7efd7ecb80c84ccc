//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use crate::mailbox::{MessageMeta, RawMessage};
use async_imap::types::Fetch;
use async_imap::Session;
use chrono::Utc;
use futures::TryStreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Authentication configuration for IMAP.
pub(crate) struct AuthConfig<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Authenticates to IMAP server and returns a session.
#[instrument(
    name = "session::authenticate",
    skip_all,
    fields(email = %config.email)
)]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    config: &AuthConfig<'_>,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(config.email, config.password)
        .await
        .map_err(|e| Error::ImapLogin {
            email: config.email.to_string(),
            source: e.0,
        })
}

/// Selects a mailbox (typically "INBOX") and returns its message count.
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<u32> {
    debug!("Selecting mailbox");

    let selected = session
        .select(mailbox)
        .await
        .map_err(|source| Error::SelectMailbox {
            mailbox: mailbox.to_string(),
            source,
        })?;

    debug!(exists = selected.exists, "Mailbox selected");

    Ok(selected.exists)
}

/// Lists UIDs and internal dates of every message in the selected mailbox.
///
/// `exists` is the count reported by SELECT. The command length does not grow with
/// the mailbox.
#[instrument(name = "session::list_all", skip(session))]
pub(crate) async fn list_all(session: &mut ImapSession, exists: u32) -> Result<Vec<MessageMeta>> {
    let Some(range) = list_range(exists) else {
        debug!("Mailbox is empty");
        return Ok(Vec::new());
    };

    let fetches = fetch(session, range, "(UID INTERNALDATE)").await?;

    let metas: Vec<MessageMeta> = fetches
        .iter()
        .filter_map(|f| {
            f.uid.map(|uid| MessageMeta {
                uid,
                internal_date: f.internal_date().map(|d| d.with_timezone(&Utc)),
            })
        })
        .collect();

    debug!(exists, listed = metas.len(), "Listed messages");

    Ok(metas)
}

/// Fetches full message content by UID without setting `\Seen`.
#[instrument(name = "session::fetch_bodies", skip(session, uids), fields(count = uids.len()))]
pub(crate) async fn fetch_bodies(
    session: &mut ImapSession,
    uids: &[u32],
) -> Result<Vec<RawMessage>> {
    if uids.is_empty() {
        return Ok(Vec::new());
    }

    let uid_set = to_uid_set(uids.iter().copied());
    let fetches = fetch(session, &uid_set, "(UID INTERNALDATE BODY.PEEK[])").await?;

    Ok(fetches
        .iter()
        .filter_map(|f| {
            let uid = f.uid?;
            let Some(body) = f.body() else {
                debug!(uid, "Message has no body");
                return None;
            };
            Some(RawMessage {
                uid,
                internal_date: f.internal_date().map(|d| d.with_timezone(&Utc)),
                content: body.to_vec(),
            })
        })
        .collect())
}

/// Runs a UID FETCH and drains the response stream.
async fn fetch(session: &mut ImapSession, uid_set: &str, query: &str) -> Result<Vec<Fetch>> {
    debug!(uid_set = %uid_set, query = %query, "Fetching messages");

    let stream = session
        .uid_fetch(uid_set, query)
        .await
        .map_err(|source| Error::ImapFetch {
            uid_set: uid_set.to_string(),
            source,
        })?;

    stream
        .try_collect()
        .await
        .map_err(|source| Error::FetchMessage { source })
}

/// UID range covering the whole mailbox, or `None` when it is empty.
///
/// `1:*` on an empty mailbox is rejected by some servers.
fn list_range(exists: u32) -> Option<&'static str> {
    (exists > 0).then_some("1:*")
}

/// Formats UIDs as an IMAP sequence set ("3,8,12").
pub(crate) fn to_uid_set(uids: impl IntoIterator<Item = u32>) -> String {
    uids.into_iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })?;

    Ok(())
}
