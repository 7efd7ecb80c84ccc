//! The mailbox scan: find the most recent relevant message for a recipient.
//!
//! A scan opens one session, pauses for a random interval, lists the inbox, keeps the
//! newest `max_messages` entries, and walks them newest first. The first message that
//! classifies as a match and yields a payload ends the scan. The session is closed
//! exactly once whatever the outcome.

use crate::classifier::{Classifier, MatchKind};
use crate::config::{DelayRange, LookupConfig};
use crate::error::Result;
use crate::mailbox::{MailSession, MailStore, MessageMeta, RawMessage};
use crate::matcher::{self, LinkMatcher, Matcher};
use crate::parser::{self, ParseOutcome, ParsedMessage};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Outcome of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// A sign-in code message; carries its body (HTML preferred).
    Disney {
        /// Message body.
        body: String,
    },
    /// A verification message; carries the extracted link.
    Netflix {
        /// Verification link.
        link: String,
    },
    /// Nothing relevant was found.
    NoMatch(NoMatchReason),
}

/// Why a scan found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchReason {
    /// The inbox holds no messages.
    EmptyMailbox,
    /// Every examined message was irrelevant.
    Exhausted,
}

/// Scans a mail store with a fixed lookup configuration.
#[derive(Debug, Clone)]
pub struct Scanner {
    classifier: Classifier,
    links: LinkMatcher,
    max_messages: usize,
    search_delay: DelayRange,
}

impl Scanner {
    /// Creates a scanner from the lookup configuration.
    #[must_use]
    pub fn new(config: &LookupConfig) -> Self {
        Self {
            classifier: Classifier::from_config(config),
            links: LinkMatcher::new(config.netflix_links.iter().cloned()),
            max_messages: config.max_messages,
            search_delay: config.search_delay,
        }
    }

    /// Looks up the most recent relevant message addressed to `target_email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, listed or fetched. Individual
    /// messages that fail to parse are skipped instead.
    #[instrument(name = "Scanner::scan", skip(self, store), fields(recipient = %target_email))]
    pub async fn scan(&self, store: &dyn MailStore, target_email: &str) -> Result<MatchResult> {
        let mut session = store.open().await?;

        let outcome = self.scan_session(session.as_mut(), target_email).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, category = %e.category(), "Failed to close mailbox session");
        }

        outcome
    }

    async fn scan_session(
        &self,
        session: &mut dyn MailSession,
        target_email: &str,
    ) -> Result<MatchResult> {
        let delay = sample_delay(self.search_delay);
        if !delay.is_zero() {
            debug!(delay = ?delay, "Pausing before search");
            tokio::time::sleep(delay).await;
        }

        let listed = session.list_messages().await?;
        if listed.is_empty() {
            info!("Mailbox is empty");
            return Ok(MatchResult::NoMatch(NoMatchReason::EmptyMailbox));
        }

        let now = Utc::now();
        let listed_count = listed.len();
        let selected = select_recent(listed, now, self.max_messages);
        let uids: Vec<u32> = selected.iter().map(|meta| meta.uid).collect();

        debug!(listed = listed_count, selected = uids.len(), "Fetching candidates");

        let mut fetched: HashMap<u32, RawMessage> = session
            .fetch_messages(&uids)
            .await?
            .into_iter()
            .map(|raw| (raw.uid, raw))
            .collect();

        for uid in uids {
            let Some(raw) = fetched.remove(&uid) else {
                debug!(uid, "Message vanished before fetch, skipping");
                continue;
            };

            if let Some(result) = self.evaluate(&raw, target_email, now) {
                info!(uid, "Match found");
                return Ok(result);
            }
        }

        info!("No matching message");
        Ok(MatchResult::NoMatch(NoMatchReason::Exhausted))
    }

    /// Parses, classifies and extracts a single message.
    ///
    /// Returns `None` when the message is skipped, irrelevant, or a verification
    /// message without a usable link.
    #[must_use]
    pub fn evaluate(
        &self,
        raw: &RawMessage,
        target_email: &str,
        now: DateTime<Utc>,
    ) -> Option<MatchResult> {
        let message = match parser::parse_message(raw, now) {
            ParseOutcome::Parsed(message) => message,
            ParseOutcome::Skipped(reason) => {
                debug!(uid = raw.uid, reason = %reason, "Skipped message");
                return None;
            }
        };

        let kind = self.classifier.classify(&message, target_email, now);
        debug!(uid = raw.uid, kind = %kind, "Classified message");

        match kind {
            MatchKind::Disney => Some(MatchResult::Disney {
                body: disney_body(&message).to_string(),
            }),
            MatchKind::Netflix => {
                let text = netflix_text(&message);
                let link = self.links.find_match(&text);
                if link.is_none() {
                    debug!(uid = raw.uid, matcher = %self.links.description(), "No link in message");
                }
                link.map(|link| MatchResult::Netflix {
                    link: link.into_owned(),
                })
            }
            MatchKind::NoMatch => None,
        }
    }
}

/// Orders messages newest first (undated ones count as `now`) and keeps the first `max`.
///
/// Ties are broken by descending UID.
#[must_use]
pub fn select_recent(
    mut messages: Vec<MessageMeta>,
    now: DateTime<Utc>,
    max: usize,
) -> Vec<MessageMeta> {
    messages.sort_by_key(|meta| (Reverse(meta.internal_date.unwrap_or(now)), Reverse(meta.uid)));
    messages.truncate(max);
    messages
}

fn sample_delay(range: DelayRange) -> Duration {
    if range.min() == range.max() {
        return range.min();
    }
    rand::rng().random_range(range.min()..=range.max())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn disney_body(message: &ParsedMessage) -> &str {
    parser::first_available([
        non_empty(message.html_body.as_deref()),
        non_empty(message.text_body.as_deref()),
    ])
    .unwrap_or("")
}

/// Plain text as is; otherwise the link targets of the HTML body, or the raw markup
/// when it has none.
fn netflix_text(message: &ParsedMessage) -> Cow<'_, str> {
    if let Some(text) = non_empty(message.text_body.as_deref()) {
        return Cow::Borrowed(text);
    }
    match non_empty(message.html_body.as_deref()) {
        Some(html) => matcher::html_links(html).map_or(Cow::Borrowed(html), Cow::Owned),
        None => Cow::Borrowed(""),
    }
}
