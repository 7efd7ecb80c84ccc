//! Deciding whether a parsed message answers the lookup.
//!
//! A message matches when it is addressed to the target, is recent enough, and its
//! subject contains an entry of one of the two subject catalogs. The Disney+ catalog
//! is consulted first, so a subject present in both catalogs classifies as Disney+.
//!
//! # Example
//!
//! ```
//! use mailbox_lookup::classifier::{Classifier, MatchKind, SubjectCatalog};
//! use mailbox_lookup::parser::ParsedMessage;
//! use chrono::{Duration, Utc};
//! use std::time::Duration as StdDuration;
//!
//! let classifier = Classifier::new(
//!     SubjectCatalog::new(["passcode for Disney+"]),
//!     SubjectCatalog::new(["temporal de Netflix"]),
//!     StdDuration::from_secs(600),
//! );
//!
//! let now = Utc::now();
//! let message = ParsedMessage {
//!     to: vec!["Alice@X.com".into()],
//!     subject: "Your one-time passcode for Disney+".into(),
//!     date: now - Duration::minutes(2),
//!     text_body: None,
//!     html_body: Some("<b>123456</b>".into()),
//! };
//!
//! assert_eq!(classifier.classify(&message, "alice@x.com", now), MatchKind::Disney);
//! ```

use crate::config::LookupConfig;
use crate::parser::ParsedMessage;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Which notification a message is, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// Sign-in code notification; answered with the message body.
    Disney,
    /// Verification notification; answered with a link from the body.
    Netflix,
    /// Not relevant to this lookup.
    NoMatch,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::Disney => write!(f, "disney"),
            MatchKind::Netflix => write!(f, "netflix"),
            MatchKind::NoMatch => write!(f, "no_match"),
        }
    }
}

/// Known subject fragments of one service's notifications.
#[derive(Debug, Clone, Default)]
pub struct SubjectCatalog {
    entries: Vec<String>,
}

impl SubjectCatalog {
    /// Creates a catalog; blank entries are dropped so they cannot match every subject.
    #[must_use]
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(Into::into)
                .filter(|entry: &String| !entry.is_empty())
                .collect(),
        }
    }

    /// Returns `true` if the subject contains any catalog entry (case-sensitive).
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        self.entries.iter().any(|entry| subject.contains(entry.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Message classifier with injected catalogs and recency window.
#[derive(Debug, Clone)]
pub struct Classifier {
    disney: SubjectCatalog,
    netflix: SubjectCatalog,
    recency_window: Duration,
}

impl Classifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(disney: SubjectCatalog, netflix: SubjectCatalog, recency_window: Duration) -> Self {
        Self {
            disney,
            netflix,
            recency_window,
        }
    }

    /// Creates a classifier from the lookup configuration.
    #[must_use]
    pub fn from_config(config: &LookupConfig) -> Self {
        Self::new(
            SubjectCatalog::new(config.disney_subjects.iter().cloned()),
            SubjectCatalog::new(config.netflix_subjects.iter().cloned()),
            config.recency_window,
        )
    }

    /// Classifies a message for `target_email` as of `now`.
    #[must_use]
    pub fn classify(
        &self,
        message: &ParsedMessage,
        target_email: &str,
        now: DateTime<Utc>,
    ) -> MatchKind {
        if !is_to_target(&message.to, target_email) || !self.is_recent(message.date, now) {
            return MatchKind::NoMatch;
        }

        if self.disney.matches(&message.subject) {
            MatchKind::Disney
        } else if self.netflix.matches(&message.subject) {
            MatchKind::Netflix
        } else {
            MatchKind::NoMatch
        }
    }

    /// `now - date <= window`; future-dated messages count as recent.
    #[must_use]
    pub fn is_recent(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - date).to_std() {
            Ok(age) => age <= self.recency_window,
            // Negative age: the message is dated in the future
            Err(_) => true,
        }
    }
}

/// Case-insensitive substring containment of the target in any recipient.
///
/// Recipients holding a display name or extra formatting still match.
#[must_use]
pub fn is_to_target(recipients: &[String], target_email: &str) -> bool {
    let target = target_email.to_lowercase();
    if target.is_empty() {
        return false;
    }
    recipients
        .iter()
        .any(|recipient| recipient.to_lowercase().contains(&target))
}
