//! Parsing raw messages into the fields the classifier needs.

use crate::error::Error;
use crate::mailbox::RawMessage;
use chrono::{DateTime, Utc};
use mailparse::{parse_mail, DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use tracing::{debug, warn};

/// A message reduced to the fields the lookup inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Recipient addresses from the `To` header.
    pub to: Vec<String>,
    /// Decoded subject, empty when absent.
    pub subject: String,
    /// Best known timestamp, see [`resolve_date`].
    pub date: DateTime<Utc>,
    /// First `text/plain` part.
    pub text_body: Option<String>,
    /// First `text/html` part.
    pub html_body: Option<String>,
}

/// Result of parsing one message.
///
/// A message that cannot be parsed is skipped by the scan, never fatal.
#[derive(Debug)]
pub enum ParseOutcome {
    /// The message was parsed.
    Parsed(Box<ParsedMessage>),
    /// The message was skipped; carries the reason for logging.
    Skipped(Error),
}

/// Parses a fetched message.
///
/// Missing or unparseable date headers fall back to the server's internal date, then
/// to `now`.
pub fn parse_message(raw: &RawMessage, now: DateTime<Utc>) -> ParseOutcome {
    let uid = raw.uid;

    let parsed = match parse_mail(&raw.content) {
        Ok(p) => p,
        Err(e) => {
            warn!(uid, error = %e, "Failed to parse email, skipping message");
            return ParseOutcome::Skipped(Error::ParseEmail { source: e });
        }
    };

    let headers = &parsed.headers;
    let subject = headers.get_first_value("Subject").unwrap_or_default();
    let to = recipients(headers.get_first_value("To").as_deref());
    let date = resolve_date(
        headers.get_first_value("Date").as_deref(),
        raw.internal_date,
        now,
    );

    let mut bodies = Bodies::default();
    collect_bodies(&parsed, &mut bodies);

    debug!(uid, subject = %subject, to = ?to, date = %date, "Parsed message");

    ParseOutcome::Parsed(Box::new(ParsedMessage {
        to,
        subject,
        date,
        text_body: bodies.text,
        html_body: bodies.html,
    }))
}

/// Returns the first source that yields a value, in priority order.
pub fn first_available<T, I>(sources: I) -> Option<T>
where
    I: IntoIterator<Item = Option<T>>,
{
    sources.into_iter().flatten().next()
}

/// Resolves a message timestamp: header `Date`, then server internal date, then `now`.
#[must_use]
pub fn resolve_date(
    header: Option<&str>,
    internal_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    first_available([header.and_then(parse_header_date), internal_date]).unwrap_or(now)
}

fn parse_header_date(value: &str) -> Option<DateTime<Utc>> {
    let secs = mailparse::dateparse(value.trim()).ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Extracts recipient addresses, falling back to the raw header value when the
/// address list cannot be parsed.
fn recipients(header: Option<&str>) -> Vec<String> {
    let Some(value) = header.map(str::trim).filter(|v| !v.is_empty()) else {
        return Vec::new();
    };

    let parsed: Vec<String> = mailparse::addrparse(value)
        .map(|list| {
            list.iter()
                .flat_map(|addr| match addr {
                    MailAddr::Single(info) => vec![info.addr.clone()],
                    MailAddr::Group(group) => {
                        group.addrs.iter().map(|info| info.addr.clone()).collect()
                    }
                })
                .filter(|addr| !addr.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if parsed.is_empty() {
        vec![value.to_string()]
    } else {
        parsed
    }
}

#[derive(Default)]
struct Bodies {
    text: Option<String>,
    html: Option<String>,
}

/// Walks the MIME tree keeping the first text and HTML parts, skipping attachments.
fn collect_bodies(part: &ParsedMail<'_>, bodies: &mut Bodies) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_bodies(sub, bodies);
        }
        return;
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return;
    }

    let slot = match part.ctype.mimetype.to_lowercase().as_str() {
        "text/plain" => &mut bodies.text,
        "text/html" => &mut bodies.html,
        _ => return,
    };
    if slot.is_some() {
        return;
    }

    match part.get_body() {
        Ok(body) => *slot = Some(body),
        Err(e) => debug!(error = %e, "Failed to decode body part"),
    }
}
