//! Link extraction from email bodies.
//!
//! A [`Matcher`] pulls a single value out of message text. The lookup uses
//! [`LinkMatcher`], which picks the verification link with the highest
//! priority among every URL in the text.
//!
//! # Example
//!
//! ```
//! use mailbox_lookup::matcher::{LinkMatcher, Matcher};
//!
//! let matcher = LinkMatcher::new(["https://www.netflix.com/password?g="]);
//! let text = "Help: https://help.netflix.com\nReset: https://www.netflix.com/password?g=abc";
//! assert_eq!(
//!     matcher.find_match(text).as_deref(),
//!     Some("https://www.netflix.com/password?g=abc")
//! );
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Anything that starts with http(s):// and runs until whitespace or a closing bracket.
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s)\]]+").expect("valid URL regex"));

/// Quoted `href` attribute values.
static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("valid href regex")
});

/// Trait for matching and extracting content from email bodies.
pub trait Matcher: Send + Sync {
    /// Attempts to find and extract matching content from the text.
    ///
    /// Returns `Some(matched_value)` if found, `None` otherwise.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Returns a human-readable description of what this matcher looks for.
    ///
    /// Used in logging.
    fn description(&self) -> &str;
}

/// Picks a URL from text, preferring those that contain one of an ordered set of patterns.
///
/// The first pattern with any matching URL wins, even if a URL for a later pattern
/// appears earlier in the text. With no preferred match, the first URL in document
/// order is returned.
#[derive(Debug, Clone)]
pub struct LinkMatcher {
    patterns: Vec<String>,
    description: String,
}

impl LinkMatcher {
    /// Creates a matcher from patterns ordered by priority.
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        Self {
            description: format!("link preferring {} pattern(s)", patterns.len()),
            patterns,
        }
    }

    /// The preferred patterns, highest priority first.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Matcher for LinkMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        extract_link(text, &self.patterns).map(Cow::Borrowed)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Returns the best URL in `text` given `preferred` patterns in priority order.
///
/// Returns `None` when the text is empty or holds no URL.
#[must_use]
pub fn extract_link<'a, P>(text: &'a str, preferred: &[P]) -> Option<&'a str>
where
    P: AsRef<str>,
{
    if text.is_empty() {
        return None;
    }

    let urls: Vec<&str> = URL_RE.find_iter(text).map(|m| m.as_str()).collect();
    let first = *urls.first()?;

    let chosen = preferred
        .iter()
        .find_map(|pattern| {
            let pattern = pattern.as_ref();
            urls.iter().copied().find(|url| url.contains(pattern))
        })
        .unwrap_or(first);

    Some(chosen.strip_suffix(']').unwrap_or(chosen))
}

/// Collects the `href` targets of an HTML body, one per line, with `&amp;` decoded.
///
/// Returns `None` when the markup has no quoted `href` attribute. The result is meant
/// to be fed to [`extract_link`] in place of the raw markup.
#[must_use]
pub fn html_links(html: &str) -> Option<String> {
    let links: Vec<String> = HREF_RE
        .captures_iter(html)
        .map(|caps| caps[1].trim().replace("&amp;", "&"))
        .collect();

    if links.is_empty() {
        None
    } else {
        Some(links.join("\n"))
    }
}
