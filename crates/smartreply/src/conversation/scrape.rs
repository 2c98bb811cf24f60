//! Interpreting text read off the host messaging app
//!
//! The accessibility observer hands over raw strings: the toolbar title and,
//! per visible message bubble, the node's content description plus its text.
//! Descriptions look like:
//!
//! ```text
//! Ammi said  Ok Wednesday 2:36 PM .
//! You sent  Hey what's up Wednesday 3:00 PM .
//! Ammi said  Ok Wednesday 2:36 PM . Loved by Sam
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::address::MIN_PHONE_DIGITS;
use crate::models::ScrapedMessage;

/// Screen titles that never name a conversation
pub const EXCLUDED_TITLES: &[&str] = &[
    "messages",
    "google messages",
    "new conversation",
    "search",
    "settings",
    "start chat",
    "archived",
    "spam & blocked",
    "message organization",
    // compose field hint
    "rcs message",
];

const MIN_TITLE_CHARS: usize = 2;
const MAX_TITLE_CHARS: usize = 60;

fn time_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?P<label>(?:Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday|Yesterday|Today|\d{1,2}/\d{1,2}(?:/\d{2,4})?)\s+\d{1,2}:\d{2}\s*[AP]M)\s*\.?(?:\s*(?:Loved|Liked|Laughed|Emphasized|Questioned|Disliked)\s+by\s+.+)?$",
        )
        .expect("valid time pattern")
    })
}

/// Whether a toolbar title can name a conversation
///
/// Phone numbers are accepted only with enough digits to match a thread.
pub fn is_likely_conversation_title(text: &str) -> bool {
    let lower = text.to_lowercase();
    if EXCLUDED_TITLES.contains(&lower.as_str()) {
        return false;
    }
    let len = text.chars().count();
    if !(MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) {
        return false;
    }
    let phone_shaped = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if phone_shaped {
        return text.chars().filter(|c| c.is_ascii_digit()).count() >= MIN_PHONE_DIGITS;
    }
    true
}

/// Parse one message bubble
///
/// `description` supplies sender and time; `text` is the clean body.
/// Returns `None` for bubbles without a recognizable sender or body.
pub fn parse_message_description(description: &str, text: &str) -> Option<ScrapedMessage> {
    let body = text.trim();
    if body.is_empty() {
        return None;
    }

    let is_from_me = description.starts_with("You sent") || description.starts_with("You said");
    let time_label = time_pattern()
        .captures(description)
        .and_then(|caps| caps.name("label"))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    if is_from_me {
        return Some(ScrapedMessage::outgoing(body, time_label));
    }

    let said = description.find(" said ")?;
    Some(ScrapedMessage::incoming(&description[..said], body, time_label))
}
