//! Conversation pacing hints for the prompt layer
//!
//! Plain date arithmetic over a timeline: who spoke last, how long ago, and
//! whether the latest incoming message asks something.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Message;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const CLUSTER_GAP_MS: i64 = 48 * 60 * 60 * 1000;

/// How overdue an unanswered message is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// At least a day
    Slight,
    /// At least a week
    Delayed,
    /// At least a month
    Overdue,
}

/// Silence pattern at the end of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationGap {
    /// They wrote last and have been waiting
    Unanswered { days: i64, severity: Severity },
    /// I wrote last and never heard back
    Reinitiation { days: i64 },
    /// Nobody has written in a long time
    Dormant { days: i64 },
}

impl ConversationGap {
    pub fn days(&self) -> i64 {
        match self {
            ConversationGap::Unanswered { days, .. }
            | ConversationGap::Reinitiation { days }
            | ConversationGap::Dormant { days } => *days,
        }
    }
}

/// What the newest incoming message in the latest exchange looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicHint {
    Question,
    Scheduling,
}

fn whole_days(from_ms: i64, to_ms: i64) -> i64 {
    (to_ms - from_ms) / DAY_MS
}

/// Classify the silence at the end of `messages` (oldest first)
pub fn analyze_gaps(messages: &[Message], now: DateTime<Utc>) -> Option<ConversationGap> {
    let last = messages.last()?;
    let now_ms = now.timestamp_millis();
    let mine = messages.iter().rev().find(|m| m.is_from_me);
    let theirs = messages.iter().rev().find(|m| !m.is_from_me);

    if let (Some(mine), Some(theirs)) = (mine, theirs) {
        if theirs.timestamp > mine.timestamp {
            let days = whole_days(theirs.timestamp, now_ms);
            let severity = match days {
                d if d >= 30 => Severity::Overdue,
                d if d >= 7 => Severity::Delayed,
                d if d >= 1 => Severity::Slight,
                _ => return None,
            };
            return Some(ConversationGap::Unanswered { days, severity });
        }
    }

    if let Some(mine) = mine {
        let days = whole_days(mine.timestamp, now_ms);
        if days >= 14 {
            return Some(ConversationGap::Reinitiation { days });
        }
    }

    let days = whole_days(last.timestamp, now_ms);
    (days >= 30).then_some(ConversationGap::Dormant { days })
}

/// Inspect the latest burst of messages for something needing an answer
///
/// The burst is the trailing run of messages at most 48 hours apart; it
/// needs two messages, and the timeline at least three.
pub fn recent_topic_hint(messages: &[Message]) -> Option<TopicHint> {
    if messages.len() < 3 {
        return None;
    }

    let mut cluster: Vec<&Message> = Vec::new();
    for msg in messages.iter().rev() {
        match cluster.last() {
            Some(newer) if newer.timestamp - msg.timestamp > CLUSTER_GAP_MS => break,
            _ => cluster.push(msg),
        }
    }
    if cluster.len() < 2 {
        return None;
    }

    let body = &cluster.iter().find(|m| !m.is_from_me)?.body;
    if body.contains('?') {
        Some(TopicHint::Question)
    } else if body.chars().any(|c| c.is_ascii_digit())
        && (body.contains(':') || body.contains("pm") || body.contains("am"))
    {
        Some(TopicHint::Scheduling)
    } else {
        None
    }
}

/// Human wording for a gap of `days`
pub fn format_gap(days: i64) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n > 1 {
            format!("{n} {name}s")
        } else {
            format!("{n} {name}")
        }
    }
    match days {
        d if d >= 365 => unit(d / 365, "year"),
        d if d >= 30 => unit(d / 30, "month"),
        d if d >= 7 => unit(d / 7, "week"),
        1 => "1 day".to_string(),
        d => format!("{d} days"),
    }
}
