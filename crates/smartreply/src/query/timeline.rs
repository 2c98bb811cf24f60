//! Timeline assembly for the conversation on screen
//!
//! Stored history gives the long view; what the host app currently shows may
//! be newer and may include messages the stores never saw (RCS). Both are
//! stitched into one list for the prompt layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::merge::{DEFAULT_MERGED_LIMIT, merge_for_contact};
use crate::models::{ActiveConversation, Message, MessageId, ScrapedMessage, Thread, ThreadId};
use crate::threads::ThreadMerger;

/// Stored messages kept ahead of scraped ones
pub const DEFAULT_PROVIDER_CONTEXT_LIMIT: usize = 50;

/// Address recorded on scraped messages sent by the device owner
pub const SELF_ADDRESS: &str = "me";

/// Size limits applied while assembling a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineLimits {
    /// Maximum size of a merged cross-thread history
    pub merged: usize,
    /// Stored messages kept when scraped messages are appended
    pub provider_context: usize,
}

impl Default for TimelineLimits {
    fn default() -> Self {
        Self {
            merged: DEFAULT_MERGED_LIMIT,
            provider_context: DEFAULT_PROVIDER_CONTEXT_LIMIT,
        }
    }
}

/// Everything the prompt layer needs about one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTimeline {
    pub thread: Thread,
    /// Participant address to resolved name
    pub participants: BTreeMap<String, Option<String>>,
    /// Oldest first; scraped messages, if any, come last
    pub messages: Vec<Message>,
}

impl ConversationTimeline {
    pub fn is_group(&self) -> bool {
        self.thread.is_group()
    }

    pub fn scraped_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.id.source() == crate::models::MessageSource::Scraped)
            .count()
    }
}

/// Turn on-screen messages into timeline messages stamped `now`
///
/// Scraped messages have no usable timestamp, only a display label; they are
/// known to be the most recent, which is all ordering needs.
pub fn scraped_to_messages(
    thread_id: &ThreadId,
    scraped: &[ScrapedMessage],
    now: DateTime<Utc>,
) -> Vec<Message> {
    let now_ms = now.timestamp_millis();
    scraped
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let (address, sender_name) = if s.is_from_me {
                (SELF_ADDRESS.to_string(), None)
            } else {
                (s.sender.clone(), Some(s.sender.clone()))
            };
            Message::new(
                MessageId::scraped(i),
                thread_id.clone(),
                address,
                s.body.clone(),
                now_ms,
                s.is_from_me,
            )
            .with_sender_name(sender_name)
        })
        .collect()
}

/// Build the timeline for the active conversation
///
/// Returns `None` when the thread is no longer in the thread list.
pub fn build_timeline(
    merger: &ThreadMerger,
    active: &ActiveConversation,
    limits: TimelineLimits,
    now: DateTime<Utc>,
) -> Option<ConversationTimeline> {
    let Some(thread) = merger.thread_by_id(&active.thread_id) else {
        debug!("Thread {} not found for timeline", active.thread_id);
        return None;
    };
    let participants = thread.participants();

    let provider = if thread.is_group() {
        merger.messages_with_names(&thread.thread_id, &participants)
    } else {
        merge_for_contact(
            merger,
            &thread.thread_id,
            &thread.primary_address,
            &participants,
            limits.merged,
        )
    };

    let messages = if active.scraped_messages.is_empty() {
        provider
    } else {
        let skip = provider.len().saturating_sub(limits.provider_context);
        let provider_count = provider.len() - skip;
        let mut combined: Vec<Message> = provider.into_iter().skip(skip).collect();
        combined.extend(scraped_to_messages(
            &thread.thread_id,
            &active.scraped_messages,
            now,
        ));
        debug!(
            "Combined {provider_count} stored + {} scraped messages",
            active.scraped_messages.len()
        );
        combined
    };

    Some(ConversationTimeline {
        thread,
        participants,
        messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SelfNumbers;
    use crate::models::{Contact, MessageSource};
    use crate::storage::{
        AddressKind, DirectRecord, InMemoryContactStore, InMemoryMessageStore, MultimediaAddress,
        MultimediaHeader,
    };
    use crate::threads::ThreadStoreReader;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn sms(id: i64, thread: &str, address: &str, ts: i64) -> DirectRecord {
        DirectRecord {
            id,
            thread_id: Some(thread.into()),
            address: Some(address.into()),
            body: Some(format!("stored {id}")),
            timestamp_ms: ts,
            kind: 1,
        }
    }

    fn setup(count: i64) -> ThreadMerger {
        let store = Arc::new(InMemoryMessageStore::new());
        for i in 0..count {
            store
                .insert_direct(sms(i, "1", "+19195550123", i * 10_000))
                .unwrap();
        }
        store
            .insert_multimedia(
                MultimediaHeader {
                    id: 1,
                    thread_id: Some("7".into()),
                    timestamp_secs: 5,
                    message_box: 1,
                },
                Some("group pic"),
                vec![
                    MultimediaAddress::new("+19195550123", AddressKind::From),
                    MultimediaAddress::new("+19195550124", AddressKind::To),
                ],
            )
            .unwrap();
        let contacts = Arc::new(InMemoryContactStore::with_contacts([
            Contact::new("Alice", "+19195550123"),
            Contact::new("Bob", "+19195550124"),
        ]));
        ThreadMerger::new(
            ThreadStoreReader::new(store, SelfNumbers::default()),
            contacts,
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(9_000_000).single().unwrap()
    }

    #[test]
    fn test_timeline_without_scraped() {
        let merger = setup(3);
        let active = ActiveConversation::new(ThreadId::new("1"), Some("Alice".into()), vec![]);
        let timeline = build_timeline(&merger, &active, TimelineLimits::default(), now()).unwrap();
        assert_eq!(timeline.messages.len(), 3);
        assert_eq!(timeline.scraped_count(), 0);
        assert_eq!(timeline.participants["+19195550123"].as_deref(), Some("Alice"));
    }

    #[test]
    fn test_timeline_appends_scraped_after_recent_context() {
        let merger = setup(60);
        let active = ActiveConversation::new(
            ThreadId::new("1"),
            Some("Alice".into()),
            vec![
                ScrapedMessage::incoming("Alice", "you there?", "Today 2:36 PM"),
                ScrapedMessage::outgoing("yep", "Today 2:37 PM"),
            ],
        );
        let timeline = build_timeline(&merger, &active, TimelineLimits::default(), now()).unwrap();
        assert_eq!(timeline.messages.len(), DEFAULT_PROVIDER_CONTEXT_LIMIT + 2);
        assert_eq!(timeline.messages[0].body, "stored 10");

        let incoming = &timeline.messages[50];
        assert_eq!(incoming.id.source(), MessageSource::Scraped);
        assert_eq!(incoming.address, "Alice");
        assert_eq!(incoming.sender_name.as_deref(), Some("Alice"));
        assert_eq!(incoming.timestamp, 9_000_000);

        let outgoing = &timeline.messages[51];
        assert!(outgoing.is_from_me);
        assert_eq!(outgoing.address, SELF_ADDRESS);
        assert_eq!(outgoing.sender_name, None);
        assert_ne!(incoming.id, outgoing.id);
    }

    #[test]
    fn test_group_timeline_uses_single_thread() {
        let merger = setup(2);
        let active = ActiveConversation::new(ThreadId::new("7"), None, vec![]);
        let timeline = build_timeline(&merger, &active, TimelineLimits::default(), now()).unwrap();
        assert!(timeline.is_group());
        assert_eq!(timeline.messages.len(), 1);
        assert_eq!(timeline.messages[0].sender_name.as_deref(), Some("Alice"));
        assert_eq!(timeline.participants.len(), 2);
    }

    #[test]
    fn test_unknown_thread() {
        let merger = setup(1);
        let active = ActiveConversation::new(ThreadId::new("404"), None, vec![]);
        assert!(build_timeline(&merger, &active, TimelineLimits::default(), now()).is_none());
    }
}
