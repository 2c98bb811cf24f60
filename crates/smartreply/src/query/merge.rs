//! Cross-thread history for one contact
//!
//! The telephony provider regularly splits a one-to-one conversation over
//! several thread ids (plain text in one, picture messages in another, or a
//! number saved in two formats). Those threads are merged back into one
//! timeline here, dropping the copies a message leaves in each of them.

use std::collections::BTreeMap;

use log::debug;

use crate::address::addresses_match;
use crate::models::{Message, ThreadId};
use crate::threads::{ThreadMerger, attach_sender_names};

/// Two copies of a message are at most this far apart
pub const DUPLICATE_WINDOW_MS: i64 = 2_000;

/// Number of leading body characters compared for duplicates
pub const DUPLICATE_PREFIX_CHARS: usize = 20;

/// Default size of a merged timeline
pub const DEFAULT_MERGED_LIMIT: usize = 100;

/// Whether two messages are copies of the same message
///
/// Copies land within two seconds of each other and agree on the start of
/// the body; the tail may differ when one store truncated it.
pub fn is_near_duplicate(a: &Message, b: &Message) -> bool {
    (a.timestamp - b.timestamp).abs() < DUPLICATE_WINDOW_MS
        && a.body_prefix(DUPLICATE_PREFIX_CHARS) == b.body_prefix(DUPLICATE_PREFIX_CHARS)
}

/// Drop near-duplicates, newest first
///
/// Messages are visited newest first and kept unless they duplicate one
/// already kept, so of two copies the newer survives.
pub fn dedup_messages(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let mut kept: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        if !kept.iter().any(|k| is_near_duplicate(k, &msg)) {
            kept.push(msg);
        }
    }
    kept
}

/// Merged history of every one-to-one thread with `contact_address`
///
/// Falls back to the primary thread alone when no other thread matches.
/// Returns at most `limit` messages, oldest first, with sender names
/// attached to incoming messages.
pub fn merge_for_contact(
    merger: &ThreadMerger,
    primary_thread_id: &ThreadId,
    contact_address: &str,
    participants: &BTreeMap<String, Option<String>>,
    limit: usize,
) -> Vec<Message> {
    let threads = merger.threads();
    let mut matching: Vec<&ThreadId> = threads
        .iter()
        .filter(|t| {
            !t.is_group()
                && t.addresses
                    .iter()
                    .any(|addr| addresses_match(addr, contact_address))
        })
        .map(|t| &t.thread_id)
        .collect();
    matching.dedup();

    debug!(
        "Merging for {contact_address}: primary={primary_thread_id}, {} matching thread(s)",
        matching.len()
    );

    if matching.len() <= 1 {
        return merger.messages_with_names(primary_thread_id, participants);
    }

    let all: Vec<Message> = matching
        .iter()
        .flat_map(|tid| merger.messages_for_thread(tid))
        .collect();
    let total = all.len();

    let mut merged = dedup_messages(all);
    merged.truncate(limit);
    merged.sort_by_key(|m| m.timestamp);

    debug!("Merged {total} messages to {} after dedup and limit", merged.len());
    attach_sender_names(merged, participants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SelfNumbers;
    use crate::models::{Contact, MessageId};
    use crate::storage::{DirectRecord, InMemoryContactStore, InMemoryMessageStore};
    use crate::threads::ThreadStoreReader;
    use std::sync::Arc;

    fn msg(id: i64, body: &str, ts: i64) -> Message {
        Message::new(MessageId::direct(id), ThreadId::new("1"), "555", body, ts, false)
    }

    #[test]
    fn test_near_duplicate_rule() {
        let a = msg(1, "Hey how are you doing", 10_000);
        let b = msg(2, "Hey how are you tonight", 11_000);
        assert!(is_near_duplicate(&a, &b));

        // Same text but too far apart
        let c = msg(3, "Hey how are you doing", 12_000);
        assert!(!is_near_duplicate(&a, &c));

        // Close in time but different text
        let d = msg(4, "ok", 10_500);
        assert!(!is_near_duplicate(&a, &d));
    }

    #[test]
    fn test_dedup_keeps_newer_copy() {
        let out = dedup_messages(vec![
            msg(1, "Hey how are you doing", 10_000),
            msg(2, "Hey how are you tonight", 11_000),
            msg(3, "fine", 20_000),
        ]);
        let ids: Vec<i64> = out.iter().map(|m| m.id.value()).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_dedup_idempotent() {
        let input = vec![
            msg(1, "a", 0),
            msg(2, "a", 500),
            msg(3, "a", 1_900),
            msg(4, "b", 1_000),
            msg(5, "a", 10_000),
        ];
        let once = dedup_messages(input);
        let twice = dedup_messages(once.clone());
        assert_eq!(once, twice);
    }

    fn sms(id: i64, thread: &str, address: &str, body: &str, ts: i64) -> DirectRecord {
        DirectRecord {
            id,
            thread_id: Some(thread.into()),
            address: Some(address.into()),
            body: Some(body.into()),
            timestamp_ms: ts,
            kind: 1,
        }
    }

    fn merger_with(records: Vec<DirectRecord>) -> ThreadMerger {
        let store = Arc::new(InMemoryMessageStore::new());
        for r in records {
            store.insert_direct(r).unwrap();
        }
        let contacts = Arc::new(InMemoryContactStore::with_contacts([Contact::new(
            "Alice",
            "+19195550123",
        )]));
        ThreadMerger::new(ThreadStoreReader::new(store, SelfNumbers::default()), contacts)
    }

    #[test]
    fn test_merge_across_split_threads() {
        let merger = merger_with(vec![
            sms(1, "1", "+19195550123", "from thread one", 1_000),
            sms(2, "1", "+19195550123", "Lunch tomorrow at noon?", 5_000),
            sms(3, "2", "9195550123", "Lunch tomorrow at noon? (copy)", 5_500),
            sms(4, "2", "9195550123", "from thread two", 9_000),
            sms(5, "3", "+19195550999", "someone else", 2_000),
        ]);
        let thread = merger.thread_by_id(&ThreadId::new("1")).unwrap();
        let participants = thread.participants();

        let merged = merge_for_contact(&merger, &thread.thread_id, &thread.primary_address, &participants, 100);
        let bodies: Vec<&str> = merged.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(
            bodies,
            vec!["from thread one", "Lunch tomorrow at noon? (copy)", "from thread two"]
        );
        assert!(merged.iter().all(|m| m.sender_name.as_deref() == Some("Alice")));
    }

    #[test]
    fn test_single_thread_falls_back_to_primary() {
        let merger = merger_with(vec![
            sms(1, "1", "+19195550123", "a", 1_000),
            sms(2, "1", "+19195550123", "a", 1_500),
        ]);
        let thread = merger.thread_by_id(&ThreadId::new("1")).unwrap();
        let merged =
            merge_for_contact(&merger, &thread.thread_id, &thread.primary_address, &thread.participants(), 100);
        // No dedup on the single-thread path
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_limit_keeps_newest() {
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(sms(i, "1", "+19195550123", &format!("one {i}"), i * 10_000));
            records.push(sms(100 + i, "2", "9195550123", &format!("two {i}"), i * 10_000 + 5_000));
        }
        let merger = merger_with(records);
        let merged = merge_for_contact(
            &merger,
            &ThreadId::new("1"),
            "+19195550123",
            &BTreeMap::new(),
            4,
        );
        let bodies: Vec<&str> = merged.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["one 4", "two 4", "one 5", "two 5"]);
    }
}
