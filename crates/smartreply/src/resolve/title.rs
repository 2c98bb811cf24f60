//! Mapping a conversation title to a thread
//!
//! The host app shows either a single contact name ("John Smith"), a phone
//! number, or a group title ("John, Jane & 2 others"). Titles are matched
//! against resolved contact names in tiers, strongest first; the first tier
//! with a candidate decides.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use log::debug;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::address::{addresses_match, looks_like_phone_number};
use crate::conversation::ConversationLookup;
use crate::models::Thread;
use crate::threads::ThreadMerger;

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// Exact name of a one-to-one thread
    ExactSingle,
    /// Partial name of a one-to-one thread
    PartialSingle,
    /// Exact name of any thread, groups included
    ExactAny,
    /// Exact display name of a group
    GroupDisplayName,
    /// Every listed name belongs to the group
    GroupMembers,
    /// Any name field contains the title
    Partial,
    /// Digits of the title match a participant address
    Phone,
}

fn overflow_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+ others?$").expect("valid overflow pattern"))
}

/// Whether the title lists several people
pub fn is_group_title(title: &str) -> bool {
    title.contains(',') || title.contains('&')
}

/// Names listed in a group title, without the "N others" tail
pub fn group_title_names(title: &str) -> Vec<String> {
    title
        .split([',', '&'])
        .map(str::trim)
        .filter(|t| !t.is_empty() && !overflow_pattern().is_match(t))
        .map(str::to_string)
        .collect()
}

/// Lowercased, non-blank name fields of a thread
fn names(thread: &Thread) -> impl Iterator<Item = String> + '_ {
    thread
        .contact_name
        .iter()
        .chain(thread.contact_names.iter())
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.to_lowercase())
}

fn has_exact_name(thread: &Thread, title: &str) -> bool {
    names(thread).any(|n| n == title)
}

fn has_partial_name(thread: &Thread, title: &str) -> bool {
    names(thread).any(|n| n.contains(title) || title.contains(n.as_str()))
}

/// Candidate with the most messages; the earliest wins a tie
fn most_messages<'a>(candidates: impl Iterator<Item = &'a Thread>) -> Option<&'a Thread> {
    candidates.fold(None, |best: Option<&Thread>, t| match best {
        Some(b) if b.message_count >= t.message_count => Some(b),
        _ => Some(t),
    })
}

/// Resolve `title` against `threads` (newest first)
pub fn resolve_title<'a>(threads: &'a [Thread], title: &str) -> Option<(&'a Thread, MatchTier)> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    let lower = title.to_lowercase();

    if !is_group_title(title) {
        let singles = || threads.iter().filter(|t| !t.is_group());

        if let Some(t) = most_messages(singles().filter(|t| has_exact_name(t, &lower))) {
            return Some((t, MatchTier::ExactSingle));
        }
        if let Some(t) = most_messages(singles().filter(|t| has_partial_name(t, &lower))) {
            return Some((t, MatchTier::PartialSingle));
        }
        if let Some(t) = most_messages(threads.iter().filter(|t| has_exact_name(t, &lower))) {
            return Some((t, MatchTier::ExactAny));
        }
    } else {
        let groups = || threads.iter().filter(|t| t.is_group());

        if let Some(t) = groups().find(|t| t.display_name().to_lowercase() == lower) {
            return Some((t, MatchTier::GroupDisplayName));
        }

        let wanted: Vec<String> = group_title_names(title)
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        if !wanted.is_empty() {
            let member_match = groups().find(|t| {
                wanted.iter().all(|w| {
                    t.contact_names
                        .iter()
                        .filter(|name| !name.trim().is_empty())
                        .any(|name| {
                            let name = name.to_lowercase();
                            name == *w || name.contains(w.as_str()) || w.contains(name.as_str())
                        })
                })
            });
            if let Some(t) = member_match {
                return Some((t, MatchTier::GroupMembers));
            }
        }
    }

    if let Some(t) = threads
        .iter()
        .find(|t| names(t).any(|n| n.contains(lower.as_str())))
    {
        return Some((t, MatchTier::Partial));
    }

    if looks_like_phone_number(title) {
        if let Some(t) = threads
            .iter()
            .find(|t| t.addresses.iter().any(|a| addresses_match(a, title)))
        {
            return Some((t, MatchTier::Phone));
        }
    }

    None
}

/// Resolves titles against the cached thread list
pub struct TitleResolver {
    merger: Arc<ThreadMerger>,
}

impl TitleResolver {
    pub fn new(merger: Arc<ThreadMerger>) -> Self {
        Self { merger }
    }

    pub fn merger(&self) -> &Arc<ThreadMerger> {
        &self.merger
    }

    pub fn resolve(&self, title: &str) -> Option<Thread> {
        self.resolve_until(title, &CancellationToken::new())
    }

    /// Resolve unless `cancel` fires while the thread list is being built
    pub fn resolve_until(&self, title: &str, cancel: &CancellationToken) -> Option<Thread> {
        let threads = self.merger.threads_until(cancel)?;
        match resolve_title(&threads, title) {
            Some((thread, tier)) => {
                debug!(
                    "Resolved '{title}' to thread {} via {tier:?} (group={}, messages={})",
                    thread.thread_id,
                    thread.is_group(),
                    thread.message_count
                );
                Some(thread.clone())
            }
            None => {
                debug!("No thread matches '{title}' among {} threads", threads.len());
                None
            }
        }
    }
}

impl ConversationLookup for TitleResolver {
    fn lookup(&self, title: &str, cancel: &CancellationToken) -> Result<Option<Thread>> {
        Ok(self.resolve_until(title, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SelfNumbers;
    use crate::models::{Contact, ThreadId};
    use crate::storage::{DirectRecord, InMemoryContactStore, InMemoryMessageStore};
    use crate::threads::ThreadStoreReader;

    fn resolver(store: Arc<InMemoryMessageStore>, contacts: Vec<Contact>) -> TitleResolver {
        let reader = ThreadStoreReader::new(store, SelfNumbers::default());
        let contacts = Arc::new(InMemoryContactStore::with_contacts(contacts));
        TitleResolver::new(Arc::new(ThreadMerger::new(reader, contacts)))
    }

    fn thread(id: &str, addresses: &[&str], names: &[&str], count: usize) -> Thread {
        let addresses: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        let first = addresses[0].clone();
        let base = Thread::new(ThreadId::new(id), addresses, first, "", 0, count);
        let contact_name = names
            .first()
            .filter(|n| !n.starts_with('+'))
            .map(|n| n.to_string());
        base.with_contact_names(contact_name, names.iter().map(|n| n.to_string()).collect())
    }

    fn id(found: Option<(&Thread, MatchTier)>) -> Option<(&str, MatchTier)> {
        found.map(|(t, tier)| (t.thread_id.as_str(), tier))
    }

    #[test]
    fn test_most_messages_wins() {
        let threads = vec![
            thread("t2", &["+19195550001"], &["John Smith"], 3),
            thread("t1", &["+19195550002"], &["John Smith"], 10),
        ];
        assert_eq!(
            id(resolve_title(&threads, "john smith")),
            Some(("t1", MatchTier::ExactSingle))
        );
    }

    #[test]
    fn test_tie_keeps_most_recent() {
        let threads = vec![
            thread("new", &["+19195550001"], &["Ann"], 5),
            thread("old", &["+19195550002"], &["Ann"], 5),
        ];
        assert_eq!(id(resolve_title(&threads, "Ann")), Some(("new", MatchTier::ExactSingle)));
    }

    #[test]
    fn test_single_prefers_one_to_one_over_group() {
        let threads = vec![
            thread("g", &["+19195550001", "+19195550002"], &["John", "Jane"], 50),
            thread("s", &["+19195550001"], &["John"], 2),
        ];
        assert_eq!(id(resolve_title(&threads, "John")), Some(("s", MatchTier::ExactSingle)));
    }

    #[test]
    fn test_partial_single_and_exact_any() {
        let threads = vec![
            thread("g", &["+19195550001", "+19195550002"], &["Mia Wong", "Leo"], 50),
            thread("s", &["+19195550003"], &["Johnny Appleseed"], 2),
        ];
        assert_eq!(
            id(resolve_title(&threads, "Johnny")),
            Some(("s", MatchTier::PartialSingle))
        );
        assert_eq!(id(resolve_title(&threads, "Leo")), Some(("g", MatchTier::ExactAny)));
    }

    #[test]
    fn test_group_display_name() {
        let threads = vec![thread(
            "g",
            &["+19195550001", "+19195550002"],
            &["John", "Jane"],
            4,
        )];
        assert_eq!(
            id(resolve_title(&threads, "John, Jane")),
            Some(("g", MatchTier::GroupDisplayName))
        );
    }

    #[test]
    fn test_group_members_with_overflow() {
        let threads = vec![
            thread("other", &["+19195550009", "+19195550001"], &["Pat", "John Smith"], 9),
            thread(
                "g",
                &["+19195550001", "+19195550002", "+19195550003", "+19195550004"],
                &["John Smith", "Jane Doe", "Al", "Bo"],
                4,
            ),
        ];
        assert_eq!(
            id(resolve_title(&threads, "John, Jane & 2 others")),
            Some(("g", MatchTier::GroupMembers))
        );
    }

    #[test]
    fn test_group_requires_every_name() {
        let threads = vec![thread(
            "g",
            &["+19195550001", "+19195550002"],
            &["John", "Bob"],
            4,
        )];
        assert_eq!(resolve_title(&threads, "John, Jane & 1 other"), None);
    }

    #[test]
    fn test_phone_fallback() {
        let threads = vec![
            thread("a", &["+19195550777"], &["+19195550777"], 1),
            thread("b", &["+19195550123"], &["+19195550123"], 1),
        ];
        assert_eq!(
            id(resolve_title(&threads, "9195550123")),
            Some(("b", MatchTier::PartialSingle))
        );
        assert_eq!(
            id(resolve_title(&threads, "(919) 555-0123")),
            Some(("b", MatchTier::Phone))
        );
        // Too few digits to trust
        assert_eq!(resolve_title(&threads, "12345"), None);

        // A named contact never matches the digits by name, only by address
        let named = vec![
            thread("a", &["+19195550777"], &["Erin"], 1),
            thread("d", &["+19195550123"], &["Dana"], 1),
        ];
        assert_eq!(
            id(resolve_title(&named, "9195550123")),
            Some(("d", MatchTier::Phone))
        );
    }

    #[test]
    fn test_blank_names_match_nothing() {
        let threads = vec![
            thread("1", &["+19195550123"], &["Ann"], 1),
            thread("2", &["+19195550124"], &["", " "], 1),
            thread("g", &["+19195550125", "+19195550126"], &["", "Bo"], 1),
        ];
        assert_eq!(resolve_title(&threads, "Somebody Unknown"), None);
        assert_eq!(resolve_title(&threads, "Cy, Di"), None);
        assert_eq!(resolve_title(&threads, "Bo, Cy"), None);
    }

    #[test]
    fn test_resolver_ignores_draft_without_recipient() {
        let store = Arc::new(InMemoryMessageStore::new());
        // The second row is a draft with no recipient yet
        for (id, thread, address, kind) in [(1, "1", "+19195550123", 1), (2, "2", "", 3)] {
            store
                .insert_direct(DirectRecord {
                    id,
                    thread_id: Some(thread.into()),
                    address: Some(address.into()),
                    body: Some("hello".into()),
                    timestamp_ms: id * 1_000,
                    kind,
                })
                .unwrap();
        }
        let resolver = resolver(store, vec![Contact::new("Ann", "+19195550123")]);

        assert_eq!(resolver.resolve("Somebody Unknown"), None);
        assert_eq!(
            resolver.resolve("Ann").map(|t| t.thread_id),
            Some(ThreadId::new("1"))
        );
    }

    #[test]
    fn test_lookup_cancelled_returns_none() {
        let store = Arc::new(InMemoryMessageStore::new());
        let resolver = resolver(store.clone(), vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(resolver.lookup("Ann", &cancel).unwrap(), None);
        assert_eq!(store.direct_listing_count(), 0);
    }

    #[test]
    fn test_group_title_names() {
        assert_eq!(
            group_title_names("John, Jane & 2 others"),
            vec!["John".to_string(), "Jane".to_string()]
        );
        assert_eq!(group_title_names("Al & 1 other"), vec!["Al".to_string()]);
        assert!(group_title_names(" , & ").is_empty());
    }

    #[test]
    fn test_blank_title() {
        let threads = vec![thread("a", &["+19195550777"], &["Ann"], 1)];
        assert_eq!(resolve_title(&threads, "   "), None);
    }
}
