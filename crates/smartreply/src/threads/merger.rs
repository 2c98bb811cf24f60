//! Canonical thread list with contact names and a short-lived cache
//!
//! Discovery scans every row of the direct store, which is slow on devices
//! with thousands of threads. Overlay actions come in bursts, so one snapshot
//! is shared for a short TTL.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use super::reader::{DEFAULT_HISTORY_LIMIT, ThreadStoreReader};
use super::timing::{Clock, SystemClock, ttl_expired};
use crate::address::addresses_match;
use crate::models::{Contact, Message, Thread, ThreadId};
use crate::storage::ContactStore;

/// Default lifetime of a thread snapshot
pub const DEFAULT_THREAD_CACHE_TTL: Duration = Duration::from_secs(30);

struct CachedThreads {
    threads: Arc<Vec<Thread>>,
    cached_at: Instant,
}

/// Builds name-resolved threads and caches the result
pub struct ThreadMerger {
    reader: ThreadStoreReader,
    contacts: Arc<dyn ContactStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    history_limit: usize,
    cache: Mutex<Option<CachedThreads>>,
}

impl ThreadMerger {
    pub fn new(reader: ThreadStoreReader, contacts: Arc<dyn ContactStore>) -> Self {
        Self {
            reader,
            contacts,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_THREAD_CACHE_TTL,
            history_limit: DEFAULT_HISTORY_LIMIT,
            cache: Mutex::new(None),
        }
    }

    /// Builder method to set the snapshot lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builder method to set how many messages a thread read returns
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Builder method to swap the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn cache(&self) -> MutexGuard<'_, Option<CachedThreads>> {
        // The guarded value is replaced whole, so a poisoned lock still holds
        // a consistent snapshot
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All threads with resolved names, newest first
    ///
    /// Within the TTL the same snapshot is returned without touching the
    /// stores. Two callers that miss at once both read; the later write wins.
    pub fn threads(&self) -> Arc<Vec<Thread>> {
        self.threads_until(&CancellationToken::new())
            .unwrap_or_default()
    }

    /// Like [`threads`](Self::threads), but abandons a store scan once
    /// `cancel` fires
    ///
    /// A cancelled scan returns `None` and leaves the cache untouched, so a
    /// partial snapshot is never served.
    pub fn threads_until(&self, cancel: &CancellationToken) -> Option<Arc<Vec<Thread>>> {
        let now = self.clock.now();
        {
            let cache = self.cache();
            let cached_at = cache.as_ref().map(|c| c.cached_at);
            if !ttl_expired(cached_at, now, self.ttl) {
                if let Some(cached) = cache.as_ref() {
                    return Some(Arc::clone(&cached.threads));
                }
            }
        }

        let started = Instant::now();
        let threads = self.reader.read_threads_until(cancel)?;
        let resolved: Option<Vec<Thread>> = threads
            .par_iter()
            .map(|thread| {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(self.resolve_names(thread))
                }
            })
            .collect();
        let Some(resolved) = resolved else {
            debug!("Thread load cancelled during name resolution");
            return None;
        };
        info!(
            "Loaded {} threads in {:?}",
            resolved.len(),
            started.elapsed()
        );

        let snapshot = Arc::new(resolved);
        *self.cache() = Some(CachedThreads {
            threads: Arc::clone(&snapshot),
            cached_at: now,
        });
        Some(snapshot)
    }

    /// Drop the cached snapshot so the next read rescans the stores
    pub fn invalidate(&self) {
        if self.cache().take().is_some() {
            debug!("Thread cache invalidated");
        }
    }

    fn resolve_names(&self, thread: &Thread) -> Thread {
        let names: Vec<Option<String>> = thread
            .addresses
            .iter()
            .map(|addr| self.contact_name(addr))
            .collect();
        // primary_address is addresses[0]
        let contact_name = names.first().cloned().flatten();
        let contact_names = thread
            .addresses
            .iter()
            .zip(names)
            .map(|(addr, name)| name.unwrap_or_else(|| addr.clone()))
            .collect();
        thread.with_contact_names(contact_name, contact_names)
    }

    /// Display name for an address; lookup failures count as unknown
    pub fn contact_name(&self, address: &str) -> Option<String> {
        match self.contacts.lookup_display_name(address) {
            Ok(name) => name.filter(|n| !n.trim().is_empty()),
            Err(e) => {
                debug!("Contact lookup failed for {address}: {e:#}");
                None
            }
        }
    }

    /// The whole address book, or nothing if it cannot be read
    pub fn list_contacts(&self) -> Vec<Contact> {
        self.contacts.list_all().unwrap_or_else(|e| {
            log::warn!("Failed to read contacts: {e:#}");
            Vec::new()
        })
    }

    pub fn thread_by_id(&self, thread_id: &ThreadId) -> Option<Thread> {
        self.threads()
            .iter()
            .find(|t| &t.thread_id == thread_id)
            .cloned()
    }

    /// History of one thread, oldest first
    pub fn messages_for_thread(&self, thread_id: &ThreadId) -> Vec<Message> {
        self.reader.messages_for_thread(thread_id, self.history_limit)
    }

    /// History of one thread with sender names on incoming messages
    pub fn messages_with_names(
        &self,
        thread_id: &ThreadId,
        participants: &BTreeMap<String, Option<String>>,
    ) -> Vec<Message> {
        attach_sender_names(self.messages_for_thread(thread_id), participants)
    }
}

/// Set `sender_name` on every incoming message from the participant map
///
/// Merged histories carry the same number in several formats, so a miss on
/// the exact key retries with a loose address match.
pub fn attach_sender_names(
    messages: Vec<Message>,
    participants: &BTreeMap<String, Option<String>>,
) -> Vec<Message> {
    messages
        .into_iter()
        .map(|msg| {
            if msg.is_from_me {
                return msg;
            }
            let name = match participants.get(&msg.address) {
                Some(name) => name.clone(),
                None => participants
                    .iter()
                    .find(|(addr, _)| addresses_match(addr, &msg.address))
                    .and_then(|(_, name)| name.clone()),
            };
            msg.with_sender_name(name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SelfNumbers;
    use crate::storage::{DirectRecord, InMemoryContactStore, InMemoryMessageStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::threads::ManualClock;

    fn sms(id: i64, thread: &str, address: &str, ts: i64, kind: i32) -> DirectRecord {
        DirectRecord {
            id,
            thread_id: Some(thread.into()),
            address: Some(address.into()),
            body: Some(format!("msg {id}")),
            timestamp_ms: ts,
            kind,
        }
    }

    fn setup() -> (Arc<InMemoryMessageStore>, Arc<ManualClock>, ThreadMerger) {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "1", "+19195550123", 1_000, 1)).unwrap();
        store.insert_direct(sms(2, "1", "+19195550123", 2_000, 2)).unwrap();
        store.insert_direct(sms(3, "2", "+19195550777", 3_000, 1)).unwrap();

        let contacts = Arc::new(InMemoryContactStore::with_contacts([Contact::new(
            "Alice",
            "(919) 555-0123",
        )]));
        let clock = Arc::new(ManualClock::new());
        let reader = ThreadStoreReader::new(store.clone(), SelfNumbers::default());
        let merger = ThreadMerger::new(reader, contacts).with_clock(clock.clone());
        (store, clock, merger)
    }

    #[test]
    fn test_names_resolved() {
        let (_store, _clock, merger) = setup();
        let threads = merger.threads();
        let alice = threads.iter().find(|t| t.thread_id.as_str() == "1").unwrap();
        assert_eq!(alice.contact_name.as_deref(), Some("Alice"));
        assert_eq!(alice.contact_names, vec!["Alice".to_string()]);

        let unknown = threads.iter().find(|t| t.thread_id.as_str() == "2").unwrap();
        assert_eq!(unknown.contact_name, None);
        assert_eq!(unknown.contact_names, vec!["+19195550777".to_string()]);
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let (store, clock, merger) = setup();
        let first = merger.threads();
        clock.advance(Duration::from_secs(10));
        let second = merger.threads();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.direct_listing_count(), 1);
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let (store, clock, merger) = setup();
        let first = merger.threads();
        clock.advance(Duration::from_secs(31));
        let second = merger.threads();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.direct_listing_count(), 2);
    }

    #[test]
    fn test_invalidate_forces_reread() {
        let (store, _clock, merger) = setup();
        merger.threads();
        merger.invalidate();
        merger.threads();
        assert_eq!(store.direct_listing_count(), 2);
    }

    #[test]
    fn test_messages_with_names() {
        let (_store, _clock, merger) = setup();
        let thread = merger.thread_by_id(&ThreadId::new("1")).unwrap();
        let messages = merger.messages_with_names(&thread.thread_id, &thread.participants());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender_name.as_deref(), Some("Alice"));
        // Outgoing messages never carry a sender name
        assert!(messages[1].is_from_me);
        assert_eq!(messages[1].sender_name, None);
    }

    /// Address book that fires a token on its first lookup
    struct CancellingContacts {
        cancel: CancellationToken,
        lookups: AtomicUsize,
    }

    impl ContactStore for CancellingContacts {
        fn lookup_display_name(&self, _address: &str) -> anyhow::Result<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            Ok(None)
        }

        fn list_all(&self) -> anyhow::Result<Vec<Contact>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_cancel_stops_name_resolution() {
        let store = Arc::new(InMemoryMessageStore::new());
        for i in 0..50 {
            let address = format!("+1919555{:04}", 1000 + i);
            store
                .insert_direct(sms(i, &i.to_string(), &address, i * 1_000, 1))
                .unwrap();
        }
        let cancel = CancellationToken::new();
        let contacts = Arc::new(CancellingContacts {
            cancel: cancel.clone(),
            lookups: AtomicUsize::new(0),
        });
        let reader = ThreadStoreReader::new(store.clone(), SelfNumbers::default());
        let merger = ThreadMerger::new(reader, contacts.clone());

        assert!(merger.threads_until(&cancel).is_none());
        // Only lookups already running on other workers get through
        let lookups = contacts.lookups.load(Ordering::SeqCst);
        assert!(lookups >= 1);
        assert!(lookups <= rayon::current_num_threads().min(49), "{lookups} lookups");

        // Nothing partial was cached
        merger.threads();
        assert_eq!(store.direct_listing_count(), 2);
    }

    #[test]
    fn test_cancelled_before_scan() {
        let (store, _clock, merger) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(merger.threads_until(&cancel).is_none());
        assert_eq!(store.direct_listing_count(), 0);

        // A cached snapshot is still served
        let first = merger.threads();
        assert!(Arc::ptr_eq(&first, &merger.threads_until(&cancel).unwrap()));
    }
}
