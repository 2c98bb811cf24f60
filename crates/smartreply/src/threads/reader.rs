//! Reading threads and messages out of the two telephony stores
//!
//! The direct store is authoritative for thread discovery. The multimedia
//! store is consulted only for threads the direct store does not know
//! (group conversations usually live there), and only its newest record per
//! thread is opened, since every body and address lookup is an extra query.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::address::SelfNumbers;
use crate::models::{Message, MessageId, Thread, ThreadId};
use crate::query::is_near_duplicate;
use crate::storage::{
    AddressKind, LineNumberSource, MessageStore, MultimediaAddress, MultimediaHeader,
};

/// Listing body for a multimedia message without a text part
pub const MULTIMEDIA_PLACEHOLDER: &str = "(MMS)";

/// Default number of messages returned per thread
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Collect the device owner's numbers
///
/// Platforms may refuse to report line numbers; that is logged and the
/// configured fallback is used alone.
pub fn discover_self_numbers(source: &dyn LineNumberSource, fallback: Option<&str>) -> SelfNumbers {
    let reported = match source.line_numbers() {
        Ok(numbers) => numbers,
        Err(e) => {
            warn!("Can't read own phone number, using fallback: {e:#}");
            Vec::new()
        }
    };
    let numbers = SelfNumbers::discover(reported, fallback);
    debug!("Discovered {} self number(s)", numbers.len());
    numbers
}

/// Messages gathered for one thread during a listing pass
#[derive(Default)]
struct ThreadAccumulator {
    /// Newest first
    messages: Vec<Message>,
    /// Multimedia participants seen without a message of their own
    participants: Vec<String>,
}

/// Newest multimedia record of a thread the direct store did not cover
struct MultimediaListing {
    thread_id: ThreadId,
    message: Message,
    participants: Vec<String>,
}

/// Reads canonical threads and per-thread histories from a [`MessageStore`]
pub struct ThreadStoreReader {
    store: Arc<dyn MessageStore>,
    self_numbers: SelfNumbers,
}

impl ThreadStoreReader {
    pub fn new(store: Arc<dyn MessageStore>, self_numbers: SelfNumbers) -> Self {
        Self {
            store,
            self_numbers,
        }
    }

    pub fn self_numbers(&self) -> &SelfNumbers {
        &self.self_numbers
    }

    /// Discover every thread, newest first
    ///
    /// Store failures never escape: an unreadable store contributes no
    /// threads.
    pub fn read_threads(&self) -> Vec<Thread> {
        self.read_threads_until(&CancellationToken::new())
            .unwrap_or_default()
    }

    /// Like [`read_threads`](Self::read_threads), but gives up with `None`
    /// once `cancel` fires
    ///
    /// The token is checked between the two stores and before every
    /// multimedia record is opened.
    pub fn read_threads_until(&self, cancel: &CancellationToken) -> Option<Vec<Thread>> {
        if cancel.is_cancelled() {
            return None;
        }
        let mut by_thread: BTreeMap<ThreadId, ThreadAccumulator> = BTreeMap::new();

        for message in self.read_direct_listing() {
            by_thread
                .entry(message.thread_id.clone())
                .or_default()
                .messages
                .push(message);
        }
        if cancel.is_cancelled() {
            debug!("Thread listing cancelled after direct store");
            return None;
        }

        let known: HashSet<ThreadId> = by_thread.keys().cloned().collect();
        for listing in self.read_multimedia_listing(&known, cancel)? {
            let acc = by_thread.entry(listing.thread_id).or_default();
            acc.messages.push(listing.message);
            acc.participants.extend(listing.participants);
        }

        let mut threads: Vec<Thread> = by_thread
            .into_iter()
            .filter_map(|(thread_id, acc)| self.build_thread(thread_id, acc))
            .collect();
        threads.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));

        debug!("Read {} threads", threads.len());
        Some(threads)
    }

    fn read_direct_listing(&self) -> Vec<Message> {
        let records = match self.store.direct_messages() {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to read direct-message store: {e:#}");
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| {
                let (Some(thread_id), Some(address)) =
                    (record.thread_id.clone(), usable_address(record.address.clone()))
                else {
                    debug!("Skipping direct record {} without thread or address", record.id);
                    return None;
                };
                let is_from_me = record.is_outgoing() || self.self_numbers.is_self(&address);
                Some(Message::new(
                    MessageId::direct(record.id),
                    ThreadId::new(thread_id),
                    address,
                    record.body.unwrap_or_default(),
                    record.timestamp_ms,
                    is_from_me,
                ))
            })
            .collect()
    }

    /// Newest multimedia record of each thread not in `known`
    ///
    /// A record whose body or addresses can't be read is skipped on its own;
    /// only an unreadable header listing empties the result. Returns `None`
    /// when cancelled.
    fn read_multimedia_listing(
        &self,
        known: &HashSet<ThreadId>,
        cancel: &CancellationToken,
    ) -> Option<Vec<MultimediaListing>> {
        let headers = match self.store.multimedia_headers() {
            Ok(headers) => headers,
            Err(e) => {
                warn!("Failed to read multimedia store for thread listing: {e:#}");
                return Some(Vec::new());
            }
        };

        // Headers arrive newest first, so the first one per thread wins
        let mut newest = Vec::new();
        let mut picked = HashSet::new();
        for header in headers {
            let Some(thread_id) = header.thread_id.clone().map(ThreadId::new) else {
                continue;
            };
            if known.contains(&thread_id) || !picked.insert(thread_id.clone()) {
                continue;
            }
            newest.push((thread_id, header));
        }

        let mut listings = Vec::with_capacity(newest.len());
        for (thread_id, header) in newest {
            if cancel.is_cancelled() {
                debug!("Thread listing cancelled in multimedia store");
                return None;
            }
            match self.multimedia_listing(thread_id, &header) {
                Ok(Some(listing)) => listings.push(listing),
                Ok(None) => {}
                Err(e) => warn!("Skipping multimedia record {}: {e:#}", header.id),
            }
        }
        Some(listings)
    }

    fn multimedia_listing(
        &self,
        thread_id: ThreadId,
        header: &MultimediaHeader,
    ) -> Result<Option<MultimediaListing>> {
        let body = self
            .store
            .multimedia_body(header.id)?
            .unwrap_or_else(|| MULTIMEDIA_PLACEHOLDER.to_string());
        let mut participants = self.participants(&self.store.multimedia_addresses(header.id)?);
        if participants.is_empty() {
            return Ok(None);
        }
        let first = participants.remove(0);
        Ok(Some(MultimediaListing {
            message: Message::new(
                MessageId::multimedia(header.id),
                thread_id.clone(),
                first,
                body,
                header.timestamp_ms(),
                false,
            ),
            thread_id,
            participants,
        }))
    }

    /// Distinct non-self sender and recipient addresses, in store order
    fn participants(&self, addresses: &[MultimediaAddress]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for addr in addresses {
            if addr.address.trim().is_empty()
                || addr.address == MultimediaAddress::INSERT_ADDRESS_TOKEN
                || self.self_numbers.is_self(&addr.address)
            {
                continue;
            }
            if matches!(addr.kind, AddressKind::From | AddressKind::To) && !out.contains(&addr.address) {
                out.push(addr.address.clone());
            }
        }
        out
    }

    fn build_thread(&self, thread_id: ThreadId, acc: ThreadAccumulator) -> Option<Thread> {
        let latest = acc.messages.first()?;

        let mut addresses: Vec<String> = Vec::new();
        let others = acc
            .messages
            .iter()
            .filter(|m| !m.is_from_me && !self.self_numbers.is_self(&m.address))
            .map(|m| &m.address)
            .chain(acc.participants.iter());
        for address in others {
            if !addresses.contains(address) {
                addresses.push(address.clone());
            }
        }

        Some(Thread::new(
            thread_id,
            addresses,
            latest.address.clone(),
            latest.body.clone(),
            latest.timestamp,
            acc.messages.len(),
        ))
    }

    /// The newest `limit` messages of a thread from both stores, oldest first
    pub fn messages_for_thread(&self, thread_id: &ThreadId, limit: usize) -> Vec<Message> {
        let mut messages = self.read_direct_thread(thread_id);
        if let Err(e) = self.read_multimedia_thread(thread_id, &mut messages) {
            warn!("Failed to read multimedia store for thread {thread_id}: {e:#}");
        }
        let total = messages.len();

        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        messages.truncate(limit);
        messages.sort_by_key(|m| m.timestamp);

        debug!(
            "Thread {thread_id}: {total} total messages, returning {}",
            messages.len()
        );
        messages
    }

    fn read_direct_thread(&self, thread_id: &ThreadId) -> Vec<Message> {
        let records = match self.store.direct_messages_for_thread(thread_id) {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to read direct messages for thread {thread_id}: {e:#}");
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| {
                let Some(address) = usable_address(record.address.clone()) else {
                    debug!("Skipping direct record {} without address", record.id);
                    return None;
                };
                let is_from_me = record.is_outgoing() || self.self_numbers.is_self(&address);
                let owner = record
                    .thread_id
                    .clone()
                    .map(ThreadId::new)
                    .unwrap_or_else(|| thread_id.clone());
                Some(Message::new(
                    MessageId::direct(record.id),
                    owner,
                    address,
                    record.body.unwrap_or_default(),
                    record.timestamp_ms,
                    is_from_me,
                ))
            })
            .collect()
    }

    fn read_multimedia_thread(&self, thread_id: &ThreadId, messages: &mut Vec<Message>) -> Result<()> {
        for header in self.store.multimedia_headers_for_thread(thread_id)? {
            match self.multimedia_message(thread_id, &header) {
                Ok(Some(candidate)) => {
                    if !messages.iter().any(|m| is_near_duplicate(m, &candidate)) {
                        messages.push(candidate);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping multimedia record {}: {e:#}", header.id),
            }
        }
        Ok(())
    }

    fn multimedia_message(
        &self,
        thread_id: &ThreadId,
        header: &MultimediaHeader,
    ) -> Result<Option<Message>> {
        let body = match self.store.multimedia_body(header.id)? {
            Some(body) if !body.trim().is_empty() => body,
            _ => return Ok(None),
        };

        let addresses = self.store.multimedia_addresses(header.id)?;
        let outgoing = header.is_outgoing();
        let wanted = if outgoing { AddressKind::To } else { AddressKind::From };
        let Some(mut address) = addresses
            .iter()
            .find(|a| a.kind == wanted && !a.address.trim().is_empty())
            .map(|a| a.address.clone())
        else {
            return Ok(None);
        };

        let mut is_from_me = outgoing;
        if !outgoing && self.self_numbers.is_self(&address) {
            // Filed as received but sent by us: attribute it to the other party
            is_from_me = true;
            match self.participants(&addresses).into_iter().next() {
                Some(other) => address = other,
                None => return Ok(None),
            }
        }

        Ok(Some(Message::new(
            MessageId::multimedia(header.id),
            thread_id.clone(),
            address,
            body,
            header.timestamp_ms(),
            is_from_me,
        )))
    }
}

/// A store address that names someone; blank ones are malformed rows
fn usable_address(address: Option<String>) -> Option<String> {
    address.filter(|a| !a.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DirectRecord, InMemoryMessageStore, StaticLineNumbers};

    const ME: &str = "+19195550100";
    const ALICE: &str = "+19195550123";
    const BOB: &str = "+19195550124";

    fn sms(id: i64, thread: &str, address: &str, body: &str, ts: i64, kind: i32) -> DirectRecord {
        DirectRecord {
            id,
            thread_id: Some(thread.into()),
            address: Some(address.into()),
            body: Some(body.into()),
            timestamp_ms: ts,
            kind,
        }
    }

    fn mms(id: i64, thread: &str, secs: i64, message_box: i32) -> MultimediaHeader {
        MultimediaHeader {
            id,
            thread_id: Some(thread.into()),
            timestamp_secs: secs,
            message_box,
        }
    }

    fn reader(store: Arc<InMemoryMessageStore>) -> ThreadStoreReader {
        ThreadStoreReader::new(store, SelfNumbers::new([ME]))
    }

    #[test]
    fn test_discover_self_numbers_failure_uses_fallback() {
        struct Denied;
        impl LineNumberSource for Denied {
            fn line_numbers(&self) -> Result<Vec<String>> {
                anyhow::bail!("permission denied")
            }
        }
        let own = discover_self_numbers(&Denied, Some(ME));
        assert_eq!(own.len(), 1);
        assert!(own.is_self("9195550100"));

        let own = discover_self_numbers(&StaticLineNumbers(vec![BOB.into()]), Some(ME));
        assert_eq!(own.len(), 2);
    }

    #[test]
    fn test_direct_threads_grouped_and_sorted() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "1", ALICE, "hi", 1_000, 1)).unwrap();
        store.insert_direct(sms(2, "1", ALICE, "yo", 5_000, 2)).unwrap();
        store.insert_direct(sms(3, "2", BOB, "hey", 3_000, 1)).unwrap();
        store.insert_direct(sms(4, "2", ME, "echo", 2_000, 1)).unwrap();
        // Malformed rows are skipped
        store
            .insert_direct(DirectRecord {
                thread_id: None,
                ..sms(5, "3", BOB, "x", 9_000, 1)
            })
            .unwrap();

        let threads = reader(store).read_threads();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].thread_id, ThreadId::new("1"));
        assert_eq!(threads[0].last_message_body, "yo");
        assert_eq!(threads[0].message_count, 2);
        assert_eq!(threads[0].addresses, vec![ALICE.to_string()]);
        // A row from our own number is not a participant
        assert_eq!(threads[1].addresses, vec![BOB.to_string()]);
    }

    #[test]
    fn test_thread_of_only_outgoing_falls_back_to_latest_address() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "1", ALICE, "ping", 1_000, 2)).unwrap();
        let threads = reader(store).read_threads();
        assert_eq!(threads[0].addresses, vec![ALICE.to_string()]);
        assert_eq!(threads[0].primary_address, ALICE);
    }

    #[test]
    fn test_multimedia_only_group_discovered() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "1", ALICE, "hi", 1_000, 1)).unwrap();
        store
            .insert_multimedia(
                mms(10, "9", 50, 1),
                Some("older"),
                vec![MultimediaAddress::new(ALICE, AddressKind::From)],
            )
            .unwrap();
        store
            .insert_multimedia(
                mms(11, "9", 60, 1),
                None,
                vec![
                    MultimediaAddress::new(ALICE, AddressKind::From),
                    MultimediaAddress::new(ME, AddressKind::To),
                    MultimediaAddress::new(MultimediaAddress::INSERT_ADDRESS_TOKEN, AddressKind::To),
                    MultimediaAddress::new(BOB, AddressKind::To),
                    MultimediaAddress::new("+19195550199", AddressKind::Cc),
                ],
            )
            .unwrap();
        // Covered by the direct store, so its multimedia rows are not opened
        store
            .insert_multimedia(mms(12, "1", 70, 1), Some("x"), vec![])
            .unwrap();

        let threads = reader(store).read_threads();
        let group = threads.iter().find(|t| t.thread_id.as_str() == "9").unwrap();
        assert_eq!(group.addresses, vec![ALICE.to_string(), BOB.to_string()]);
        assert!(group.is_group());
        assert_eq!(group.last_message_body, MULTIMEDIA_PLACEHOLDER);
        assert_eq!(group.last_timestamp, 60_000);
        assert_eq!(group.message_count, 1);
    }

    #[test]
    fn test_multimedia_failure_degrades_to_direct_only() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "1", ALICE, "hi", 1_000, 1)).unwrap();
        store
            .insert_multimedia(
                mms(10, "9", 50, 1),
                Some("pic"),
                vec![MultimediaAddress::new(BOB, AddressKind::From)],
            )
            .unwrap();
        store.set_multimedia_denied(true);

        let reader = reader(store);
        assert_eq!(reader.read_threads().len(), 1);
        assert_eq!(reader.messages_for_thread(&ThreadId::new("1"), 100).len(), 1);
    }

    #[test]
    fn test_messages_for_thread_merges_stores() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "5", ALICE, "first", 1_000, 1)).unwrap();
        store.insert_direct(sms(2, "5", ALICE, "Running late, see you", 10_000, 2)).unwrap();
        // Outgoing MMS: counterpart is the TO address
        store
            .insert_multimedia(
                mms(20, "5", 20, 2),
                Some("photo caption"),
                vec![
                    MultimediaAddress::new(ME, AddressKind::From),
                    MultimediaAddress::new(ALICE, AddressKind::To),
                ],
            )
            .unwrap();
        // Mirror of the direct message one second later: dropped
        store
            .insert_multimedia(
                mms(21, "5", 11, 2),
                Some("Running late, see you soon"),
                vec![MultimediaAddress::new(ALICE, AddressKind::To)],
            )
            .unwrap();
        // Blank body: skipped
        store
            .insert_multimedia(
                mms(22, "5", 30, 1),
                Some("  "),
                vec![MultimediaAddress::new(ALICE, AddressKind::From)],
            )
            .unwrap();
        // Filed as incoming but FROM is our number: flipped to outgoing
        store
            .insert_multimedia(
                mms(23, "5", 40, 1),
                Some("sent from my laptop"),
                vec![
                    MultimediaAddress::new(ME, AddressKind::From),
                    MultimediaAddress::new(ALICE, AddressKind::To),
                ],
            )
            .unwrap();

        let messages = reader(store).messages_for_thread(&ThreadId::new("5"), 100);
        let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(
            bodies,
            vec!["first", "Running late, see you", "photo caption", "sent from my laptop"]
        );

        let caption = &messages[2];
        assert_eq!(caption.id, MessageId::multimedia(20));
        assert_eq!(caption.address, ALICE);
        assert_eq!(caption.timestamp, 20_000);
        assert!(caption.is_from_me);

        let flipped = &messages[3];
        assert!(flipped.is_from_me);
        assert_eq!(flipped.address, ALICE);
    }

    #[test]
    fn test_messages_for_thread_limit_keeps_newest() {
        let store = Arc::new(InMemoryMessageStore::new());
        for i in 0..10 {
            store
                .insert_direct(sms(i, "1", ALICE, &format!("m{i}"), i * 1_000, 1))
                .unwrap();
        }
        let messages = reader(store).messages_for_thread(&ThreadId::new("1"), 3);
        let ids: Vec<i64> = messages.iter().map(|m| m.id.value()).collect();
        assert_eq!(ids, vec![7, 8, 9]);
    }

    #[test]
    fn test_blank_address_rows_skipped() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "1", ALICE, "hi", 1_000, 1)).unwrap();
        // Draft without a recipient
        store.insert_direct(sms(2, "2", "", "draft", 2_000, 3)).unwrap();
        store.insert_direct(sms(3, "1", "  ", "blank", 3_000, 1)).unwrap();
        store
            .insert_multimedia(
                mms(10, "7", 5, 1),
                Some("pic"),
                vec![
                    MultimediaAddress::new("", AddressKind::From),
                    MultimediaAddress::new(BOB, AddressKind::To),
                ],
            )
            .unwrap();

        let reader = reader(store);
        let threads = reader.read_threads();
        let ids: Vec<&str> = threads.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["7", "1"]);
        assert_eq!(threads[0].addresses, vec![BOB.to_string()]);
        assert_eq!(threads[1].message_count, 1);

        let messages = reader.messages_for_thread(&ThreadId::new("1"), 100);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].address, ALICE);
        // FROM is blank, so the record names nobody
        assert!(reader.messages_for_thread(&ThreadId::new("7"), 100).is_empty());
    }

    /// Delegates to an in-memory store but fails reads for one record
    struct BrokenRecord {
        inner: InMemoryMessageStore,
        broken_id: i64,
    }

    impl BrokenRecord {
        fn check(&self, id: i64) -> Result<()> {
            if id == self.broken_id {
                anyhow::bail!("corrupt part table for record {id}");
            }
            Ok(())
        }
    }

    impl MessageStore for BrokenRecord {
        fn direct_messages(&self) -> Result<Vec<DirectRecord>> {
            self.inner.direct_messages()
        }

        fn direct_messages_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<DirectRecord>> {
            self.inner.direct_messages_for_thread(thread_id)
        }

        fn multimedia_headers(&self) -> Result<Vec<MultimediaHeader>> {
            self.inner.multimedia_headers()
        }

        fn multimedia_headers_for_thread(
            &self,
            thread_id: &ThreadId,
        ) -> Result<Vec<MultimediaHeader>> {
            self.inner.multimedia_headers_for_thread(thread_id)
        }

        fn multimedia_body(&self, id: i64) -> Result<Option<String>> {
            self.check(id)?;
            self.inner.multimedia_body(id)
        }

        fn multimedia_addresses(&self, id: i64) -> Result<Vec<MultimediaAddress>> {
            self.inner.multimedia_addresses(id)
        }
    }

    #[test]
    fn test_unreadable_multimedia_record_skipped_alone() {
        let inner = InMemoryMessageStore::new();
        inner.insert_direct(sms(1, "1", ALICE, "hi", 1_000, 1)).unwrap();
        for (id, thread, secs) in [(10, "7", 50), (11, "8", 60), (12, "8", 40)] {
            inner
                .insert_multimedia(
                    mms(id, thread, secs, 1),
                    Some("pic"),
                    vec![MultimediaAddress::new(BOB, AddressKind::From)],
                )
                .unwrap();
        }
        let store = Arc::new(BrokenRecord { inner, broken_id: 11 });
        let reader = ThreadStoreReader::new(store, SelfNumbers::new([ME]));

        let threads = reader.read_threads();
        let ids: Vec<&str> = threads.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["7", "1"]);

        let messages = reader.messages_for_thread(&ThreadId::new("8"), 100);
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MessageId::multimedia(12)]);
    }

    #[test]
    fn test_cancelled_listing_returns_none() {
        let store = Arc::new(InMemoryMessageStore::new());
        store.insert_direct(sms(1, "1", ALICE, "hi", 1_000, 1)).unwrap();
        let reader = reader(Arc::clone(&store));

        let cancel = CancellationToken::new();
        assert_eq!(reader.read_threads_until(&cancel).map(|t| t.len()), Some(1));

        cancel.cancel();
        assert!(reader.read_threads_until(&cancel).is_none());
        // Checked before the store is touched
        assert_eq!(store.direct_listing_count(), 1);
    }
}
