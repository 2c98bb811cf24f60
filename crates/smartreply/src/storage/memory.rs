//! In-memory storage implementation
//!
//! Used by tests and by tools that assemble record sets by hand. Behaves
//! like the device stores, including newest-first ordering and an optional
//! permission failure on the multimedia side.

use anyhow::{Result, anyhow, bail};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    ContactStore, DirectRecord, MessageStore, MultimediaAddress, MultimediaHeader,
};
use crate::address::{addresses_match, normalize};
use crate::models::{Contact, ThreadId};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// In-memory implementation of [`MessageStore`]
pub struct InMemoryMessageStore {
    direct: RwLock<Vec<DirectRecord>>,
    multimedia: RwLock<Vec<MultimediaHeader>>,
    multimedia_bodies: RwLock<HashMap<i64, String>>,
    multimedia_addresses: RwLock<HashMap<i64, Vec<MultimediaAddress>>>,
    /// Simulates a permission-restricted multimedia provider
    multimedia_denied: AtomicBool,
    /// Number of full direct-store listings served
    direct_listings: AtomicUsize,
}

impl InMemoryMessageStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            direct: RwLock::new(Vec::new()),
            multimedia: RwLock::new(Vec::new()),
            multimedia_bodies: RwLock::new(HashMap::new()),
            multimedia_addresses: RwLock::new(HashMap::new()),
            multimedia_denied: AtomicBool::new(false),
            direct_listings: AtomicUsize::new(0),
        }
    }

    /// Add a direct-message row
    pub fn insert_direct(&self, record: DirectRecord) -> Result<()> {
        write(&self.direct)?.push(record);
        Ok(())
    }

    /// Add a multimedia message with its text part and addresses
    pub fn insert_multimedia(
        &self,
        header: MultimediaHeader,
        body: Option<&str>,
        addresses: Vec<MultimediaAddress>,
    ) -> Result<()> {
        let id = header.id;
        write(&self.multimedia)?.push(header);
        if let Some(body) = body {
            write(&self.multimedia_bodies)?.insert(id, body.to_string());
        }
        write(&self.multimedia_addresses)?.insert(id, addresses);
        Ok(())
    }

    /// Make every multimedia query fail, as a restricted provider does
    pub fn set_multimedia_denied(&self, denied: bool) {
        self.multimedia_denied.store(denied, Ordering::SeqCst);
    }

    /// How many times the full direct-message listing was read
    pub fn direct_listing_count(&self) -> usize {
        self.direct_listings.load(Ordering::SeqCst)
    }

    fn check_multimedia(&self) -> Result<()> {
        if self.multimedia_denied.load(Ordering::SeqCst) {
            bail!("permission denied reading multimedia store");
        }
        Ok(())
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first_direct(mut rows: Vec<DirectRecord>) -> Vec<DirectRecord> {
    rows.sort_by_key(|r| Reverse(r.timestamp_ms));
    rows
}

fn newest_first_multimedia(mut rows: Vec<MultimediaHeader>) -> Vec<MultimediaHeader> {
    rows.sort_by_key(|r| Reverse(r.timestamp_secs));
    rows
}

impl MessageStore for InMemoryMessageStore {
    fn direct_messages(&self) -> Result<Vec<DirectRecord>> {
        self.direct_listings.fetch_add(1, Ordering::SeqCst);
        Ok(newest_first_direct(read(&self.direct)?.clone()))
    }

    fn direct_messages_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<DirectRecord>> {
        let rows = read(&self.direct)?
            .iter()
            .filter(|r| r.thread_id.as_deref() == Some(thread_id.as_str()))
            .cloned()
            .collect();
        Ok(newest_first_direct(rows))
    }

    fn multimedia_headers(&self) -> Result<Vec<MultimediaHeader>> {
        self.check_multimedia()?;
        Ok(newest_first_multimedia(read(&self.multimedia)?.clone()))
    }

    fn multimedia_headers_for_thread(
        &self,
        thread_id: &ThreadId,
    ) -> Result<Vec<MultimediaHeader>> {
        self.check_multimedia()?;
        let rows = read(&self.multimedia)?
            .iter()
            .filter(|r| r.thread_id.as_deref() == Some(thread_id.as_str()))
            .cloned()
            .collect();
        Ok(newest_first_multimedia(rows))
    }

    fn multimedia_body(&self, id: i64) -> Result<Option<String>> {
        self.check_multimedia()?;
        Ok(read(&self.multimedia_bodies)?.get(&id).cloned())
    }

    fn multimedia_addresses(&self, id: i64) -> Result<Vec<MultimediaAddress>> {
        self.check_multimedia()?;
        Ok(read(&self.multimedia_addresses)?
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory address book
#[derive(Default)]
pub struct InMemoryContactStore {
    contacts: RwLock<Vec<Contact>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, contact: Contact) -> Result<()> {
        write(&self.contacts)?.push(contact);
        Ok(())
    }

    /// Builder-style constructor for tests and fixtures
    pub fn with_contacts<I>(contacts: I) -> Self
    where
        I: IntoIterator<Item = Contact>,
    {
        Self {
            contacts: RwLock::new(contacts.into_iter().collect()),
        }
    }
}

impl ContactStore for InMemoryContactStore {
    fn lookup_display_name(&self, address: &str) -> Result<Option<String>> {
        Ok(read(&self.contacts)?
            .iter()
            .find(|c| addresses_match(&c.phone_number, address))
            .map(|c| c.name.clone()))
    }

    fn list_all(&self) -> Result<Vec<Contact>> {
        let mut contacts = read(&self.contacts)?.clone();
        contacts.sort_by(|a, b| a.name.cmp(&b.name));
        let mut seen = std::collections::HashSet::new();
        contacts.retain(|c| seen.insert(normalize(&c.phone_number)));
        Ok(contacts)
    }
}
