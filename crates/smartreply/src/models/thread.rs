//! Thread model representing a canonical SMS/MMS conversation

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a thread (telephony store thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A thread represents one conversation as the record stores see it
///
/// Threads are snapshots rebuilt on every discovery pass. Name resolution
/// produces a new value via [`Thread::with_contact_names`] instead of
/// mutating a thread that callers may already hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Store thread ID
    pub thread_id: ThreadId,
    /// First non-self participant address
    pub primary_address: String,
    /// Resolved contact name for `primary_address`
    #[serde(default)]
    pub contact_name: Option<String>,
    /// Unique non-self participant addresses, never empty
    pub addresses: Vec<String>,
    /// Resolved names, parallel to `addresses` (the address itself when unknown)
    #[serde(default)]
    pub contact_names: Vec<String>,
    /// Body of the most recent message
    pub last_message_body: String,
    /// Timestamp of the most recent message (milliseconds since epoch)
    pub last_timestamp: i64,
    /// Number of messages read for this thread
    pub message_count: usize,
}

impl Thread {
    /// Create a thread with unresolved names
    ///
    /// An empty `addresses` list falls back to `fallback_address` so the
    /// non-empty invariant holds for every constructed thread.
    pub fn new(
        thread_id: ThreadId,
        addresses: Vec<String>,
        fallback_address: impl Into<String>,
        last_message_body: impl Into<String>,
        last_timestamp: i64,
        message_count: usize,
    ) -> Self {
        let addresses = if addresses.is_empty() {
            vec![fallback_address.into()]
        } else {
            addresses
        };
        Self {
            thread_id,
            primary_address: addresses[0].clone(),
            contact_name: None,
            addresses,
            contact_names: Vec::new(),
            last_message_body: last_message_body.into(),
            last_timestamp,
            message_count,
        }
    }

    /// Return a copy carrying resolved contact names
    pub fn with_contact_names(
        &self,
        contact_name: Option<String>,
        contact_names: Vec<String>,
    ) -> Self {
        Self {
            contact_name,
            contact_names,
            ..self.clone()
        }
    }

    /// Whether more than one other person takes part in the thread
    pub fn is_group(&self) -> bool {
        self.addresses.len() > 1
    }

    /// Name shown for the thread in lists and used for group title matching
    pub fn display_name(&self) -> String {
        if self.is_group() {
            let names: Vec<&str> = self
                .contact_names
                .iter()
                .map(String::as_str)
                .filter(|n| !n.trim().is_empty())
                .collect();
            if names.is_empty() {
                self.addresses.join(", ")
            } else {
                names.join(", ")
            }
        } else {
            self.contact_name
                .clone()
                .unwrap_or_else(|| self.primary_address.clone())
        }
    }

    /// Map each participant address to its resolved name
    ///
    /// Addresses whose "name" is just the address again map to `None`.
    pub fn participants(&self) -> BTreeMap<String, Option<String>> {
        self.addresses
            .iter()
            .enumerate()
            .map(|(i, addr)| {
                let name = self
                    .contact_names
                    .get(i)
                    .filter(|name| *name != addr)
                    .cloned();
                (addr.clone(), name)
            })
            .collect()
    }

    /// Timestamp of the most recent message
    pub fn last_message_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_timestamp)
            .single()
            .unwrap_or_default()
    }
}
