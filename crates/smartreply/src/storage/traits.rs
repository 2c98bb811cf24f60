//! Storage trait definitions
//!
//! The telephony stores are read-only from the engine's point of view. Rows
//! are handed over as raw records with optional columns; normalization and
//! skipping of malformed rows happen in [`crate::threads::ThreadStoreReader`].

use anyhow::Result;

use crate::models::{Contact, ThreadId};

/// `kind` / `message_box` value for received messages in both stores
pub const BOX_INBOX: i32 = 1;

/// A row of the direct-message (SMS) store
#[derive(Debug, Clone, PartialEq)]
pub struct DirectRecord {
    pub id: i64,
    pub thread_id: Option<String>,
    pub address: Option<String>,
    pub body: Option<String>,
    /// Milliseconds since epoch
    pub timestamp_ms: i64,
    /// 1 = inbox; everything else was sent from this device
    pub kind: i32,
}

impl DirectRecord {
    pub fn is_outgoing(&self) -> bool {
        self.kind != BOX_INBOX
    }
}

/// Header row of the multimedia (MMS) store
///
/// Body and addresses live in separate tables and cost one extra query
/// each per message.
#[derive(Debug, Clone, PartialEq)]
pub struct MultimediaHeader {
    pub id: i64,
    pub thread_id: Option<String>,
    /// Seconds since epoch
    pub timestamp_secs: i64,
    /// 1 = inbox; everything else was sent from this device
    pub message_box: i32,
}

impl MultimediaHeader {
    pub fn is_outgoing(&self) -> bool {
        self.message_box != BOX_INBOX
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_secs * 1000
    }
}

/// Role of an address on a multimedia message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    From,
    To,
    Cc,
    Bcc,
    Other(i32),
}

impl AddressKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            137 => AddressKind::From,
            151 => AddressKind::To,
            130 => AddressKind::Bcc,
            129 => AddressKind::Cc,
            other => AddressKind::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AddressKind::From => 137,
            AddressKind::To => 151,
            AddressKind::Bcc => 130,
            AddressKind::Cc => 129,
            AddressKind::Other(code) => *code,
        }
    }
}

/// An address attached to a multimedia message
#[derive(Debug, Clone, PartialEq)]
pub struct MultimediaAddress {
    pub address: String,
    pub kind: AddressKind,
}

impl MultimediaAddress {
    /// Placeholder some carriers write instead of the device's own number
    pub const INSERT_ADDRESS_TOKEN: &'static str = "insert-address-token";

    pub fn new(address: impl Into<String>, kind: AddressKind) -> Self {
        Self {
            address: address.into(),
            kind,
        }
    }
}

/// Trait for the pair of telephony record stores
///
/// All listing methods return rows newest first.
pub trait MessageStore: Send + Sync {
    /// All direct-message rows
    fn direct_messages(&self) -> Result<Vec<DirectRecord>>;

    /// Direct-message rows of one thread
    fn direct_messages_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<DirectRecord>>;

    /// All multimedia headers
    fn multimedia_headers(&self) -> Result<Vec<MultimediaHeader>>;

    /// Multimedia headers of one thread
    fn multimedia_headers_for_thread(&self, thread_id: &ThreadId)
    -> Result<Vec<MultimediaHeader>>;

    /// Text of the first `text/plain` part of a multimedia message
    fn multimedia_body(&self, id: i64) -> Result<Option<String>>;

    /// Addresses attached to a multimedia message, in store order
    fn multimedia_addresses(&self, id: i64) -> Result<Vec<MultimediaAddress>>;
}

/// Trait for the address book
pub trait ContactStore: Send + Sync {
    /// Display name for a phone address
    fn lookup_display_name(&self, address: &str) -> Result<Option<String>>;

    /// All contacts, one entry per normalized number, ordered by name
    fn list_all(&self) -> Result<Vec<Contact>>;
}

/// Source of the device's own phone numbers
///
/// Platforms may refuse to disclose them; an error is expected and handled.
pub trait LineNumberSource: Send + Sync {
    fn line_numbers(&self) -> Result<Vec<String>>;
}

/// Fixed list of line numbers (handed over by the host app)
#[derive(Debug, Clone, Default)]
pub struct StaticLineNumbers(pub Vec<String>);

impl LineNumberSource for StaticLineNumbers {
    fn line_numbers(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}
