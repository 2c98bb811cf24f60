//! Message model representing a single SMS or MMS

use super::ThreadId;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Which record store (or live UI scrape) a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSource {
    Direct,
    Multimedia,
    Scraped,
}

/// Unique identifier for a message
///
/// The direct-message and multimedia stores number their rows
/// independently, so multimedia ids are shifted by a fixed offset to keep
/// the two ranges apart. Scraped messages get a third range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl MessageId {
    pub const MULTIMEDIA_OFFSET: i64 = 1_000_000_000;
    pub const SCRAPED_OFFSET: i64 = 2_000_000_000;

    /// Id for a row of the direct-message store
    pub fn direct(native_id: i64) -> Self {
        Self(native_id)
    }

    /// Id for a row of the multimedia store
    pub fn multimedia(native_id: i64) -> Self {
        Self(native_id + Self::MULTIMEDIA_OFFSET)
    }

    /// Id for the `index`-th message scraped from the host UI
    pub fn scraped(index: usize) -> Self {
        Self(Self::SCRAPED_OFFSET + index as i64)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn source(&self) -> MessageSource {
        match self.0 {
            id if id >= Self::SCRAPED_OFFSET => MessageSource::Scraped,
            id if id >= Self::MULTIMEDIA_OFFSET => MessageSource::Multimedia,
            _ => MessageSource::Direct,
        }
    }
}

/// A single message within a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Synthesized message id (see [`MessageId`])
    pub id: MessageId,
    /// Thread this message was stored under
    pub thread_id: ThreadId,
    /// Counterpart address (sender for incoming, recipient for outgoing)
    pub address: String,
    /// Text body
    pub body: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Whether the device owner sent this message
    pub is_from_me: bool,
    /// Resolved sender name for incoming messages
    #[serde(default)]
    pub sender_name: Option<String>,
}

impl Message {
    pub fn new(
        id: MessageId,
        thread_id: ThreadId,
        address: impl Into<String>,
        body: impl Into<String>,
        timestamp: i64,
        is_from_me: bool,
    ) -> Self {
        Self {
            id,
            thread_id,
            address: address.into(),
            body: body.into(),
            timestamp,
            is_from_me,
            sender_name: None,
        }
    }

    /// Builder method to attach a sender name
    pub fn with_sender_name(mut self, name: Option<String>) -> Self {
        self.sender_name = name;
        self
    }

    /// When the message was sent or received
    pub fn sent_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }

    /// The first `n` characters of the body (not bytes)
    pub fn body_prefix(&self, n: usize) -> &str {
        match self.body.char_indices().nth(n) {
            Some((idx, _)) => &self.body[..idx],
            None => &self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_offsets() {
        assert_eq!(MessageId::direct(42).source(), MessageSource::Direct);
        assert_eq!(MessageId::multimedia(42).value(), 1_000_000_042);
        assert_eq!(MessageId::multimedia(42).source(), MessageSource::Multimedia);
        assert_eq!(MessageId::scraped(3).source(), MessageSource::Scraped);
        assert_ne!(MessageId::direct(42), MessageId::multimedia(42));
    }

    #[test]
    fn test_body_prefix_counts_chars() {
        let msg = Message::new(
            MessageId::direct(1),
            ThreadId::new("1"),
            "555",
            "héllo wörld",
            0,
            false,
        );
        assert_eq!(msg.body_prefix(5), "héllo");
        assert_eq!(msg.body_prefix(50), "héllo wörld");
    }

    #[test]
    fn test_serialization() {
        let msg = Message::new(MessageId::direct(9), ThreadId::new("3"), "555", "hi", 10, true)
            .with_sender_name(Some("Ann".into()));
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
