//! Live conversation models fed by the host UI observer

use serde::{Deserialize, Serialize};

use super::ThreadId;

/// A message read off the host app's screen
///
/// Scraped messages are not yet corroborated by the record stores and may
/// come from transports the stores never see (RCS, for example).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedMessage {
    /// Sender name as displayed, or "Me" for outgoing messages
    pub sender: String,
    pub body: String,
    pub is_from_me: bool,
    /// Time label as displayed, e.g. "Wednesday 2:36 PM"
    pub time_label: String,
}

impl ScrapedMessage {
    pub const SELF_SENDER: &'static str = "Me";

    pub fn incoming(
        sender: impl Into<String>,
        body: impl Into<String>,
        time_label: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            is_from_me: false,
            time_label: time_label.into(),
        }
    }

    pub fn outgoing(body: impl Into<String>, time_label: impl Into<String>) -> Self {
        Self {
            sender: Self::SELF_SENDER.to_string(),
            body: body.into(),
            is_from_me: true,
            time_label: time_label.into(),
        }
    }
}

/// What the user is currently looking at
///
/// Always replaced as a whole so observers never see a half-updated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConversation {
    pub thread_id: ThreadId,
    pub contact_name: Option<String>,
    #[serde(default)]
    pub scraped_messages: Vec<ScrapedMessage>,
}

impl ActiveConversation {
    pub fn new(
        thread_id: ThreadId,
        contact_name: Option<String>,
        scraped_messages: Vec<ScrapedMessage>,
    ) -> Self {
        Self {
            thread_id,
            contact_name,
            scraped_messages,
        }
    }
}
