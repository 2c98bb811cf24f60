//! Coordinator states, inbound UI events and outbound requests

use serde::{Deserialize, Serialize};

use crate::models::{ActiveConversation, ScrapedMessage, ThreadId};

/// What consumers see about the conversation on screen
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    /// No conversation on screen, or no matching thread
    #[default]
    Idle,
    /// A title was seen and its thread is being looked up
    Resolving { title: String },
    /// The title resolved to a thread
    Active(ActiveConversation),
}

impl ConversationState {
    pub fn active(&self) -> Option<&ActiveConversation> {
        match self {
            ConversationState::Active(active) => Some(active),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConversationState::Idle)
    }
}

/// Observations reported by the host UI observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// A conversation title is visible, with the messages shown under it
    TitleDetected {
        title: String,
        scraped: Vec<ScrapedMessage>,
    },
    /// The title disappeared (back on the conversation list)
    TitleCleared,
    /// The messaging app went to the background
    AppLeft,
}

/// Text the user chose to send into the active conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingText {
    pub thread_id: ThreadId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("No conversation is active")]
    NoActiveConversation,

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Outgoing message handler is gone")]
    OutgoingClosed,
}
