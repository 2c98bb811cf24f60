//! FFI-friendly type wrappers for UniFFI export
//!
//! Ids become strings, timestamps stay epoch milliseconds, and enums with
//! data are flattened where the bindings would otherwise need generics.

use crate::conversation::{ConversationState, CoordinatorError};
use crate::models::{ActiveConversation, Contact, Message, MessageSource, ScrapedMessage, Thread};
use crate::query::{ConversationGap, ConversationTimeline, Severity, TopicHint, format_gap};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum EngineError {
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("No conversation is active")]
    NoActiveConversation,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        let message = format!("{e:#}");
        let lower = message.to_lowercase();
        if lower.contains("database") || lower.contains("sqlite") || lower.contains("migration") {
            EngineError::Storage { message }
        } else if lower.contains("parse") || lower.contains("json") {
            EngineError::InvalidArgument { message }
        } else {
            EngineError::Internal { message }
        }
    }
}

impl From<CoordinatorError> for EngineError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::NoActiveConversation => EngineError::NoActiveConversation,
            CoordinatorError::EmptyMessage => EngineError::InvalidArgument {
                message: e.to_string(),
            },
            CoordinatorError::OutgoingClosed => EngineError::Internal {
                message: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Threads and Messages
// ============================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiThread {
    pub thread_id: String,
    pub primary_address: String,
    pub contact_name: Option<String>,
    pub addresses: Vec<String>,
    pub contact_names: Vec<String>,
    pub display_name: String,
    pub is_group: bool,
    pub last_message_body: String,
    /// Epoch milliseconds
    pub last_timestamp: i64,
    pub message_count: u32,
}

impl From<Thread> for FfiThread {
    fn from(t: Thread) -> Self {
        Self {
            display_name: t.display_name(),
            is_group: t.is_group(),
            thread_id: t.thread_id.0,
            primary_address: t.primary_address,
            contact_name: t.contact_name,
            addresses: t.addresses,
            contact_names: t.contact_names,
            last_message_body: t.last_message_body,
            last_timestamp: t.last_timestamp,
            message_count: t.message_count as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiMessageSource {
    Sms,
    Mms,
    Screen,
}

impl From<MessageSource> for FfiMessageSource {
    fn from(s: MessageSource) -> Self {
        match s {
            MessageSource::Direct => FfiMessageSource::Sms,
            MessageSource::Multimedia => FfiMessageSource::Mms,
            MessageSource::Scraped => FfiMessageSource::Screen,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMessage {
    pub id: i64,
    pub thread_id: String,
    pub address: String,
    pub body: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub is_from_me: bool,
    pub sender_name: Option<String>,
    pub source: FfiMessageSource,
}

impl From<Message> for FfiMessage {
    fn from(m: Message) -> Self {
        Self {
            id: m.id.value(),
            source: m.id.source().into(),
            thread_id: m.thread_id.0,
            address: m.address,
            body: m.body,
            timestamp: m.timestamp,
            is_from_me: m.is_from_me,
            sender_name: m.sender_name,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiContact {
    pub name: String,
    pub phone_number: String,
}

impl From<Contact> for FfiContact {
    fn from(c: Contact) -> Self {
        Self {
            name: c.name,
            phone_number: c.phone_number,
        }
    }
}

// ============================================================================
// Screen State
// ============================================================================

/// A message bubble as read off the screen
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiScrapedMessage {
    pub sender: String,
    pub body: String,
    pub is_from_me: bool,
    pub time_label: String,
}

impl From<ScrapedMessage> for FfiScrapedMessage {
    fn from(m: ScrapedMessage) -> Self {
        Self {
            sender: m.sender,
            body: m.body,
            is_from_me: m.is_from_me,
            time_label: m.time_label,
        }
    }
}

impl From<FfiScrapedMessage> for ScrapedMessage {
    fn from(m: FfiScrapedMessage) -> Self {
        if m.is_from_me {
            ScrapedMessage::outgoing(m.body, m.time_label)
        } else {
            ScrapedMessage::incoming(m.sender, m.body, m.time_label)
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActiveConversation {
    pub thread_id: String,
    pub contact_name: Option<String>,
    pub scraped_messages: Vec<FfiScrapedMessage>,
}

impl From<ActiveConversation> for FfiActiveConversation {
    fn from(a: ActiveConversation) -> Self {
        Self {
            thread_id: a.thread_id.0,
            contact_name: a.contact_name,
            scraped_messages: a.scraped_messages.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Enum)]
pub enum FfiConversationState {
    Idle,
    Resolving { title: String },
    Active { conversation: FfiActiveConversation },
}

impl From<ConversationState> for FfiConversationState {
    fn from(s: ConversationState) -> Self {
        match s {
            ConversationState::Idle => FfiConversationState::Idle,
            ConversationState::Resolving { title } => FfiConversationState::Resolving { title },
            ConversationState::Active(active) => FfiConversationState::Active {
                conversation: active.into(),
            },
        }
    }
}

// ============================================================================
// Timeline
// ============================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiParticipant {
    pub address: String,
    pub name: Option<String>,
}

/// Pacing hint rendered for the prompt layer
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiGapHint {
    /// "unanswered", "reinitiation" or "dormant"
    pub kind: String,
    pub days: i64,
    /// "slight", "delayed" or "overdue" for unanswered gaps
    pub severity: Option<String>,
    /// Human wording, e.g. "2 weeks"
    pub description: String,
}

impl From<ConversationGap> for FfiGapHint {
    fn from(gap: ConversationGap) -> Self {
        let (kind, severity) = match gap {
            ConversationGap::Unanswered { severity, .. } => {
                let severity = match severity {
                    Severity::Slight => "slight",
                    Severity::Delayed => "delayed",
                    Severity::Overdue => "overdue",
                };
                ("unanswered", Some(severity.to_string()))
            }
            ConversationGap::Reinitiation { .. } => ("reinitiation", None),
            ConversationGap::Dormant { .. } => ("dormant", None),
        };
        Self {
            kind: kind.to_string(),
            days: gap.days(),
            severity,
            description: format_gap(gap.days()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiTopicHint {
    Question,
    Scheduling,
}

impl From<TopicHint> for FfiTopicHint {
    fn from(h: TopicHint) -> Self {
        match h {
            TopicHint::Question => FfiTopicHint::Question,
            TopicHint::Scheduling => FfiTopicHint::Scheduling,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiTimeline {
    pub thread: FfiThread,
    pub participants: Vec<FfiParticipant>,
    /// Oldest first
    pub messages: Vec<FfiMessage>,
    pub gap: Option<FfiGapHint>,
    pub topic: Option<FfiTopicHint>,
}

impl FfiTimeline {
    pub fn new(
        timeline: ConversationTimeline,
        gap: Option<ConversationGap>,
        topic: Option<TopicHint>,
    ) -> Self {
        Self {
            thread: timeline.thread.into(),
            participants: timeline
                .participants
                .into_iter()
                .map(|(address, name)| FfiParticipant { address, name })
                .collect(),
            messages: timeline.messages.into_iter().map(Into::into).collect(),
            gap: gap.map(Into::into),
            topic: topic.map(Into::into),
        }
    }
}

// ============================================================================
// Callback Traits
// ============================================================================

/// Receives every state the coordinator publishes
#[uniffi::export(callback_interface)]
pub trait ConversationObserver: Send + Sync {
    fn on_state_changed(&self, state: FfiConversationState);
}

/// Injects text into the host messaging app
#[uniffi::export(callback_interface)]
pub trait OutgoingTextHandler: Send + Sync {
    fn send_text(&self, thread_id: String, text: String);
}

// ============================================================================
// Log Callback
// ============================================================================

#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for FfiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => FfiLogLevel::Error,
            log::Level::Warn => FfiLogLevel::Warn,
            log::Level::Info => FfiLogLevel::Info,
            log::Level::Debug => FfiLogLevel::Debug,
            log::Level::Trace => FfiLogLevel::Trace,
        }
    }
}

impl From<FfiLogLevel> for log::Level {
    fn from(level: FfiLogLevel) -> Self {
        match level {
            FfiLogLevel::Error => log::Level::Error,
            FfiLogLevel::Warn => log::Level::Warn,
            FfiLogLevel::Info => log::Level::Info,
            FfiLogLevel::Debug => log::Level::Debug,
            FfiLogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Receives log records from Rust
///
/// Kotlin should forward these to `android.util.Log`.
#[uniffi::export(callback_interface)]
pub trait LogCallback: Send + Sync {
    /// # Arguments
    /// * `level` - The log level
    /// * `target` - Module path, e.g. "smartreply::threads::merger"
    /// * `message` - The formatted record
    fn on_log(&self, level: FfiLogLevel, target: String, message: String);
}
