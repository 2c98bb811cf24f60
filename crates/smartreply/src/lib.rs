//! Conversation identity resolution and message aggregation
//!
//! Figures out which stored SMS/MMS thread the conversation on screen
//! belongs to, and assembles a deduplicated history for it:
//! - Address normalization and self-number detection
//! - Thread discovery across the SMS and MMS stores
//! - Cached thread listing with contact names
//! - Cross-thread merging with near-duplicate removal
//! - Tiered title resolution
//! - A coordinator tracking the active conversation
//!
//! The crate has no UI dependencies; [`ffi`] exposes it to Kotlin through
//! UniFFI.

pub mod address;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod ffi;
pub mod models;
pub mod query;
pub mod resolve;
pub mod storage;
pub mod threads;

pub use address::{SelfNumbers, addresses_match, looks_like_phone_number, normalize};
pub use config::EngineConfig;
pub use conversation::{
    ActiveConversationCoordinator, ConversationLookup, ConversationState, CoordinatorError,
    OutgoingText, UiEvent, is_likely_conversation_title, parse_message_description,
};
pub use engine::{SmartReplyEngine, TimelineReport};
pub use models::{
    ActiveConversation, Contact, Message, MessageId, MessageSource, ScrapedMessage, Thread,
    ThreadId,
};
pub use query::{
    ConversationGap, ConversationTimeline, TimelineLimits, TopicHint, analyze_gaps,
    build_timeline, dedup_messages, merge_for_contact, recent_topic_hint,
};
pub use resolve::{MatchTier, TitleResolver, resolve_title};
pub use storage::{
    ContactStore, InMemoryContactStore, InMemoryMessageStore, LineNumberSource, MessageStore,
    SqliteMessageStore,
};
pub use threads::{ThreadMerger, ThreadStoreReader};

uniffi::setup_scaffolding!();
