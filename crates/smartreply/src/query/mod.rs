//! Query API for the prompt layer
//!
//! Merged histories, timelines and pacing hints built on top of the thread
//! list.

mod context;
mod merge;
mod timeline;

pub use context::{ConversationGap, Severity, TopicHint, analyze_gaps, format_gap, recent_topic_hint};
pub use merge::{
    DEFAULT_MERGED_LIMIT, DUPLICATE_PREFIX_CHARS, DUPLICATE_WINDOW_MS, dedup_messages,
    is_near_duplicate, merge_for_contact,
};
pub use timeline::{
    ConversationTimeline, DEFAULT_PROVIDER_CONTEXT_LIMIT, SELF_ADDRESS, TimelineLimits,
    build_timeline, scraped_to_messages,
};
