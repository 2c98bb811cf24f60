//! Tracking the conversation the user has open
//!
//! Screen text becomes [`UiEvent`]s, and the [`ActiveConversationCoordinator`]
//! turns them into a single published [`ConversationState`].

mod coordinator;
mod scrape;
mod state;

pub use coordinator::{ActiveConversationCoordinator, ConversationLookup};
pub use scrape::{EXCLUDED_TITLES, is_likely_conversation_title, parse_message_description};
pub use state::{ConversationState, CoordinatorError, OutgoingText, UiEvent};
