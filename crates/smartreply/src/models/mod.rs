//! Domain models for conversation entities

mod contact;
mod conversation;
mod message;
mod thread;

pub use contact::Contact;
pub use conversation::{ActiveConversation, ScrapedMessage};
pub use message::{Message, MessageId, MessageSource};
pub use thread::{Thread, ThreadId};
