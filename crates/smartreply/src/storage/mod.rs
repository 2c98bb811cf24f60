//! Storage traits and implementations
//!
//! The engine reads the device's telephony stores through these traits.
//! Platform hosts, the SQLite snapshot reader and the in-memory fixtures all
//! plug in at the same seam.

mod memory;
mod sqlite;
mod traits;

pub use memory::{InMemoryContactStore, InMemoryMessageStore};
pub use sqlite::SqliteMessageStore;
pub use traits::{
    AddressKind, BOX_INBOX, ContactStore, DirectRecord, LineNumberSource, MessageStore,
    MultimediaAddress, MultimediaHeader, StaticLineNumbers,
};
