//! Thread discovery over the telephony stores
//!
//! [`ThreadStoreReader`] turns raw store rows into messages and threads;
//! [`ThreadMerger`] attaches contact names and caches the thread list.

mod merger;
mod reader;
mod timing;

pub use merger::{DEFAULT_THREAD_CACHE_TTL, ThreadMerger, attach_sender_names};
pub use reader::{
    DEFAULT_HISTORY_LIMIT, MULTIMEDIA_PLACEHOLDER, ThreadStoreReader, discover_self_numbers,
};
pub use timing::{Clock, ManualClock, SystemClock, ttl_expired};
