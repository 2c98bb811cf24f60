//! FFI bindings for UniFFI export
//!
//! Kotlin bindings for the Android accessibility service.
//!
//! ## Usage from Kotlin
//!
//! ```kotlin
//! initLogging(LogcatCallback(), FfiLogLevel.INFO)
//!
//! val service = SmartReplyService(
//!     dbPath = "${filesDir}/telephony.db",
//!     lineNumbers = listOfNotNull(telephonyManager.line1Number),
//!     configJson = null,
//! )
//! service.setConversationObserver(observer)
//! service.setOutgoingHandler(injector)
//!
//! // From AccessibilityService.onAccessibilityEvent
//! service.onTitleDetected(title, bubbles.mapNotNull { parseScrapedMessage(it.desc, it.text) })
//! val timeline = service.currentTimeline()
//! ```

mod logging;
mod service;
mod types;

pub use logging::{init_logging, install_logger, set_log_callback, set_log_level};
pub use service::*;
pub use types::*;
