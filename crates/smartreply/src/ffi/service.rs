//! SmartReplyService facade for UniFFI export
//!
//! Owns the engine, the coordinator and a small tokio runtime that runs
//! title lookups and delivers coordinator output to the host callbacks.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use log::{debug, warn};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};

use crate::config::EngineConfig;
use crate::conversation::{
    ActiveConversationCoordinator, ConversationLookup, ConversationState, OutgoingText, UiEvent,
};
use crate::engine::SmartReplyEngine;
use crate::ffi::types::*;
use crate::models::ThreadId;
use crate::storage::SqliteMessageStore;

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

fn current<T: ?Sized>(slot: &Mutex<Option<Arc<T>>>) -> Option<Arc<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn replace<T: ?Sized>(slot: &Mutex<Option<Arc<T>>>, value: Option<Arc<T>>) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Main entry point for the Android service
#[derive(uniffi::Object)]
pub struct SmartReplyService {
    engine: SmartReplyEngine,
    coordinator: ActiveConversationCoordinator,
    observer: Slot<dyn ConversationObserver>,
    outgoing_handler: Slot<dyn OutgoingTextHandler>,
    // Only held so its tasks keep running; dropped last so coordinator
    // tasks are cancelled before shutdown
    _runtime: Runtime,
}

#[uniffi::export]
impl SmartReplyService {
    /// Open the engine over a telephony snapshot database
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite snapshot of the SMS/MMS/contact stores
    /// * `line_numbers` - Numbers the telephony layer reports for this device
    /// * `config_json` - Engine config; `None` loads ~/.config/smartreply/smartreply.json
    #[uniffi::constructor]
    pub fn new(
        db_path: String,
        line_numbers: Vec<String>,
        config_json: Option<String>,
    ) -> Result<Arc<Self>, EngineError> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json)?,
            None => EngineConfig::load()?,
        };

        if let Some(parent) = PathBuf::from(&db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Storage {
                message: format!("Failed to create database directory: {e}"),
            })?;
        }
        let store = SqliteMessageStore::open(&db_path).map_err(|e| EngineError::Storage {
            message: format!("Failed to open database: {e:#}"),
        })?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("smartreply")
            .enable_all()
            .build()
            .map_err(|e| EngineError::Internal {
                message: format!("Failed to start runtime: {e}"),
            })?;

        let engine = SmartReplyEngine::new(Arc::new(store), line_numbers, config);
        let lookup: Arc<dyn ConversationLookup> = engine.resolver().clone();
        let (coordinator, outgoing_rx) =
            ActiveConversationCoordinator::new(lookup, runtime.handle().clone());

        let observer: Slot<dyn ConversationObserver> = Arc::new(Mutex::new(None));
        let outgoing_handler: Slot<dyn OutgoingTextHandler> = Arc::new(Mutex::new(None));

        runtime.spawn(forward_states(coordinator.subscribe(), Arc::clone(&observer)));
        runtime.spawn(forward_outgoing(outgoing_rx, Arc::clone(&outgoing_handler)));

        Ok(Arc::new(Self {
            engine,
            coordinator,
            observer,
            outgoing_handler,
            _runtime: runtime,
        }))
    }

    // ========================================================================
    // Thread Queries
    // ========================================================================

    /// All threads, newest first, with contact names resolved
    pub fn list_threads(&self) -> Vec<FfiThread> {
        self.engine
            .threads()
            .iter()
            .cloned()
            .map(FfiThread::from)
            .collect()
    }

    /// Thread a conversation title refers to
    pub fn resolve_title(&self, title: String) -> Option<FfiThread> {
        self.engine.resolve_title(&title).map(FfiThread::from)
    }

    /// History of a thread merged across the contact's other threads
    pub fn merged_messages(&self, thread_id: String) -> Result<Vec<FfiMessage>, EngineError> {
        let thread_id = ThreadId::new(thread_id);
        if self.engine.merger().thread_by_id(&thread_id).is_none() {
            return Err(EngineError::NotFound {
                resource: format!("thread {thread_id}"),
            });
        }
        let messages = self.engine.merged_messages(&thread_id)?;
        Ok(messages.into_iter().map(FfiMessage::from).collect())
    }

    pub fn list_contacts(&self) -> Vec<FfiContact> {
        self.engine
            .merger()
            .list_contacts()
            .into_iter()
            .map(FfiContact::from)
            .collect()
    }

    /// Drop the cached thread list, e.g. after a new message arrived
    pub fn invalidate_threads(&self) {
        self.engine.merger().invalidate();
    }

    // ========================================================================
    // UI Events
    // ========================================================================

    pub fn on_title_detected(&self, title: String, scraped: Vec<FfiScrapedMessage>) {
        self.coordinator.handle_event(UiEvent::TitleDetected {
            title,
            scraped: scraped.into_iter().map(Into::into).collect(),
        });
    }

    pub fn on_title_cleared(&self) {
        self.coordinator.handle_event(UiEvent::TitleCleared);
    }

    pub fn on_app_left(&self) {
        self.coordinator.handle_event(UiEvent::AppLeft);
    }

    // ========================================================================
    // Active Conversation
    // ========================================================================

    pub fn conversation_state(&self) -> FfiConversationState {
        self.coordinator.state().into()
    }

    pub fn active_conversation(&self) -> Option<FfiActiveConversation> {
        self.coordinator.active_conversation().map(Into::into)
    }

    /// Timeline and pacing hints for the conversation on screen
    pub fn current_timeline(&self) -> Option<FfiTimeline> {
        let active = self.coordinator.active_conversation()?;
        let report = self.engine.timeline(&active, Utc::now())?;
        Some(FfiTimeline::new(report.timeline, report.gap, report.topic))
    }

    /// Register the observer for coordinator state changes
    ///
    /// The current state is delivered immediately.
    pub fn set_conversation_observer(&self, observer: Box<dyn ConversationObserver>) {
        let observer: Arc<dyn ConversationObserver> = Arc::from(observer);
        replace(&self.observer, Some(Arc::clone(&observer)));
        observer.on_state_changed(self.coordinator.state().into());
    }

    pub fn clear_conversation_observer(&self) {
        replace(&self.observer, None);
    }

    pub fn set_outgoing_handler(&self, handler: Box<dyn OutgoingTextHandler>) {
        replace(&self.outgoing_handler, Some(Arc::from(handler)));
    }

    /// Send text into the active conversation through the outgoing handler
    pub fn submit_outgoing_text(&self, text: String) -> Result<(), EngineError> {
        self.coordinator.submit_outgoing(&text)?;
        Ok(())
    }
}

async fn forward_states(
    mut states: watch::Receiver<ConversationState>,
    observer: Slot<dyn ConversationObserver>,
) {
    while states.changed().await.is_ok() {
        let state = states.borrow_and_update().clone();
        match current(&observer) {
            Some(observer) => observer.on_state_changed(state.into()),
            None => debug!("No observer for state change"),
        }
    }
}

async fn forward_outgoing(
    mut outgoing: mpsc::UnboundedReceiver<OutgoingText>,
    handler: Slot<dyn OutgoingTextHandler>,
) {
    while let Some(OutgoingText { thread_id, text }) = outgoing.recv().await {
        match current(&handler) {
            Some(handler) => handler.send_text(thread_id.0, text),
            None => warn!("No outgoing handler; dropped message for thread {thread_id}"),
        }
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Parse one message bubble read off the screen
///
/// # Arguments
/// * `description` - The node's content description ("Ann said  hi Today 2:36 PM .")
/// * `text` - The node's visible text
#[uniffi::export]
pub fn parse_scraped_message(description: String, text: String) -> Option<FfiScrapedMessage> {
    crate::conversation::parse_message_description(&description, &text).map(Into::into)
}

/// Whether a toolbar title can name a conversation
#[uniffi::export]
pub fn is_likely_conversation_title(title: String) -> bool {
    crate::conversation::is_likely_conversation_title(title.trim())
}

/// Normalized form of a phone address
#[uniffi::export]
pub fn normalize_address(address: String) -> String {
    crate::address::normalize(&address)
}
