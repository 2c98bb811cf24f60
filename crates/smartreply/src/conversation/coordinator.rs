//! Active conversation coordinator
//!
//! UI events arrive one at a time from the accessibility observer, but title
//! lookups are slow (a cold thread scan) and the user can switch
//! conversations faster than a lookup finishes. Each new title cancels the
//! lookup in flight, and a finished lookup only publishes if its title is
//! still the one on screen. The check and the publish happen under the same
//! lock that event handling takes, so a stale result can never land after a
//! newer event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::scrape::is_likely_conversation_title;
use super::state::{ConversationState, CoordinatorError, OutgoingText, UiEvent};
use crate::models::{ActiveConversation, ScrapedMessage, Thread};

/// Finds the thread behind a conversation title
///
/// Runs on the blocking pool. Implementations should return early once
/// `cancel` fires; the result is discarded either way.
pub trait ConversationLookup: Send + Sync + 'static {
    fn lookup(&self, title: &str, cancel: &CancellationToken) -> Result<Option<Thread>>;
}

struct ResolveJob {
    title: String,
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    current_title: Option<String>,
    job: Option<ResolveJob>,
}

impl Inner {
    fn cancel_job(&mut self) {
        if let Some(job) = self.job.take() {
            debug!("Cancelling lookup for '{}'", job.title);
            job.cancel.cancel();
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    state: watch::Sender<ConversationState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves Inner consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, next: ConversationState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Publish a lookup result unless the user moved on meanwhile
    fn finish(
        &self,
        title: &str,
        cancel: &CancellationToken,
        found: Option<Thread>,
        scraped: Vec<ScrapedMessage>,
    ) {
        let mut inner = self.lock();
        if cancel.is_cancelled() || inner.current_title.as_deref() != Some(title) {
            debug!(
                "Discarding stale lookup for '{title}' (current: {:?})",
                inner.current_title
            );
            return;
        }
        inner.job = None;

        match found {
            Some(thread) => {
                info!("Matched thread {} for '{title}'", thread.thread_id);
                self.publish(ConversationState::Active(ActiveConversation::new(
                    thread.thread_id,
                    thread.contact_name,
                    scraped,
                )));
            }
            None => {
                info!("No thread match for '{title}'");
                self.publish(ConversationState::Idle);
            }
        }
    }
}

async fn run_lookup(
    shared: Arc<Shared>,
    lookup: Arc<dyn ConversationLookup>,
    title: String,
    scraped: Vec<ScrapedMessage>,
    cancel: CancellationToken,
) {
    let blocking = {
        let lookup = Arc::clone(&lookup);
        let title = title.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || lookup.lookup(&title, &cancel))
    };

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Lookup for '{title}' cancelled");
            return;
        }
        outcome = blocking => outcome,
    };

    let found = match outcome {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => {
            warn!("Lookup for '{title}' failed: {e:#}");
            None
        }
        Err(e) => {
            warn!("Lookup task for '{title}' panicked or was aborted: {e}");
            None
        }
    };
    shared.finish(&title, &cancel, found, scraped);
}

/// Single writer of the active conversation state
pub struct ActiveConversationCoordinator {
    shared: Arc<Shared>,
    lookup: Arc<dyn ConversationLookup>,
    runtime: Handle,
    outgoing: mpsc::UnboundedSender<OutgoingText>,
}

impl ActiveConversationCoordinator {
    /// Create a coordinator spawning lookups on `runtime`
    ///
    /// The returned receiver yields text the user asked to send; whoever
    /// injects text into the host app drains it.
    pub fn new(
        lookup: Arc<dyn ConversationLookup>,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<OutgoingText>) {
        let (state, _) = watch::channel(ConversationState::Idle);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                state,
            }),
            lookup,
            runtime,
            outgoing,
        };
        (coordinator, outgoing_rx)
    }

    /// Feed one UI observation
    pub fn handle_event(&self, event: UiEvent) {
        match event {
            UiEvent::TitleDetected { title, scraped } => self.title_detected(title, scraped),
            UiEvent::TitleCleared => self.clear("title cleared"),
            UiEvent::AppLeft => self.clear("left messaging app"),
        }
    }

    fn title_detected(&self, title: String, scraped: Vec<ScrapedMessage>) {
        let title = title.trim().to_string();
        if !is_likely_conversation_title(&title) {
            debug!("Ignoring non-conversation title '{title}'");
            return;
        }

        let mut inner = self.shared.lock();
        if inner.current_title.as_deref() == Some(title.as_str()) {
            return;
        }

        info!(
            "Conversation: '{title}' ({} scraped messages)",
            scraped.len()
        );
        inner.cancel_job();
        inner.current_title = Some(title.clone());
        // Hide the previous conversation while the new one loads
        self.shared.publish(ConversationState::Resolving {
            title: title.clone(),
        });

        let cancel = CancellationToken::new();
        let handle = self.runtime.spawn(run_lookup(
            Arc::clone(&self.shared),
            Arc::clone(&self.lookup),
            title.clone(),
            scraped,
            cancel.clone(),
        ));
        inner.job = Some(ResolveJob {
            title,
            cancel,
            _handle: handle,
        });
    }

    fn clear(&self, reason: &str) {
        let mut inner = self.shared.lock();
        if let Some(title) = inner.current_title.take() {
            info!("Left conversation '{title}' ({reason})");
        }
        inner.cancel_job();
        self.shared.publish(ConversationState::Idle);
    }

    /// Latest published state
    pub fn state(&self) -> ConversationState {
        self.shared.state.borrow().clone()
    }

    pub fn active_conversation(&self) -> Option<ActiveConversation> {
        self.state().active().cloned()
    }

    /// Title the coordinator currently tracks, resolved or not
    pub fn current_title(&self) -> Option<String> {
        self.shared.lock().current_title.clone()
    }

    /// Watch every published state
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.shared.state.subscribe()
    }

    /// Queue text for sending into the active conversation
    pub fn submit_outgoing(&self, text: &str) -> Result<OutgoingText, CoordinatorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoordinatorError::EmptyMessage);
        }
        let active = self
            .active_conversation()
            .ok_or(CoordinatorError::NoActiveConversation)?;

        let outgoing = OutgoingText {
            thread_id: active.thread_id,
            text: text.to_string(),
        };
        self.outgoing
            .send(outgoing.clone())
            .map_err(|_| CoordinatorError::OutgoingClosed)?;
        Ok(outgoing)
    }
}

impl Drop for ActiveConversationCoordinator {
    fn drop(&mut self) {
        self.shared.lock().cancel_job();
    }
}
