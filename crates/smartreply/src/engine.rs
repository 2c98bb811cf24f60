//! Wiring of the reader, merger and resolver over one store
//!
//! Both the FFI service and the CLI build the same object graph, so it
//! lives here once.

use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use log::info;

use crate::config::EngineConfig;
use crate::models::{ActiveConversation, Message, Thread, ThreadId};
use crate::query::{
    ConversationGap, ConversationTimeline, TopicHint, analyze_gaps, build_timeline,
    merge_for_contact, recent_topic_hint,
};
use crate::resolve::TitleResolver;
use crate::storage::{ContactStore, LineNumberSource, MessageStore, StaticLineNumbers};
use crate::threads::{ThreadMerger, ThreadStoreReader, discover_self_numbers};

/// Timeline plus the pacing hints derived from it
#[derive(Debug, Clone)]
pub struct TimelineReport {
    pub timeline: ConversationTimeline,
    pub gap: Option<ConversationGap>,
    pub topic: Option<TopicHint>,
}

pub struct SmartReplyEngine {
    config: EngineConfig,
    merger: Arc<ThreadMerger>,
    resolver: Arc<TitleResolver>,
}

impl SmartReplyEngine {
    /// Build the engine over `store`
    ///
    /// `reported_numbers` are the line numbers the host telephony layer
    /// knows; when empty, the store's own line number table is asked.
    pub fn new<S>(store: Arc<S>, reported_numbers: Vec<String>, config: EngineConfig) -> Self
    where
        S: MessageStore + ContactStore + LineNumberSource + 'static,
    {
        let fallback = config.self_number_fallback.as_deref();
        let self_numbers = if reported_numbers.is_empty() {
            discover_self_numbers(store.as_ref(), fallback)
        } else {
            discover_self_numbers(&StaticLineNumbers(reported_numbers), fallback)
        };
        info!("Engine ready with {} self number(s)", self_numbers.len());

        let messages: Arc<dyn MessageStore> = store.clone();
        let contacts: Arc<dyn ContactStore> = store;
        let reader = ThreadStoreReader::new(messages, self_numbers);
        let merger = Arc::new(
            ThreadMerger::new(reader, contacts)
                .with_ttl(config.thread_cache_ttl())
                .with_history_limit(config.history_limit),
        );
        let resolver = Arc::new(TitleResolver::new(Arc::clone(&merger)));

        Self {
            config,
            merger,
            resolver,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn merger(&self) -> &Arc<ThreadMerger> {
        &self.merger
    }

    pub fn resolver(&self) -> &Arc<TitleResolver> {
        &self.resolver
    }

    pub fn threads(&self) -> Arc<Vec<Thread>> {
        self.merger.threads()
    }

    pub fn resolve_title(&self, title: &str) -> Option<Thread> {
        self.resolver.resolve(title)
    }

    /// History for a thread, merged across every thread with the same
    /// contact unless it is a group
    pub fn merged_messages(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        let Some(thread) = self.merger.thread_by_id(thread_id) else {
            bail!("Thread {thread_id} not found");
        };
        let participants = thread.participants();
        if thread.is_group() {
            return Ok(self.merger.messages_with_names(thread_id, &participants));
        }
        Ok(merge_for_contact(
            &self.merger,
            thread_id,
            &thread.primary_address,
            &participants,
            self.config.merged_limit,
        ))
    }

    /// Timeline for the conversation on screen, `None` if its thread vanished
    pub fn timeline(
        &self,
        active: &ActiveConversation,
        now: DateTime<Utc>,
    ) -> Option<TimelineReport> {
        let timeline = build_timeline(&self.merger, active, self.config.timeline_limits(), now)?;
        let gap = analyze_gaps(&timeline.messages, now);
        let topic = recent_topic_hint(&timeline.messages);
        Some(TimelineReport {
            timeline,
            gap,
            topic,
        })
    }
}
