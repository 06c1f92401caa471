//! Fakes shared by the unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{ChatError, ChatResult};
use crate::traits::{
    ConversationAnalyzer, ReplySink, SessionEndAnalyzer, TeardownNotifier, UserStore,
};
use crate::types::{FieldValue, Message, SessionInsights, UserField};

/// Answers every call with the same text and remembers what it was given
pub struct ScriptedAnalyzer {
    reply: String,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedAnalyzer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, history: &[Message]) -> ChatResult<String> {
        self.calls.lock().unwrap().push(history.to_vec());
        Ok(self.reply.clone())
    }
}

/// Parks inside `analyze` until released
pub struct GatedAnalyzer {
    reply: String,
    entered: Notify,
    release: Notify,
}

impl GatedAnalyzer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Resolves once a call is parked in `analyze`
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl ConversationAnalyzer for GatedAnalyzer {
    async fn analyze(&self, _history: &[Message]) -> ChatResult<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.reply.clone())
    }
}

pub struct FailingAnalyzer;

#[async_trait]
impl ConversationAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _history: &[Message]) -> ChatResult<String> {
        Err(ChatError::Llm("model unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct CollectingSink {
    replies: Mutex<Vec<String>>,
    failures: Mutex<usize>,
}

impl CollectingSink {
    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }

    pub fn failures(&self) -> usize {
        *self.failures.lock().unwrap()
    }
}

#[async_trait]
impl ReplySink for CollectingSink {
    async fn deliver(&self, reply: &str) -> ChatResult<()> {
        self.replies.lock().unwrap().push(reply.to_string());
        Ok(())
    }

    async fn fail(&self, _error: &ChatError) -> ChatResult<()> {
        *self.failures.lock().unwrap() += 1;
        Ok(())
    }
}

/// Returns fixed insights and records each call's history and tags
pub struct ScriptedSummarizer {
    insights: SessionInsights,
    calls: Mutex<Vec<(Vec<Message>, Vec<String>)>>,
}

impl ScriptedSummarizer {
    pub fn new(memory: &str, tags: &[&str]) -> Self {
        Self {
            insights: SessionInsights {
                memory: memory.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Vec<Message>, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionEndAnalyzer for ScriptedSummarizer {
    async fn summarize(
        &self,
        history: &[Message],
        existing_tags: &[String],
    ) -> ChatResult<SessionInsights> {
        self.calls
            .lock()
            .unwrap()
            .push((history.to_vec(), existing_tags.to_vec()));
        Ok(self.insights.clone())
    }
}

pub struct FailingSummarizer;

#[async_trait]
impl SessionEndAnalyzer for FailingSummarizer {
    async fn summarize(
        &self,
        _history: &[Message],
        _existing_tags: &[String],
    ) -> ChatResult<SessionInsights> {
        Err(ChatError::Llm("summary unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct CollectingNotifier {
    summaries: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn summaries(&self) -> Vec<String> {
        self.summaries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TeardownNotifier for CollectingNotifier {
    async fn notify(&self, summary: &str) -> ChatResult<()> {
        self.summaries.lock().unwrap().push(summary.to_string());
        Ok(())
    }
}

/// Reads succeed with nothing, writes always fail
pub struct ReadOnlyStore;

#[async_trait]
impl UserStore for ReadOnlyStore {
    async fn get_field(&self, _subject_id: &str, _field: UserField) -> ChatResult<Option<FieldValue>> {
        Ok(None)
    }

    async fn set_field(&self, _subject_id: &str, _field: UserField, _value: FieldValue) -> ChatResult<()> {
        Err(ChatError::Store("read-only".to_string()))
    }
}
