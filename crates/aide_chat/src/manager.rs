//! Session registry.
//!
//! [`ChatManager`] is the only owner of live sessions. It creates a session on
//! first contact, starts its lifecycle monitor, and is the place the monitor
//! removes it from once finalization is done.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::lifecycle;
use crate::session::Chat;
use crate::traits::{SessionEndAnalyzer, TeardownNotifier, UserStore};
use crate::types::SubjectId;

/// Counters describing the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Entries currently in the map
    pub live: usize,
    /// Monitors that have not terminated yet
    pub monitors: usize,
    /// Sessions created since startup
    pub created: u64,
    /// Sessions torn down since startup
    pub finalized: u64,
    /// Sessions that went through the session-end analyzer
    pub summarized: u64,
}

struct ManagerInner {
    config: SessionConfig,
    sessions: Mutex<HashMap<SubjectId, Arc<Chat>>>,
    user_store: Arc<dyn UserStore>,
    summarizer: Arc<dyn SessionEndAnalyzer>,
    notifier: Option<Arc<dyn TeardownNotifier>>,
    created: AtomicU64,
    finalized: AtomicU64,
    summarized: AtomicU64,
    monitors: AtomicUsize,
}

/// Registry of live chat sessions, keyed by subject.
///
/// Cloning is cheap and yields a handle to the same registry. Must be used
/// from within a tokio runtime: every new session spawns a monitor task.
#[derive(Clone)]
pub struct ChatManager {
    inner: Arc<ManagerInner>,
}

impl ChatManager {
    pub fn new(
        config: SessionConfig,
        user_store: Arc<dyn UserStore>,
        summarizer: Arc<dyn SessionEndAnalyzer>,
        notifier: Option<Arc<dyn TeardownNotifier>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                sessions: Mutex::new(HashMap::new()),
                user_store,
                summarizer,
                notifier,
                created: AtomicU64::new(0),
                finalized: AtomicU64::new(0),
                summarized: AtomicU64::new(0),
                monitors: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn user_store(&self) -> &Arc<dyn UserStore> {
        &self.inner.user_store
    }

    pub(crate) fn summarizer(&self) -> &Arc<dyn SessionEndAnalyzer> {
        &self.inner.summarizer
    }

    pub(crate) fn notifier(&self) -> Option<&Arc<dyn TeardownNotifier>> {
        self.inner.notifier.as_ref()
    }

    /// Return the live session for `subject_id`, creating it if needed.
    ///
    /// The profile read happens outside the registry lock; the map is checked
    /// again before installing, so concurrent first messages from the same
    /// subject end up on one session with one monitor.
    pub async fn resolve_or_create(&self, subject_id: &str) -> Arc<Chat> {
        if let Some(chat) = self.get(subject_id).await {
            return chat;
        }

        let tags = match self.inner.user_store.tags(subject_id).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Could not read tags for {}: {}", subject_id, e);
                Vec::new()
            }
        };
        let description = describe_tags(&tags);

        let mut sessions = self.inner.sessions.lock().await;
        if let Some(existing) = sessions.get(subject_id) {
            if existing.is_active().await {
                return existing.clone();
            }
            debug!("Replacing expired chat for {}", subject_id);
        }

        info!("Creating new chat for user: {}", subject_id);
        let chat = Arc::new(Chat::new(subject_id, &self.inner.config, description));
        sessions.insert(subject_id.to_string(), chat.clone());
        self.inner.created.fetch_add(1, Ordering::SeqCst);
        self.inner.monitors.fetch_add(1, Ordering::SeqCst);
        lifecycle::spawn_monitor(self.clone(), chat.clone());
        chat
    }

    /// The live session for `subject_id`, if any
    pub async fn get(&self, subject_id: &str) -> Option<Arc<Chat>> {
        let chat = self.inner.sessions.lock().await.get(subject_id).cloned()?;
        chat.is_active().await.then_some(chat)
    }

    /// Whether `subject_id` has a live, non-expired session
    pub async fn is_live(&self, subject_id: &str) -> bool {
        self.get(subject_id).await.is_some()
    }

    /// Subjects with an entry in the registry
    pub async fn live_subjects(&self) -> Vec<SubjectId> {
        let mut subjects: Vec<_> = self.inner.sessions.lock().await.keys().cloned().collect();
        subjects.sort();
        subjects
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.lock().await.is_empty()
    }

    /// End the session for `subject_id` without waiting for the inactivity
    /// window. Its monitor finalizes it on the next tick.
    pub async fn remove(&self, subject_id: &str) -> Option<Arc<Chat>> {
        let mut sessions = self.inner.sessions.lock().await;
        let removed = sessions.remove(subject_id)?;
        removed.expire().await;
        info!("Removed chat for {}", subject_id);
        Some(removed)
    }

    pub async fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.len().await,
            monitors: self.inner.monitors.load(Ordering::SeqCst),
            created: self.inner.created.load(Ordering::SeqCst),
            finalized: self.inner.finalized.load(Ordering::SeqCst),
            summarized: self.inner.summarized.load(Ordering::SeqCst),
        }
    }

    /// Remove `chat` from the map if it is still the entry for its subject.
    /// A replacement session is left alone.
    pub(crate) async fn remove_if_current(&self, chat: &Arc<Chat>) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        let is_current = sessions
            .get(chat.subject_id())
            .is_some_and(|entry| Arc::ptr_eq(entry, chat));
        if is_current {
            sessions.remove(chat.subject_id());
        }
        self.inner.finalized.fetch_add(1, Ordering::SeqCst);
        is_current
    }

    pub(crate) fn record_summarized(&self) {
        self.inner.summarized.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn monitor_terminated(&self) {
        self.inner.monitors.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ChatManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatManager")
            .field("config", &self.inner.config)
            .field("notifier", &self.inner.notifier.is_some())
            .finish()
    }
}

/// Second line of the system preamble, built from the contact's tags
fn describe_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        "No tags are known for this contact yet.".to_string()
    } else {
        format!("Tags the operator assigned to this contact: {}", tags.join(", "))
    }
}
