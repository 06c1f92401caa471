//! Lifecycle monitor.
//!
//! Every session gets one monitor task. It drains the inbox on a fixed tick
//! while the session is active, and once the inactivity window has elapsed it
//! finalizes the session:
//!
//! ```text
//! Running ──tick──▶ Running ── … ──▶ Expired ──▶ Finalizing ──▶ Terminated
//! ```
//!
//! Finalization is best effort. A failing analyzer or store is logged and the
//! session is removed regardless.

use std::sync::Arc;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::ChatResult;
use crate::manager::ChatManager;
use crate::session::Chat;
use crate::traits::UserStore;
use crate::types::{FieldValue, UserField};

/// States a monitor moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Expired,
    Finalizing,
    Terminated,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Expired => "expired",
            Self::Finalizing => "finalizing",
            Self::Terminated => "terminated",
        }
    }
}

pub(crate) fn spawn_monitor(manager: ChatManager, chat: Arc<Chat>) -> JoinHandle<()> {
    tokio::spawn(run_monitor(manager, chat))
}

fn enter(subject_id: &str, state: MonitorState) -> MonitorState {
    debug!("Monitor for {} is {}", subject_id, state.as_str());
    state
}

async fn run_monitor(manager: ChatManager, chat: Arc<Chat>) {
    let subject_id = chat.subject_id().to_string();
    let tick = manager.config().tick;
    let mut state = enter(&subject_id, MonitorState::Running);

    while state == MonitorState::Running {
        sleep(tick).await;
        if !chat.is_active().await {
            state = enter(&subject_id, MonitorState::Expired);
            continue;
        }
        let report = chat.drain_and_dispatch().await;
        if !report.is_idle() {
            debug!("Drained inbox for {}: {:?}", subject_id, report);
        }
    }

    let leftovers = chat.take_pending().await;
    if !leftovers.is_empty() {
        warn!(
            "Chat with {} expired with {} unanswered message(s), dropping them",
            subject_id,
            leftovers.len()
        );
    }

    enter(&subject_id, MonitorState::Finalizing);
    let summary = finalize(&manager, &chat).await;

    manager.remove_if_current(&chat).await;
    info!("Chat expired and deleted for user: {}", subject_id);

    if let (Some(summary), Some(notifier)) = (summary, manager.notifier()) {
        if let Err(e) = notifier.notify(&summary).await {
            error!("Failed to send teardown summary for {}: {}", subject_id, e);
        }
    }

    enter(&subject_id, MonitorState::Terminated);
    manager.monitor_terminated();
}

/// Summarize a finished session and persist what was learned.
///
/// Returns `None` when the session never had a conversation, otherwise the
/// human-readable summary for the teardown notifier.
async fn finalize(manager: &ChatManager, chat: &Chat) -> Option<String> {
    let subject_id = chat.subject_id();
    if !chat.has_conversation().await {
        debug!("Nothing to summarize for {}", subject_id);
        return None;
    }

    let mut summary = format!("Chat with {} ended.", subject_id);
    let store = manager.user_store();
    let history = chat.full_history().await;
    let existing_tags = match store.tags(subject_id).await {
        Ok(tags) => tags,
        Err(e) => {
            warn!("Could not read tags for {}: {}", subject_id, e);
            Vec::new()
        }
    };

    let insights = match manager.summarizer().summarize(&history, &existing_tags).await {
        Ok(insights) => insights,
        Err(e) => {
            error!("Failed to summarize chat with {}: {}", subject_id, e);
            return Some(summary);
        }
    };
    manager.record_summarized();
    if insights.is_empty() {
        debug!("Nothing new learned from chat with {}", subject_id);
        return Some(summary);
    }

    let memory = insights.memory.trim();
    info!("Memory extracted from chat with {}: {}", subject_id, memory);
    if !memory.is_empty() {
        match append_memory(store.as_ref(), subject_id, memory).await {
            Ok(()) => summary.push_str(&format!("\nNew memory: {}", memory)),
            Err(e) => error!("Failed to store memory for {}: {}", subject_id, e),
        }
    }

    info!("Tags extracted from chat with {}: {:?}", subject_id, insights.tags);
    match append_tags(store.as_ref(), subject_id, &insights.tags).await {
        Ok(added) if !added.is_empty() => {
            summary.push_str(&format!("\nNew tags: {}", added.join(", ")))
        }
        Ok(_) => {}
        Err(e) => error!("Failed to store tags for {}: {}", subject_id, e),
    }

    Some(summary)
}

/// Append a timestamped entry to the subject's memory list
async fn append_memory(store: &dyn UserStore, subject_id: &str, memory: &str) -> ChatResult<()> {
    let mut entries = store.memory(subject_id).await?;
    entries.push(format!(
        "{}::{}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        memory
    ));
    store
        .set_field(subject_id, UserField::Memory, FieldValue::List(entries))
        .await
}

/// Append tags the subject does not have yet; returns the ones added
async fn append_tags(
    store: &dyn UserStore,
    subject_id: &str,
    tags: &[String],
) -> ChatResult<Vec<String>> {
    let mut current = store.tags(subject_id).await?;
    let mut added = Vec::new();
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !current.iter().any(|c| c == tag) && !added.iter().any(|a: &String| a == tag) {
            added.push(tag.to_string());
        }
    }
    if added.is_empty() {
        return Ok(added);
    }
    current.extend(added.iter().cloned());
    store
        .set_field(subject_id, UserField::Tags, FieldValue::List(current))
        .await?;
    Ok(added)
}
