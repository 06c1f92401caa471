//! Per-contact chat session.
//!
//! A [`Chat`] holds the rolling history for one counterparty, the mode flags
//! that decide how inbound messages are handled, and an inbox of messages
//! waiting for the next batched reply. All state sits behind the session's own
//! locks; nothing is held across a call into an analyzer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::ChatError;
use crate::traits::{ConversationAnalyzer, ReplySink};
use crate::types::{ChatMode, Message, MessageRole, SubjectId};

/// Separator placed between inbox messages merged into one user turn
pub const BATCH_SEPARATOR: &str = "\n\n";

/// A raw inbound message waiting for the next drain, together with the
/// analyzer and sink it was enqueued with.
struct PendingMessage {
    content: String,
    analyzer: Arc<dyn ConversationAnalyzer>,
    reply_sink: Arc<dyn ReplySink>,
}

impl PendingMessage {
    fn same_binding(&self, other: &PendingMessage) -> bool {
        Arc::ptr_eq(&self.analyzer, &other.analyzer) && Arc::ptr_eq(&self.reply_sink, &other.reply_sink)
    }
}

/// Consecutive pending messages sharing one binding
struct Batch {
    contents: Vec<String>,
    analyzer: Arc<dyn ConversationAnalyzer>,
    reply_sink: Arc<dyn ReplySink>,
}

fn into_batches(pending: Vec<PendingMessage>) -> Vec<Batch> {
    let mut batches: Vec<(PendingMessage, Vec<String>)> = Vec::new();
    for item in pending {
        match batches.last_mut() {
            Some((head, contents)) if head.same_binding(&item) => contents.push(item.content),
            _ => {
                let contents = vec![item.content.clone()];
                batches.push((item, contents));
            }
        }
    }
    batches
        .into_iter()
        .map(|(head, contents)| Batch {
            contents,
            analyzer: head.analyzer,
            reply_sink: head.reply_sink,
        })
        .collect()
}

/// Outcome of one `drain_and_dispatch` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Analyzer calls made
    pub batches: usize,
    /// Replies handed to a sink
    pub delivered: usize,
    /// Batches whose analyzer or sink failed
    pub failed: usize,
    /// Messages discarded because the session expired
    pub dropped: usize,
    /// Messages stored without a reply because the operator has the chat
    pub recorded: usize,
    /// Replies delivered after the session expired, missing from the history
    pub unrecorded: usize,
}

impl DispatchReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

struct ChatState {
    history: Vec<Message>,
    last_activity: Instant,
    expired: bool,
    mode: ChatMode,
    manual_override: bool,
    hold: bool,
}

/// What became of a drained batch once it reached the history
enum Admission {
    Expired,
    Manual,
    Dispatch,
}

impl ChatState {
    fn push(&mut self, message: Message) {
        self.history.push(message);
        self.last_activity = Instant::now();
        self.mode = ChatMode::Conversational;
    }

    /// Flip the permanent expired flag once the window has elapsed
    fn check_active(&mut self, ttl: Duration) -> bool {
        if !self.expired && self.last_activity.elapsed() >= ttl {
            self.expired = true;
        }
        !self.expired
    }
}

/// Conversation state for a single counterparty
pub struct Chat {
    subject_id: SubjectId,
    ttl: Duration,
    max_history: usize,
    preamble: Message,
    state: Mutex<ChatState>,
    inbox: Mutex<Vec<PendingMessage>>,
}

impl Chat {
    /// Create a session. `chat_description` is appended to the assistant
    /// description to form the system preamble.
    pub fn new(
        subject_id: impl Into<SubjectId>,
        config: &SessionConfig,
        chat_description: impl AsRef<str>,
    ) -> Self {
        let preamble = Message::system(format!(
            "{}\n{}",
            config.assistant_description,
            chat_description.as_ref()
        ));
        Self {
            subject_id: subject_id.into(),
            ttl: config.ttl,
            max_history: config.max_history,
            preamble,
            state: Mutex::new(ChatState {
                history: Vec::new(),
                last_activity: Instant::now(),
                expired: false,
                mode: ChatMode::Function,
                manual_override: false,
                hold: false,
            }),
            inbox: Mutex::new(Vec::new()),
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The seeded system turn
    pub fn preamble(&self) -> &Message {
        &self.preamble
    }

    /// Append a turn.
    ///
    /// Returns `false` and leaves the session untouched when it has expired.
    pub async fn record(&self, message: Message, operator_originated: bool) -> bool {
        let mut state = self.state.lock().await;
        if !state.check_active(self.ttl) {
            warn!(
                "Attempted to add message to expired chat {}, dropping it",
                self.subject_id
            );
            return false;
        }
        debug!("Message added to {}: {:?}: {}", self.subject_id, message.role, message.content);
        state.push(message);
        if operator_originated && !state.manual_override {
            info!("Operator took over the chat with {}", self.subject_id);
            state.manual_override = true;
        }
        true
    }

    /// Store a drained batch as one user turn and report whether the
    /// automatic responder may answer it.
    async fn admit_batch(&self, content: String) -> Admission {
        let mut state = self.state.lock().await;
        if !state.check_active(self.ttl) {
            return Admission::Expired;
        }
        state.push(Message::user(content));
        if state.manual_override {
            Admission::Manual
        } else {
            Admission::Dispatch
        }
    }

    /// Preamble followed by the most recent `max_history` turns
    pub async fn snapshot_history(&self) -> Vec<Message> {
        let state = self.state.lock().await;
        let start = state.history.len().saturating_sub(self.max_history);
        std::iter::once(self.preamble.clone())
            .chain(state.history[start..].iter().cloned())
            .collect()
    }

    /// Preamble followed by every stored turn
    pub async fn full_history(&self) -> Vec<Message> {
        let state = self.state.lock().await;
        std::iter::once(self.preamble.clone())
            .chain(state.history.iter().cloned())
            .collect()
    }

    /// Whether any non-system turn was recorded
    pub async fn has_conversation(&self) -> bool {
        let state = self.state.lock().await;
        state.history.iter().any(|m| m.role != MessageRole::System)
    }

    /// Number of stored turns, preamble excluded
    pub async fn turn_count(&self) -> usize {
        self.state.lock().await.history.len()
    }

    /// Queue a raw message for the next batched reply.
    ///
    /// Returns `false` when the session has expired; the message is dropped.
    pub async fn enqueue(
        &self,
        content: impl Into<String>,
        analyzer: Arc<dyn ConversationAnalyzer>,
        reply_sink: Arc<dyn ReplySink>,
    ) -> bool {
        if !self.is_active().await {
            warn!("Chat {} expired, dropping queued message", self.subject_id);
            return false;
        }
        self.inbox.lock().await.push(PendingMessage {
            content: content.into(),
            analyzer,
            reply_sink,
        });
        true
    }

    /// Messages currently waiting in the inbox
    pub async fn pending(&self) -> usize {
        self.inbox.lock().await.len()
    }

    /// Empty the inbox without dispatching, returning the raw messages
    pub async fn take_pending(&self) -> Vec<String> {
        let pending = std::mem::take(&mut *self.inbox.lock().await);
        pending.into_iter().map(|p| p.content).collect()
    }

    /// Drain the inbox and answer it.
    ///
    /// Consecutive messages enqueued with the same analyzer and sink are
    /// merged into a single user turn and answered with a single analyzer
    /// call. The analyzer runs on a snapshot, without any lock held.
    ///
    /// Once the operator has taken over, batches are only stored.
    pub async fn drain_and_dispatch(&self) -> DispatchReport {
        let pending = std::mem::take(&mut *self.inbox.lock().await);
        let mut report = DispatchReport::default();
        if pending.is_empty() {
            return report;
        }

        for batch in into_batches(pending) {
            let size = batch.contents.len();
            let content = batch.contents.join(BATCH_SEPARATOR);
            match self.admit_batch(content).await {
                Admission::Dispatch => {}
                Admission::Manual => {
                    info!(
                        "Operator has the chat with {}, stored {} message(s) without replying",
                        self.subject_id, size
                    );
                    report.recorded += size;
                    continue;
                }
                Admission::Expired => {
                    warn!("Chat {} expired, dropping {} queued message(s)", self.subject_id, size);
                    report.dropped += size;
                    let expired = ChatError::SessionExpired(self.subject_id.clone());
                    if let Err(e) = batch.reply_sink.fail(&expired).await {
                        warn!("Failed to report expiry to {}: {}", self.subject_id, e);
                    }
                    continue;
                }
            }

            let snapshot = self.snapshot_history().await;
            debug!(
                "Dispatching {} message(s) for {} with {} turns of context",
                size,
                self.subject_id,
                snapshot.len()
            );
            report.batches += 1;

            match batch.analyzer.analyze(&snapshot).await {
                Ok(reply) => {
                    info!("Response generated for {}", self.subject_id);
                    if !self.record(Message::assistant(reply.clone()), false).await {
                        warn!(
                            "Chat {} expired while its reply was generated, delivering it unrecorded",
                            self.subject_id
                        );
                        report.unrecorded += 1;
                    }
                    match batch.reply_sink.deliver(&reply).await {
                        Ok(()) => report.delivered += 1,
                        Err(e) => {
                            error!("Failed to deliver reply to {}: {}", self.subject_id, e);
                            report.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    if e.is_external() {
                        error!("Analyzer failed for {}: {}", self.subject_id, e);
                    } else {
                        warn!("No reply for {}: {}", self.subject_id, e);
                    }
                    report.failed += 1;
                    if let Err(sink_err) = batch.reply_sink.fail(&e).await {
                        warn!("Failed to report error to {}: {}", self.subject_id, sink_err);
                    }
                }
            }
        }

        report
    }

    /// End the session now. Its monitor finalizes it on the next tick.
    pub async fn expire(&self) {
        let mut state = self.state.lock().await;
        if !state.expired {
            info!("Chat with {} ended early", self.subject_id);
            state.expired = true;
        }
    }

    /// `false` once the inactivity window has elapsed. Permanent.
    pub async fn is_active(&self) -> bool {
        self.state.lock().await.check_active(self.ttl)
    }

    /// Time left before the session expires
    pub async fn remaining(&self) -> Duration {
        let state = self.state.lock().await;
        if state.expired {
            return Duration::ZERO;
        }
        self.ttl.saturating_sub(state.last_activity.elapsed())
    }

    pub async fn mode(&self) -> ChatMode {
        self.state.lock().await.mode
    }

    pub async fn is_manual_override(&self) -> bool {
        self.state.lock().await.manual_override
    }

    /// Set the busy-notice gate
    pub async fn mark_hold(&self) {
        self.state.lock().await.hold = true;
    }

    pub async fn is_on_hold(&self) -> bool {
        self.state.lock().await.hold
    }
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("subject_id", &self.subject_id)
            .field("ttl", &self.ttl)
            .field("max_history", &self.max_history)
            .finish()
    }
}
