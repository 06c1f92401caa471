//! Inbound message routing.
//!
//! Decides, per platform message, whether it becomes a recorded turn, waits in
//! the inbox for a batched reply, earns a one-off busy notice, or is ignored.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::manager::ChatManager;
use crate::traits::{ConversationAnalyzer, ReplySink};
use crate::types::{Message, SubjectId, UserType};

/// Who wrote an inbound message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The contact the session is about
    Counterparty,
    /// The account owner typing into the contact's conversation
    Operator,
}

/// A text message from the chat platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub subject_id: SubjectId,
    pub text: String,
    pub origin: Origin,
}

impl InboundMessage {
    pub fn from_counterparty(subject_id: impl Into<SubjectId>, text: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            text: text.into(),
            origin: Origin::Counterparty,
        }
    }

    pub fn from_operator(subject_id: impl Into<SubjectId>, text: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            text: text.into(),
            origin: Origin::Operator,
        }
    }
}

/// What happened to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Appended to the history, no reply expected
    Recorded,
    /// Waiting in the inbox for the next batched reply
    Queued,
    /// Send this text back right away
    Reply(String),
    Ignored,
    /// The session expired before the message could be stored
    Dropped,
}

pub struct Router {
    manager: ChatManager,
    analyzer: Arc<dyn ConversationAnalyzer>,
    busy_notice: String,
}

impl Router {
    pub fn new(
        manager: ChatManager,
        analyzer: Arc<dyn ConversationAnalyzer>,
        busy_notice: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            analyzer,
            busy_notice: busy_notice.into(),
        }
    }

    pub fn manager(&self) -> &ChatManager {
        &self.manager
    }

    /// Route one message. Replies for queued messages go to `reply_sink`.
    pub async fn route(&self, message: InboundMessage, reply_sink: Arc<dyn ReplySink>) -> RouteOutcome {
        let subject_id = message.subject_id.as_str();
        let user_type = match self.manager.user_store().user_type(subject_id).await {
            Ok(user_type) => user_type,
            Err(e) => {
                warn!("Could not read user type for {}: {}", subject_id, e);
                UserType::Regular
            }
        };
        debug!("Routing {:?} message for {} ({})", message.origin, subject_id, user_type.as_str());

        match (message.origin, user_type.is_starred()) {
            (Origin::Operator, true) => {
                let chat = self.manager.resolve_or_create(subject_id).await;
                if chat.record(Message::assistant(message.text), true).await {
                    RouteOutcome::Recorded
                } else {
                    RouteOutcome::Dropped
                }
            }
            (Origin::Operator, false) => RouteOutcome::Ignored,
            (Origin::Counterparty, true) => {
                let chat = self.manager.resolve_or_create(subject_id).await;
                if chat.is_manual_override().await {
                    info!("Chat recorded for {}: {}", subject_id, message.text);
                    return if chat.record(Message::user(message.text), false).await {
                        RouteOutcome::Recorded
                    } else {
                        RouteOutcome::Dropped
                    };
                }
                if chat.enqueue(message.text, self.analyzer.clone(), reply_sink).await {
                    RouteOutcome::Queued
                } else {
                    RouteOutcome::Dropped
                }
            }
            (Origin::Counterparty, false) => {
                let chat = self.manager.resolve_or_create(subject_id).await;
                if chat.is_on_hold().await {
                    RouteOutcome::Ignored
                } else {
                    chat.mark_hold().await;
                    RouteOutcome::Reply(self.busy_notice.clone())
                }
            }
        }
    }
}
