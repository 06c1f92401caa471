//! Collaborator contracts consumed by the session core.
//!
//! The core never talks to a language model, a database or a chat platform
//! directly. Everything external comes in through one of these traits.

use async_trait::async_trait;
use tracing::warn;

use crate::error::{ChatError, ChatResult};
use crate::types::{FieldValue, Message, SessionInsights, UserField, UserType};

/// Read/write access to contact profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Read a field. `None` when the contact or the field is unknown.
    async fn get_field(&self, subject_id: &str, field: UserField) -> ChatResult<Option<FieldValue>>;

    /// Overwrite a field, creating the contact when needed.
    async fn set_field(&self, subject_id: &str, field: UserField, value: FieldValue) -> ChatResult<()>;

    /// Tags assigned to the contact (empty when unknown).
    async fn tags(&self, subject_id: &str) -> ChatResult<Vec<String>> {
        Ok(self
            .get_field(subject_id, UserField::Tags)
            .await?
            .map(FieldValue::into_list)
            .unwrap_or_default())
    }

    /// Memory entries recorded for the contact (empty when unknown).
    async fn memory(&self, subject_id: &str) -> ChatResult<Vec<String>> {
        Ok(self
            .get_field(subject_id, UserField::Memory)
            .await?
            .map(FieldValue::into_list)
            .unwrap_or_default())
    }

    async fn user_type(&self, subject_id: &str) -> ChatResult<UserType> {
        Ok(self
            .get_field(subject_id, UserField::UserType)
            .await?
            .map(|v| UserType::parse(&v.into_text()))
            .unwrap_or_default())
    }
}

/// Produces the assistant's next reply for a conversation.
#[async_trait]
pub trait ConversationAnalyzer: Send + Sync {
    async fn analyze(&self, history: &[Message]) -> ChatResult<String>;
}

/// Extracts memory and tags from a finished conversation.
#[async_trait]
pub trait SessionEndAnalyzer: Send + Sync {
    async fn summarize(
        &self,
        history: &[Message],
        existing_tags: &[String],
    ) -> ChatResult<SessionInsights>;
}

/// Where batched replies for a contact go.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn deliver(&self, reply: &str) -> ChatResult<()>;

    /// Called instead of `deliver` when the analyzer failed for this batch.
    async fn fail(&self, error: &ChatError) -> ChatResult<()> {
        warn!("Reply could not be generated: {}", error);
        Ok(())
    }
}

/// Receives the end-of-conversation summary once per finalized session.
#[async_trait]
pub trait TeardownNotifier: Send + Sync {
    async fn notify(&self, summary: &str) -> ChatResult<()>;
}
