//! Core types for the chat system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the counterparty a session belongs to
pub type SubjectId = String;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Assistant,
    User,
}

impl MessageRole {
    /// Wire name used by chat-completion APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }
}

/// A single chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (UUID)
    pub id: String,
    /// Role of the message sender
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was created
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }
}

/// Conversation phase of a session.
///
/// Every session starts in `Function` mode and moves to `Conversational`
/// as soon as the first turn is recorded. It never moves back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Function,
    Conversational,
}

/// How the operator classified a contact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Regular,
    Star,
    Owner,
}

impl UserType {
    /// Parse the stored representation, falling back to `Regular`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => Self::Owner,
            "star" => Self::Star,
            _ => Self::Regular,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Star => "star",
            Self::Owner => "owner",
        }
    }

    /// Contacts that get automatic conversational replies
    pub fn is_starred(&self) -> bool {
        matches!(self, Self::Star | Self::Owner)
    }
}

/// Fields of a user profile addressable through the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Email,
    UserType,
    Memory,
    Tags,
}

impl UserField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::UserType => "user_type",
            Self::Memory => "memory",
            Self::Tags => "tags",
        }
    }
}

/// Value of a user profile field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Interpret the value as a list. A text value becomes a one-element list
    /// unless it is blank.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::List(items) => items,
            Self::Text(text) if text.trim().is_empty() => Vec::new(),
            Self::Text(text) => vec![text],
        }
    }

    /// Interpret the value as text. Lists are joined with `", "`.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::List(items) => items.join(", "),
        }
    }
}

/// Stored profile of a contact
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "userType")]
    pub user_type: UserType,
    #[serde(default)]
    pub memory: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl UserProfile {
    /// Read a single field
    pub fn field(&self, field: UserField) -> FieldValue {
        match field {
            UserField::Email => FieldValue::Text(self.email.clone()),
            UserField::UserType => FieldValue::Text(self.user_type.as_str().to_string()),
            UserField::Memory => FieldValue::List(self.memory.clone()),
            UserField::Tags => FieldValue::List(self.tags.clone()),
        }
    }

    /// Overwrite a single field
    pub fn set_field(&mut self, field: UserField, value: FieldValue) {
        match field {
            UserField::Email => self.email = value.into_text(),
            UserField::UserType => self.user_type = UserType::parse(&value.into_text()),
            UserField::Memory => self.memory = value.into_list(),
            UserField::Tags => self.tags = value.into_list(),
        }
    }
}

/// What the session-end analyzer extracted from a finished conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInsights {
    /// Short note worth remembering about the contact (may be empty)
    #[serde(default)]
    pub memory: String,
    /// New tags describing the contact (may be empty)
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SessionInsights {
    pub fn is_empty(&self) -> bool {
        self.memory.trim().is_empty() && self.tags.is_empty()
    }
}
