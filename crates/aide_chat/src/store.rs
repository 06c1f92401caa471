//! In-memory user profile store.
//!
//! Used by the CLI and the tests. Durable storage belongs to whatever
//! embeds the core and only has to implement [`UserStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ChatResult;
use crate::traits::UserStore;
use crate::types::{FieldValue, SubjectId, UserField, UserProfile};

#[derive(Default)]
pub struct InMemoryUserStore {
    profiles: RwLock<HashMap<SubjectId, UserProfile>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole profile
    pub async fn upsert(&self, subject_id: impl Into<SubjectId>, profile: UserProfile) {
        let subject_id = subject_id.into();
        debug!("Storing profile for {}", subject_id);
        self.profiles.write().await.insert(subject_id, profile);
    }

    pub async fn profile(&self, subject_id: &str) -> Option<UserProfile> {
        self.profiles.read().await.get(subject_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_field(&self, subject_id: &str, field: UserField) -> ChatResult<Option<FieldValue>> {
        Ok(self
            .profiles
            .read()
            .await
            .get(subject_id)
            .map(|profile| profile.field(field)))
    }

    async fn set_field(&self, subject_id: &str, field: UserField, value: FieldValue) -> ChatResult<()> {
        debug!("Setting {} for {}", field.as_str(), subject_id);
        self.profiles
            .write()
            .await
            .entry(subject_id.to_string())
            .or_default()
            .set_field(field, value);
        Ok(())
    }
}
