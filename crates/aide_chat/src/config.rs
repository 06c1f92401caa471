//! Configuration for the assistant.
//!
//! Settings live in a TOML file with two sections:
//!
//! ```toml
//! [assistant]
//! description = "Personal assistant"
//! chat_lifespan_secs = 1800
//! tick_secs = 3
//! max_history = 10
//!
//! [llm]
//! provider = "openai"
//! chat_model = "gpt-4o-mini"
//! ```
//!
//! The file is looked up at an explicit path, then `$AIDE_CONFIG`, then
//! `./aide.toml`. Missing files fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ChatError, ChatResult};

/// Environment variable pointing at the config file
pub const CONFIG_ENV: &str = "AIDE_CONFIG";
/// Environment variable overriding the chat model
pub const MODEL_ENV: &str = "AIDE_LLM_MODEL";
/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "aide.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AideConfig {
    pub assistant: AssistantSettings,
    pub llm: LlmSettings,
}

/// Behaviour of the conversational sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssistantSettings {
    /// Persona text placed at the top of every session's system preamble
    pub description: String,
    /// Inactivity window after which a session is finalized
    pub chat_lifespan_secs: u64,
    /// Interval of the lifecycle monitor's drain tick
    pub tick_secs: u64,
    /// Number of most recent turns sent to the model
    pub max_history: usize,
    /// One-shot notice sent to contacts without automatic replies
    pub busy_notice: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            description: "Personal assistant".to_string(),
            chat_lifespan_secs: 1800,
            tick_secs: 3,
            max_history: 10,
            busy_notice: "I'm busy right now, I'll get back to you later.".to_string(),
        }
    }
}

/// Language model access
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmSettings {
    /// `openai` or `anthropic`; detected from available keys when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model used for conversational replies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,
    /// Model used for end-of-session summaries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruct_model: Option<String>,
    /// API key; environment variables take precedence
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Override for OpenAI-compatible endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl AideConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AideConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file and apply environment overrides.
    ///
    /// An explicit path must exist; the implicit locations are optional.
    pub fn resolve(explicit: Option<&Path>) -> ChatResult<Self> {
        let config = match Self::locate(explicit) {
            Some(path) => {
                info!("Using config file: {}", path.display());
                Self::load(&path)?
            }
            None if explicit.is_some() => {
                return Err(ChatError::Config(format!(
                    "config file not found: {}",
                    explicit.map(|p| p.display().to_string()).unwrap_or_default()
                )));
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        Ok(config.with_model_override(std::env::var(MODEL_ENV).ok()))
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return path.exists().then(|| path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    }

    /// Replace the chat model when an override is present and non-empty
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.llm.chat_model = Some(model);
        }
        self
    }

    /// Reject values the session core cannot work with
    pub fn validate(&self) -> ChatResult<()> {
        if self.assistant.chat_lifespan_secs == 0 {
            return Err(ChatError::Config("chat_lifespan_secs must be positive".to_string()));
        }
        if self.assistant.tick_secs == 0 {
            return Err(ChatError::Config("tick_secs must be positive".to_string()));
        }
        if let Some(provider) = &self.llm.provider {
            if !matches!(provider.as_str(), "openai" | "anthropic") {
                return Err(ChatError::Config(format!("unknown llm provider: {}", provider)));
            }
        }
        Ok(())
    }

    /// Render the effective configuration (API keys are never written)
    pub fn to_toml(&self) -> ChatResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(&self.assistant)
    }
}

/// Per-session parameters handed to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Persona text for the system preamble
    pub assistant_description: String,
    /// Inactivity window
    pub ttl: Duration,
    /// Monitor tick
    pub tick: Duration,
    /// Most recent turns included in a snapshot
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::from(&AssistantSettings::default())
    }
}

impl From<&AssistantSettings> for SessionConfig {
    fn from(settings: &AssistantSettings) -> Self {
        Self {
            assistant_description: settings.description.clone(),
            ttl: Duration::from_secs(settings.chat_lifespan_secs),
            tick: Duration::from_secs(settings.tick_secs),
            max_history: settings.max_history,
        }
    }
}

impl SessionConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.assistant_description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AideConfig::default();
        assert_eq!(config.assistant.chat_lifespan_secs, 1800);
        assert_eq!(config.assistant.tick_secs, 3);
        assert_eq!(config.assistant.max_history, 10);
        assert!(config.llm.provider.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("aide.toml");
        std::fs::write(
            &path,
            "[assistant]\nchat_lifespan_secs = 60\n\n[llm]\nprovider = \"anthropic\"\n",
        )
        .unwrap();

        let config = AideConfig::load(&path).unwrap();
        assert_eq!(config.assistant.chat_lifespan_secs, 60);
        assert_eq!(config.assistant.tick_secs, 3);
        assert_eq!(config.llm.provider.as_deref(), Some("anthropic"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("aide.toml");

        std::fs::write(&path, "[assistant]\ntick_secs = 0\n").unwrap();
        assert!(matches!(AideConfig::load(&path), Err(ChatError::Config(_))));

        std::fs::write(&path, "[llm]\nprovider = \"mystery\"\n").unwrap();
        assert!(matches!(AideConfig::load(&path), Err(ChatError::Config(_))));

        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(AideConfig::load(&path), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_resolve_missing_explicit_path() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(matches!(
            AideConfig::resolve(Some(&missing)),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn test_model_override() {
        let config = AideConfig::default().with_model_override(Some("gpt-4o".to_string()));
        assert_eq!(config.llm.chat_model.as_deref(), Some("gpt-4o"));

        let config = config.with_model_override(Some("  ".to_string()));
        assert_eq!(config.llm.chat_model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_to_toml_hides_api_key() {
        let mut config = AideConfig::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let rendered = config.to_toml().unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("chat_lifespan_secs"));
    }

    #[test]
    fn test_session_config() {
        let mut config = AideConfig::default();
        config.assistant.chat_lifespan_secs = 5;
        config.assistant.description = "Helper".to_string();

        let session = config.session_config();
        assert_eq!(session.ttl, Duration::from_secs(5));
        assert_eq!(session.tick, Duration::from_secs(3));
        assert_eq!(session.assistant_description, "Helper");

        let session = session.with_tick(Duration::from_millis(100)).with_max_history(2);
        assert_eq!(session.tick, Duration::from_millis(100));
        assert_eq!(session.max_history, 2);
    }
}
