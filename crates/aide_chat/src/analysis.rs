//! LLM-backed analyzers.
//!
//! [`LlmConversationAnalyzer`] produces replies; [`LlmSessionEndAnalyzer`]
//! distills a finished conversation into memory and tags.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::llm::{LlmAdapter, ResponseFormat};
use crate::traits::{ConversationAnalyzer, SessionEndAnalyzer};
use crate::types::{Message, MessageRole, SessionInsights};

/// Replies with the chat model, sending the snapshot as-is
pub struct LlmConversationAnalyzer {
    adapter: LlmAdapter,
}

impl LlmConversationAnalyzer {
    pub fn new(adapter: LlmAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &LlmAdapter {
        &self.adapter
    }
}

#[async_trait]
impl ConversationAnalyzer for LlmConversationAnalyzer {
    async fn analyze(&self, history: &[Message]) -> ChatResult<String> {
        let response = self.adapter.complete(history, ResponseFormat::Text).await?;
        debug!(
            "Reply from {} ({} in / {} out tokens)",
            response.model, response.input_tokens, response.output_tokens
        );
        let reply = response.content.trim();
        if reply.is_empty() {
            return Err(ChatError::InvalidResponse("empty reply".to_string()));
        }
        Ok(reply.to_string())
    }
}

/// Extracts memory and tags at the end of a session
pub struct LlmSessionEndAnalyzer {
    adapter: LlmAdapter,
}

impl LlmSessionEndAnalyzer {
    pub fn new(adapter: LlmAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &LlmAdapter {
        &self.adapter
    }
}

#[async_trait]
impl SessionEndAnalyzer for LlmSessionEndAnalyzer {
    async fn summarize(
        &self,
        history: &[Message],
        existing_tags: &[String],
    ) -> ChatResult<SessionInsights> {
        let prompt = build_summary_prompt(history, existing_tags, &current_time());
        debug!("Session summary prompt:\n{}", prompt);
        let response = self
            .adapter
            .complete(&[Message::user(prompt)], ResponseFormat::JsonObject)
            .await?;
        parse_insights(&response.content)
    }
}

fn current_time() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S %A").to_string()
}

/// Prompt for the session-end analyzer. System turns are left out.
pub fn build_summary_prompt(history: &[Message], existing_tags: &[String], now: &str) -> String {
    let transcript = history
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "The current time is {now}. From the conversation below, extract what is important \
         to know about the person you talked with (the user). You are the assistant. Do not \
         add anything the conversation does not mention, but you may infer tags for the user.\n\n\
         Answer with a JSON object:\n\
         {{\n  \"memory\": a short summary of details that help understand the user better, \
         such as preferences or how they treat you; empty if there is nothing new,\n  \
         \"tags\": new tags describing who the user is, such as background or role; empty if \
         nothing new or already covered by the existing tags\n}}\n\n\
         Conversation:\n[[{transcript}]]\n"
    );
    if !existing_tags.is_empty() {
        prompt.push_str(&format!("Existing tags: [[{}]]\n", existing_tags.join(", ")));
    }
    prompt.push_str("Output:");
    prompt
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").ok())
        .as_ref()
}

/// Parse the session-end analyzer's answer.
///
/// Accepts a bare or fenced JSON object. `null` or an empty answer means
/// nothing was learned. `tags` may be a list or a single comma-separated
/// string.
pub fn parse_insights(text: &str) -> ChatResult<SessionInsights> {
    let body = match fence_pattern().and_then(|re| re.captures(text)) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => text.trim(),
    };
    if body.is_empty() {
        return Ok(SessionInsights::default());
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| ChatError::InvalidResponse(format!("not JSON: {}", e)))?;
    let object = match value {
        Value::Object(object) => object,
        Value::Null => return Ok(SessionInsights::default()),
        other => {
            return Err(ChatError::InvalidResponse(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
    };

    let memory = match object.get("memory") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    };

    let tags = match object.get("tags") {
        Some(Value::String(s)) => split_tags(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .flat_map(split_tags)
            .collect(),
        _ => Vec::new(),
    };

    Ok(SessionInsights { memory, tags })
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_skips_system_turns() {
        let history = vec![
            Message::system("persona"),
            Message::user("I just got back from Tokyo"),
            Message::assistant("How was it?"),
        ];
        let prompt = build_summary_prompt(&history, &[], "2024-05-01 10:00:00 Wednesday");

        assert!(prompt.starts_with("The current time is 2024-05-01 10:00:00 Wednesday."));
        assert!(prompt.contains("[[user: I just got back from Tokyo\nassistant: How was it?]]"));
        assert!(!prompt.contains("persona"));
        assert!(!prompt.contains("Existing tags"));
        assert!(prompt.ends_with("Output:"));
    }

    #[test]
    fn test_prompt_lists_existing_tags() {
        let tags = vec!["investor".to_string(), "golfer".to_string()];
        let prompt = build_summary_prompt(&[Message::user("hi")], &tags, "now");
        assert!(prompt.contains("Existing tags: [[investor, golfer]]"));
    }

    #[test]
    fn test_parse_plain_object() {
        let insights =
            parse_insights(r#"{"memory": "likes golf", "tags": ["golfer", "investor"]}"#).unwrap();
        assert_eq!(insights.memory, "likes golf");
        assert_eq!(insights.tags, vec!["golfer".to_string(), "investor".to_string()]);
    }

    #[test]
    fn test_parse_fenced_object() {
        let text = "```json\n{\"memory\": \"\", \"tags\": \"AI investor, founder\"}\n```";
        let insights = parse_insights(text).unwrap();
        assert!(insights.memory.is_empty());
        assert_eq!(insights.tags, vec!["AI investor".to_string(), "founder".to_string()]);
    }

    #[test]
    fn test_parse_nothing_learned() {
        assert!(parse_insights("null").unwrap().is_empty());
        assert!(parse_insights("   ").unwrap().is_empty());
        assert!(parse_insights(r#"{"memory": null, "tags": null}"#).unwrap().is_empty());
        assert!(parse_insights("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_list_entries_with_commas() {
        let insights = parse_insights(r#"{"tags": ["a, b", " ", "c"], "memory": ["x", "y"]}"#).unwrap();
        assert_eq!(insights.tags, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(insights.memory, "x; y");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_insights("I could not find anything"),
            Err(ChatError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_insights("[1, 2]"),
            Err(ChatError::InvalidResponse(_))
        ));
    }
}
