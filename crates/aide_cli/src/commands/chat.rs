//! Chat command - Talk to the assistant as one contact.
//!
//! Each stdin line is a message from the contact. A line starting with `/op`
//! is typed by the operator instead, and `/quit` ends the input.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use aide_chat::{
    AideConfig, ChatError, ChatManager, ChatResult, InMemoryUserStore, InboundMessage, LlmAdapter,
    LlmConversationAnalyzer, LlmSessionEndAnalyzer, ReplySink, RouteOutcome, Router,
    TeardownNotifier, UserProfile, UserType,
};

#[derive(Args)]
pub struct ChatArgs {
    /// Identifier of the contact you are playing
    #[arg(short, long)]
    pub subject: String,

    /// Contact type: star, owner or regular
    #[arg(long, default_value = "star")]
    pub user_type: String,

    /// Tag already known for the contact (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Override the inactivity window, in seconds
    #[arg(long)]
    pub lifespan: Option<u64>,

    /// Exit at end of input instead of waiting for the session summary
    #[arg(long)]
    pub no_wait: bool,
}

/// One parsed stdin line
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Contact(String),
    Operator(String),
    Quit,
    Blank,
}

fn parse_line(raw: &str) -> Line {
    let line = raw.trim();
    if line.is_empty() {
        Line::Blank
    } else if line == "/quit" {
        Line::Quit
    } else if let Some(rest) = line
        .strip_prefix("/op")
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        match rest.trim() {
            "" => Line::Blank,
            text => Line::Operator(text.to_string()),
        }
    } else {
        Line::Contact(line.to_string())
    }
}

/// Prints replies and teardown summaries to stdout
struct Console {
    subject: String,
}

impl Console {
    fn emit(&self, line: &str) -> ChatResult<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)
            .and_then(|_| stdout.flush())
            .map_err(|e| ChatError::Delivery(format!("stdout for {}: {}", self.subject, e)))
    }
}

#[async_trait]
impl ReplySink for Console {
    async fn deliver(&self, reply: &str) -> ChatResult<()> {
        self.emit(&format!("[aide → {}] {}", self.subject, reply))
    }

    async fn fail(&self, error: &ChatError) -> ChatResult<()> {
        eprintln!("[aide] could not answer {}: {}", self.subject, error);
        Ok(())
    }
}

#[async_trait]
impl TeardownNotifier for Console {
    async fn notify(&self, summary: &str) -> ChatResult<()> {
        self.emit(&format!("[summary] {}", summary))
    }
}

pub async fn execute(args: ChatArgs, mut config: AideConfig) -> Result<()> {
    if let Some(secs) = args.lifespan {
        config.assistant.chat_lifespan_secs = secs;
    }
    config.validate()?;

    let adapter = LlmAdapter::from_config(&config.llm)
        .context("the chat command needs a language model")?;
    let instruct = match &config.llm.instruct_model {
        Some(model) => adapter.clone().with_model(model.clone()),
        None => adapter.clone(),
    };
    info!("Using {:?} model {} for replies", adapter.provider(), adapter.model());

    let store = Arc::new(InMemoryUserStore::new());
    store
        .upsert(
            args.subject.clone(),
            UserProfile {
                user_type: UserType::parse(&args.user_type),
                tags: args.tags.clone(),
                ..UserProfile::default()
            },
        )
        .await;

    let console = Arc::new(Console {
        subject: args.subject.clone(),
    });
    let manager = ChatManager::new(
        config.session_config(),
        store,
        Arc::new(LlmSessionEndAnalyzer::new(instruct)),
        Some(console.clone()),
    );
    let router = Router::new(
        manager.clone(),
        Arc::new(LlmConversationAnalyzer::new(adapter)),
        config.assistant.busy_notice.clone(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(raw) = lines.next_line().await? {
        let message = match parse_line(&raw) {
            Line::Blank => continue,
            Line::Quit => break,
            Line::Contact(text) => InboundMessage::from_counterparty(args.subject.as_str(), text),
            Line::Operator(text) => InboundMessage::from_operator(args.subject.as_str(), text),
        };

        match router.route(message, console.clone()).await {
            RouteOutcome::Reply(text) => println!("[aide → {}] {}", args.subject, text),
            RouteOutcome::Dropped => warn!("Session for {} expired, message dropped", args.subject),
            outcome => debug!("Routed: {:?}", outcome),
        }
    }

    if args.no_wait {
        return Ok(());
    }

    info!("End of input, waiting for the session to wind down");
    let tick = manager.config().tick.max(Duration::from_millis(100));
    while manager.stats().await.monitors > 0 {
        tokio::time::sleep(tick).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  hello there "), Line::Contact("hello there".to_string()));
        assert_eq!(parse_line("/op I'll take it"), Line::Operator("I'll take it".to_string()));
        assert_eq!(parse_line("/op   "), Line::Blank);
        assert_eq!(parse_line("/quit"), Line::Quit);
        assert_eq!(parse_line("/opera tonight?"), Line::Contact("/opera tonight?".to_string()));
        assert_eq!(parse_line(""), Line::Blank);
    }
}
