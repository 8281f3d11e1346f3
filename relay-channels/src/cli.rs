//! CLI channel adapter for interactive terminal sessions.
//!
//! Reads prompts and commands from stdin as a single local user and prints
//! replies to stdout. Useful for trying the relay without a bot token.

use crate::message::{ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelResult};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Chat id of the terminal.
pub const CLI_CHAT_ID: &str = "cli";

/// CLI channel - stdin/stdout, always available.
pub struct CliChannel {
    username: String,
}

impl CliChannel {
    /// Create a CLI channel whose messages come from `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Turn one input line into a message. Blank lines yield `None`.
    fn parse_line(&self, line: &str) -> Option<ChannelMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        Some(ChannelMessage {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type: ChannelType::Cli,
            channel_id: CLI_CHAT_ID.to_string(),
            user_id: "local".to_string(),
            username: Some(self.username.clone()),
            content: MessageContent::Text {
                text: line.to_string(),
            },
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn render(content: &OutgoingContent) -> String {
        match content {
            OutgoingContent::Text { text } => text.clone(),
            OutgoingContent::Document { path, filename, caption } => {
                let body = std::fs::read(path)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_else(|e| format!("<unreadable: {e}>"));
                match caption {
                    Some(cap) => format!("[File: {filename}] {cap}\n{body}"),
                    None => format!("[File: {filename}]\n{body}"),
                }
            }
            OutgoingContent::Photo { path, caption } => match caption {
                Some(cap) => format!("[Image: {}] {cap}", path.display()),
                None => format!("[Image: {}]", path.display()),
            },
        }
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn init(&self) -> ChannelResult<()> {
        println!("Relay CLI ready. Type a prompt or /help; /quit to exit.");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        println!("{}", Self::render(&message.content));
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if matches!(line.trim(), "/quit" | "/exit") {
                break;
            }
            let Some(msg) = self.parse_line(&line) else {
                continue;
            };
            if tx.send(msg).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn send_typing(&self, _channel_id: &str) -> ChannelResult<()> {
        println!("...");
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}
