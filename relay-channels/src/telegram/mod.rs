//! Telegram channel adapter.
//!
//! Provides the `TelegramChannel` implementation for receiving and sending messages
//! through the Telegram Bot API, using long polling.

use crate::message::{Attachment, ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Telegram Bot API channel.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
    poll_timeout_secs: u64,
    drop_pending_updates: bool,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
            poll_timeout_secs: 30,
            drop_pending_updates: true,
        }
    }

    /// Create a channel from the `telegram` config section.
    pub fn from_config(config: &relay_common::config::TelegramConfig) -> ChannelResult<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ChannelError::Auth("TELEGRAM_BOT_TOKEN is not set".into()))?;
        Ok(Self::new(token)
            .with_poll_timeout(config.poll_timeout_secs)
            .with_drop_pending_updates(config.drop_pending_updates))
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    pub fn with_drop_pending_updates(mut self, drop: bool) -> Self {
        self.drop_pending_updates = drop;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    /// POST a JSON body and return the `result` field of a successful reply.
    async fn call(&self, method: &str, body: &Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await?;
        Self::read_result(method, resp).await
    }

    async fn read_result(method: &str, resp: reqwest::Response) -> anyhow::Result<Value> {
        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram {method} failed ({status}): {err}");
        }

        let mut data: Value = resp.json().await?;
        if data.get("ok").and_then(Value::as_bool) == Some(false) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("Telegram {method} failed: {description}");
        }
        Ok(data.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    async fn send_file(
        &self,
        method: &str,
        field: &str,
        chat_id: &str,
        path: &Path,
        filename: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<Value> {
        let file_bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(file_bytes).file_name(filename.to_string());

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field.to_string(), part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await?;
        let result = Self::read_result(method, resp).await?;

        tracing::info!(chat_id = %chat_id, file = %filename, method, "Telegram file sent");
        Ok(result)
    }

    async fn fetch_file(&self, file_id: &str, dest: &Path) -> anyhow::Result<u64> {
        let result = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let file_path = result
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing file_path in getFile response"))?;

        let mut resp = self.client.get(self.file_url(file_path)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Failed to download file from Telegram: {}", resp.status());
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn poll_updates(&self, offset: i64) -> anyhow::Result<Vec<Value>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"]
        });

        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .json(&body)
            .send()
            .await?;

        match Self::read_result("getUpdates", resp).await? {
            Value::Array(updates) => Ok(updates),
            other => anyhow::bail!("Unexpected getUpdates result: {other}"),
        }
    }
}

fn message_id(result: &Value) -> String {
    result
        .get("message_id")
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

/// Turn one `getUpdates` entry into a [`ChannelMessage`].
///
/// Returns `None` for updates that carry nothing the relay handles.
pub fn parse_update(update: &Value) -> Option<ChannelMessage> {
    let message = update.get("message")?;

    let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();
    let from = message.get("from");
    let username = from.and_then(|f| str_field(f, "username"));
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();
    let caption = str_field(message, "caption");

    let (content, message_type) = if let Some(text) = message.get("text").and_then(Value::as_str) {
        (MessageContent::Text { text: text.to_string() }, "text")
    } else if let Some(photos) = message.get("photo").and_then(Value::as_array) {
        // Sizes are listed smallest first.
        let largest = photos.last()?;
        let attachment = Attachment {
            file_ref: str_field(largest, "file_id")?,
            filename: None,
            mime_type: Some("image/jpeg".into()),
            size_bytes: largest.get("file_size").and_then(Value::as_u64),
        };
        (MessageContent::Image { attachment, caption }, "photo")
    } else if let Some(doc) = message.get("document") {
        let attachment = Attachment {
            file_ref: str_field(doc, "file_id")?,
            filename: str_field(doc, "file_name"),
            mime_type: str_field(doc, "mime_type"),
            size_bytes: doc.get("file_size").and_then(Value::as_u64),
        };
        (MessageContent::File { attachment, caption }, "document")
    } else {
        return None;
    };

    tracing::info!(
        channel = "telegram",
        user_id = %user_id,
        chat_id = %chat_id,
        message_type,
        "IM message received"
    );

    Some(ChannelMessage {
        id: message_id(message),
        channel_type: ChannelType::Telegram,
        channel_id: chat_id,
        user_id,
        username,
        content,
        timestamp: message
            .get("date")
            .and_then(Value::as_i64)
            .map(|secs| secs * 1000)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    })
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&self) -> ChannelResult<()> {
        // Verify bot token by calling getMe
        let me = self
            .call("getMe", &serde_json::json!({}))
            .await
            .map_err(|e| ChannelError::Auth(format!("Invalid bot token: {e}")))?;

        // Polling does not work while a webhook is registered.
        self.call(
            "deleteWebhook",
            &serde_json::json!({ "drop_pending_updates": self.drop_pending_updates }),
        )
        .await
        .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let username = me.get("username").and_then(Value::as_str).unwrap_or("unknown");
        tracing::info!(
            bot = %username,
            drop_pending_updates = self.drop_pending_updates,
            "Telegram channel initialized"
        );
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let chat_id = message.channel_id.as_str();
        let result = match &message.content {
            OutgoingContent::Text { text } => {
                self.call("sendMessage", &serde_json::json!({ "chat_id": chat_id, "text": text }))
                    .await
            }
            OutgoingContent::Document { path, filename, caption } => {
                self.send_file("sendDocument", "document", chat_id, path, filename, caption.as_deref())
                    .await
            }
            OutgoingContent::Photo { path, caption } => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "photo.jpg".into());
                self.send_file("sendPhoto", "photo", chat_id, path, &filename, caption.as_deref())
                    .await
            }
        }
        .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        Ok(message_id(&result))
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let mut offset: i64 = 0;
        let mut backoff = INITIAL_BACKOFF;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let updates = match self.poll_updates(offset).await {
                Ok(updates) => {
                    backoff = INITIAL_BACKOFF;
                    updates
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in_secs = backoff.as_secs(), "Telegram poll error");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            for update in &updates {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(uid + 1);
                }

                let Some(msg) = parse_update(update) else {
                    continue;
                };

                if tx.send(msg).await.is_err() {
                    tracing::info!("Message receiver closed, Telegram listener stopping");
                    return Ok(());
                }
            }
        }
    }

    async fn download(&self, attachment: &Attachment, dest: &Path) -> ChannelResult<()> {
        let bytes = self
            .fetch_file(&attachment.file_ref, dest)
            .await
            .map_err(|e| ChannelError::DownloadFailed(e.to_string()))?;
        tracing::debug!(file_id = %attachment.file_ref, bytes, "Telegram file downloaded");
        Ok(())
    }

    async fn send_typing(&self, channel_id: &str) -> ChannelResult<()> {
        self.call(
            "sendChatAction",
            &serde_json::json!({ "chat_id": channel_id, "action": "typing" }),
        )
        .await
        .map(|_| ())
        .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}
