//! Message types for channel communication.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Cli => "cli",
        }
    }
}

/// Unified inbound message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Chat the message came from; replies go here
    pub channel_id: String,
    /// Numeric or opaque user identifier
    pub user_id: String,
    /// Platform username, the identity checked by the access gate
    #[serde(default)]
    pub username: Option<String>,
    /// Message content
    pub content: MessageContent,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
}

/// Message content types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text message (commands included)
    Text { text: String },
    /// Photo message
    Image {
        attachment: Attachment,
        caption: Option<String>,
    },
    /// File/document message
    File {
        attachment: Attachment,
        caption: Option<String>,
    },
}

/// A file living on the platform side, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Channel-specific file reference (Telegram `file_id`, local path for CLI)
    pub file_ref: String,
    /// Original filename
    pub filename: Option<String>,
    /// MIME type
    pub mime_type: Option<String>,
    /// Size in bytes
    pub size_bytes: Option<u64>,
}

impl Attachment {
    /// Whether the platform labelled this file as an image.
    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("image/"))
    }

    /// File extension to stage the download under.
    pub fn extension(&self) -> &str {
        self.filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("jpg")
    }
}

/// Outgoing message to send to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target channel type
    pub channel_type: ChannelType,
    /// Target chat ID
    pub channel_id: String,
    /// Reply to message ID (optional)
    pub reply_to: Option<String>,
    /// Message content
    pub content: OutgoingContent,
}

/// Outgoing message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    /// Plain text
    Text { text: String },
    /// Local file uploaded as a downloadable document
    Document {
        path: PathBuf,
        filename: String,
        caption: Option<String>,
    },
    /// Local image uploaded as a photo
    Photo {
        path: PathBuf,
        caption: Option<String>,
    },
}

impl ChannelMessage {
    /// Get the text content if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Get the channel type as a string.
    pub fn channel_type_str(&self) -> &'static str {
        self.channel_type.as_str()
    }

    /// Build a reply addressed to the chat this message came from.
    pub fn reply(&self, content: OutgoingContent) -> OutgoingMessage {
        OutgoingMessage {
            channel_type: self.channel_type,
            channel_id: self.channel_id.clone(),
            reply_to: Some(self.id.clone()),
            content,
        }
    }

    /// Build a plain-text reply.
    pub fn reply_text(&self, text: impl Into<String>) -> OutgoingMessage {
        self.reply(OutgoingContent::Text { text: text.into() })
    }
}
