//! Channel traits for implementing channel adapters.

use crate::message::{Attachment, ChannelMessage, OutgoingMessage};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Channel not ready")]
    NotReady,
}

/// Channel adapter trait.
///
/// A channel turns platform events into [`ChannelMessage`]s and carries
/// [`OutgoingMessage`]s back. It is object safe so the dispatcher can hold
/// any front-end behind `Arc<dyn Channel>`.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Initialize the channel (connect, authenticate, etc.).
    async fn init(&self) -> ChannelResult<()>;

    /// Send a message to the channel, returning a platform message id.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Listen for incoming messages and forward them to `tx`.
    ///
    /// Returns when the source is exhausted or the receiver is dropped.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()>;

    /// Fetch an inbound attachment into `dest`.
    async fn download(&self, attachment: &Attachment, dest: &Path) -> ChannelResult<()> {
        let _ = dest;
        Err(ChannelError::InvalidMessage(format!(
            "{} does not support attachments ({})",
            self.name(),
            attachment.file_ref
        )))
    }

    /// Show a "typing" indicator in the given chat.
    async fn send_typing(&self, channel_id: &str) -> ChannelResult<()> {
        let _ = channel_id;
        Ok(())
    }

    /// Shutdown the channel gracefully.
    async fn shutdown(&self) -> ChannelResult<()>;
}

/// Processes one incoming message, replying through `channel`.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message.
    async fn handle(&self, channel: &dyn Channel, message: &ChannelMessage) -> anyhow::Result<()>;
}
