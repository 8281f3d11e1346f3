//! Response delivery.
//!
//! Short replies go inline. Replies over the platform's message limit are
//! staged into a temporary file and uploaded as a document; the staging
//! file is removed whether or not the upload succeeds.

use crate::message::{ChannelMessage, OutgoingContent};
use crate::traits::{Channel, ChannelError, ChannelResult};
use relay_common::config::{Config, DeliveryConfig};
use relay_common::util::format_bytes;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Placeholder for a blank assistant reply.
pub const EMPTY_RESPONSE: &str = "(empty response)";

/// Filename of oversized replies.
pub const RESPONSE_FILENAME: &str = "response.txt";

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

const MIB: u64 = 1024 * 1024;

/// Outcome of [`ResponseDelivery::deliver_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDelivery {
    Photo,
    Document,
    /// Over the size ceiling; only a rejection notice was sent.
    TooLarge,
}

/// Sends replies and files to a chat.
#[derive(Debug, Clone)]
pub struct ResponseDelivery {
    inline_limit: usize,
    max_file_bytes: u64,
    temp_dir: PathBuf,
}

impl ResponseDelivery {
    pub fn new(config: &DeliveryConfig, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            inline_limit: config.inline_limit,
            max_file_bytes: config.max_file_bytes,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.delivery, config.temp_dir())
    }

    /// Directory that staged files are created in.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Send `text` as a reply to `origin`.
    pub async fn deliver_text(&self, channel: &dyn Channel, origin: &ChannelMessage, text: &str) -> ChannelResult<()> {
        let text = if text.trim().is_empty() { EMPTY_RESPONSE } else { text };

        let chars = text.chars().count();
        if chars <= self.inline_limit {
            channel.send(origin.reply_text(text)).await?;
            return Ok(());
        }

        let staged = self.stage(text).map_err(|e| {
            ChannelError::SendFailed(format!("could not stage long response: {e}"))
        })?;
        tracing::debug!(chars, path = %staged.display(), "Response over inline limit, sending as file");

        let result = channel
            .send(origin.reply(OutgoingContent::Document {
                path: staged.to_path_buf(),
                filename: RESPONSE_FILENAME.to_string(),
                caption: Some(format!("Response was too long ({chars} chars), sent as file.")),
            }))
            .await;

        if let Err(e) = staged.close() {
            tracing::warn!(error = %e, "Failed to remove staged response");
        }

        result.map(|_| ())
    }

    fn stage(&self, text: &str) -> std::io::Result<tempfile::TempPath> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("response_")
            .suffix(".txt")
            .tempfile_in(&self.temp_dir)?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    /// Upload a local file to the chat of `origin`.
    ///
    /// Images go as photos, everything else as documents, followed by a
    /// `Sent: <name>` confirmation. Files over the size ceiling are refused
    /// with a notice before anything is uploaded.
    pub async fn deliver_file(&self, channel: &dyn Channel, origin: &ChannelMessage, path: &Path) -> ChannelResult<FileDelivery> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| ChannelError::SendFailed(format!("{}: {e}", path.display())))?
            .len();

        if size > self.max_file_bytes {
            tracing::info!(path = %path.display(), size = %format_bytes(size), "File over upload ceiling");
            channel
                .send(origin.reply_text(format!(
                    "File too large ({}MB). Upload limit is {}MB.",
                    size / MIB,
                    self.max_file_bytes / MIB
                )))
                .await?;
            return Ok(FileDelivery::TooLarge);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let kind = if is_image(path) {
            channel
                .send(origin.reply(OutgoingContent::Photo {
                    path: path.to_path_buf(),
                    caption: Some(name.clone()),
                }))
                .await?;
            FileDelivery::Photo
        } else {
            channel
                .send(origin.reply(OutgoingContent::Document {
                    path: path.to_path_buf(),
                    filename: name.clone(),
                    caption: None,
                }))
                .await?;
            FileDelivery::Document
        };

        channel.send(origin.reply_text(format!("Sent: {name}"))).await?;
        Ok(kind)
    }
}

/// Whether `path` has an image extension the platform renders as a photo.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
