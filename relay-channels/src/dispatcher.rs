//! Intent dispatch.
//!
//! Gates each inbound message, turns it into an [`Intent`] and carries it out
//! against the [`Conversation`], answering through the originating channel.

use crate::access::AccessGate;
use crate::delivery::ResponseDelivery;
use crate::intent::Intent;
use crate::invoker::InvocationError;
use crate::message::{Attachment, ChannelMessage};
use crate::scope::ScopeResolver;
use crate::session::{Conversation, SessionRef};
use crate::traits::{Channel, MessageHandler};
use anyhow::Context;
use async_trait::async_trait;
use relay_common::util::truncate_with_ellipsis;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reply to an unauthorized `/start`.
pub const UNAUTHORIZED_REPLY: &str = "Sorry, you are not authorized to use this bot.";

/// Routes intents to the conversation.
pub struct Dispatcher {
    conversation: Arc<Conversation>,
    gate: AccessGate,
    scopes: ScopeResolver,
    delivery: ResponseDelivery,
}

impl Dispatcher {
    pub fn new(
        conversation: Arc<Conversation>,
        gate: AccessGate,
        scopes: ScopeResolver,
        delivery: ResponseDelivery,
    ) -> Self {
        Self {
            conversation,
            gate,
            scopes,
            delivery,
        }
    }

    /// Handle one inbound message.
    ///
    /// Assistant failures are answered as text. An `Err` means a reply could
    /// not be produced or sent at all.
    pub async fn handle(&self, channel: &dyn Channel, message: &ChannelMessage) -> anyhow::Result<()> {
        let intent = Intent::parse(message);

        if intent.requires_authorization() && !self.gate.is_authorized(message.username.as_deref()) {
            tracing::warn!(
                user_id = %message.user_id,
                username = ?message.username,
                "Ignoring message from unauthorized user"
            );
            if intent == Intent::Start {
                channel.send(message.reply_text(UNAUTHORIZED_REPLY)).await?;
            }
            return Ok(());
        }

        match intent {
            Intent::Start => self.reply(channel, message, self.start_text()).await,
            Intent::Clear => {
                self.conversation.clear().await?;
                self.reply(
                    channel,
                    message,
                    "Session cleared. Next message will start a fresh conversation.".into(),
                )
                .await
            }
            Intent::Resume(token) => {
                let state = self.conversation.resume(token).await?;
                let text = match state.session {
                    SessionRef::Explicit(token) => format!("Resuming session: {token}"),
                    _ => "Resuming last session. Use /clear to start fresh.".into(),
                };
                self.reply(channel, message, text).await
            }
            Intent::Scope(None) => self.reply(channel, message, self.scope_help()).await,
            Intent::Scope(Some(arg)) => {
                let text = match self.conversation.set_scope(&self.scopes, &arg).await {
                    Ok(scope) => format!("Scope set to: {}\nSession reset for new scope.", scope.display()),
                    Err(e) => format!("Error: {e}"),
                };
                self.reply(channel, message, text).await
            }
            Intent::Status => {
                let state = self.conversation.snapshot();
                let text = format!(
                    "Status:\n- Scope: {}\n- Session: {}",
                    state.scope.display(),
                    state.session
                );
                self.reply(channel, message, text).await
            }
            Intent::Send(None) => {
                self.reply(
                    channel,
                    message,
                    "Usage: /send <file_path>\n\nExample: /send ~/report.pdf".into(),
                )
                .await
            }
            Intent::Send(Some(arg)) => self.send_file(channel, message, &arg).await,
            Intent::MyId => self.reply(channel, message, my_id_text(message)).await,
            Intent::Prompt(prompt) => self.prompt(channel, message, &prompt, None).await,
            Intent::ImagePrompt { attachment, prompt } => {
                self.image_prompt(channel, message, &attachment, &prompt).await
            }
            Intent::Unknown(command) => {
                tracing::debug!(command = %command, "Ignoring unknown command");
                Ok(())
            }
        }
    }

    async fn reply(&self, channel: &dyn Channel, message: &ChannelMessage, text: String) -> anyhow::Result<()> {
        channel.send(message.reply_text(text)).await?;
        Ok(())
    }

    fn start_text(&self) -> String {
        format!(
            "Connected to the assistant.\n\n\
             Current scope: {}\n\n\
             Commands:\n\
             /clear - start fresh session\n\
             /resume [id] - continue last or given session\n\
             /scope <path> - set working directory\n\
             /send <file> - send file/photo to you\n\
             /status - show current settings\n\
             /myid - get your chat ID",
            self.conversation.snapshot().scope.display()
        )
    }

    fn scope_help(&self) -> String {
        let presets: Vec<String> = self
            .scopes
            .presets()
            .iter()
            .map(|(name, path)| format!("  {name} -> {}", path.display()))
            .collect();
        format!(
            "Current scope: {}\n\n\
             Usage: /scope <path or preset>\n\n\
             Presets:\n{}\n  new -> create new empty folder in {}",
            self.conversation.snapshot().scope.display(),
            presets.join("\n"),
            self.scopes.project_root().display()
        )
    }

    async fn send_file(&self, channel: &dyn Channel, message: &ChannelMessage, arg: &str) -> anyhow::Result<()> {
        let expanded = PathBuf::from(shellexpand::tilde(arg).into_owned());
        let path = if expanded.is_relative() {
            self.conversation.snapshot().scope.join(expanded)
        } else {
            expanded
        };

        if !path.exists() {
            return self
                .reply(channel, message, format!("File not found: {}", path.display()))
                .await;
        }
        if !path.is_file() {
            return self
                .reply(channel, message, format!("Not a file: {}", path.display()))
                .await;
        }

        if let Err(e) = self.delivery.deliver_file(channel, message, &path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to send file");
            self.reply(channel, message, format!("Error sending file: {e}")).await?;
        }
        Ok(())
    }

    async fn image_prompt(
        &self,
        channel: &dyn Channel,
        message: &ChannelMessage,
        attachment: &Attachment,
        prompt: &str,
    ) -> anyhow::Result<()> {
        let dir = self.delivery.temp_dir();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        // Removed when dropped, on every exit path.
        let staged = tempfile::Builder::new()
            .prefix("image_")
            .suffix(&format!(".{}", attachment.extension()))
            .tempfile_in(dir)
            .context("staging image")?
            .into_temp_path();

        channel
            .download(attachment, &staged)
            .await
            .context("downloading image")?;
        tracing::debug!(path = %staged.display(), "Image staged");

        self.prompt(channel, message, prompt, Some(&*staged)).await
    }

    async fn prompt(
        &self,
        channel: &dyn Channel,
        message: &ChannelMessage,
        prompt: &str,
        attachment: Option<&Path>,
    ) -> anyhow::Result<()> {
        tracing::info!(
            chat = %message.channel_id,
            image = attachment.is_some(),
            preview = %truncate_with_ellipsis(prompt, 100),
            "Forwarding prompt"
        );

        if let Err(e) = channel.send_typing(&message.channel_id).await {
            tracing::debug!(error = %e, "Typing indicator failed");
        }

        let text = match self.conversation.ask(prompt, attachment).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Assistant invocation failed");
                render_error(&e)
            }
        };

        self.delivery.deliver_text(channel, message, &text).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, channel: &dyn Channel, message: &ChannelMessage) -> anyhow::Result<()> {
        Dispatcher::handle(self, channel, message).await
    }
}

/// User-facing text for an invocation failure.
pub fn render_error(error: &InvocationError) -> String {
    match error {
        InvocationError::NotFound { .. } => format!("Error: {error}"),
        _ => format!("Error calling the assistant: {error}"),
    }
}

fn my_id_text(message: &ChannelMessage) -> String {
    let username = message
        .username
        .as_deref()
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "(none)".into());
    format!(
        "Your info:\n\
         - Chat ID: {chat}\n\
         - User ID: {user}\n\
         - Username: {username}\n\n\
         Add this to .env for error notifications:\n\
         OWNER_CHAT_ID={chat}",
        chat = message.channel_id,
        user = message.user_id,
    )
}
