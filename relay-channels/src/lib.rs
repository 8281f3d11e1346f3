//! Relay Channels - chat front-ends for a command-line assistant.
//!
//! Messages arriving on a channel (Telegram or the local terminal) are
//! forwarded to an assistant CLI that runs in a chosen working directory and
//! keeps its conversation across messages. Replies come back through the
//! same channel.
//!
//! ## Architecture
//!
//! ```text
//! User IM → channel.listen → RelayBridge → Dispatcher → Conversation → CliInvoker
//!                                              ↓
//! User ←──── channel.send ←── ResponseDelivery ← response
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod access;
pub mod bridge;
pub mod cli;
pub mod delivery;
pub mod dispatcher;
pub mod intent;
pub mod invoker;
pub mod message;
pub mod scope;
pub mod session;
pub mod telegram;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use access::AccessGate;
pub use bridge::RelayBridge;
pub use cli::CliChannel;
pub use delivery::{FileDelivery, ResponseDelivery};
pub use dispatcher::Dispatcher;
pub use intent::Intent;
pub use invoker::{AssistantInvoker, CliInvoker, InvocationError, InvocationRequest};
pub use message::{Attachment, ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage};
pub use scope::{ScopeError, ScopeResolver};
pub use session::{Conversation, SessionRef, SessionState, SessionStore};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult, MessageHandler};

use anyhow::Context;
use relay_common::config::{ChannelKind, Config};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Name the CLI channel's local user goes by when no username is configured.
const LOCAL_USERNAME: &str = "local";

/// Build the front-end selected by the configuration.
///
/// Also returns the username the access gate should admit.
pub fn build_channel(config: &Config) -> anyhow::Result<(Arc<dyn Channel>, Option<String>)> {
    let allowed = config.telegram.allowed_username.clone();
    match config.channel {
        ChannelKind::Telegram => {
            let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::from_config(&config.telegram)?);
            Ok((channel, allowed))
        }
        ChannelKind::Cli => {
            let username = allowed.unwrap_or_else(|| LOCAL_USERNAME.to_string());
            let channel: Arc<dyn Channel> = Arc::new(CliChannel::new(username.clone()));
            Ok((channel, Some(username)))
        }
    }
}

/// Wire the core together and build a dispatcher for `config`.
pub fn build_dispatcher(config: &Config, allowed_username: Option<&str>) -> Dispatcher {
    let store = SessionStore::new(config.session_file(), config.default_scope());
    let invoker: Arc<dyn AssistantInvoker> = Arc::new(CliInvoker::new(config.assistant.clone()));
    let conversation = Arc::new(Conversation::open(store, invoker));

    Dispatcher::new(
        conversation,
        AccessGate::new(allowed_username),
        ScopeResolver::from_config(config),
        ResponseDelivery::from_config(config),
    )
}

/// Run the relay until the channel stops listening.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let (channel, allowed) = build_channel(config)?;
    let dispatcher = build_dispatcher(config, allowed.as_deref());

    if !AccessGate::new(allowed.as_deref()).is_configured() {
        tracing::warn!("No allowed username configured; every message will be ignored");
    }

    channel
        .init()
        .await
        .with_context(|| format!("initializing {} channel", channel.name()))?;

    let bridge = Arc::new(
        RelayBridge::new(channel.clone(), Arc::new(dispatcher))
            .with_owner(config.telegram.owner_chat_id.clone())
            .with_message_limit(config.delivery.inline_limit),
    );

    let (tx, rx) = mpsc::channel(100);
    let processor = RelayBridge::spawn_processor(bridge, rx);

    tracing::info!(
        channel = channel.name(),
        allowed = allowed.as_deref().unwrap_or("<none>"),
        "Relay started"
    );

    let listened = channel.listen(tx).await;

    // The processor ends once the sender is dropped and queued messages are handed off.
    if let Err(e) = processor.await {
        tracing::warn!(error = %e, "Bridge processor ended abnormally");
    }
    channel.shutdown().await?;

    listened.context("channel listener failed")
}
