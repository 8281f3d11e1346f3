//! Bridge between a channel's inbound queue and the message handler.
//!
//! Each message runs in its own task so a slow assistant call never blocks
//! commands. A failing or panicking task is reported to the sender and,
//! when configured, mirrored to the owner chat; the loop keeps running.

use crate::message::{ChannelMessage, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, MessageHandler};
use relay_common::util::char_prefix;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

const TRUNCATION_MARKER: &str = "\n\n... (truncated)";

/// Room kept for the report header when truncating.
const REPORT_HEADROOM: usize = 100;

/// Drives a [`MessageHandler`] from a channel.
pub struct RelayBridge {
    channel: Arc<dyn Channel>,
    handler: Arc<dyn MessageHandler>,
    owner_chat_id: Option<String>,
    message_limit: usize,
}

impl RelayBridge {
    pub fn new(channel: Arc<dyn Channel>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            channel,
            handler,
            owner_chat_id: None,
            message_limit: 4096,
        }
    }

    /// Mirror failures to this chat.
    pub fn with_owner(mut self, owner_chat_id: Option<String>) -> Self {
        self.owner_chat_id = owner_chat_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Longest text the channel accepts in one message.
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    /// Process one message to completion, reporting any failure.
    pub async fn process(&self, message: ChannelMessage) {
        let channel = self.channel.clone();
        let handler = self.handler.clone();
        let task_message = message.clone();

        let outcome = tokio::spawn(async move {
            handler.handle(channel.as_ref(), &task_message).await
        })
        .await;

        let (summary, detail) = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => (e.to_string(), format!("Error: {e:#}\n\n{e:?}")),
            Err(join) => {
                let summary = describe_join_error(join);
                let detail = format!("Error: {summary}");
                (summary, detail)
            }
        };

        tracing::error!(
            message_id = %message.id,
            channel_id = %message.channel_id,
            error = %summary,
            "Failed to process message"
        );
        self.report(&message, &summary, &detail).await;
    }

    async fn report(&self, origin: &ChannelMessage, summary: &str, detail: &str) {
        let apology = origin.reply_text(format!("Sorry, something went wrong: {summary}"));
        if let Err(e) = self.channel.send(apology).await {
            tracing::warn!(error = %e, "Failed to send error reply");
        }

        let Some(owner) = &self.owner_chat_id else {
            return;
        };
        let notice = OutgoingMessage {
            channel_type: origin.channel_type,
            channel_id: owner.clone(),
            reply_to: None,
            content: OutgoingContent::Text {
                text: owner_report(detail, self.message_limit),
            },
        };
        if let Err(e) = self.channel.send(notice).await {
            tracing::warn!(error = %e, "Failed to send error notification");
        }
    }

    /// Spawn the loop that reads `rx` until every sender is gone.
    ///
    /// The returned task finishes after all in-flight messages are done.
    pub fn spawn_processor(bridge: Arc<Self>, mut rx: mpsc::Receiver<ChannelMessage>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(channel = bridge.channel.name(), "Relay bridge processor started");
            let mut in_flight = JoinSet::new();

            loop {
                tokio::select! {
                    message = rx.recv() => {
                        let Some(message) = message else { break };
                        let bridge = bridge.clone();

                        // Process each message in its own task
                        in_flight.spawn(async move {
                            bridge.process(message).await;
                        });
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }

            while in_flight.join_next().await.is_some() {}
            tracing::info!("Relay bridge processor stopped");
        })
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".into();
    }
    let payload = err.into_panic();
    format!("panic: {}", panic_message(&*payload))
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Owner notification text, cut to fit one message of `limit` characters.
pub fn owner_report(detail: &str, limit: usize) -> String {
    let body = if detail.chars().count() > limit {
        let keep = limit.saturating_sub(REPORT_HEADROOM);
        format!("{}{TRUNCATION_MARKER}", char_prefix(detail, keep))
    } else {
        detail.to_string()
    };
    format!("Bot Error:\n{body}")
}
