//! Inbound message classification.

use crate::message::{Attachment, ChannelMessage, MessageContent};

/// Prompt for an image sent without a caption.
pub const DEFAULT_IMAGE_PROMPT: &str = "What's in this image?";

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// `/start` or `/help`
    Start,
    /// `/clear`
    Clear,
    /// `/resume [token]`
    Resume(Option<String>),
    /// `/scope [arg]`
    Scope(Option<String>),
    /// `/status`
    Status,
    /// `/send <path>`
    Send(Option<String>),
    /// `/myid`
    MyId,
    /// Free text to forward to the assistant
    Prompt(String),
    /// Image to stage and forward along with a prompt
    ImagePrompt { attachment: Attachment, prompt: String },
    /// An unrecognized `/command`
    Unknown(String),
}

impl Intent {
    /// Classify `message`.
    pub fn parse(message: &ChannelMessage) -> Self {
        match &message.content {
            MessageContent::Text { text } => Self::parse_text(text),
            MessageContent::Image { attachment, caption } => Self::ImagePrompt {
                attachment: attachment.clone(),
                prompt: caption_or(caption, DEFAULT_IMAGE_PROMPT.to_string()),
            },
            MessageContent::File { attachment, caption } if attachment.is_image() => Self::ImagePrompt {
                attachment: attachment.clone(),
                prompt: caption_or(caption, DEFAULT_IMAGE_PROMPT.to_string()),
            },
            MessageContent::File { attachment, caption } => {
                let name = attachment.filename.as_deref().unwrap_or("unnamed");
                Self::Prompt(caption_or(caption, format!("Received file: {name}")))
            }
        }
    }

    /// Classify a text message. Commands accept a `@botname` suffix.
    pub fn parse_text(text: &str) -> Self {
        let Some(rest) = text.trim_start().strip_prefix('/') else {
            return Self::Prompt(text.to_string());
        };

        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let command = head.split('@').next().unwrap_or(head).to_lowercase();
        let args = (!args.is_empty()).then(|| args.to_string());

        match command.as_str() {
            "start" | "help" => Self::Start,
            "clear" => Self::Clear,
            "resume" => Self::Resume(args.and_then(|a| a.split_whitespace().next().map(String::from))),
            "scope" => Self::Scope(args),
            "status" => Self::Status,
            "send" => Self::Send(args),
            "myid" => Self::MyId,
            _ => Self::Unknown(command),
        }
    }

    /// Whether handling this intent needs an authorized sender.
    pub fn requires_authorization(&self) -> bool {
        !matches!(self, Self::MyId)
    }
}

fn caption_or(caption: &Option<String>, fallback: String) -> String {
    caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .unwrap_or(fallback)
}
