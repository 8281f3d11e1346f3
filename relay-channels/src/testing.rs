//! In-memory fakes shared by unit tests.

use crate::invoker::{AssistantInvoker, InvocationError, InvocationRequest};
use crate::message::{Attachment, ChannelMessage, ChannelType, MessageContent, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// What a [`RecordingChannel`] saw, with uploads captured at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat: String, text: String },
    Document { chat: String, path: PathBuf, filename: String, caption: Option<String>, content: Vec<u8> },
    Photo { chat: String, path: PathBuf, caption: Option<String> },
    Typing { chat: String },
}

/// Channel that records everything sent through it.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    fail_uploads: AtomicBool,
    download_bytes: Mutex<Option<Vec<u8>>>,
    downloaded_to: Mutex<Vec<PathBuf>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make document and photo sends fail.
    pub fn fail_uploads(self) -> Self {
        self.fail_uploads.store(true, Ordering::SeqCst);
        self
    }

    /// Content written by [`Channel::download`].
    pub fn with_download(self, bytes: &[u8]) -> Self {
        *self.download_bytes.lock().unwrap() = Some(bytes.to_vec());
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts only, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn downloaded_to(&self) -> Vec<PathBuf> {
        self.downloaded_to.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn init(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let chat = message.channel_id;
        let record = match message.content {
            OutgoingContent::Text { text } => Sent::Text { chat, text },
            OutgoingContent::Document { path, filename, caption } => {
                if self.fail_uploads.load(Ordering::SeqCst) {
                    return Err(ChannelError::SendFailed("upload rejected".into()));
                }
                let content = std::fs::read(&path).unwrap();
                Sent::Document { chat, path, filename, caption, content }
            }
            OutgoingContent::Photo { path, caption } => {
                if self.fail_uploads.load(Ordering::SeqCst) {
                    return Err(ChannelError::SendFailed("upload rejected".into()));
                }
                assert!(path.exists());
                Sent::Photo { chat, path, caption }
            }
        };
        let mut sent = self.sent.lock().unwrap();
        sent.push(record);
        Ok(sent.len().to_string())
    }

    async fn listen(&self, _tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        Ok(())
    }

    async fn download(&self, attachment: &Attachment, dest: &Path) -> ChannelResult<()> {
        let bytes = self
            .download_bytes
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ChannelError::DownloadFailed(attachment.file_ref.clone()))?;
        std::fs::write(dest, bytes).unwrap();
        self.downloaded_to.lock().unwrap().push(dest.to_path_buf());
        Ok(())
    }

    async fn send_typing(&self, channel_id: &str) -> ChannelResult<()> {
        self.sent.lock().unwrap().push(Sent::Typing {
            chat: channel_id.to_string(),
        });
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

/// Invoker returning scripted outcomes and recording requests.
///
/// Also records whether the attachment existed at invocation time.
#[derive(Default)]
pub struct FakeInvoker {
    outcomes: Mutex<VecDeque<Result<String, InvocationError>>>,
    calls: Mutex<Vec<(InvocationRequest, bool)>>,
}

impl FakeInvoker {
    pub fn new(outcomes: Vec<Result<String, InvocationError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.calls.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    /// Whether each request's attachment existed when it was invoked.
    pub fn attachment_seen(&self) -> Vec<bool> {
        self.calls.lock().unwrap().iter().map(|(_, seen)| *seen).collect()
    }
}

#[async_trait]
impl AssistantInvoker for FakeInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, InvocationError> {
        let seen = request.attachment.as_deref().is_some_and(Path::exists);
        self.calls.lock().unwrap().push((request.clone(), seen));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".into()))
    }
}

/// Inbound message from `username` in chat `chat-1`.
pub fn inbound(username: Option<&str>, content: MessageContent) -> ChannelMessage {
    ChannelMessage {
        id: "m-1".into(),
        channel_type: ChannelType::Telegram,
        channel_id: "chat-1".into(),
        user_id: "42".into(),
        username: username.map(String::from),
        content,
        timestamp: 0,
    }
}

/// Inbound text message from `username`.
pub fn text_from(username: Option<&str>, text: &str) -> ChannelMessage {
    inbound(username, MessageContent::Text { text: text.into() })
}
