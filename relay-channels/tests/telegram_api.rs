//! Integration tests for the Telegram channel against a mock Bot API.

use relay_channels::{
    Attachment, Channel, ChannelError, ChannelMessage, ChannelType, MessageContent, OutgoingContent,
    OutgoingMessage, TelegramChannel,
};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:TEST";

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
}

fn channel(server: &MockServer) -> TelegramChannel {
    TelegramChannel::new(TOKEN).with_api_base(server.uri())
}

fn outgoing(chat: &str, content: OutgoingContent) -> OutgoingMessage {
    OutgoingMessage {
        channel_type: ChannelType::Telegram,
        channel_id: chat.to_string(),
        reply_to: None,
        content,
    }
}

#[tokio::test]
async fn test_init_verifies_token_and_clears_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ok(json!({ "id": 1, "username": "relay_bot" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/deleteWebhook")))
        .and(body_partial_json(json!({ "drop_pending_updates": true })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    channel(&server).init().await.unwrap();
}

#[tokio::test]
async fn test_init_rejects_bad_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "ok": false, "description": "Unauthorized" })),
        )
        .mount(&server)
        .await;

    let err = channel(&server).init().await.unwrap_err();
    assert!(matches!(err, ChannelError::Auth(_)));
}

#[tokio::test]
async fn test_send_text_is_plain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({ "chat_id": "42", "text": "<b>not html</b>" })))
        .respond_with(ok(json!({ "message_id": 99 })))
        .expect(1)
        .mount(&server)
        .await;

    let id = channel(&server)
        .send(outgoing(
            "42",
            OutgoingContent::Text {
                text: "<b>not html</b>".into(),
            },
        ))
        .await
        .unwrap();
    assert_eq!(id, "99");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("parse_mode").is_none());
}

#[tokio::test]
async fn test_send_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: message is too long"
        })))
        .mount(&server)
        .await;

    let err = channel(&server)
        .send(outgoing("42", OutgoingContent::Text { text: "x".into() }))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::SendFailed(ref m) if m.contains("too long")));
}

#[tokio::test]
async fn test_send_document_uploads_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendDocument")))
        .and(body_string_contains("filename=\"response.txt\""))
        .and(body_string_contains("the full response body"))
        .and(body_string_contains("sent as file."))
        .respond_with(ok(json!({ "message_id": 7 })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let staged = dir.path().join("response_abc.txt");
    std::fs::write(&staged, "the full response body").unwrap();

    let id = channel(&server)
        .send(outgoing(
            "42",
            OutgoingContent::Document {
                path: staged,
                filename: "response.txt".into(),
                caption: Some("Response was too long (5000 chars), sent as file.".into()),
            },
        ))
        .await
        .unwrap();
    assert_eq!(id, "7");
}

#[tokio::test]
async fn test_send_photo_uses_photo_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendPhoto")))
        .and(body_string_contains("name=\"photo\""))
        .and(body_string_contains("chart.png"))
        .respond_with(ok(json!({ "message_id": 8 })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let image = dir.path().join("chart.png");
    std::fs::write(&image, b"png-bytes").unwrap();

    channel(&server)
        .send(outgoing(
            "42",
            OutgoingContent::Photo {
                path: image,
                caption: Some("chart.png".into()),
            },
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_download_fetches_file_contents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getFile")))
        .and(body_partial_json(json!({ "file_id": "photo-1" })))
        .respond_with(ok(json!({ "file_id": "photo-1", "file_path": "photos/file_1.jpg" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/file/bot{TOKEN}/photos/file_1.jpg")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let dest = dir.path().join("staged.jpg");
    let attachment = Attachment {
        file_ref: "photo-1".into(),
        filename: None,
        mime_type: Some("image/jpeg".into()),
        size_bytes: Some(10),
    };

    channel(&server).download(&attachment, &dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"jpeg-bytes");
}

#[tokio::test]
async fn test_download_without_file_path_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getFile")))
        .respond_with(ok(json!({ "file_id": "x" })))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let attachment = Attachment {
        file_ref: "x".into(),
        filename: None,
        mime_type: None,
        size_bytes: None,
    };

    let err = channel(&server)
        .download(&attachment, &dir.path().join("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::DownloadFailed(_)));
}

#[tokio::test]
async fn test_typing_indicator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendChatAction")))
        .and(body_partial_json(json!({ "chat_id": "42", "action": "typing" })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    channel(&server).send_typing("42").await.unwrap();
}

fn update(update_id: i64, text: &str) -> serde_json::Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id * 10,
            "date": 1_700_000_000,
            "chat": { "id": 42 },
            "from": { "id": 7, "username": "alice" },
            "text": text
        }
    })
}

#[tokio::test]
async fn test_listen_advances_offset_and_stops_when_receiver_closes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 0 })))
        .respond_with(ok(json!([update(10, "first")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 11 })))
        .respond_with(ok(json!([update(11, "second")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 12 })))
        // A redelivered update keeps the listener busy until the receiver is gone.
        .respond_with(ok(json!([update(11, "again")])))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::channel::<ChannelMessage>(1);
    let listener = {
        let ch = channel(&server).with_poll_timeout(1);
        tokio::spawn(async move { ch.listen(tx).await })
    };

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.text(), Some("first"));
    assert_eq!(second.text(), Some("second"));
    assert_eq!(second.channel_id, "42");
    assert_eq!(second.username.as_deref(), Some("alice"));
    assert!(matches!(second.content, MessageContent::Text { .. }));
    drop(rx);

    let result = tokio::time::timeout(Duration::from_secs(10), listener)
        .await
        .expect("listener should stop once the receiver is gone")
        .unwrap();
    assert!(result.is_ok());
}
