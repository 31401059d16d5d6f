// REST collaborator for the chat backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::record::{MessageRecord, PollDefinition, ProductRef, RecordBody};
use crate::state::{MessageStatus, ValidationIssue};

/// How a failed request should be handled by the send pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connectivity or server-side trouble; safe to re-attempt.
    Network,
    /// The backend refused the request; re-sending the same payload won't help.
    Validation,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{message}")]
    Validation {
        message: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("chat backend not configured: {0}")]
    NotConfigured(String),
}

impl TransportError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::Network(_) => ErrorClass::Network,
            _ => ErrorClass::Validation,
        }
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            TransportError::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            classify_status(status, "")
        } else {
            // Connect, timeout, DNS and "request never completed" all land here.
            TransportError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    errors: Vec<ValidationIssue>,
}

/// Map a non-success HTTP response onto the error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            TransportError::Network(format!("{}: {message}", status.as_u16()))
        }
        s if s.is_server_error() => TransportError::Network(format!("{}: {message}", s.as_u16())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::PermissionDenied(message)
        }
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            TransportError::Validation {
                message,
                issues: parsed.errors,
            }
        }
        s => TransportError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    async fn send_text(
        &self,
        room_id: &str,
        content: &str,
        temporary_id: &str,
        reply_to_id: Option<&str>,
    ) -> Result<MessageRecord, TransportError>;

    async fn send_images(
        &self,
        room_id: &str,
        files: &[String],
        captions: &[String],
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError>;

    async fn send_voice(
        &self,
        room_id: &str,
        voice_path: &str,
        duration_ms: Option<u64>,
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError>;

    async fn send_poll(
        &self,
        room_id: &str,
        poll: &PollDefinition,
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError>;

    async fn send_product(
        &self,
        room_id: &str,
        product_id: &str,
    ) -> Result<MessageRecord, TransportError>;

    async fn mark_as_read(
        &self,
        room_id: &str,
        user_id: &str,
        message_ids: &[String],
    ) -> Result<(), TransportError>;

    async fn fetch_messages(
        &self,
        room_id: &str,
        limit: u32,
        cursor_id: Option<&str>,
    ) -> Result<Vec<MessageRecord>, TransportError>;
}

/// Backends answer either with the bare record or wrapped in `{ "data": ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(t) => t,
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let raw = base_url.trim();
        let base_url = reqwest::Url::parse(raw)
            .with_context(|| format!("invalid api_base_url {raw:?}"))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "api_base_url {raw:?} cannot carry a path"
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// Room ids are percent-encoded as a single path segment.
    fn room_url(&self, room_id: &str, tail: &str) -> reqwest::Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base urls, so this always succeeds.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["chat", "rooms", room_id])
                .extend(tail.split('/'));
        }
        url
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let resp = self.authed(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice::<Envelope<T>>(&bytes)
            .map(Envelope::into_inner)
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn file_part(path: &str) -> Result<Part, TransportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransportError::Validation {
                message: format!("cannot read {path}: {e}"),
                issues: vec![],
            })?;
        let filename = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Part::bytes(bytes).file_name(filename))
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send_text(
        &self,
        room_id: &str,
        content: &str,
        temporary_id: &str,
        reply_to_id: Option<&str>,
    ) -> Result<MessageRecord, TransportError> {
        let body = serde_json::json!({
            "type": "TEXT",
            "content": content,
            "temporaryId": temporary_id,
            "replyToId": reply_to_id,
        });
        self.execute(
            self.client
                .post(self.room_url(room_id, "messages"))
                .json(&body),
        )
        .await
    }

    async fn send_images(
        &self,
        room_id: &str,
        files: &[String],
        captions: &[String],
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let mut form = Form::new().text("temporaryId", temporary_id.to_string());
        for path in files {
            form = form.part("files", Self::file_part(path).await?);
        }
        for caption in captions {
            form = form.text("captions", caption.clone());
        }
        self.execute(
            self.client
                .post(self.room_url(room_id, "messages/images"))
                .multipart(form),
        )
        .await
    }

    async fn send_voice(
        &self,
        room_id: &str,
        voice_path: &str,
        duration_ms: Option<u64>,
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let mut form = Form::new()
            .text("temporaryId", temporary_id.to_string())
            .part("voice", Self::file_part(voice_path).await?);
        if let Some(ms) = duration_ms {
            form = form.text("durationMs", ms.to_string());
        }
        self.execute(
            self.client
                .post(self.room_url(room_id, "messages/voice"))
                .multipart(form),
        )
        .await
    }

    async fn send_poll(
        &self,
        room_id: &str,
        poll: &PollDefinition,
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let body = serde_json::json!({ "poll": poll, "temporaryId": temporary_id });
        self.execute(
            self.client
                .post(self.room_url(room_id, "messages/poll"))
                .json(&body),
        )
        .await
    }

    async fn send_product(
        &self,
        room_id: &str,
        product_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let body = serde_json::json!({ "productId": product_id });
        self.execute(
            self.client
                .post(self.room_url(room_id, "messages/product"))
                .json(&body),
        )
        .await
    }

    async fn mark_as_read(
        &self,
        room_id: &str,
        user_id: &str,
        message_ids: &[String],
    ) -> Result<(), TransportError> {
        let body = serde_json::json!({ "userId": user_id, "messageIds": message_ids });
        let resp = self
            .authed(self.client.post(self.room_url(room_id, "read")).json(&body))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        Ok(())
    }

    async fn fetch_messages(
        &self,
        room_id: &str,
        limit: u32,
        cursor_id: Option<&str>,
    ) -> Result<Vec<MessageRecord>, TransportError> {
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor_id {
            query.push(("cursor", cursor.to_string()));
        }
        self.execute(
            self.client
                .get(self.room_url(room_id, "messages"))
                .query(&query),
        )
        .await
    }
}

/// Stands in when no backend is configured: every call fails with a surfaced error.
pub struct UnavailableTransport {
    reason: String,
}

impl UnavailableTransport {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn err(&self) -> TransportError {
        TransportError::NotConfigured(self.reason.clone())
    }
}

#[async_trait]
impl ChatTransport for UnavailableTransport {
    async fn send_text(
        &self,
        _room_id: &str,
        _content: &str,
        _temporary_id: &str,
        _reply_to_id: Option<&str>,
    ) -> Result<MessageRecord, TransportError> {
        Err(self.err())
    }

    async fn send_images(
        &self,
        _room_id: &str,
        _files: &[String],
        _captions: &[String],
        _temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        Err(self.err())
    }

    async fn send_voice(
        &self,
        _room_id: &str,
        _voice_path: &str,
        _duration_ms: Option<u64>,
        _temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        Err(self.err())
    }

    async fn send_poll(
        &self,
        _room_id: &str,
        _poll: &PollDefinition,
        _temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        Err(self.err())
    }

    async fn send_product(
        &self,
        _room_id: &str,
        _product_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        Err(self.err())
    }

    async fn mark_as_read(
        &self,
        _room_id: &str,
        _user_id: &str,
        _message_ids: &[String],
    ) -> Result<(), TransportError> {
        Err(self.err())
    }

    async fn fetch_messages(
        &self,
        _room_id: &str,
        _limit: u32,
        _cursor_id: Option<&str>,
    ) -> Result<Vec<MessageRecord>, TransportError> {
        Err(self.err())
    }
}

/// Offline mode: confirms every send locally so the UI stays deterministic.
pub struct LoopbackTransport {
    user_id: String,
    next_id: AtomicU64,
}

impl LoopbackTransport {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            next_id: AtomicU64::new(1),
        }
    }

    fn confirm(&self, room_id: &str, temporary_id: Option<&str>, body: RecordBody) -> MessageRecord {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        MessageRecord {
            id: format!("local-{n}"),
            room_id: room_id.to_string(),
            sender_id: self.user_id.clone(),
            temporary_id: temporary_id.map(str::to_string),
            reply_to_id: None,
            created_at: chrono::Utc::now(),
            status: MessageStatus::Sent,
            body,
        }
    }
}

#[async_trait]
impl ChatTransport for LoopbackTransport {
    async fn send_text(
        &self,
        room_id: &str,
        content: &str,
        temporary_id: &str,
        reply_to_id: Option<&str>,
    ) -> Result<MessageRecord, TransportError> {
        let mut rec = self.confirm(
            room_id,
            Some(temporary_id),
            RecordBody::Text {
                content: content.to_string(),
            },
        );
        rec.reply_to_id = reply_to_id.map(str::to_string);
        Ok(rec)
    }

    async fn send_images(
        &self,
        room_id: &str,
        files: &[String],
        captions: &[String],
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let attachments = files
            .iter()
            .map(|f| crate::record::RecordAttachment {
                url: format!("file://{f}"),
                mime_type: None,
            })
            .collect();
        Ok(self.confirm(
            room_id,
            Some(temporary_id),
            RecordBody::Image {
                attachments,
                captions: captions.to_vec(),
            },
        ))
    }

    async fn send_voice(
        &self,
        room_id: &str,
        voice_path: &str,
        duration_ms: Option<u64>,
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let attachments = vec![crate::record::RecordAttachment {
            url: format!("file://{voice_path}"),
            mime_type: None,
        }];
        Ok(self.confirm(
            room_id,
            Some(temporary_id),
            RecordBody::Voice {
                attachments,
                duration_ms,
            },
        ))
    }

    async fn send_poll(
        &self,
        room_id: &str,
        poll: &PollDefinition,
        temporary_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let poll = crate::record::PollRecord {
            question: poll.question.clone(),
            options: poll
                .options
                .iter()
                .map(|text| crate::record::PollOptionRecord {
                    id: None,
                    text: text.clone(),
                    votes: 0,
                })
                .collect(),
            allow_multiple: poll.allow_multiple,
        };
        Ok(self.confirm(room_id, Some(temporary_id), RecordBody::Poll { poll }))
    }

    async fn send_product(
        &self,
        room_id: &str,
        product_id: &str,
    ) -> Result<MessageRecord, TransportError> {
        let product = ProductRef {
            id: product_id.to_string(),
            name: None,
            price: None,
            image_url: None,
        };
        Ok(self.confirm(room_id, None, RecordBody::Product { product }))
    }

    async fn mark_as_read(
        &self,
        _room_id: &str,
        _user_id: &str,
        _message_ids: &[String],
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn fetch_messages(
        &self,
        _room_id: &str,
        _limit: u32,
        _cursor_id: Option<&str>,
    ) -> Result<Vec<MessageRecord>, TransportError> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_throttle_errors_are_retryable() {
        for code in [500u16, 502, 503, 504, 408, 429] {
            let status = StatusCode::from_u16(code).unwrap();
            let err = classify_status(status, "");
            assert_eq!(err.class(), ErrorClass::Network, "status {code}");
        }
    }

    #[test]
    fn business_rejections_are_not_retried() {
        let body = r#"{
            "message": "Insufficient stock",
            "errors": [{"type": "insufficient_stock", "productId": "p1", "productName": "X", "requested": 10, "available": 3}]
        }"#;
        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(err.to_string(), "Insufficient stock");
        assert_eq!(err.issues().len(), 1);
        assert_eq!(
            err.issues()[0].describe(),
            "Product X: requested 10, available 3"
        );

        let denied = classify_status(StatusCode::FORBIDDEN, r#"{"error":"not a member"}"#);
        assert!(matches!(denied, TransportError::PermissionDenied(ref m) if m == "not a member"));
        assert_eq!(denied.class(), ErrorClass::Validation);
    }

    #[test]
    fn unparseable_error_body_uses_status_reason() {
        let err = classify_status(StatusCode::BAD_REQUEST, "<html>oops</html>");
        match err {
            TransportError::Validation { message, issues } => {
                assert_eq!(message, "Bad Request");
                assert!(issues.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let missing = classify_status(StatusCode::NOT_FOUND, "");
        assert!(matches!(missing, TransportError::Rejected { status: 404, .. }));
    }

    #[test]
    fn base_url_must_parse() {
        assert!(HttpTransport::new("not a url", None, Duration::from_secs(1)).is_err());
        let t = HttpTransport::new("https://api.example.com/v1/", None, Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            t.room_url("r1", "messages").as_str(),
            "https://api.example.com/v1/chat/rooms/r1/messages"
        );
        let opaque = HttpTransport::new("mailto:ops@example.com", None, Duration::from_secs(1));
        assert!(opaque.is_err());
    }

    #[test]
    fn room_id_is_encoded_as_one_segment() {
        let t = HttpTransport::new("https://api.example.com", None, Duration::from_secs(1))
            .unwrap();
        let url = t.room_url("a/b?c#d", "messages/images");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/chat/rooms/a%2Fb%3Fc%23d/messages/images"
        );
        assert_eq!(url.query(), None);
        assert_eq!(
            url.path_segments().unwrap().count(),
            5,
            "chat/rooms/<id>/messages/images"
        );
    }

    #[test]
    fn envelope_accepts_wrapped_and_bare_records() {
        let bare = r#"{"id":"1","roomId":"r","senderId":"u","type":"TEXT","content":"a","createdAt":"2024-01-01T00:00:00Z"}"#;
        let wrapped = format!(r#"{{"data":{bare}}}"#);
        let a: MessageRecord = serde_json::from_str::<Envelope<MessageRecord>>(bare)
            .unwrap()
            .into_inner();
        let b: MessageRecord = serde_json::from_str::<Envelope<MessageRecord>>(&wrapped)
            .unwrap()
            .into_inner();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn loopback_echoes_temporary_id() {
        let t = LoopbackTransport::new("me");
        let rec = t.send_text("r1", "Hi", "tmp-1", None).await.unwrap();
        assert_eq!(rec.temporary_id.as_deref(), Some("tmp-1"));
        assert_eq!(rec.sender_id, "me");
        assert_eq!(rec.id, "local-1");
    }
}
