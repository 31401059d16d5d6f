// Wire shapes exchanged with the messaging backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{Attachment, MessageContent, MessageStatus, PollOption};

/// Server-confirmed message as returned by send endpoints, history pages and the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    /// Echo of the client id the send was issued with, when the backend knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: MessageStatus,
    #[serde(flatten)]
    pub body: RecordBody,
}

fn default_status() -> MessageStatus {
    MessageStatus::Sent
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RecordBody {
    Text {
        content: String,
    },
    Image {
        attachments: Vec<RecordAttachment>,
        #[serde(default)]
        captions: Vec<String>,
    },
    Voice {
        attachments: Vec<RecordAttachment>,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    Product {
        product: ProductRef,
    },
    Poll {
        poll: PollRecord,
    },
    Stop {
        content: String,
        #[serde(default)]
        stop_id: Option<String>,
    },
    System {
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttachment {
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRecord {
    pub question: String,
    pub options: Vec<PollOptionRecord>,
    #[serde(default)]
    pub allow_multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOptionRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub votes: u32,
}

/// Poll as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDefinition {
    pub question: String,
    pub options: Vec<String>,
    pub allow_multiple: bool,
}

impl MessageRecord {
    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    /// A confirmed record is at least `Sent`, whatever the backend echoes.
    pub fn confirmed_status(&self) -> MessageStatus {
        match self.status {
            MessageStatus::Sending | MessageStatus::Failed => MessageStatus::Sent,
            other => other,
        }
    }
}

impl From<RecordAttachment> for Attachment {
    fn from(a: RecordAttachment) -> Self {
        Attachment {
            url: Some(a.url),
            local_path: None,
            mime_type: a.mime_type,
        }
    }
}

impl From<RecordBody> for MessageContent {
    fn from(body: RecordBody) -> Self {
        match body {
            RecordBody::Text { content } => MessageContent::Text { text: content },
            RecordBody::Image {
                attachments,
                captions,
            } => MessageContent::Image {
                attachments: attachments.into_iter().map(Attachment::from).collect(),
                captions,
            },
            RecordBody::Voice {
                attachments,
                duration_ms,
            } => MessageContent::Voice {
                attachment: attachments
                    .into_iter()
                    .next()
                    .map(Attachment::from)
                    .unwrap_or(Attachment {
                        url: None,
                        local_path: None,
                        mime_type: None,
                    }),
                duration_ms,
            },
            RecordBody::Product { product } => MessageContent::Product {
                product_id: product.id,
                name: product.name,
                price: product.price,
                image_url: product.image_url,
            },
            RecordBody::Poll { poll } => MessageContent::Poll {
                question: poll.question,
                options: poll
                    .options
                    .into_iter()
                    .map(|o| PollOption {
                        id: o.id,
                        text: o.text,
                        votes: o.votes,
                    })
                    .collect(),
                allow_multiple: poll.allow_multiple,
            },
            RecordBody::Stop { content, stop_id } => MessageContent::Stop {
                text: content,
                stop_id,
            },
            RecordBody::System { content } => MessageContent::System { text: content },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_text_record_from_backend_json() {
        let json = r#"{
            "id": "42",
            "roomId": "room-1",
            "senderId": "u1",
            "temporaryId": "t1",
            "type": "TEXT",
            "content": "Hi",
            "createdAt": "2024-05-01T10:00:00.250Z",
            "status": "SENT"
        }"#;
        let rec: MessageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.id, "42");
        assert_eq!(rec.temporary_id.as_deref(), Some("t1"));
        assert_eq!(rec.status, MessageStatus::Sent);
        assert_eq!(rec.created_at_millis(), 1_714_557_600_250);
        assert_eq!(
            rec.body,
            RecordBody::Text {
                content: "Hi".into()
            }
        );
    }

    #[test]
    fn decodes_product_and_poll_variants() {
        let product = r#"{
            "id": "7", "roomId": "r", "senderId": "u2",
            "type": "PRODUCT",
            "product": {"id": "p-9", "name": "Pallet wrap", "imageUrl": "https://cdn/x.png"},
            "createdAt": "2024-05-01T10:00:00Z"
        }"#;
        let rec: MessageRecord = serde_json::from_str(product).unwrap();
        // Missing status defaults to SENT.
        assert_eq!(rec.status, MessageStatus::Sent);
        match MessageContent::from(rec.body) {
            MessageContent::Product {
                product_id,
                name,
                image_url,
                ..
            } => {
                assert_eq!(product_id, "p-9");
                assert_eq!(name.as_deref(), Some("Pallet wrap"));
                assert_eq!(image_url.as_deref(), Some("https://cdn/x.png"));
            }
            other => panic!("unexpected content: {other:?}"),
        }

        let poll = r#"{
            "id": "8", "roomId": "r", "senderId": "u2",
            "type": "POLL",
            "poll": {"question": "Dock?", "options": [{"text": "A", "votes": 2}, {"text": "B"}], "allowMultiple": true},
            "createdAt": "2024-05-01T10:00:00Z",
            "status": "DELIVERED"
        }"#;
        let rec: MessageRecord = serde_json::from_str(poll).unwrap();
        assert_eq!(rec.status, MessageStatus::Delivered);
        match MessageContent::from(rec.body) {
            MessageContent::Poll {
                options,
                allow_multiple,
                ..
            } => {
                assert!(allow_multiple);
                assert_eq!(options.len(), 2);
                assert_eq!(options[0].votes, 2);
                assert_eq!(options[1].votes, 0);
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let json = r#"{
            "id": "1", "roomId": "r", "senderId": "u",
            "type": "TEXT", "content": "x",
            "createdAt": "2024-05-01T10:00:00Z",
            "status": "ARCHIVED"
        }"#;
        assert!(serde_json::from_str::<MessageRecord>(json).is_err());
    }

    #[test]
    fn echoed_failure_status_still_counts_as_sent() {
        let json = r#"{
            "id": "1", "roomId": "r", "senderId": "u",
            "type": "SYSTEM", "content": "Order #12 dispatched",
            "createdAt": "2024-05-01T10:00:00Z",
            "status": "SENDING"
        }"#;
        let rec: MessageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.confirmed_status(), MessageStatus::Sent);
    }
}
