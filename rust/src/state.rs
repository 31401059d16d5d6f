#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub user_id: String,
    pub rooms: Vec<RoomSummary>,
    pub current_chat: Option<ChatViewState>,
    pub toast: Option<String>,
    pub alert: Option<SendAlert>,
}

impl AppState {
    pub fn empty(user_id: String) -> Self {
        Self {
            rev: 0,
            user_id,
            rooms: vec![],
            current_chat: None,
            toast: None,
            alert: None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct RoomSummary {
    pub room_id: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: u32,
    pub pending_count: u32,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ChatViewState {
    pub room_id: String,
    /// Newest first; index 0 is rendered at the bottom of an inverted list.
    pub messages: Vec<ChatMessage>,
    pub is_focused: bool,
    pub can_load_older: bool,
    pub loading_older: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    /// Server id; `None` until the backend confirms the send.
    pub id: Option<String>,
    /// Only surfaced while `id` is absent, so the UI can target retry/cancel.
    pub temporary_id: Option<String>,
    pub room_id: String,
    pub sender_id: String,
    pub reply_to_id: Option<String>,
    pub content: MessageContent,
    pub status: MessageStatus,
    /// Unix millis. Provisional (client clock) until the server record lands.
    pub created_at: i64,
    pub is_mine: bool,
    pub attempt_count: u32,
    pub can_retry: bool,
    pub can_cancel: bool,
    pub failure_reason: Option<String>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Product,
    Poll,
    Stop,
    System,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub url: Option<String>,
    pub local_path: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct PollOption {
    pub id: Option<String>,
    pub text: String,
    pub votes: u32,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        attachments: Vec<Attachment>,
        captions: Vec<String>,
    },
    Voice {
        attachment: Attachment,
        duration_ms: Option<u64>,
    },
    Product {
        product_id: String,
        name: Option<String>,
        price: Option<String>,
        image_url: Option<String>,
    },
    Poll {
        question: String,
        options: Vec<PollOption>,
        allow_multiple: bool,
    },
    Stop {
        text: String,
        stop_id: Option<String>,
    },
    System {
        text: String,
    },
}

impl MessageContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageContent::Text { .. } => MessageKind::Text,
            MessageContent::Image { .. } => MessageKind::Image,
            MessageContent::Voice { .. } => MessageKind::Voice,
            MessageContent::Product { .. } => MessageKind::Product,
            MessageContent::Poll { .. } => MessageKind::Poll,
            MessageContent::Stop { .. } => MessageKind::Stop,
            MessageContent::System { .. } => MessageKind::System,
        }
    }

    /// One-line text for room previews.
    pub fn preview(&self) -> String {
        match self {
            MessageContent::Text { text }
            | MessageContent::Stop { text, .. }
            | MessageContent::System { text } => text.clone(),
            MessageContent::Image { attachments, .. } if attachments.len() > 1 => {
                format!("{} photos", attachments.len())
            }
            MessageContent::Image { .. } => "Photo".to_string(),
            MessageContent::Voice { .. } => "Voice message".to_string(),
            MessageContent::Product { name, product_id, .. } => {
                format!("Product: {}", name.as_deref().unwrap_or(product_id))
            }
            MessageContent::Poll { question, .. } => format!("Poll: {question}"),
        }
    }
}

/// Delivery lifecycle of a message.
///
/// Forward only: `Sending -> {Sent | Failed}`, `Sent -> Delivered -> Read`.
/// `Failed` is terminal except for an explicit manual retry back to `Sending`.
#[derive(
    uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    fn delivery_rank(self) -> Option<u8> {
        match self {
            MessageStatus::Sending => Some(0),
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Read => Some(3),
            MessageStatus::Failed => None,
        }
    }

    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Sending, MessageStatus::Failed) => true,
            (MessageStatus::Failed, MessageStatus::Sending) => true,
            (MessageStatus::Failed, _) | (_, MessageStatus::Failed) => false,
            (cur, next) => match (cur.delivery_rank(), next.delivery_rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }

    /// Later of two delivery states; used when merging server records.
    pub fn furthest(self, other: MessageStatus) -> MessageStatus {
        match (self.delivery_rank(), other.delivery_rank()) {
            (Some(a), Some(b)) if b > a => other,
            (Some(_), Some(_)) => self,
            (None, _) => other,
            (_, None) => self,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, MessageStatus::Sending)
    }
}

/// A single field-attributable rejection reported by the backend
/// (e.g. insufficient stock for one product).
#[derive(
    uniffi::Record, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub field: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub requested: Option<u32>,
    pub available: Option<u32>,
    pub message: Option<String>,
}

impl ValidationIssue {
    pub fn describe(&self) -> String {
        let subject = self
            .product_name
            .as_deref()
            .or(self.product_id.as_deref())
            .map(|p| format!("Product {p}"))
            .or_else(|| self.field.clone());
        match (subject, self.requested, self.available) {
            (Some(subject), Some(requested), Some(available)) => {
                format!("{subject}: requested {requested}, available {available}")
            }
            (Some(subject), _, _) => match &self.message {
                Some(m) => format!("{subject}: {m}"),
                None => format!("{subject}: {}", self.kind),
            },
            (None, _, _) => self.message.clone().unwrap_or_else(|| self.kind.clone()),
        }
    }
}

/// A send the backend refused for business reasons; shown as a blocking alert.
#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct SendAlert {
    pub room_id: String,
    pub temporary_id: String,
    pub summary: String,
    pub issues: Vec<ValidationIssue>,
}

impl SendAlert {
    pub fn lines(&self) -> Vec<String> {
        if self.issues.is_empty() {
            return vec![self.summary.clone()];
        }
        self.issues.iter().map(ValidationIssue::describe).collect()
    }
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::{MessageStatus, SendAlert, ValidationIssue};

    #[test]
    fn status_moves_forward_only() {
        use MessageStatus::*;
        assert!(Sending.can_transition_to(Sent));
        assert!(Sending.can_transition_to(Failed));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Read));
        assert!(Sent.can_transition_to(Read));

        assert!(!Sent.can_transition_to(Sending));
        assert!(!Read.can_transition_to(Delivered));
        assert!(!Sent.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn failed_reenters_sending_only() {
        use MessageStatus::*;
        assert!(Failed.can_transition_to(Sending));
        for next in [Sent, Delivered, Read, Failed] {
            assert!(!Failed.can_transition_to(next), "Failed -> {next:?}");
        }
    }

    #[test]
    fn furthest_keeps_later_delivery_state() {
        use MessageStatus::*;
        assert_eq!(Read.furthest(Sent), Read);
        assert_eq!(Sent.furthest(Delivered), Delivered);
        assert_eq!(Failed.furthest(Sent), Sent);
    }

    #[test]
    fn insufficient_stock_issue_reads_naturally() {
        let issue = ValidationIssue {
            kind: "insufficient_stock".into(),
            product_name: Some("X".into()),
            requested: Some(10),
            available: Some(3),
            ..Default::default()
        };
        assert_eq!(issue.describe(), "Product X: requested 10, available 3");
    }

    #[test]
    fn issue_without_product_falls_back_to_message() {
        let issue = ValidationIssue {
            kind: "permission_denied".into(),
            message: Some("Only admins can post here".into()),
            ..Default::default()
        };
        assert_eq!(issue.describe(), "Only admins can post here");

        let field_issue = ValidationIssue {
            kind: "price_mismatch".into(),
            field: Some("price".into()),
            ..Default::default()
        };
        assert_eq!(field_issue.describe(), "price: price_mismatch");
    }

    #[test]
    fn alert_without_issues_shows_summary() {
        let alert = SendAlert {
            room_id: "r1".into(),
            temporary_id: "t1".into(),
            summary: "Message rejected".into(),
            issues: vec![],
        };
        assert_eq!(alert.lines(), vec!["Message rejected".to_string()]);
    }
}
