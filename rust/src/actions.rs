/// What the user composed. Each variant maps onto one backend send capability.
#[derive(uniffi::Enum, Debug, Clone, PartialEq)]
pub enum OutgoingPayload {
    Text {
        text: String,
    },
    Images {
        paths: Vec<String>,
        captions: Vec<String>,
    },
    Voice {
        path: String,
        duration_ms: Option<u64>,
    },
    Poll {
        question: String,
        options: Vec<String>,
        allow_multiple: bool,
    },
    Product {
        product_id: String,
    },
}

impl OutgoingPayload {
    /// Local sanity checks only; anything business-related is the backend's call.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            OutgoingPayload::Text { text } if text.trim().is_empty() => Err("Message is empty"),
            OutgoingPayload::Images { paths, .. } if paths.is_empty() => {
                Err("Pick at least one image")
            }
            OutgoingPayload::Voice { path, .. } if path.trim().is_empty() => {
                Err("Voice recording is missing")
            }
            OutgoingPayload::Poll { question, .. } if question.trim().is_empty() => {
                Err("Poll needs a question")
            }
            OutgoingPayload::Poll { options, .. }
                if options.iter().filter(|o| !o.trim().is_empty()).count() < 2 =>
            {
                Err("Poll needs at least two options")
            }
            OutgoingPayload::Product { product_id } if product_id.trim().is_empty() => {
                Err("No product selected")
            }
            _ => Ok(()),
        }
    }

    /// Trim user input the same way for the optimistic entry and the request.
    pub fn normalized(self) -> Self {
        match self {
            OutgoingPayload::Text { text } => OutgoingPayload::Text {
                text: text.trim().to_string(),
            },
            OutgoingPayload::Poll {
                question,
                options,
                allow_multiple,
            } => OutgoingPayload::Poll {
                question: question.trim().to_string(),
                options: options
                    .into_iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect(),
                allow_multiple,
            },
            other => other,
        }
    }
}

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Chat screen lifecycle
    OpenChat {
        room_id: String,
    },
    CloseChat {
        room_id: String,
    },
    ChatFocused {
        room_id: String,
    },
    ChatBlurred {
        room_id: String,
    },
    LoadOlderMessages {
        room_id: String,
        limit: u32,
    },

    // Sending
    SendMessage {
        room_id: String,
        payload: OutgoingPayload,
        reply_to_id: Option<String>,
    },
    RetryMessage {
        room_id: String,
        temporary_id: String,
    },
    CancelMessage {
        room_id: String,
        temporary_id: String,
        confirmed: bool,
    },

    // UI
    ClearToast,
    ClearAlert,

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            // Chat screen lifecycle
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::CloseChat { .. } => "CloseChat",
            AppAction::ChatFocused { .. } => "ChatFocused",
            AppAction::ChatBlurred { .. } => "ChatBlurred",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",

            // Sending
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::CancelMessage { .. } => "CancelMessage",

            // UI
            AppAction::ClearToast => "ClearToast",
            AppAction::ClearAlert => "ClearAlert",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OutgoingPayload;

    #[test]
    fn blank_text_is_rejected() {
        let p = OutgoingPayload::Text {
            text: "   \n".into(),
        };
        assert_eq!(p.validate(), Err("Message is empty"));
    }

    #[test]
    fn poll_needs_two_real_options() {
        let p = OutgoingPayload::Poll {
            question: "Pickup time?".into(),
            options: vec!["9am".into(), "  ".into()],
            allow_multiple: false,
        };
        assert!(p.validate().is_err());

        let p = OutgoingPayload::Poll {
            question: "Pickup time?".into(),
            options: vec!["9am".into(), " 2pm ".into(), "".into()],
            allow_multiple: false,
        };
        assert!(p.validate().is_ok());
        match p.normalized() {
            OutgoingPayload::Poll { options, .. } => assert_eq!(options, vec!["9am", "2pm"]),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn text_is_trimmed_before_sending() {
        let p = OutgoingPayload::Text {
            text: "  Hi  ".into(),
        }
        .normalized();
        assert_eq!(p, OutgoingPayload::Text { text: "Hi".into() });
    }
}
