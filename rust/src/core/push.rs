// Real-time channel: other senders' messages pushed over a WebSocket.

use std::time::Duration;

use flume::Sender;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use super::AppCore;
use crate::record::MessageRecord;
use crate::updates::{CoreMsg, InternalEvent};

const RECONNECT_BASE: Duration = Duration::from_millis(250);
const RECONNECT_MAX: Duration = Duration::from_secs(8);

#[derive(Deserialize)]
#[serde(untagged)]
enum PushFrame {
    Envelope { event: String, message: MessageRecord },
    Bare(MessageRecord),
}

/// Decode one text frame. Non-message events (typing, presence, ...) yield `None`.
pub(crate) fn parse_push_frame(text: &str) -> Option<MessageRecord> {
    match serde_json::from_str::<PushFrame>(text) {
        Ok(PushFrame::Envelope { event, message }) if event == "message" => Some(message),
        Ok(PushFrame::Envelope { .. }) => None,
        Ok(PushFrame::Bare(record)) => Some(record),
        Err(e) => {
            tracing::debug!(%e, "push: ignoring undecodable frame");
            None
        }
    }
}

pub(crate) fn reconnect_delay(failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    RECONNECT_BASE.saturating_mul(factor).min(RECONNECT_MAX)
}

fn build_request(
    url: &str,
    auth_token: Option<&str>,
) -> Result<Request, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request()?;
    if let Some(token) = auth_token {
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {token}")) {
            request.headers_mut().insert("Authorization", v);
        }
    }
    Ok(request)
}

impl AppCore {
    pub(super) fn start_push_channel(&mut self) {
        if !self.network_enabled() {
            return;
        }
        let Some(url) = self.config.push_url() else {
            return;
        };
        let auth_token = self.config.auth_token.clone();
        if let Err(e) = build_request(&url, auth_token.as_deref()) {
            tracing::error!(%e, %url, "push: invalid url");
            self.toast("Live updates unavailable");
            return;
        }
        let tx = self.core_sender.clone();
        self.runtime.spawn(run_push_channel(url, auth_token, tx));
    }
}

async fn run_push_channel(url: String, auth_token: Option<String>, tx: Sender<CoreMsg>) {
    let mut failures: u32 = 0;
    loop {
        let connected = match build_request(&url, auth_token.as_deref()) {
            Ok(request) => tokio_tungstenite::connect_async(request).await,
            Err(e) => Err(e),
        };
        match connected {
            Ok((mut stream, _)) => {
                tracing::info!("push: connected");
                failures = 0;
                while let Some(frame) = stream.next().await {
                    let text = match frame {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!(%e, "push: stream error");
                            break;
                        }
                    };
                    let Some(record) = parse_push_frame(text.as_str()) else {
                        continue;
                    };
                    if tx
                        .send(CoreMsg::Internal(Box::new(InternalEvent::PushReceived(
                            record,
                        ))))
                        .is_err()
                    {
                        // Actor gone; nobody left to deliver to.
                        return;
                    }
                }
                tracing::info!("push: disconnected");
            }
            Err(e) => {
                tracing::warn!(%e, failures, "push: connect failed");
            }
        }
        if tx.is_disconnected() {
            return;
        }
        let delay = reconnect_delay(failures);
        failures = failures.saturating_add(1);
        tokio::time::sleep(delay).await;
    }
}
