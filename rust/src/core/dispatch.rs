// Outgoing send bookkeeping and transport selection by payload kind.

use std::collections::HashMap;

use tokio::task::AbortHandle;

use crate::actions::OutgoingPayload;
use crate::record::{MessageRecord, PollDefinition};
use crate::transport::{ChatTransport, TransportError};

/// Everything needed to (re)issue a send; kept until confirmed or cancelled.
#[derive(Debug, Clone)]
pub(crate) struct PendingSend {
    pub(crate) room_id: String,
    pub(crate) payload: OutgoingPayload,
    pub(crate) reply_to_id: Option<String>,
}

/// At most one request in flight per temporary id.
#[derive(Default)]
pub(crate) struct DispatchQueue {
    in_flight: HashMap<String, Option<AbortHandle>>,
}

impl DispatchQueue {
    /// Reserve the slot for `temporary_id`. `false` if a request is already running.
    pub(crate) fn try_begin(&mut self, temporary_id: &str) -> bool {
        if self.in_flight.contains_key(temporary_id) {
            return false;
        }
        self.in_flight.insert(temporary_id.to_string(), None);
        true
    }

    pub(crate) fn attach(&mut self, temporary_id: &str, handle: AbortHandle) {
        match self.in_flight.get_mut(temporary_id) {
            Some(slot) => *slot = Some(handle),
            None => handle.abort(),
        }
    }

    pub(crate) fn finish(&mut self, temporary_id: &str) {
        self.in_flight.remove(temporary_id);
    }

    pub(crate) fn is_in_flight(&self, temporary_id: &str) -> bool {
        self.in_flight.contains_key(temporary_id)
    }

    /// Abort the running request, if any.
    pub(crate) fn cancel(&mut self, temporary_id: &str) {
        if let Some(Some(handle)) = self.in_flight.remove(temporary_id) {
            handle.abort();
        }
    }

    pub(crate) fn clear(&mut self) {
        for (_, handle) in self.in_flight.drain() {
            if let Some(h) = handle {
                h.abort();
            }
        }
    }
}

/// Issue one send attempt through the capability matching the payload.
pub(crate) async fn send_once(
    transport: &dyn ChatTransport,
    temporary_id: &str,
    pending: &PendingSend,
) -> Result<MessageRecord, TransportError> {
    let room_id = pending.room_id.as_str();
    match &pending.payload {
        OutgoingPayload::Text { text } => {
            transport
                .send_text(room_id, text, temporary_id, pending.reply_to_id.as_deref())
                .await
        }
        OutgoingPayload::Images { paths, captions } => {
            transport
                .send_images(room_id, paths, captions, temporary_id)
                .await
        }
        OutgoingPayload::Voice { path, duration_ms } => {
            transport
                .send_voice(room_id, path, *duration_ms, temporary_id)
                .await
        }
        OutgoingPayload::Poll {
            question,
            options,
            allow_multiple,
        } => {
            let poll = PollDefinition {
                question: question.clone(),
                options: options.clone(),
                allow_multiple: *allow_multiple,
            };
            transport.send_poll(room_id, &poll, temporary_id).await
        }
        OutgoingPayload::Product { product_id } => {
            transport.send_product(room_id, product_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBody;
    use crate::transport::LoopbackTransport;

    #[test]
    fn duplicate_dispatch_for_same_id_is_refused() {
        let mut q = DispatchQueue::default();
        assert!(q.try_begin("t1"));
        assert!(!q.try_begin("t1"));
        // Other messages are independent.
        assert!(q.try_begin("t2"));
        q.finish("t1");
        assert!(!q.is_in_flight("t1"));
        assert!(q.try_begin("t1"));
    }

    #[tokio::test]
    async fn cancel_aborts_running_request() {
        let mut q = DispatchQueue::default();
        assert!(q.try_begin("t1"));
        let task = tokio::spawn(tokio::time::sleep(std::time::Duration::from_secs(60)));
        q.attach("t1", task.abort_handle());
        q.cancel("t1");
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!q.is_in_flight("t1"));
    }

    #[tokio::test]
    async fn payload_kind_selects_transport_capability() {
        let transport = LoopbackTransport::new("me");
        let poll = PendingSend {
            room_id: "r1".into(),
            payload: OutgoingPayload::Poll {
                question: "Dock?".into(),
                options: vec!["A".into(), "B".into()],
                allow_multiple: false,
            },
            reply_to_id: None,
        };
        let rec = send_once(&transport, "tmp-1", &poll).await.unwrap();
        assert!(matches!(rec.body, RecordBody::Poll { .. }));
        assert_eq!(rec.temporary_id.as_deref(), Some("tmp-1"));

        let product = PendingSend {
            room_id: "r1".into(),
            payload: OutgoingPayload::Product {
                product_id: "p-1".into(),
            },
            reply_to_id: None,
        };
        let rec = send_once(&transport, "tmp-2", &product).await.unwrap();
        assert!(matches!(rec.body, RecordBody::Product { ref product } if product.id == "p-1"));
        // Product shares carry no temporary id on the wire.
        assert_eq!(rec.temporary_id, None);
    }
}
