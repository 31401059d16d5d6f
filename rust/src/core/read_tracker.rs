// Debounced mark-as-read for the focused chat.

use std::collections::HashSet;

use tokio::task::AbortHandle;

#[derive(Default)]
pub(crate) struct ReadTracker {
    token: u64,
    armed: Option<Armed>,
    // Ids already sent in a mark-as-read call that hasn't completed yet.
    in_flight: HashSet<String>,
}

struct Armed {
    room_id: String,
    token: u64,
    handle: Option<AbortHandle>,
}

impl ReadTracker {
    /// (Re)start the debounce window for `room_id`. Any earlier window is dropped.
    pub(crate) fn arm(&mut self, room_id: &str) -> u64 {
        self.disarm();
        self.token += 1;
        self.armed = Some(Armed {
            room_id: room_id.to_string(),
            token: self.token,
            handle: None,
        });
        self.token
    }

    pub(crate) fn attach(&mut self, token: u64, handle: AbortHandle) {
        match self.armed.as_mut() {
            Some(armed) if armed.token == token => armed.handle = Some(handle),
            _ => handle.abort(),
        }
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            if let Some(h) = armed.handle {
                h.abort();
            }
        }
    }

    /// The debounce elapsed. `true` only for the live window of `room_id`.
    pub(crate) fn fire(&mut self, room_id: &str, token: u64) -> bool {
        let live = matches!(
            &self.armed,
            Some(armed) if armed.token == token && armed.room_id == room_id
        );
        if live {
            self.armed = None;
        }
        live
    }

    /// Filter out ids already being marked and reserve the rest.
    pub(crate) fn claim(&mut self, candidate_ids: Vec<String>) -> Vec<String> {
        let claimed: Vec<String> = candidate_ids
            .into_iter()
            .filter(|id| !self.in_flight.contains(id))
            .collect();
        self.in_flight.extend(claimed.iter().cloned());
        claimed
    }

    pub(crate) fn release(&mut self, ids: &[String]) {
        for id in ids {
            self.in_flight.remove(id);
        }
    }

    pub(crate) fn is_armed_for(&self, room_id: &str) -> bool {
        self.armed
            .as_ref()
            .map(|a| a.room_id == room_id)
            .unwrap_or(false)
    }

    pub(crate) fn clear(&mut self) {
        self.disarm();
        self.in_flight.clear();
    }
}
