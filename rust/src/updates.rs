use crate::record::MessageRecord;
use crate::state::AppState;
use crate::transport::TransportError;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Send pipeline
    DispatchFinished {
        room_id: String,
        temporary_id: String,
        result: Result<MessageRecord, TransportError>,
    },
    BackoffElapsed {
        temporary_id: String,
        token: u64,
    },

    // Read receipts
    ReadDebounceElapsed {
        room_id: String,
        token: u64,
    },
    MarkReadFinished {
        room_id: String,
        message_ids: Vec<String>,
        result: Result<(), TransportError>,
    },

    // History paging
    HistoryFetched {
        room_id: String,
        limit: u32,
        older: bool,
        result: Result<Vec<MessageRecord>, TransportError>,
    },

    // Real-time channel
    PushReceived(MessageRecord),
}
