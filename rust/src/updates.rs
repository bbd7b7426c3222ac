use crate::api::{Peer, WireMessage};
use crate::state::{AppState, ConnectionState};
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
    // Push channel. `epoch` identifies the connection that produced the event.
    PushMessage {
        epoch: u64,
        message: WireMessage,
    },
    ConnectionChanged {
        epoch: u64,
        state: ConnectionState,
    },

    // Async REST results. `Err` carries a log-ready description.
    PeersLoaded {
        token: u64,
        result: Result<Vec<Peer>, String>,
    },
    HistoryLoaded {
        token: u64,
        peer_id: String,
        result: Result<Vec<WireMessage>, String>,
    },
    MarkReadResult {
        session: u64,
        peer_id: Option<String>,
        result: Result<bool, String>,
    },
    UnreadCountFetched {
        session: u64,
        peer_id: Option<String>,
        result: Result<u32, String>,
    },

    // Polling fallback tick.
    PollTick {
        session: u64,
    },
}
