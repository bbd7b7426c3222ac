use std::collections::HashMap;

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub connection: ConnectionState,
    pub busy: BusyState,
    pub peers: Vec<PeerSummary>,
    pub current_thread: Option<ThreadViewState>,
    /// Every tracked counter, including senders not (yet) in `peers`.
    pub unread_counts: HashMap<String, u32>,
    /// Sum of the local per-peer unread counters.
    pub total_unread: u32,
    /// Last self-wide unread count reported by the server, if fetched.
    pub server_unread_total: Option<u32>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::LoggedOut,
            connection: ConnectionState::Disconnected,
            busy: BusyState::idle(),
            peers: vec![],
            current_thread: None,
            unread_counts: HashMap::new(),
            total_unread: 0,
            server_unread_total: None,
        }
    }

    pub fn unread_for(&self, peer_id: &str) -> u32 {
        self.unread_counts.get(peer_id).copied().unwrap_or(0)
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user_id: String },
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// True when the transport has stopped trying on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed { .. })
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub loading_peers: bool,
    pub loading_history: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            loading_peers: false,
            loading_history: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct PeerSummary {
    pub peer_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub unread_count: u32,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadPhase {
    LoadingHistory,
    Active,
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ThreadViewState {
    pub peer_id: String,
    pub phase: ThreadPhase,
    pub messages: Vec<ChatMessage>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageDelivery {
    /// Came from the server (history or push).
    Confirmed,
    /// Optimistic local copy of an outgoing message; no echo seen yet.
    Pending,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: i64,
    pub is_read: bool,
    pub is_mine: bool,
    pub delivery: MessageDelivery,
    pub client_id: Option<String>,
}

impl ChatMessage {
    /// Same logical message by server id or client correlation id.
    pub(crate) fn same_as(&self, other: &ChatMessage) -> bool {
        if let (Some(a), Some(b)) = (&self.client_id, &other.client_id) {
            return a == b;
        }
        self.id == other.id
    }
}

pub fn now_seconds() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
