#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Session
    StartSession {
        user_id: String,
        auth_token: String,
    },
    EndSession,

    // Peers
    RefreshPeers,
    SelectPeer {
        peer_id: String,
    },
    CloseThread,

    // Messages
    SendMessage {
        content: String,
    },

    // Read state
    MarkAllRead,
    RefreshUnreadCount {
        peer_id: Option<String>,
    },

    // Lifecycle
    Foregrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes the auth token).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::StartSession { .. } => "StartSession",
            AppAction::EndSession => "EndSession",

            // Peers
            AppAction::RefreshPeers => "RefreshPeers",
            AppAction::SelectPeer { .. } => "SelectPeer",
            AppAction::CloseThread => "CloseThread",

            // Messages
            AppAction::SendMessage { .. } => "SendMessage",

            // Read state
            AppAction::MarkAllRead => "MarkAllRead",
            AppAction::RefreshUnreadCount { .. } => "RefreshUnreadCount",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_never_carries_the_token() {
        let action = AppAction::StartSession {
            user_id: "42".into(),
            auth_token: "secret-token".into(),
        };
        assert_eq!(action.tag(), "StartSession");
        assert!(!action.tag().contains("secret"));
    }
}
