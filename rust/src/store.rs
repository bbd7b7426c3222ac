//! In-memory conversation state for one session.
//!
//! Pure container: no I/O, no locking. The actor owns exactly one store and
//! mutates it from a single thread, so every operation is synchronous.

use std::collections::HashMap;

use crate::api::Peer;
use crate::state::{ChatMessage, MessageDelivery, PeerSummary};

#[derive(Debug, Default)]
pub struct ConversationStore {
    peers: Vec<Peer>,
    threads: HashMap<String, Vec<ChatMessage>>,
    unread: HashMap<String, u32>,
    selected: Option<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the peer list and reseed unread counters from the server's
    /// per-peer `unreadMessages`. Peers reporting zero get no entry.
    pub fn set_peers(&mut self, peers: Vec<Peer>) {
        self.unread.clear();
        for p in &peers {
            if p.unread_messages > 0 {
                self.unread.insert(p.id.clone(), p.unread_messages);
            }
        }
        self.peers = peers;
    }

    pub fn set_thread(&mut self, peer_id: &str, messages: Vec<ChatMessage>) {
        self.threads.insert(peer_id.to_string(), messages);
    }

    /// Append to the selected peer's thread. Returns `false` (and leaves the
    /// store untouched) when `peer_id` is not the selected peer; the caller
    /// should count it as unread instead.
    pub fn append_message(&mut self, peer_id: &str, message: ChatMessage) -> bool {
        if self.selected.as_deref() != Some(peer_id) {
            return false;
        }
        self.threads
            .entry(peer_id.to_string())
            .or_default()
            .push(message);
        true
    }

    pub fn increment_unread(&mut self, peer_id: &str) {
        *self.unread.entry(peer_id.to_string()).or_insert(0) += 1;
    }

    pub fn reset_unread(&mut self, peer_id: &str) {
        self.unread.insert(peer_id.to_string(), 0);
    }

    pub fn set_unread(&mut self, peer_id: &str, count: u32) {
        self.unread.insert(peer_id.to_string(), count);
    }

    pub fn reset_all_unread(&mut self) {
        for v in self.unread.values_mut() {
            *v = 0;
        }
    }

    /// Mark `peer_id` active. The thread is left as-is; the controller
    /// repopulates it from the history fetch.
    pub fn select_peer(&mut self, peer_id: &str) {
        self.selected = Some(peer_id.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Swap a pending optimistic message for its server-confirmed echo.
    /// Returns `false` when no pending message carries `client_id`.
    pub fn confirm_pending(
        &mut self,
        peer_id: &str,
        client_id: &str,
        server_id: Option<&str>,
        created_at: i64,
    ) -> bool {
        let Some(thread) = self.threads.get_mut(peer_id) else {
            return false;
        };
        let Some(m) = thread.iter_mut().find(|m| {
            m.delivery == MessageDelivery::Pending && m.client_id.as_deref() == Some(client_id)
        }) else {
            return false;
        };
        m.delivery = MessageDelivery::Confirmed;
        if let Some(id) = server_id {
            m.id = id.to_string();
        }
        m.created_at = created_at;
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn thread(&self, peer_id: &str) -> &[ChatMessage] {
        self.threads.get(peer_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn unread(&self, peer_id: &str) -> u32 {
        self.unread.get(peer_id).copied().unwrap_or(0)
    }

    pub fn unread_map(&self) -> &HashMap<String, u32> {
        &self.unread
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn contains_peer(&self, peer_id: &str) -> bool {
        self.peers.iter().any(|p| p.id == peer_id)
    }

    /// Peer list with live unread badges, in server order.
    pub fn peer_summaries(&self) -> Vec<PeerSummary> {
        self.peers
            .iter()
            .map(|p| PeerSummary {
                peer_id: p.id.clone(),
                display_name: p.display_name.clone(),
                avatar_url: p.avatar_url.clone(),
                unread_count: self.unread(&p.id),
            })
            .collect()
    }
}
