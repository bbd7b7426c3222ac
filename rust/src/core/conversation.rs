// Selected-thread controller: history loading, live messages, sending.

use super::*;

use crate::api::WireMessage;
use crate::state::{now_seconds, MessageDelivery};
use crate::transport::OutgoingReply;

/// A live or optimistic message held back while the selected thread's
/// history is loading.
pub(super) struct Buffered {
    pub(super) message: ChatMessage,
    /// `message.id` came from the server rather than being made up locally.
    pub(super) has_server_id: bool,
}

impl Buffered {
    fn from_wire(wire: WireMessage, me: &str) -> Self {
        let has_server_id = wire.id.is_some();
        Self {
            message: wire.into_chat_message(me),
            has_server_id,
        }
    }

    /// Whether `history` is the server's copy of this message. Without a
    /// server id or client id to compare, fall back to sender, content and
    /// timestamp.
    fn is_copy_of(&self, history: &ChatMessage) -> bool {
        let m = &self.message;
        if let (Some(a), Some(b)) = (&m.client_id, &history.client_id) {
            return a == b;
        }
        if self.has_server_id {
            return m.id == history.id;
        }
        m.sender_id == history.sender_id
            && m.content == history.content
            && m.created_at == history.created_at
    }
}

impl AppCore {
    pub(super) fn select_peer(&mut self, peer_id: &str) {
        let peer_id = peer_id.trim();
        if peer_id.is_empty() || !self.is_logged_in() {
            return;
        }

        // A new token invalidates any history fetch still in flight.
        self.history_token += 1;
        let token = self.history_token;

        self.store.select_peer(peer_id);
        self.store.reset_unread(peer_id);
        self.live_buffer.clear();
        self.mark_dirty();

        let Some((session, api)) = self.session_api() else {
            // Offline: nothing to fetch, the thread is what we already hold.
            self.loading_history = false;
            return;
        };
        self.loading_history = true;
        tracing::debug!(peer_id, token, "history fetch");

        let tx = self.core_sender.clone();
        let peer = peer_id.to_string();
        let read_fut = api.mark_read(peer_id);
        let history_fut = api.message_history(peer_id);

        let read_tx = tx.clone();
        let read_peer = peer.clone();
        self.runtime.spawn(async move {
            let result = read_fut.await.map_err(|e| e.to_string());
            AppCore::send_internal(
                &read_tx,
                InternalEvent::MarkReadResult {
                    session,
                    peer_id: Some(read_peer),
                    result,
                },
            );
        });
        self.runtime.spawn(async move {
            let result = history_fut.await.map_err(|e| e.to_string());
            AppCore::send_internal(
                &tx,
                InternalEvent::HistoryLoaded {
                    token,
                    peer_id: peer,
                    result,
                },
            );
        });
    }

    pub(super) fn close_thread(&mut self) {
        if self.store.selected().is_none() {
            return;
        }
        self.history_token += 1;
        self.loading_history = false;
        self.live_buffer.clear();
        self.store.clear_selection();
        self.mark_dirty();
    }

    pub(super) fn handle_history_loaded(
        &mut self,
        token: u64,
        peer_id: String,
        result: Result<Vec<WireMessage>, String>,
    ) {
        if token != self.history_token || self.store.selected() != Some(peer_id.as_str()) {
            tracing::debug!(token, current = self.history_token, "stale history dropped");
            return;
        }
        let Some(me) = self.self_user_id() else {
            return;
        };

        let mut messages: Vec<ChatMessage> = match result {
            Ok(wire) => wire.into_iter().map(|m| m.into_chat_message(&me)).collect(),
            Err(e) => {
                tracing::warn!(peer_id = %peer_id, err = %e, "history fetch failed");
                Vec::new()
            }
        };

        // Replay what arrived while loading. Each history entry absorbs at
        // most one buffered copy; buffered entries never dedup each other.
        let history_len = messages.len();
        let mut absorbed = vec![false; history_len];
        for buffered in std::mem::take(&mut self.live_buffer) {
            let hit =
                (0..history_len).find(|&i| !absorbed[i] && buffered.is_copy_of(&messages[i]));
            match hit {
                Some(i) => {
                    absorbed[i] = true;
                    if messages[i].client_id.is_none() {
                        messages[i].client_id = buffered.message.client_id;
                    }
                }
                None => messages.push(buffered.message),
            }
        }

        self.store.set_thread(&peer_id, messages);
        self.loading_history = false;
        self.mark_dirty();
    }

    pub(super) fn handle_inbound(&mut self, wire: WireMessage) {
        let Some(me) = self.self_user_id() else {
            return;
        };
        if wire.sender_id == me {
            self.handle_own_echo(wire, &me);
            return;
        }

        let sender = wire.sender_id.clone();
        if self.store.selected() == Some(sender.as_str()) {
            if self.loading_history {
                self.live_buffer.push(Buffered::from_wire(wire, &me));
                self.mark_dirty();
                return;
            }
            let message = wire.into_chat_message(&me);
            if !self.store.thread(&sender).iter().any(|m| m.id == message.id) {
                self.store.append_message(&sender, message);
            }
            self.mark_dirty();
            return;
        }

        self.store.increment_unread(&sender);
        self.mark_dirty();
        if !self.store.contains_peer(&sender) {
            tracing::debug!(sender = %sender, "message from unknown peer; refreshing");
            self.refresh_peers();
        }
    }

    /// The server may reflect our own sends back to us. Confirm the optimistic
    /// copy when we can correlate it, and never count it as unread.
    fn handle_own_echo(&mut self, wire: WireMessage, me: &str) {
        let created_at = wire.created_at.unwrap_or_else(now_seconds);
        let target = wire
            .receiver_id
            .clone()
            .or_else(|| self.store.selected().map(str::to_string));

        if let (Some(client_id), Some(peer)) = (wire.client_id.as_deref(), target.as_deref()) {
            if self
                .store
                .confirm_pending(peer, client_id, wire.id.as_deref(), created_at)
            {
                self.mark_dirty();
                return;
            }
            if let Some(b) = self.live_buffer.iter_mut().find(|b| {
                b.message.delivery == MessageDelivery::Pending
                    && b.message.client_id.as_deref() == Some(client_id)
            }) {
                let m = &mut b.message;
                m.delivery = MessageDelivery::Confirmed;
                if let Some(id) = &wire.id {
                    m.id = id.clone();
                    b.has_server_id = true;
                }
                m.created_at = created_at;
                self.mark_dirty();
                return;
            }
        }

        // Sent from another device: show it if it belongs to the open thread.
        let Some(peer) = wire.receiver_id.clone() else {
            return;
        };
        if self.store.selected() != Some(peer.as_str()) {
            return;
        }
        if self.loading_history {
            self.live_buffer.push(Buffered::from_wire(wire, me));
            self.mark_dirty();
            return;
        }
        let message = wire.into_chat_message(me);
        if !self.store.thread(&peer).iter().any(|m| m.same_as(&message)) {
            self.store.append_message(&peer, message);
        }
        self.mark_dirty();
    }

    pub(super) fn send_message(&mut self, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        let Some(peer_id) = self.store.selected().map(str::to_string) else {
            tracing::debug!("send without an open thread ignored");
            return;
        };
        let Some(sess) = self.session.as_ref() else {
            return;
        };

        let client_id = uuid::Uuid::new_v4().to_string();
        match &sess.push {
            Some(push) => push.send(OutgoingReply {
                receiver_id: peer_id.clone(),
                content: content.to_string(),
                client_id: client_id.clone(),
            }),
            None => tracing::warn!(peer_id = %peer_id, "no push channel; reply not sent"),
        }

        let message = ChatMessage {
            id: client_id.clone(),
            sender_id: sess.user_id.clone(),
            content: content.to_string(),
            created_at: now_seconds(),
            is_read: false,
            is_mine: true,
            delivery: MessageDelivery::Pending,
            client_id: Some(client_id),
        };
        if self.loading_history {
            self.live_buffer.push(Buffered {
                message,
                has_server_id: false,
            });
        } else {
            self.store.append_message(&peer_id, message);
        }
        self.mark_dirty();
    }
}
