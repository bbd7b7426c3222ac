// Peer list refresh + unread counters.

use super::*;

use crate::api::Peer;

impl AppCore {
    /// Reload the peer list. Coalesced: while a fetch is in flight, further
    /// requests collapse into one follow-up fetch.
    pub(super) fn refresh_peers(&mut self) {
        let Some((_, api)) = self.session_api() else {
            return;
        };
        if self.peers_in_flight {
            self.peers_refresh_queued = true;
            return;
        }

        self.peers_token += 1;
        let token = self.peers_token;
        self.peers_in_flight = true;
        self.state.busy.loading_peers = true;
        self.mark_dirty();

        let tx = self.core_sender.clone();
        let fut = api.list_peers();
        self.runtime.spawn(async move {
            let result = fut.await.map_err(|e| e.to_string());
            AppCore::send_internal(&tx, InternalEvent::PeersLoaded { token, result });
        });
    }

    pub(super) fn handle_peers_loaded(&mut self, token: u64, result: Result<Vec<Peer>, String>) {
        if token != self.peers_token {
            return;
        }
        self.peers_in_flight = false;
        self.state.busy.loading_peers = false;
        self.mark_dirty();

        match result {
            Ok(peers) => {
                tracing::debug!(count = peers.len(), "peers loaded");
                self.store.set_peers(peers);
                // The open thread is being read right now.
                if let Some(selected) = self.store.selected().map(str::to_string) {
                    self.store.reset_unread(&selected);
                }
            }
            Err(e) => tracing::warn!(err = %e, "peer list fetch failed; keeping previous list"),
        }

        if std::mem::take(&mut self.peers_refresh_queued) {
            self.refresh_peers();
        }
    }

    pub(super) fn mark_all_read(&mut self) {
        if !self.is_logged_in() {
            return;
        }
        self.store.reset_all_unread();
        self.state.server_unread_total = Some(0);
        self.mark_dirty();

        let Some((session, api)) = self.session_api() else {
            return;
        };
        let tx = self.core_sender.clone();
        let fut = api.mark_all_read();
        self.runtime.spawn(async move {
            let result = fut.await.map_err(|e| e.to_string());
            AppCore::send_internal(
                &tx,
                InternalEvent::MarkReadResult {
                    session,
                    peer_id: None,
                    result,
                },
            );
        });
    }

    /// `Some(peer)` asks for that peer's count, `None` for the user's total.
    pub(super) fn refresh_unread_count(&mut self, peer_id: Option<String>) {
        let Some((session, api)) = self.session_api() else {
            return;
        };
        let fut = match peer_id.as_deref() {
            Some(peer) => api.unread_count(peer),
            None => api.total_unread_count(),
        };
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = fut.await.map_err(|e| e.to_string());
            AppCore::send_internal(
                &tx,
                InternalEvent::UnreadCountFetched {
                    session,
                    peer_id,
                    result,
                },
            );
        });
    }

    pub(super) fn handle_unread_count(&mut self, peer_id: Option<String>, result: Result<u32, String>) {
        let count = match result {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(?peer_id, err = %e, "unread count fetch failed");
                return;
            }
        };
        match peer_id {
            Some(peer) => {
                // The open thread stays at zero regardless of what the server thinks.
                if self.store.selected() == Some(peer.as_str()) {
                    return;
                }
                self.store.set_unread(&peer, count);
            }
            None => self.state.server_unread_total = Some(count),
        }
        self.mark_dirty();
    }
}
