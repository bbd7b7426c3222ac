// Session lifecycle + push channel wiring.

use super::*;

use crate::state::ConnectionState;
use crate::transport::{PushEvent, PushHandler};

impl AppCore {
    pub(super) fn start_session(&mut self, user_id: String, auth_token: String) {
        // Tear down any existing session first.
        self.stop_session();

        self.session_seq += 1;
        let id = self.session_seq;
        tracing::info!(session = id, user_id = %user_id, "start_session");

        let api = if self.network_enabled() {
            match (self.backends.api_factory)(&auth_token) {
                Ok(api) => Some(api),
                Err(e) => {
                    tracing::error!(%e, "rest client unavailable");
                    None
                }
            }
        } else {
            tracing::info!("network disabled; session runs offline");
            None
        };

        self.session = Some(Session {
            id,
            user_id: user_id.clone(),
            auth_token,
            api,
            push: None,
            alive: Arc::new(AtomicBool::new(true)),
        });

        self.state.auth = AuthState::LoggedIn { user_id };
        self.state.server_unread_total = None;
        self.connect_push();
        self.mark_dirty();

        self.refresh_peers();
        self.refresh_unread_count(None);
        self.start_poll_loop();
    }

    pub(super) fn stop_session(&mut self) {
        let Some(sess) = self.session.take() else {
            return;
        };
        tracing::info!(session = sess.id, "stop_session");
        sess.alive.store(false, Ordering::SeqCst);
        if let Some(push) = sess.push {
            push.disconnect();
        }

        // Invalidate every in-flight result tied to the old session.
        self.push_epoch += 1;
        self.history_token += 1;
        self.peers_token += 1;
        self.peers_in_flight = false;
        self.peers_refresh_queued = false;
        self.loading_history = false;
        self.live_buffer.clear();
        self.store.clear();

        let rev = self.state.rev;
        self.state = AppState::empty();
        self.state.rev = rev;
        self.mark_dirty();
    }

    /// (Re)open the push channel under a fresh epoch. Any previous
    /// connection is closed and its late events are ignored.
    pub(super) fn connect_push(&mut self) {
        self.push_epoch += 1;
        let epoch = self.push_epoch;

        let network = self.network_enabled();
        let connector = self.backends.push_connector.clone();
        let handle = self.runtime.handle().clone();
        let tx = self.core_sender.clone();

        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if let Some(old) = sess.push.take() {
            old.disconnect();
        }

        let Some(connector) = connector.filter(|_| network) else {
            self.state.connection = ConnectionState::Disconnected;
            self.mark_dirty();
            return;
        };

        let handler: PushHandler = Arc::new(move |event| {
            let internal = match event {
                PushEvent::MessageReceived(message) => {
                    InternalEvent::PushMessage { epoch, message }
                }
                PushEvent::StateChanged(state) => InternalEvent::ConnectionChanged { epoch, state },
            };
            AppCore::send_internal(&tx, internal);
        });
        sess.push = Some(connector.connect(&handle, &sess.auth_token, handler));
        self.state.connection = ConnectionState::Connecting;
        self.mark_dirty();
    }

    pub(super) fn handle_connection_changed(&mut self, state: ConnectionState) {
        if self.state.connection == state {
            return;
        }
        let recovered = matches!(self.state.connection, ConnectionState::Reconnecting { .. })
            && state.is_connected();
        match &state {
            ConnectionState::Failed { reason } => tracing::warn!(%reason, "push channel failed"),
            other => tracing::info!(state = ?other, "push channel"),
        }
        self.state.connection = state;
        self.mark_dirty();

        // Anything pushed while we were away only shows up in the REST view.
        if recovered {
            self.refresh_peers();
        }
    }

    pub(super) fn foregrounded(&mut self) {
        if !self.is_logged_in() {
            return;
        }
        self.refresh_peers();
        if self.state.connection.is_terminal() {
            tracing::info!("foregrounded with push channel down; reconnecting");
            self.connect_push();
        }
    }

    fn start_poll_loop(&mut self) {
        let Some(interval) = self.config.poll_interval() else {
            return;
        };
        if !self.network_enabled() {
            return;
        }
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let session = sess.id;
        let alive = sess.alive.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the session start already refreshed.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !alive.load(Ordering::SeqCst) {
                    break;
                }
                AppCore::send_internal(&tx, InternalEvent::PollTick { session });
            }
        });
    }
}
