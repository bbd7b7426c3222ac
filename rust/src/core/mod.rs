mod config;
mod conversation;
mod session;
mod unread;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::api::{ChatApi, ChatApiFactory, HttpChatApi};
use crate::state::{AppState, AuthState, ChatMessage, ThreadPhase, ThreadViewState};
use crate::store::ConversationStore;
use crate::transport::{PushConnection, PushConnector, SocketIoConnector};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::{load_app_config, AppConfig};

/// Network collaborators of the conversation core.
#[derive(Clone)]
pub struct Backends {
    pub api_factory: ChatApiFactory,
    /// `None` leaves the session without a push channel.
    pub push_connector: Option<Arc<dyn PushConnector>>,
}

impl Backends {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        let api_factory = HttpChatApi::factory(config.api_base_url(), config.request_timeout());
        let socket_url = config.socket_url();
        let push_connector = match SocketIoConnector::new(&socket_url, config.reconnect_policy()) {
            Ok(c) => Some(Arc::new(c) as Arc<dyn PushConnector>),
            Err(e) => {
                tracing::error!(%socket_url, %e, "push connector unavailable");
                None
            }
        };
        Self {
            api_factory,
            push_connector,
        }
    }
}

struct Session {
    id: u64,
    user_id: String,
    auth_token: String,
    api: Option<Arc<dyn ChatApi>>,
    push: Option<Box<dyn PushConnection>>,
    alive: Arc<AtomicBool>,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    dirty: bool,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    backends: Backends,

    store: ConversationStore,
    session: Option<Session>,
    session_seq: u64,
    push_epoch: u64,

    // Selected-thread bookkeeping. Live and optimistic messages for the
    // selected peer are buffered while its history fetch is in flight.
    history_token: u64,
    loading_history: bool,
    live_buffer: Vec<conversation::Buffered>,

    peers_token: u64,
    peers_in_flight: bool,
    peers_refresh_queued: bool,
}

impl AppCore {
    pub(crate) fn with_backends(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        config: AppConfig,
        shared_state: Arc<RwLock<AppState>>,
        backends: Backends,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            dirty: false,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            backends,
            store: ConversationStore::new(),
            session: None,
            session_seq: 0,
            push_epoch: 0,
            history_token: 0,
            loading_history: false,
            live_buffer: Vec::new(),
            peers_token: 0,
            peers_in_flight: false,
            peers_refresh_queued: false,
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Rebuild the derived view from the store and publish one snapshot.
    fn emit_state(&mut self) {
        self.state.peers = self.store.peer_summaries();
        self.state.unread_counts = self.store.unread_map().clone();
        self.state.total_unread = self.store.total_unread();
        self.state.busy.loading_history = self.loading_history;
        self.state.current_thread = self.store.selected().map(|peer_id| {
            let mut messages = self.store.thread(peer_id).to_vec();
            let phase = if self.loading_history {
                messages.extend(self.live_buffer.iter().map(|b| b.message.clone()));
                ThreadPhase::LoadingHistory
            } else {
                ThreadPhase::Active
            };
            ThreadViewState {
                peer_id: peer_id.to_string(),
                phase,
                messages,
            }
        });

        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    fn self_user_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.user_id.clone())
    }

    fn session_api(&self) -> Option<(u64, Arc<dyn ChatApi>)> {
        let sess = self.session.as_ref()?;
        Some((sess.id, sess.api.clone()?))
    }

    fn send_internal(tx: &Sender<CoreMsg>, event: InternalEvent) {
        let _ = tx.send(CoreMsg::Internal(Box::new(event)));
    }

    /// Every message is applied completely before a single snapshot goes
    /// out, so observers never see a half-applied event.
    pub fn handle_message(&mut self, msg: CoreMsg) {
        self.dirty = false;
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it can contain the auth token.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
        if self.dirty {
            self.emit_state();
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            // Session
            AppAction::StartSession {
                user_id,
                auth_token,
            } => {
                let user_id = user_id.trim().to_string();
                if user_id.is_empty() {
                    tracing::warn!("start_session without user id");
                    return;
                }
                self.start_session(user_id, auth_token);
            }
            AppAction::EndSession => self.stop_session(),

            // Peers
            AppAction::RefreshPeers => self.refresh_peers(),
            AppAction::SelectPeer { peer_id } => self.select_peer(&peer_id),
            AppAction::CloseThread => self.close_thread(),

            // Messages
            AppAction::SendMessage { content } => self.send_message(&content),

            // Read state
            AppAction::MarkAllRead => self.mark_all_read(),
            AppAction::RefreshUnreadCount { peer_id } => self.refresh_unread_count(peer_id),

            // Lifecycle
            AppAction::Foregrounded => self.foregrounded(),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::PushMessage { epoch, message } => {
                // Ignore stale connections (e.g., end/start session while a socket drains).
                if epoch != self.push_epoch || !self.is_logged_in() {
                    return;
                }
                self.handle_inbound(message);
            }
            InternalEvent::ConnectionChanged { epoch, state } => {
                if epoch != self.push_epoch || !self.is_logged_in() {
                    return;
                }
                self.handle_connection_changed(state);
            }
            InternalEvent::PeersLoaded { token, result } => {
                self.handle_peers_loaded(token, result);
            }
            InternalEvent::HistoryLoaded {
                token,
                peer_id,
                result,
            } => {
                self.handle_history_loaded(token, peer_id, result);
            }
            InternalEvent::MarkReadResult {
                session,
                peer_id,
                result,
            } => match result {
                Ok(true) => tracing::debug!(session, ?peer_id, "mark_read acknowledged"),
                Ok(false) => tracing::warn!(session, ?peer_id, "mark_read not acknowledged"),
                Err(e) => tracing::warn!(session, ?peer_id, err = %e, "mark_read failed"),
            },
            InternalEvent::UnreadCountFetched {
                session,
                peer_id,
                result,
            } => {
                if self.session.as_ref().map(|s| s.id) != Some(session) {
                    return;
                }
                self.handle_unread_count(peer_id, result);
            }
            InternalEvent::PollTick { session } => {
                if self.session.as_ref().map(|s| s.id) != Some(session) {
                    return;
                }
                if !self.state.connection.is_connected() {
                    tracing::debug!("poll: push channel down, refreshing peers");
                    self.refresh_peers();
                }
            }
        }
    }
}
