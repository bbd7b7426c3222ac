use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use serde_json::json;
use teamwork_chat_core::api::{ChatApi, HttpChatApi, WireMessage};
use teamwork_chat_core::transport::{
    OutgoingReply, PushConnection, PushConnector, PushEvent, PushHandler, ReconnectPolicy,
    SocketIoConnector,
};
use teamwork_chat_core::{
    AppAction, AppReconciler, AppUpdate, Backends, ConnectionState, FfiApp, format_relative_time,
};

#[derive(Debug, Parser)]
#[command(name = "teamwork-chat")]
#[command(about = "Teamwork chat CLI: peers, history, unread counters and live messages")]
struct Cli {
    /// REST API base URL
    #[arg(long, env = "TEAMWORK_API_URL", default_value = "http://localhost:5000/api")]
    api_url: String,

    /// Socket.IO server URL
    #[arg(long, env = "TEAMWORK_SOCKET_URL", default_value = "http://localhost:5000")]
    socket_url: String,

    /// Bearer token for both REST and the push channel
    #[arg(long, env = "TEAMWORK_TOKEN", hide_env_values = true)]
    token: String,

    /// Your own user id (marks your messages as `mine`)
    #[arg(long, env = "TEAMWORK_USER_ID", default_value = "")]
    user_id: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 15)]
    request_timeout: u64,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List conversation peers with their unread counts
    Peers,

    /// Print the message history with one peer
    History {
        #[arg(long)]
        peer: String,
    },

    /// Send a message to a peer over the push channel
    Send {
        #[arg(long)]
        peer: String,

        #[arg(long)]
        content: String,
    },

    /// Print incoming messages as JSON lines (runs until --timeout)
    Listen {
        /// Timeout in seconds (0 = run forever)
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },

    /// Unread count for one peer, or the total when --peer is omitted
    Unread {
        #[arg(long)]
        peer: Option<String>,
    },

    /// Mark the conversation with a peer as read
    MarkRead {
        #[arg(long)]
        peer: String,
    },

    /// Mark every conversation as read
    MarkAllRead,

    /// Run the full conversation core and print unread totals as they change
    Watch {
        /// State directory (logs and teamwork_config.json)
        #[arg(long, default_value = ".teamwork-chat")]
        state_dir: PathBuf,

        /// Timeout in seconds (0 = run forever)
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.token.trim().is_empty() {
        return Err(anyhow!("--token must not be empty"));
    }

    match &cli.cmd {
        Command::Peers => cmd_peers(&cli).await,
        Command::History { peer } => cmd_history(&cli, peer).await,
        Command::Send { peer, content } => cmd_send(&cli, peer, content).await,
        Command::Listen { timeout } => cmd_listen(&cli, *timeout).await,
        Command::Unread { peer } => cmd_unread(&cli, peer.as_deref()).await,
        Command::MarkRead { peer } => cmd_mark_read(&cli, peer).await,
        Command::MarkAllRead => cmd_mark_all_read(&cli).await,
        Command::Watch { state_dir, timeout } => cmd_watch(&cli, state_dir, *timeout).await,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn api(cli: &Cli) -> anyhow::Result<HttpChatApi> {
    HttpChatApi::new(
        &cli.api_url,
        &cli.token,
        Duration::from_secs(cli.request_timeout),
    )
    .context("build REST client")
}

fn connector(cli: &Cli) -> anyhow::Result<SocketIoConnector> {
    SocketIoConnector::new(&cli.socket_url, ReconnectPolicy::default())
        .context("build push connector")
}

/// Open the push channel and wait until it joins (or fails).
async fn connect_push(
    cli: &Cli,
    on_message: impl Fn(WireMessage) + Send + Sync + 'static,
) -> anyhow::Result<Box<dyn PushConnection>> {
    let (state_tx, mut state_rx) = tokio::sync::mpsc::unbounded_channel::<ConnectionState>();
    let handler: PushHandler = Arc::new(move |event| match event {
        PushEvent::MessageReceived(msg) => on_message(msg),
        PushEvent::StateChanged(state) => {
            let _ = state_tx.send(state);
        }
    });
    let conn = connector(cli)?.connect(&tokio::runtime::Handle::current(), &cli.token, handler);

    let joined = async {
        while let Some(state) = state_rx.recv().await {
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Failed { reason } => return Err(anyhow!("push channel: {reason}")),
                ConnectionState::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "push channel reconnecting")
                }
                _ => {}
            }
        }
        Err(anyhow!("push channel closed"))
    };
    tokio::time::timeout(Duration::from_secs(30), joined)
        .await
        .context("timed out waiting for push channel")??;
    Ok(conn)
}

/// Every send gets its own correlation id so server echoes can be matched.
fn outgoing_reply(peer: &str, content: &str) -> OutgoingReply {
    OutgoingReply {
        receiver_id: peer.to_string(),
        content: content.to_string(),
        client_id: uuid::Uuid::new_v4().to_string(),
    }
}

fn message_json(cli: &Cli, msg: WireMessage) -> serde_json::Value {
    let m = msg.into_chat_message(&cli.user_id);
    json!({
        "id": m.id,
        "sender_id": m.sender_id,
        "content": m.content,
        "created_at": m.created_at,
        "when": format_relative_time(m.created_at),
        "is_read": m.is_read,
        "mine": m.is_mine,
    })
}

fn print(v: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&v).expect("json encode"));
}

// ── Commands ────────────────────────────────────────────────────────────────

async fn cmd_peers(cli: &Cli) -> anyhow::Result<()> {
    let peers = api(cli)?.list_peers().await.context("list peers")?;
    let out: Vec<serde_json::Value> = peers
        .into_iter()
        .map(|p| {
            json!({
                "peer_id": p.id,
                "name": p.display_name,
                "avatar": p.avatar_url,
                "unread": p.unread_messages,
            })
        })
        .collect();
    print(json!({ "peers": out }));
    Ok(())
}

async fn cmd_history(cli: &Cli, peer: &str) -> anyhow::Result<()> {
    let msgs = api(cli)?
        .message_history(peer)
        .await
        .with_context(|| format!("history with {peer}"))?;
    let out: Vec<serde_json::Value> = msgs.into_iter().map(|m| message_json(cli, m)).collect();
    print(json!({ "peer_id": peer, "messages": out }));
    Ok(())
}

async fn cmd_send(cli: &Cli, peer: &str, content: &str) -> anyhow::Result<()> {
    let content = content.trim();
    if content.is_empty() {
        return Err(anyhow!("--content must not be empty"));
    }
    let conn = connect_push(cli, |_| {}).await?;
    let reply = outgoing_reply(peer, content);
    let client_id = reply.client_id.clone();
    conn.send(reply);
    // The emit has no ack; give the socket a moment to flush before closing.
    tokio::time::sleep(Duration::from_millis(500)).await;
    conn.disconnect();
    print(json!({ "sent": true, "peer_id": peer, "client_id": client_id }));
    Ok(())
}

async fn cmd_listen(cli: &Cli, timeout_sec: u64) -> anyhow::Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<WireMessage>();
    let conn = connect_push(cli, move |msg| {
        let _ = tx.send(msg);
    })
    .await?;

    let deadline = if timeout_sec == 0 {
        None
    } else {
        Some(tokio::time::Instant::now() + Duration::from_secs(timeout_sec))
    };

    loop {
        let msg = if let Some(dl) = deadline {
            match tokio::time::timeout_at(dl, rx.recv()).await {
                Ok(Some(m)) => m,
                Ok(None) | Err(_) => break,
            }
        } else {
            match rx.recv().await {
                Some(m) => m,
                None => break,
            }
        };
        let mut line = message_json(cli, msg);
        line["type"] = json!("message");
        println!("{}", serde_json::to_string(&line)?);
    }

    conn.disconnect();
    Ok(())
}

async fn cmd_unread(cli: &Cli, peer: Option<&str>) -> anyhow::Result<()> {
    let api = api(cli)?;
    match peer {
        Some(peer) => {
            let count = api.unread_count(peer).await.context("unread count")?;
            print(json!({ "peer_id": peer, "unread": count }));
        }
        None => {
            let count = api.total_unread_count().await.context("total unread count")?;
            print(json!({ "unread": count }));
        }
    }
    Ok(())
}

async fn cmd_mark_read(cli: &Cli, peer: &str) -> anyhow::Result<()> {
    let ok = api(cli)?.mark_read(peer).await.context("mark read")?;
    print(json!({ "peer_id": peer, "success": ok }));
    Ok(())
}

async fn cmd_mark_all_read(cli: &Cli) -> anyhow::Result<()> {
    let ok = api(cli)?.mark_all_read().await.context("mark all read")?;
    print(json!({ "success": ok }));
    Ok(())
}

struct ChannelReconciler(tokio::sync::mpsc::UnboundedSender<AppUpdate>);

impl AppReconciler for ChannelReconciler {
    fn reconcile(&self, update: AppUpdate) {
        let _ = self.0.send(update);
    }
}

async fn cmd_watch(cli: &Cli, state_dir: &Path, timeout_sec: u64) -> anyhow::Result<()> {
    if cli.user_id.trim().is_empty() {
        return Err(anyhow!("watch needs --user-id"));
    }
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("create state dir {}", state_dir.display()))?;

    let backends = Backends {
        api_factory: HttpChatApi::factory(
            cli.api_url.clone(),
            Duration::from_secs(cli.request_timeout),
        ),
        push_connector: Some(Arc::new(connector(cli)?) as Arc<dyn PushConnector>),
    };
    let app = FfiApp::new_with_backends(state_dir.to_string_lossy().to_string(), backends);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    app.listen_for_updates(Box::new(ChannelReconciler(tx)));
    app.dispatch(AppAction::StartSession {
        user_id: cli.user_id.clone(),
        auth_token: cli.token.clone(),
    });

    let deadline = if timeout_sec == 0 {
        None
    } else {
        Some(tokio::time::Instant::now() + Duration::from_secs(timeout_sec))
    };

    let mut last_line = String::new();
    loop {
        let update = if let Some(dl) = deadline {
            match tokio::time::timeout_at(dl, rx.recv()).await {
                Ok(Some(u)) => u,
                Ok(None) | Err(_) => break,
            }
        } else {
            match rx.recv().await {
                Some(u) => u,
                None => break,
            }
        };
        let AppUpdate::FullState(state) = update;
        let line = json!({
            "type": "unread",
            "connection": format!("{:?}", state.connection),
            "total": state.total_unread,
            "server_total": state.server_unread_total,
            "peers": state.peers.iter().filter(|p| p.unread_count > 0).map(|p| {
                json!({ "peer_id": p.peer_id, "name": p.display_name, "unread": p.unread_count })
            }).collect::<Vec<_>>(),
        })
        .to_string();
        // Only print when something visible changed.
        if line != last_line {
            println!("{line}");
            last_line = line;
        }
    }

    app.dispatch(AppAction::EndSession);
    Ok(())
}
