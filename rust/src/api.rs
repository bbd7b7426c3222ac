// REST backend: wire types + HTTP client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{RequestBuilder, Url};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};

use crate::state::{now_seconds, ChatMessage, MessageDelivery};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid api url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Http(e) if e.is_timeout())
    }
}

/// A conversation counterpart as reported by "list peers".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    #[serde(alias = "_id", alias = "userId", deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "name", alias = "fullName", alias = "username", default)]
    pub display_name: String,
    #[serde(rename = "avatar", alias = "profileImage", default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub unread_messages: u32,
}

/// Message shape shared by the history endpoint and the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default, alias = "_id", deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(alias = "sender", deserialize_with = "de_id")]
    pub sender_id: String,
    #[serde(default, alias = "receiver", deserialize_with = "de_opt_id")]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl WireMessage {
    pub fn into_chat_message(self, self_user_id: &str) -> ChatMessage {
        let id = self
            .id
            .or_else(|| self.client_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        ChatMessage {
            id,
            is_mine: self.sender_id == self_user_id,
            sender_id: self.sender_id,
            content: self.content,
            created_at: self.created_at.unwrap_or_else(now_seconds),
            is_read: self.is_read,
            delivery: MessageDelivery::Confirmed,
            client_id: self.client_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SuccessEnvelope {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct CountEnvelope {
    #[serde(default)]
    count: u32,
}

/// REST operations the conversation core consumes.
pub trait ChatApi: Send + Sync + 'static {
    fn list_peers(&self) -> BoxFuture<'static, Result<Vec<Peer>, ApiError>>;
    fn message_history(&self, peer_id: &str)
        -> BoxFuture<'static, Result<Vec<WireMessage>, ApiError>>;
    fn mark_read(&self, peer_id: &str) -> BoxFuture<'static, Result<bool, ApiError>>;
    fn unread_count(&self, peer_id: &str) -> BoxFuture<'static, Result<u32, ApiError>>;
    fn total_unread_count(&self) -> BoxFuture<'static, Result<u32, ApiError>>;
    fn mark_all_read(&self) -> BoxFuture<'static, Result<bool, ApiError>>;
}

/// Builds a per-session API client from the session's auth token.
pub type ChatApiFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn ChatApi>, ApiError> + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base: Url,
    auth_token: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str, auth_token: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base =
            Url::parse(base_url.trim()).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            auth_token: auth_token.to_string(),
        })
    }

    pub fn factory(base_url: String, timeout: Duration) -> ChatApiFactory {
        Arc::new(move |token: &str| {
            let api = HttpChatApi::new(&base_url, token, timeout)?;
            Ok(Arc::new(api) as Arc<dyn ChatApi>)
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(segments)?;
        Ok(self.client.get(url).bearer_auth(&self.auth_token))
    }

    fn post(&self, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(segments)?;
        Ok(self
            .client
            .post(url)
            .bearer_auth(&self.auth_token)
            .json(&serde_json::json!({})))
    }
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ApiError> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        let body: String = String::from_utf8_lossy(&body).chars().take(200).collect();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_slice(&body)?)
}

impl ChatApi for HttpChatApi {
    fn list_peers(&self) -> BoxFuture<'static, Result<Vec<Peer>, ApiError>> {
        let req = self.get(&["messages", "senders"]);
        Box::pin(async move {
            let env: DataEnvelope<Vec<Peer>> = send_json(req?).await?;
            Ok(env.data)
        })
    }

    fn message_history(
        &self,
        peer_id: &str,
    ) -> BoxFuture<'static, Result<Vec<WireMessage>, ApiError>> {
        let req = self.get(&["messages", peer_id]);
        Box::pin(async move {
            let env: DataEnvelope<Vec<WireMessage>> = send_json(req?).await?;
            Ok(env.data)
        })
    }

    fn mark_read(&self, peer_id: &str) -> BoxFuture<'static, Result<bool, ApiError>> {
        let req = self.post(&["messages", peer_id, "read"]);
        Box::pin(async move {
            let env: SuccessEnvelope = send_json(req?).await?;
            Ok(env.success)
        })
    }

    fn unread_count(&self, peer_id: &str) -> BoxFuture<'static, Result<u32, ApiError>> {
        let req = self.get(&["messages", "unread", peer_id]);
        Box::pin(async move {
            let env: CountEnvelope = send_json(req?).await?;
            Ok(env.count)
        })
    }

    fn total_unread_count(&self) -> BoxFuture<'static, Result<u32, ApiError>> {
        let req = self.get(&["messages", "unread"]);
        Box::pin(async move {
            let env: CountEnvelope = send_json(req?).await?;
            Ok(env.count)
        })
    }

    fn mark_all_read(&self) -> BoxFuture<'static, Result<bool, ApiError>> {
        let req = self.post(&["messages", "read-all"]);
        Box::pin(async move {
            let env: SuccessEnvelope = send_json(req?).await?;
            Ok(env.success)
        })
    }
}

// ── serde helpers ───────────────────────────────────────────────────────────

fn id_from_value<E: serde::de::Error>(v: serde_json::Value) -> Result<Option<String>, E> {
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        // Populated references: `{ "_id": "...", "name": ... }`.
        serde_json::Value::Object(mut map) => {
            let inner = map
                .remove("_id")
                .or_else(|| map.remove("id"))
                .unwrap_or(serde_json::Value::Null);
            match inner {
                serde_json::Value::Object(_) => Err(E::custom("nested object id")),
                other => id_from_value(other),
            }
        }
        other => Err(E::custom(format!("unsupported id: {other}"))),
    }
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    id_from_value(v)?.ok_or_else(|| D::Error::custom("missing id"))
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    id_from_value(v)
}

// Numbers above this are treated as unix milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => {
            let raw = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| D::Error::custom("timestamp out of range"))?;
            Ok(Some(normalize_epoch(raw)))
        }
        serde_json::Value::String(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unparseable timestamp: {s}"))),
        other => Err(D::Error::custom(format!("unsupported timestamp: {other}"))),
    }
}

fn normalize_epoch(raw: i64) -> i64 {
    if raw.abs() >= MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    }
}

/// RFC 3339 or a bare epoch (seconds or millis) to unix seconds.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(raw) = s.parse::<i64>() {
        return Some(normalize_epoch(raw));
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp())
}
