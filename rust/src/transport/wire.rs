//! Socket.IO v4 over Engine.IO v4, text frames only.
//!
//! Engine.IO prefixes every frame with a single packet-type digit. A
//! `message` (4) frame carries a Socket.IO packet, itself
//! `<type>[<nsp>,][<ack id>][<json>]`. Binary attachments are not used by
//! the chat channel and are rejected.

use serde_json::Value;

pub const EVENT_MESSAGE_RECEIVED: &str = "message received";
pub const EVENT_REPLY: &str = "reply";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine.io packet type {0:?}")]
    UnknownEngineType(char),
    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketType(char),
    #[error("binary attachments are not supported")]
    Binary,
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Parameters from the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, WireError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => serde_json::from_str::<OpenInfo>(rest)
                .map(EnginePacket::Open)
                .map_err(|e| WireError::Payload(e.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(WireError::UnknownEngineType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(info) => format!(
                "0{}",
                serde_json::json!({
                    "sid": info.sid,
                    "pingInterval": info.ping_interval,
                    "pingTimeout": info.ping_timeout,
                })
            ),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Ack { id: u64, args: Vec<Value> },
    ConnectError(Value),
}

impl SocketPacket {
    pub fn decode(payload: &str) -> Result<Self, WireError> {
        let mut chars = payload.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        let mut rest = chars.as_str();

        // Attachment count: digits followed by '-'.
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 && rest[digits..].starts_with('-') {
            return Err(WireError::Binary);
        }

        // Only the default namespace is used; skip any explicit one.
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(i) => &rest[i + 1..],
                None => "",
            };
        }

        let ack_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if ack_len > 0 {
            rest[..ack_len].parse::<u64>().ok()
        } else {
            None
        };
        let body = &rest[ack_len..];
        let json = if body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(body)
                    .map_err(|e| WireError::Payload(e.to_string()))?,
            )
        };

        match kind {
            '0' => Ok(SocketPacket::Connect(json)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let Some(Value::Array(mut items)) = json else {
                    return Err(WireError::Payload("event without array body".into()));
                };
                if items.is_empty() {
                    return Err(WireError::Payload("event without name".into()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(WireError::Payload("event name is not a string".into()));
                };
                Ok(SocketPacket::Event { name, args: items })
            }
            '3' => {
                let args = match json {
                    Some(Value::Array(items)) => items,
                    _ => vec![],
                };
                Ok(SocketPacket::Ack {
                    id: ack_id.unwrap_or_default(),
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError(json.unwrap_or(Value::Null))),
            '5' | '6' => Err(WireError::Binary),
            other => Err(WireError::UnknownSocketType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{auth}"),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("2{}", Value::Array(items))
            }
            SocketPacket::Ack { id, args } => format!("3{id}{}", Value::Array(args.clone())),
            SocketPacket::ConnectError(v) => format!("4{v}"),
        }
    }
}

/// A decoded text frame, flattened for the connection loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(OpenInfo),
    Ping(String),
    Pong,
    Close,
    Noop,
    Connected,
    ConnectError(String),
    Disconnected,
    Event { name: String, data: Value },
}

pub fn decode_frame(text: &str) -> Result<Frame, WireError> {
    match EnginePacket::decode(text)? {
        EnginePacket::Open(info) => Ok(Frame::Open(info)),
        EnginePacket::Ping(data) => Ok(Frame::Ping(data)),
        EnginePacket::Pong(_) => Ok(Frame::Pong),
        EnginePacket::Close => Ok(Frame::Close),
        EnginePacket::Upgrade | EnginePacket::Noop => Ok(Frame::Noop),
        EnginePacket::Message(payload) => match SocketPacket::decode(&payload)? {
            SocketPacket::Connect(_) => Ok(Frame::Connected),
            SocketPacket::Disconnect => Ok(Frame::Disconnected),
            SocketPacket::ConnectError(v) => {
                let reason = v
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| v.to_string());
                Ok(Frame::ConnectError(reason))
            }
            SocketPacket::Event { name, mut args } => {
                let data = if args.is_empty() {
                    Value::Null
                } else {
                    args.remove(0)
                };
                Ok(Frame::Event { name, data })
            }
            SocketPacket::Ack { .. } => Ok(Frame::Noop),
        },
    }
}

/// `40{"token":...}`: join the default namespace with the session token.
pub fn encode_connect(auth_token: &str) -> String {
    EnginePacket::Message(
        SocketPacket::Connect(Some(serde_json::json!({ "token": auth_token }))).encode(),
    )
    .encode()
}

pub fn encode_event(name: &str, data: Value) -> String {
    EnginePacket::Message(
        SocketPacket::Event {
            name: name.to_string(),
            args: vec![data],
        }
        .encode(),
    )
    .encode()
}

pub fn encode_pong(data: &str) -> String {
    EnginePacket::Pong(data.to_string()).encode()
}
