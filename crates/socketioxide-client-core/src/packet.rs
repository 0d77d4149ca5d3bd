//! Engine.io / socket.io message model and its text encoding.
//!
//! A [`Message`] is the base unit exchanged with the server. Every frame starts with an
//! engine.io type digit. Engine.io `Message` frames carry a second socket.io type digit,
//! an optional namespace section and an optional `[event, payload]` json array.
use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ParseError;

/// Frame sent by the client to probe the websocket transport during the upgrade.
pub const PROBE_PING: &str = "2probe";
/// Frame expected from the server in response to [`PROBE_PING`].
pub const PROBE_PONG: &str = "3probe";

/// | Type    | ID  | Usage                                              |
/// |---------|-----|----------------------------------------------------|
/// | OPEN    | 0   | Sent by the server when a new session is opened.   |
/// | CLOSE   | 1   | Used to indicate that a transport can be closed.   |
/// | PING    | 2   | Used in the heartbeat mechanism.                   |
/// | PONG    | 3   | Used in the heartbeat mechanism.                   |
/// | MESSAGE | 4   | Used to send a socket.io payload.                  |
/// | UPGRADE | 5   | Used during the upgrade process.                   |
/// | NOOP    | 6   | Used during the upgrade process.                   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineType {
    /// Open packet used to initiate a session
    Open = 0,
    /// Close packet used to close a session
    Close = 1,
    /// Ping packet, sent by the server in the heartbeat mechanism
    Ping = 2,
    /// Pong packet, sent by the client in the heartbeat mechanism
    Pong = 3,
    /// Message packet carrying a socket.io frame
    Message = 4,
    /// Upgrade packet to switch from polling to websocket
    Upgrade = 5,
    /// Noop packet used during the upgrade
    Noop = 6,
}

impl EngineType {
    /// Get the [`EngineType`] matching an ascii digit.
    pub fn from_digit(digit: u8) -> Option<Self> {
        use EngineType::*;
        Some(match digit {
            b'0' => Open,
            b'1' => Close,
            b'2' => Ping,
            b'3' => Pong,
            b'4' => EngineType::Message,
            b'5' => Upgrade,
            b'6' => Noop,
            _ => return None,
        })
    }

    /// The ascii digit of this type.
    pub fn as_char(self) -> char {
        (b'0' + self as u8) as char
    }
}

/// | Type          | ID  | Usage                                                    |
/// |---------------|-----|----------------------------------------------------------|
/// | CONNECT       | 0   | Used during the connection to a namespace.               |
/// | DISCONNECT    | 1   | Used when disconnecting from a namespace.                |
/// | EVENT         | 2   | Used to send data to the other side.                     |
/// | ACK           | 3   | Used to acknowledge an event.                            |
/// | CONNECT_ERROR | 4   | Used during the connection to a namespace.               |
/// | BINARY_EVENT  | 5   | Used to send binary data to the other side.              |
/// | BINARY_ACK    | 6   | Used to acknowledge an event with binary data.           |
///
/// [`SocketType::None`] is used for engine.io level frames that carry no socket.io part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// Connect packet, also used by the server to acknowledge a namespace join
    Connect = 0,
    /// Disconnect packet
    Disconnect = 1,
    /// Event packet
    Event = 2,
    /// Event ack packet
    Ack = 3,
    /// Connect error packet, sent by the server when a namespace join is refused
    ConnectError = 4,
    /// Binary event packet
    BinaryEvent = 5,
    /// Binary ack packet
    BinaryAck = 6,
    /// No socket.io part
    None = 99,
}

impl SocketType {
    /// Get the [`SocketType`] matching an ascii digit.
    pub fn from_digit(digit: u8) -> Option<Self> {
        use SocketType::*;
        Some(match digit {
            b'0' => Connect,
            b'1' => Disconnect,
            b'2' => Event,
            b'3' => Ack,
            b'4' => ConnectError,
            b'5' => BinaryEvent,
            b'6' => BinaryAck,
            _ => return Option::None,
        })
    }

    /// The ascii digit of this type. [`SocketType::None`] has no digit.
    pub fn as_char(self) -> Option<char> {
        match self {
            SocketType::None => Option::None,
            t => Some((b'0' + t as u8) as char),
        }
    }
}

/// The content of an event: a string or a key/value mapping.
///
/// The mapping keeps the key order of the frame it was decoded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// A string payload
    Str(String),
    /// An object payload
    Map(Map<String, Value>),
}

impl Content {
    /// An empty string is considered as no content when encoding.
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Str(s) if s.is_empty())
    }

    /// Get the string payload, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Content::Str(s) => Some(s),
            Content::Map(_) => None,
        }
    }

    /// Get the mapping payload, if this is one.
    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Content::Map(m) => Some(m),
            Content::Str(_) => None,
        }
    }
}

impl TryFrom<Value> for Content {
    type Error = ParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Content::Str(s)),
            Value::Object(m) => Ok(Content::Map(m)),
            Value::Null => Err(ParseError::UnsupportedPayloadType("null")),
            Value::Bool(_) => Err(ParseError::UnsupportedPayloadType("bool")),
            Value::Number(_) => Err(ParseError::UnsupportedPayloadType("number")),
            Value::Array(_) => Err(ParseError::UnsupportedPayloadType("array")),
        }
    }
}
impl From<Content> for Value {
    fn from(content: Content) -> Self {
        match content {
            Content::Str(s) => Value::String(s),
            Content::Map(m) => Value::Object(m),
        }
    }
}
impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Str(s)
    }
}
impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Str(s.to_owned())
    }
}
impl From<Map<String, Value>> for Content {
    fn from(m: Map<String, Value>) -> Self {
        Content::Map(m)
    }
}

/// The socket.io part of a [`Message`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocketEvent {
    /// The namespace, without its leading `/`. The root namespace is empty.
    pub ns: String,
    /// The event name. An empty name means that there is no event.
    pub name: String,
    /// The event payload
    pub content: Option<Content>,
}

/// A decoded or to-be-encoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The engine.io type
    pub engine: EngineType,
    /// The socket.io type, [`SocketType::None`] for engine.io only frames
    pub socket: SocketType,
    /// The socket.io event
    pub event: SocketEvent,
}

impl Message {
    /// An engine.io only message (ping, pong, close...).
    pub fn engine(engine: EngineType) -> Self {
        Self {
            engine,
            socket: SocketType::None,
            event: SocketEvent::default(),
        }
    }

    /// A namespace connect message: `40/<ns>,`
    pub fn connect(ns: impl Into<String>) -> Self {
        Self::socket(SocketType::Connect, ns)
    }

    /// A namespace disconnect message: `41/<ns>,`
    pub fn disconnect(ns: impl Into<String>) -> Self {
        Self::socket(SocketType::Disconnect, ns)
    }

    /// An event message: `42/<ns>,["<name>",<content>]`
    pub fn event(ns: impl Into<String>, name: impl Into<String>, content: Content) -> Self {
        Self {
            engine: EngineType::Message,
            socket: SocketType::Event,
            event: SocketEvent {
                ns: ns.into(),
                name: name.into(),
                content: Some(content),
            },
        }
    }

    fn socket(socket: SocketType, ns: impl Into<String>) -> Self {
        Self {
            engine: EngineType::Message,
            socket,
            event: SocketEvent {
                ns: ns.into(),
                ..Default::default()
            },
        }
    }

    /// Decode a full frame.
    ///
    /// The socket.io part is only decoded for engine.io `Message` frames.
    /// Events must carry a json array. Connect and connect error frames may carry a json payload,
    /// other socket.io types only carry their namespace.
    pub fn decode(frame: &str) -> Result<Self, ParseError> {
        let engine = crate::de::parse_engine_type(frame)?;
        if engine != EngineType::Message || frame.len() < 2 {
            return Ok(Message::engine(engine));
        }
        let socket = crate::de::parse_socket_type(frame)?;
        let event = match socket {
            SocketType::Event => crate::de::parse_event(frame)?,
            SocketType::Connect | SocketType::ConnectError => {
                crate::de::parse_socket_packet(frame)?
            }
            _ => SocketEvent {
                ns: crate::de::read_namespace(frame)?.to_owned(),
                ..Default::default()
            },
        };
        Ok(Message {
            engine,
            socket,
            event,
        })
    }

    /// Get the max size the message could have when serialized, without the json payload.
    fn size_hint(&self) -> usize {
        3 + self.event.ns.len() + self.event.name.len()
    }
}

/// Serialize a [`Message`] to a [`String`] according to the socket.io protocol.
impl From<&Message> for String {
    fn from(msg: &Message) -> String {
        let mut buffer = String::with_capacity(msg.size_hint());
        buffer.push(msg.engine.as_char());
        let Some(socket) = msg.socket.as_char() else {
            return buffer;
        };
        buffer.push(socket);
        if !msg.event.ns.is_empty() {
            buffer.push('/');
            buffer.push_str(&msg.event.ns);
            buffer.push(',');
        }
        match &msg.event.content {
            Some(content) if !msg.event.name.is_empty() && !content.is_empty() => {
                // A (&str, &Content) tuple cannot fail to serialize: keys are always strings.
                if let Ok(payload) = serde_json::to_string(&(&msg.event.name, content)) {
                    buffer.push_str(&payload);
                }
            }
            _ => (),
        }
        buffer
    }
}
impl From<Message> for String {
    fn from(msg: Message) -> String {
        String::from(&msg)
    }
}
impl Message {
    /// Encode the message to its text frame.
    pub fn encode(&self) -> String {
        self.into()
    }
}
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The engine.io session header, sent by the server in the open packet.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionHeader {
    /// The session ID.
    pub sid: String,
    /// The list of available transport upgrades.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// The ping interval, used in the heartbeat mechanism (in milliseconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// The ping timeout, used in the heartbeat mechanism (in milliseconds).
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    /// The maximum number of bytes per chunk.
    #[serde(default = "default_max_payload")]
    pub max_payload: u64,
}

fn default_ping_interval() -> u64 {
    25000
}
fn default_ping_timeout() -> u64 {
    20000
}
fn default_max_payload() -> u64 {
    1_000_000
}

impl SessionHeader {
    /// Parse the json payload of an open packet (the frame without its leading `0`).
    pub fn from_open_payload(payload: &str) -> Result<Self, ParseError> {
        serde_json::from_str(payload).map_err(|_| ParseError::MalformedFrame)
    }

    /// The ping interval as a [`Duration`]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    /// The ping timeout as a [`Duration`]
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Content {
        Content::try_from(value).unwrap()
    }

    #[test]
    fn encode_engine_only() {
        assert_eq!(Message::engine(EngineType::Ping).encode(), "2");
        assert_eq!(Message::engine(EngineType::Pong).encode(), "3");
        assert_eq!(Message::engine(EngineType::Close).encode(), "1");
        assert_eq!(Message::engine(EngineType::Upgrade).encode(), "5");
    }

    #[test]
    fn encode_engine_only_ignores_event() {
        let mut msg = Message::engine(EngineType::Pong);
        msg.event.name = "greet".into();
        msg.event.content = Some("hello".into());
        assert_eq!(msg.encode(), "3");
    }

    #[test]
    fn encode_connect() {
        assert_eq!(Message::connect("chat").encode(), "40/chat,");
        assert_eq!(Message::connect("").encode(), "40");
        assert_eq!(Message::disconnect("chat").encode(), "41/chat,");
    }

    #[test]
    fn encode_event_map() {
        let msg = Message::event("chat", "greet", map(json!({ "x": 1 })));
        assert_eq!(msg.encode(), r#"42/chat,["greet",{"x":1}]"#);
    }

    #[test]
    fn encode_event_keeps_key_order() {
        let msg = Message::event("chat", "greet", map(json!({ "z": 1, "a": 2 })));
        assert_eq!(msg.encode(), r#"42/chat,["greet",{"z":1,"a":2}]"#);
    }

    #[test]
    fn encode_event_str_root_ns() {
        let msg = Message::event("", "greet", "hello".into());
        assert_eq!(msg.encode(), r#"42["greet","hello"]"#);
    }

    #[test]
    fn encode_event_without_content() {
        let msg = Message::event("chat", "greet", "".into());
        assert_eq!(msg.encode(), "42/chat,");
        let msg = Message::event("chat", "", "hello".into());
        assert_eq!(msg.encode(), "42/chat,");
    }

    #[test]
    fn encode_event_escapes() {
        let msg = Message::event("chat", "say \"hi\"", "a\nb".into());
        assert_eq!(msg.encode(), r#"42/chat,["say \"hi\"","a\nb"]"#);
    }

    #[test]
    fn decode_event_roundtrip() {
        let cases = [
            Message::event("chat", "greet", "hello".into()),
            Message::event("chat", "greet", map(json!({ "x": 1, "nested": { "y": [1, 2] } }))),
            Message::event("", "greet", "hello".into()),
            Message::event("admin™", "ünïcode", "ok".into()),
        ];
        for msg in cases {
            let decoded = Message::decode(&msg.encode()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn decode_connect_ack() {
        let msg = Message::decode(r#"40/chat,{"sid":"abc"}"#).unwrap();
        assert_eq!(msg.engine, EngineType::Message);
        assert_eq!(msg.socket, SocketType::Connect);
        assert_eq!(msg.event.ns, "chat");
        assert_eq!(msg.event.name, "");
        let sid = msg.event.content.as_ref().and_then(Content::as_map).unwrap();
        assert_eq!(sid["sid"], "abc");

        let msg = Message::decode("40").unwrap();
        assert_eq!(msg.socket, SocketType::Connect);
        assert_eq!(msg.event.ns, "");
    }

    #[test]
    fn decode_engine_only() {
        let msg = Message::decode("2").unwrap();
        assert_eq!(msg, Message::engine(EngineType::Ping));
        let msg = Message::decode("4").unwrap();
        assert_eq!(msg, Message::engine(EngineType::Message));
    }

    #[test]
    fn session_header() {
        let header = SessionHeader::from_open_payload(
            r#"{"sid":"abc123","upgrades":["websocket"],"pingInterval":300,"pingTimeout":200,"maxPayload":100}"#,
        )
        .unwrap();
        assert_eq!(header.sid, "abc123");
        assert_eq!(header.ping_interval(), Duration::from_millis(300));
        assert_eq!(header.ping_timeout(), Duration::from_millis(200));
        assert_eq!(header.max_payload, 100);
    }

    #[test]
    fn session_header_defaults() {
        let header = SessionHeader::from_open_payload(r#"{"sid":"abc123"}"#).unwrap();
        assert_eq!(header.ping_interval, 25000);
        assert_eq!(header.ping_timeout, 20000);
        assert!(header.upgrades.is_empty());
    }

    #[test]
    fn session_header_without_sid() {
        let err = SessionHeader::from_open_payload(r#"{"pingInterval":300}"#).unwrap_err();
        assert_eq!(err, ParseError::MalformedFrame);
    }
}
