use crate::error::{DlzError, Result};
use serde_json::{json, Value};
use std::fmt;

/// Event name the pad server wraps every application payload in
pub const EVENT_NAME: &str = "message";

/// Engine.IO transport packet types (first character of a frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPacket {
    Open,
    Close,
    Ping,
    Pong,
    Message,
}

impl TransportPacket {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Open),
            '1' => Some(Self::Close),
            '2' => Some(Self::Ping),
            '3' => Some(Self::Pong),
            '4' => Some(Self::Message),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Open => '0',
            Self::Close => '1',
            Self::Ping => '2',
            Self::Pong => '3',
            Self::Message => '4',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Message => "MESSAGE",
        }
    }
}

/// Socket.IO packet types carried inside a MESSAGE transport packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationPacket {
    Connect,
    Disconnect,
    Event,
    Ack,
    Error,
    BinaryEvent,
    BinaryAck,
}

impl ApplicationPacket {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Connect),
            '1' => Some(Self::Disconnect),
            '2' => Some(Self::Event),
            '3' => Some(Self::Ack),
            '4' => Some(Self::Error),
            '5' => Some(Self::BinaryEvent),
            '6' => Some(Self::BinaryAck),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::Error => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Event => "EVENT",
            Self::Ack => "ACK",
            Self::Error => "ERROR",
            Self::BinaryEvent => "BINARY_EVENT",
            Self::BinaryAck => "BINARY_ACK",
        }
    }
}

/// A decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub transport: TransportPacket,
    pub application: Option<ApplicationPacket>,
    pub payload: Option<Value>,
}

impl Frame {
    /// Decode a raw text frame
    ///
    /// OPEN and MESSAGE frames may carry a JSON body. A MESSAGE body is allowed
    /// to start with a non-JSON prefix (namespace, ack id) before the first
    /// `[` or `{`; anything after that which is not valid JSON is an error.
    pub fn decode(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let first = chars
            .next()
            .ok_or_else(|| DlzError::InvalidFrame("empty frame".to_string()))?;
        let transport = TransportPacket::from_char(first)
            .ok_or_else(|| DlzError::InvalidFrame(format!("unknown transport packet type {:?}", first)))?;
        let rest = chars.as_str();

        match transport {
            TransportPacket::Message => {
                let mut rest_chars = rest.chars();
                let second = rest_chars
                    .next()
                    .ok_or_else(|| DlzError::InvalidFrame("message frame without packet type".to_string()))?;
                let application = ApplicationPacket::from_char(second).ok_or_else(|| {
                    DlzError::InvalidFrame(format!("unknown application packet type {:?}", second))
                })?;

                Ok(Self {
                    transport,
                    application: Some(application),
                    payload: parse_payload(rest_chars.as_str())?,
                })
            }
            TransportPacket::Open => Ok(Self {
                transport,
                application: None,
                payload: parse_payload(rest)?,
            }),
            // Ping/pong may carry "probe"; it is not JSON and nothing reads it
            _ => Ok(Self {
                transport,
                application: None,
                payload: None,
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport == TransportPacket::Open
    }

    pub fn is_connect(&self) -> bool {
        self.application == Some(ApplicationPacket::Connect)
    }

    pub fn is_event(&self) -> bool {
        self.application == Some(ApplicationPacket::Event)
    }

    /// Application body of an event frame
    ///
    /// For the usual `["message", {...}]` array this is the second element.
    pub fn event_body(&self) -> Option<&Value> {
        match self.payload.as_ref()? {
            Value::Array(items) => items.get(1),
            value @ Value::Object(_) => Some(value),
            _ => None,
        }
    }

    /// Ping interval announced in an OPEN frame, in milliseconds
    pub fn ping_interval(&self) -> Option<u64> {
        self.payload.as_ref()?.get("pingInterval")?.as_u64()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[EIO:{}]", self.transport.name())?;
        if let Some(application) = self.application {
            write!(f, " [Socket.IO:{}]", application.name())?;
        }
        if let Some(payload) = &self.payload {
            write!(f, " {}", payload)?;
        }
        Ok(())
    }
}

fn parse_payload(body: &str) -> Result<Option<Value>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }

    let mut error = match serde_json::from_str(body) {
        Ok(value) => return Ok(Some(value)),
        Err(e) => e,
    };

    // Retry after a prefix: from the first `[` or `{`, then from the first `{`
    let first = body.find(|c| c == '[' || c == '{');
    let brace = body.find('{').filter(|&b| Some(b) != first);
    for start in [first, brace].into_iter().flatten().filter(|&s| s > 0) {
        match serde_json::from_str(&body[start..]) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => error = e,
        }
    }
    Err(error.into())
}

/// Human-readable description of a raw frame for logging
///
/// Never fails: frames that do not decode are shown with `UNKNOWN(..)` tags.
pub fn describe(raw: &str) -> String {
    if let Ok(frame) = Frame::decode(raw) {
        return frame.to_string();
    }

    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return "Empty message".to_string();
    };
    let mut result = match TransportPacket::from_char(first) {
        Some(t) => format!("[EIO:{}]", t.name()),
        None => format!("[EIO:UNKNOWN({})]", first),
    };

    let mut rest = chars.as_str();
    if first == '4' {
        let mut rest_chars = rest.chars();
        if let Some(second) = rest_chars.next() {
            match ApplicationPacket::from_char(second) {
                Some(a) => result.push_str(&format!(" [Socket.IO:{}]", a.name())),
                None => result.push_str(&format!(" [Socket.IO:UNKNOWN({})]", second)),
            }
            rest = rest_chars.as_str();
        }
    }
    if !rest.is_empty() {
        result.push(' ');
        result.push_str(rest);
    }
    result
}

/// `"40"`: open the default Socket.IO namespace
pub fn encode_connect() -> String {
    format!(
        "{}{}",
        TransportPacket::Message.as_char(),
        ApplicationPacket::Connect.as_char()
    )
}

/// `"3"`: keep-alive
pub fn encode_pong() -> String {
    TransportPacket::Pong.as_char().to_string()
}

/// `42["message", <body>]`
pub fn encode_event(body: &Value) -> Result<String> {
    let json = serde_json::to_string(&json!([EVENT_NAME, body]))?;
    Ok(format!(
        "{}{}{}",
        TransportPacket::Message.as_char(),
        ApplicationPacket::Event.as_char(),
        json
    ))
}

/// Body of the INIT snapshot request
pub fn init_request(correlation_id: u64) -> Value {
    json!({ "cmd": "INIT", "id": correlation_id, "args": {} })
}
