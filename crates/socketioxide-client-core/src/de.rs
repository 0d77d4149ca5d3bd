//! Frame decoding functions.
//!
//! Separators are ASCII only so frames are read as bytes and sliced back to `&str`
//! at separator boundaries.
use serde_json::Value;

use crate::{
    errors::ParseError,
    packet::{Content, EngineType, SocketEvent, SocketType},
};

/// Read the engine.io type from the first byte of a frame.
pub fn parse_engine_type(frame: &str) -> Result<EngineType, ParseError> {
    frame
        .as_bytes()
        .first()
        .and_then(|&b| EngineType::from_digit(b))
        .ok_or(ParseError::MalformedFrame)
}

/// Read the socket.io type from the second byte of a frame.
pub fn parse_socket_type(frame: &str) -> Result<SocketType, ParseError> {
    frame
        .as_bytes()
        .get(1)
        .and_then(|&b| SocketType::from_digit(b))
        .ok_or(ParseError::MalformedFrame)
}

/// Parse an event frame: `<digits>[/<namespace>,][<ack id>]["<event>",<payload>]`.
///
/// The payload must be a string or an object, a missing payload yields an event without content.
pub fn parse_event(frame: &str) -> Result<SocketEvent, ParseError> {
    let data = frame.as_bytes();
    let mut pos = read_type_digits(data)?;
    let ns = read_nsp(frame, &mut pos)?;

    // An ack id may sit between the namespace and the payload, it is not tracked.
    while data.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    if data.get(pos) != Some(&b'[') {
        return Err(ParseError::MalformedFrame);
    }

    let array: Vec<Value> =
        serde_json::from_str(&frame[pos..]).map_err(|_| ParseError::MalformedFrame)?;
    let mut array = array.into_iter();
    let name = match array.next() {
        Some(Value::String(name)) => name,
        _ => return Err(ParseError::MalformedFrame),
    };
    let content = array.next().map(Content::try_from).transpose()?;

    Ok(SocketEvent {
        ns: ns.to_owned(),
        name,
        content,
    })
}

/// Parse a namespace connect or connect error frame: `<digits>[/<namespace>,][<payload>]`.
///
/// The server may append a json object (the socket.io sid or an error message) after the namespace.
pub(crate) fn parse_socket_packet(frame: &str) -> Result<SocketEvent, ParseError> {
    let mut pos = read_type_digits(frame.as_bytes())?;
    let ns = read_nsp(frame, &mut pos)?.to_owned();
    let content = match &frame[pos..] {
        "" => None,
        payload => {
            let value: Value =
                serde_json::from_str(payload).map_err(|_| ParseError::MalformedFrame)?;
            Some(Content::try_from(value)?)
        }
    };
    Ok(SocketEvent {
        ns,
        name: String::new(),
        content,
    })
}

/// Read the namespace of a socket.io frame, the root namespace is returned as an empty string.
pub(crate) fn read_namespace(frame: &str) -> Result<&str, ParseError> {
    let mut pos = read_type_digits(frame.as_bytes())?;
    read_nsp(frame, &mut pos)
}

/// Skip the one or two leading type digits.
fn read_type_digits(data: &[u8]) -> Result<usize, ParseError> {
    let digits = data.iter().take(2).take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        Err(ParseError::MalformedFrame)
    } else {
        Ok(digits)
    }
}

/// Custom namespaces start with a slash and end with a comma.
/// A frame may end right after the namespace, e.g. `41/custom`.
fn read_nsp<'a>(frame: &'a str, pos: &mut usize) -> Result<&'a str, ParseError> {
    let data = frame.as_bytes();
    if data.get(*pos) != Some(&b'/') {
        return Ok("");
    }
    let start = *pos + 1;
    match data[start..].iter().position(|&b| b == b',') {
        Some(len) => {
            *pos = start + len + 1;
            Ok(&frame[start..start + len])
        }
        None if data[start..].iter().any(|&b| b == b'[' || b == b'{') => {
            Err(ParseError::MalformedFrame)
        }
        None => {
            *pos = data.len();
            Ok(&frame[start..])
        }
    }
}
