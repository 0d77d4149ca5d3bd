//! Query level protocol parameters: `EIO=<version>&transport=<type>`.
use std::fmt;

/// The type of `transport` used to talk to the server.
///
/// Polling is only used during the handshake, the session then lives on the websocket.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportType {
    /// Polling transport
    Polling,
    /// Websocket transport
    Websocket,
}

impl From<TransportType> for &'static str {
    fn from(t: TransportType) -> Self {
        match t {
            TransportType::Polling => "polling",
            TransportType::Websocket => "websocket",
        }
    }
}
impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).into())
    }
}

/// The engine.io protocol version.
///
/// Only the v4 protocol is spoken by this client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// The protocol version 4
    #[default]
    V4 = 4,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V4 => f.write_str("4"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_type_query_value() {
        assert_eq!(TransportType::Polling.to_string(), "polling");
        assert_eq!(TransportType::Websocket.to_string(), "websocket");
    }

    #[test]
    fn protocol_version_query_value() {
        assert_eq!(ProtocolVersion::default().to_string(), "4");
    }
}
