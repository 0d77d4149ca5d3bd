use socketioxide_client_core::ParseError;
use tokio_tungstenite::tungstenite;

/// Error type for the [`Transport`](crate::transport::Transport) and
/// [`Connection`](crate::transport::Connection) implementations.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// Error from the http client used during the polling handshake
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Error from the websocket connection
    #[error("ws transport error: {0}")]
    Ws(#[from] Box<tungstenite::Error>),
    /// A read, write or request deadline elapsed
    #[error("transport deadline elapsed")]
    Timeout,
    /// The remote closed the connection
    #[error("transport closed")]
    Closed,
    /// Any other transport error, for custom implementations
    #[error("{0}")]
    Other(String),
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            err => TransportError::Ws(Box::new(err)),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout
    }
}

/// Error type for the socket.io client.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A frame could not be decoded
    #[error("malformed frame")]
    MalformedFrame,

    /// An event payload is neither a string nor an object
    #[error("unsupported payload type: {0}")]
    UnsupportedPayloadType(&'static str),

    /// One of the polling handshake requests failed
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The websocket probe sequence failed
    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    /// The outbound queue is full
    #[error("outbound queue overflow")]
    Overflow,

    /// The connection failed while reading or writing
    #[error("transport fault: {0}")]
    TransportFault(#[from] TransportError),

    /// Every reconnection attempt failed
    #[error("reconnection attempts exhausted")]
    ReconnectExhausted,

    /// The handler shape cannot be used with this event
    #[error("invalid handler signature for event {0:?}")]
    InvalidHandlerSignature(String),

    /// Handlers cannot be registered for an empty event name
    #[error("invalid event name")]
    InvalidEventName,

    /// The client is closed
    #[error("client closed")]
    Closed,

    /// The emitted payload could not be serialized
    #[error("error serializing payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedFrame => Error::MalformedFrame,
            ParseError::UnsupportedPayloadType(kind) => Error::UnsupportedPayloadType(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_conversion() {
        assert!(matches!(
            Error::from(ParseError::MalformedFrame),
            Error::MalformedFrame
        ));
        assert!(matches!(
            Error::from(ParseError::UnsupportedPayloadType("number")),
            Error::UnsupportedPayloadType("number")
        ));
    }

    #[test]
    fn closed_ws_is_transport_closed() {
        let err = TransportError::from(tungstenite::Error::ConnectionClosed);
        assert!(matches!(err, TransportError::Closed));
        let err = TransportError::from(tungstenite::Error::Io(std::io::Error::other("boom")));
        assert!(matches!(err, TransportError::Ws(_)));
    }
}
