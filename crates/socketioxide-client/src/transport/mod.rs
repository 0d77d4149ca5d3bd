//! The transport layer used by the client.
//!
//! A [`Transport`] issues the polling requests of the handshake and opens the streaming
//! [`Connection`] that carries the session once upgraded.
//! The [`WsTransport`] is the default implementation, based on `reqwest` and `tokio-tungstenite`.
//! Any other implementation can be plugged in, for example to use a custom tls stack
//! or to script a server in tests.
use std::{future::Future, time::Duration};

use http::StatusCode;

use crate::errors::TransportError;

pub mod ws;

pub use ws::{WsConnection, WsTransport};

/// The response of a polling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingResponse {
    /// The http status of the response
    pub status: StatusCode,
    /// The text body of the response
    pub body: String,
}

impl PollingResponse {
    /// Create a new response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Network primitives needed by the handshake and the upgrade.
pub trait Transport: Send + Sync + 'static {
    /// The streaming connection type opened by [`Transport::connect`].
    type Conn: Connection;

    /// Issue a polling GET request.
    fn get(&self, url: &str)
    -> impl Future<Output = Result<PollingResponse, TransportError>> + Send;

    /// Issue a polling POST request with a text body.
    fn post(
        &self,
        url: &str,
        body: String,
    ) -> impl Future<Output = Result<PollingResponse, TransportError>> + Send;

    /// Open a streaming connection to a websocket url.
    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;
}

/// A duplex text connection.
///
/// Reads and writes may happen concurrently from different tasks,
/// implementations must serialize each direction on their own.
pub trait Connection: Send + Sync + 'static {
    /// Read the next text frame.
    /// It should return [`TransportError::Closed`] once the connection is closed.
    fn get_message(&self) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Write a text frame.
    fn write_message(&self, frame: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// The keepalive interval and timeout of this connection.
    fn ping_params(&self) -> (Duration, Duration);

    /// Close the connection. Closing twice is a no-op.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
