//! Default transport: `reqwest` for the polling handshake and `tokio-tungstenite` for the websocket.
use std::time::Duration;

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream,
    tungstenite::{Message, Utf8Bytes, client::IntoClientRequest},
};

use super::{Connection, PollingResponse, Transport};
use crate::errors::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The default [`Transport`].
#[derive(Clone)]
pub struct WsTransport {
    http: reqwest::Client,
    headers: HeaderMap,
    connector: Option<Connector>,
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("http", &self.http)
            .field("headers", &self.headers)
            .field("custom_connector", &self.connector.is_some())
            .field("ping_interval", &self.ping_interval)
            .field("ping_timeout", &self.ping_timeout)
            .finish()
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl WsTransport {
    /// Create a transport from a configured http client.
    /// The http client is only used for the handshake requests.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            headers: HeaderMap::new(),
            connector: None,
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(30),
        }
    }

    /// Set the keepalive interval and timeout of the opened connections.
    /// Defaults to 30 seconds for both.
    pub fn with_ping_params(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = interval;
        self.ping_timeout = timeout;
        self
    }

    /// Add a header sent with every polling request and with the websocket upgrade request,
    /// for example an `authorization` header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Use a custom TLS setup for `wss` connections, such as a rustls config
    /// trusting a private certificate authority.
    /// The polling requests are configured through the [`reqwest::Client`] given to [`WsTransport::new`].
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = Some(connector);
        self
    }

    async fn read_response(res: reqwest::Response) -> Result<PollingResponse, TransportError> {
        let status = res.status();
        let body = res.text().await?;
        Ok(PollingResponse { status, body })
    }
}

impl Transport for WsTransport {
    type Conn = WsConnection;

    async fn get(&self, url: &str) -> Result<PollingResponse, TransportError> {
        let res = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;
        Self::read_response(res).await
    }

    async fn post(&self, url: &str, body: String) -> Result<PollingResponse, TransportError> {
        let res = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .header(http::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(body)
            .send()
            .await?;
        Self::read_response(res).await
    }

    async fn connect(&self, url: &str) -> Result<WsConnection, TransportError> {
        let mut req = url.into_client_request()?;
        req.headers_mut().extend(self.headers.clone());
        let (ws, _) =
            tokio_tungstenite::connect_async_tls_with_config(req, None, false, self.connector.clone())
                .await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(url, "websocket connection opened");
        let (tx, rx) = ws.split();
        Ok(WsConnection {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            ping_interval: self.ping_interval,
            ping_timeout: self.ping_timeout,
        })
    }
}

/// A websocket [`Connection`], each half is behind its own lock.
pub struct WsConnection {
    tx: Mutex<SplitSink<WsStream, Message>>,
    rx: Mutex<SplitStream<WsStream>>,
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl Connection for WsConnection {
    async fn get_message(&self) -> Result<String, TransportError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_msg)) => {
                    // Binary payloads are not supported, ping/pong frames are handled by tungstenite.
                    #[cfg(feature = "tracing")]
                    tracing::trace!(?_msg, "skipping non text ws frame");
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn write_message(&self, frame: &str) -> Result<(), TransportError> {
        let mut tx = self.tx.lock().await;
        tx.send(Message::Text(Utf8Bytes::from(frame.to_owned()))).await?;
        Ok(())
    }

    fn ping_params(&self) -> (Duration, Duration) {
        (self.ping_interval, self.ping_timeout)
    }

    async fn close(&self) {
        let mut tx = self.tx.lock().await;
        tx.send(Message::Close(None)).await.ok();
        tx.close().await.ok();
    }
}
