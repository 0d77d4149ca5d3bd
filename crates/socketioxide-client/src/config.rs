//! ## Configuration for the socket.io client.
//!
//! The [`ClientConfig`] describes where the server lives and how the client behaves
//! when the connection degrades. It is immutable once the client is built, the handshake
//! and upgrade urls are regenerated from it on every (re)connection.
//!
//! #### Example
//! ```rust
//! # use socketioxide_client::ClientConfig;
//! # use std::time::Duration;
//! let config = ClientConfig::builder("localhost", 3000)
//!     .query("token", "secret")
//!     .reconnect_delay(Duration::from_secs(1))
//!     .reconnect_attempts(3)
//!     .build();
//! assert_eq!(config.port, 3000);
//! ```
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use socketioxide_client_core::{ProtocolVersion, TransportType};

/// Configuration for the socket.io client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The server host, a domain name or an ip address.
    pub host: String,

    /// The server port.
    pub port: u16,

    /// Use `https` / `wss` instead of `http` / `ws`.
    /// Defaults to false.
    pub secure: bool,

    /// The path the server listens on for socket.io requests.
    /// Defaults to "/socket.io".
    pub path: String,

    /// Additional query parameters sent with every handshake and upgrade request.
    /// They are sent in insertion order.
    pub query: Vec<(String, String)>,

    /// The base delay between two reconnection attempts.
    /// The n-th attempt of a sequence waits `n * reconnect_delay` after the previous one.
    ///
    /// Defaults to 5 seconds.
    pub reconnect_delay: Duration,

    /// The maximum number of reconnection attempts before giving up.
    /// Defaults to 10.
    pub reconnect_attempts: usize,

    /// The maximum number of frames that can be buffered before being written to the server.
    ///
    /// If the buffer is full the `emit()` method will return an error,
    /// and the connection is torn down when the writer cannot keep up.
    ///
    /// Values lower than 2 are raised to 2. Defaults to 10000 frames.
    pub max_buffer_size: usize,

    /// Deadline applied to every handshake request, and to every websocket read and write.
    /// Defaults to 30 seconds.
    pub request_timeout: Duration,

    /// How long to wait for the namespace join acknowledgement after an open packet
    /// before calling the `connection` handler anyway.
    ///
    /// Defaults to 100 milliseconds.
    pub join_timeout: Duration,
}

impl ClientConfig {
    /// Create a new config builder for the given server.
    pub fn builder(host: impl Into<String>, port: u16) -> ClientConfigBuilder {
        ClientConfigBuilder::new(host, port)
    }

    /// The polling url used to acquire a session, without the `sid` parameter.
    /// It embeds a fresh timestamp to avoid caching.
    pub(crate) fn handshake_url(&self) -> String {
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let scheme = if self.secure { "https" } else { "http" };
        let mut url = self.base_url(scheme, TransportType::Polling);
        url.push_str("&t=");
        url.push_str(&t.to_string());
        url
    }

    /// The websocket url of an already acquired session.
    pub(crate) fn websocket_url(&self, sid: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = self.base_url(scheme, TransportType::Websocket);
        url.push_str("&sid=");
        url.push_str(&encode(sid));
        url
    }

    fn base_url(&self, scheme: &str, transport: TransportType) -> String {
        let mut url = format!(
            "{scheme}://{}:{}{}/?EIO={}&transport={transport}",
            self.host_for_url(),
            self.port,
            self.path.trim_end_matches('/'),
            ProtocolVersion::V4,
        );
        if !self.query.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.query)
                .finish();
            url.push('&');
            url.push_str(&query);
        }
        url
    }

    /// Ipv6 literals are wrapped in brackets.
    fn host_for_url(&self) -> std::borrow::Cow<'_, str> {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host).into()
        } else {
            self.host.as_str().into()
        }
    }
}

/// Append the `sid` parameter to a polling url.
pub(crate) fn with_sid(url: &str, sid: &str) -> String {
    format!("{url}&sid={}", encode(sid))
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Builder for a [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new config builder with the default options.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            config: ClientConfig {
                host: host.into(),
                port,
                secure: false,
                path: "/socket.io".to_string(),
                query: Vec::new(),
                reconnect_delay: Duration::from_secs(5),
                reconnect_attempts: 10,
                max_buffer_size: 10000,
                request_timeout: Duration::from_secs(30),
                join_timeout: Duration::from_millis(100),
            },
        }
    }

    /// Use `https` / `wss` instead of `http` / `ws`.
    /// Defaults to false.
    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    /// The path the server listens on for socket.io requests.
    /// Defaults to "/socket.io".
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Add a query parameter sent with every handshake and upgrade request.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.query.push((key.into(), value.into()));
        self
    }

    /// The base delay between two reconnection attempts.
    /// Defaults to 5 seconds.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// The maximum number of reconnection attempts before giving up.
    /// Defaults to 10.
    pub fn reconnect_attempts(mut self, attempts: usize) -> Self {
        self.config.reconnect_attempts = attempts;
        self
    }

    /// The maximum number of frames that can be buffered before being written to the server.
    /// Values lower than 2 are raised to 2.
    /// Defaults to 10000 frames.
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.max_buffer_size = max_buffer_size;
        self
    }

    /// Deadline applied to every handshake request, and to every websocket read and write.
    /// Defaults to 30 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// How long to wait for the namespace join acknowledgement after an open packet.
    /// Defaults to 100 milliseconds.
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
