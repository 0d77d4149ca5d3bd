//! The [`Client`] facade and the shared state behind it.
use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, RwLock, Weak},
};

use serde::Serialize;
use socketioxide_client_core::{Content, Message, SessionHeader};
use tokio::task::JoinHandle;

use crate::{
    channel::Channel,
    config::ClientConfig,
    errors::Error,
    handler::{CONNECTION_EVENT, DISCONNECTION_EVENT, EventHandler, Registry},
    handshake,
    ns::Namespace,
    reconnect::ReconnectState,
    transport::{Connection, Transport, WsTransport},
};

/// A socket.io client bound to a single namespace.
///
/// It is cheap to clone, every clone drives the same connection.
///
/// ```no_run
/// # use socketioxide_client::{Client, ClientConfig, Content, WsTransport};
/// # async fn doc() -> Result<(), socketioxide_client::Error> {
/// let config = ClientConfig::builder("localhost", 3000).build();
/// let client = Client::builder(config)
///     .on("greet", async |content: Content| println!("greeted: {content:?}"))?
///     .connect(WsTransport::default(), "/chat")
///     .await?;
///
/// client.emit("greet", &serde_json::json!({ "x": 1 }))?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Client<T: Transport = WsTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Client {
    /// Create a [`ClientBuilder`] to register handlers before connecting.
    ///
    /// Handlers registered on the builder observe the `connection` event of the first connection.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }
}

impl<T: Transport> Client<T> {
    /// Connect to the namespace `ns` of the server described by the config.
    ///
    /// It runs the polling handshake, upgrades the session to the streaming connection
    /// and starts the inbound, outbound and keepalive loops.
    pub async fn connect(config: ClientConfig, transport: T, ns: &str) -> Result<Self, Error> {
        ClientBuilder::new(config).connect(transport, ns).await
    }

    /// Emit an event to the server.
    ///
    /// The payload must serialize to a string or an object,
    /// it is sent as `42/<ns>,["<event>",<payload>]`.
    ///
    /// The frame is queued: it fails with [`Error::Overflow`] when the outbound queue is full
    /// and with [`Error::Closed`] once the client is closed.
    pub fn emit<P: Serialize + ?Sized>(&self, event: &str, payload: &P) -> Result<(), Error> {
        let content = to_content(payload)?;
        self.inner.emit_content(event, content)
    }

    /// Register a handler for an event. A previous handler for the same event is replaced.
    /// See the [`handler`](crate::handler) module for the accepted handler shapes.
    pub fn on<H, M>(&self, event: &str, handler: H) -> Result<(), Error>
    where
        H: EventHandler<M>,
        M: Send + Sync + 'static,
    {
        self.inner.registry.on(event, handler)
    }

    /// Disconnect from the namespace and close the connection.
    ///
    /// The `disconnection` handler is called once, every registered handler is removed
    /// and every background task of the client is stopped before this returns.
    /// Closing twice is a no-op.
    pub async fn close(&self) {
        if let Some(conn) = self.inner.channel.current() {
            let frame = Message::disconnect(self.inner.ns.name.as_str()).encode();
            let timeout = self.inner.config.request_timeout;
            tokio::time::timeout(timeout, conn.write_message(&frame))
                .await
                .ok();
        }
        self.inner.teardown().await;
        self.inner.join_tasks().await;
    }

    /// The namespace name, without its leading `/`.
    pub fn ns(&self) -> &str {
        &self.inner.ns.name
    }

    /// The engine.io session id of the current connection.
    pub fn sid(&self) -> Option<String> {
        self.inner.ns.sid()
    }

    /// Whether a connection is up and the namespace is joined.
    pub fn is_connected(&self) -> bool {
        self.inner.channel.is_connected() && self.inner.ns.is_initialized()
    }

    /// Whether the outbound queue is more than half full.
    /// Emitters should slow down while this is set.
    pub fn is_overflowing(&self) -> bool {
        self.inner.channel.is_overflowing()
    }

    /// The session parameters sent by the server for the current connection.
    pub fn session(&self) -> Option<SessionHeader> {
        self.inner.session.read().unwrap().clone()
    }

    /// A handle to emit events that does not keep the client alive.
    pub fn emitter(&self) -> Emitter {
        self.inner.emitter()
    }
}

impl<T: Transport> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("ns", &self.inner.ns.name)
            .field("sid", &self.sid())
            .field("channel", &self.inner.channel)
            .field("handlers", &self.inner.registry)
            .finish()
    }
}

/// A builder to register handlers before the first connection.
#[derive(Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    registry: Registry,
}

impl ClientBuilder {
    /// Create a new builder
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            registry: Registry::default(),
        }
    }

    /// Register a handler for an event.
    /// See the [`handler`](crate::handler) module for the accepted handler shapes.
    pub fn on<H, M>(self, event: &str, handler: H) -> Result<Self, Error>
    where
        H: EventHandler<M>,
        M: Send + Sync + 'static,
    {
        self.registry.on(event, handler)?;
        Ok(self)
    }

    /// Connect to the namespace `ns`.
    pub async fn connect<T: Transport>(self, transport: T, ns: &str) -> Result<Client<T>, Error> {
        let inner = Arc::new(Inner {
            channel: Channel::new(self.config.max_buffer_size),
            reconnect: tokio::sync::Mutex::new(ReconnectState::new(
                self.config.reconnect_delay,
                self.config.reconnect_attempts,
            )),
            ns: Namespace::new(ns),
            registry: self.registry,
            session: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            config: self.config,
            transport,
        });

        let header = handshake::handshake(&inner.transport, &inner.config, &inner.ns).await?;
        let conn = handshake::upgrade(&inner.transport, &inner.config, &header.sid).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(ns = %inner.ns.name, sid = %header.sid, "client connected");
        *inner.session.write().unwrap() = Some(header);
        inner.start(conn).await?;
        Ok(Client { inner })
    }
}

/// A handle given to handlers to emit events back to the server.
///
/// It does not keep the client alive: emitting after the client is dropped
/// fails with [`Error::Closed`].
#[derive(Clone)]
pub struct Emitter {
    inner: Weak<dyn Emit>,
}

pub(crate) trait Emit: Send + Sync + 'static {
    fn emit_content(&self, event: &str, content: Content) -> Result<(), Error>;
}

impl Emitter {
    /// Emit an event to the server, see [`Client::emit`].
    pub fn emit<P: Serialize + ?Sized>(&self, event: &str, payload: &P) -> Result<(), Error> {
        let content = to_content(payload)?;
        let inner = self.inner.upgrade().ok_or(Error::Closed)?;
        inner.emit_content(event, content)
    }

    #[cfg(test)]
    pub(crate) fn new(inner: Weak<dyn Emit>) -> Self {
        Self { inner }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        struct Detached;
        impl Emit for Detached {
            fn emit_content(&self, _: &str, _: Content) -> Result<(), Error> {
                Err(Error::Closed)
            }
        }
        Self {
            inner: Weak::<Detached>::new(),
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

fn to_content<P: Serialize + ?Sized>(payload: &P) -> Result<Content, Error> {
    let value = serde_json::to_value(payload)?;
    Ok(Content::try_from(value)?)
}

/// The state shared by the client handles and its background tasks.
pub(crate) struct Inner<T: Transport> {
    pub config: ClientConfig,
    pub transport: T,
    pub ns: Namespace,
    pub channel: Channel<T::Conn>,
    pub registry: Registry,
    pub reconnect: tokio::sync::Mutex<ReconnectState>,
    pub session: RwLock<Option<SessionHeader>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> Emit for Inner<T> {
    fn emit_content(&self, event: &str, content: Content) -> Result<(), Error> {
        if event.is_empty() {
            return Err(Error::InvalidEventName);
        }
        let frame = Message::event(self.ns.name.as_str(), event, content).encode();
        self.channel.enqueue(frame)
    }
}

impl<T: Transport> Inner<T> {
    pub fn emitter(self: &Arc<Self>) -> Emitter {
        let inner: Weak<Inner<T>> = Arc::downgrade(self);
        Emitter { inner }
    }

    /// Attach a freshly upgraded connection and start its loops.
    pub async fn start(self: &Arc<Self>, conn: T::Conn) -> Result<(), Error> {
        let conn = Arc::new(conn);
        match self.channel.attach(conn.clone()) {
            Ok((generation, previous)) => {
                if let Some(previous) = previous {
                    previous.close().await;
                }
                self.spawn_loops(generation, conn);
                self.registry
                    .dispatch(self.emitter(), CONNECTION_EVENT, None);
                Ok(())
            }
            Err(conn) => {
                conn.close().await;
                Err(Error::Closed)
            }
        }
    }

    /// Tear the client down: close the connection, drop queued frames
    /// and call the `disconnection` handler. Only the first call has an effect.
    pub async fn teardown(self: &Arc<Self>) {
        let Some(conn) = self.channel.teardown() else {
            return;
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(ns = %self.ns.name, "tearing down client");
        if let Some(conn) = conn {
            conn.close().await;
        }
        self.channel.drain().await;
        self.ns.reset();
        self.registry
            .dispatch(self.emitter(), DISCONNECTION_EVENT, None);
        self.registry.clear();
    }

    /// Spawn a background task that [`Client::close`] waits for.
    pub fn spawn_task<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for every background task, including the ones spawned while waiting.
    async fn join_tasks(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                task.await.ok();
            }
        }
    }
}
