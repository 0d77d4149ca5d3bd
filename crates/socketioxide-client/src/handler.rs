//! [`EventHandler`] trait and the handler registry used to dispatch inbound events.
//!
//! Handlers are async closures with one of the following shapes:
//! * `async || {}`: called for every occurrence of the event, with or without payload.
//! * `async |content: Content| {}`: called with the event payload.
//!   Events without payload are skipped for this shape.
//! * `async |emitter: Emitter, event: String, content: Option<Content>| {}`:
//!   called with a handle to emit messages back, the event name and the optional payload.
//!
//! The future may return `()` or a `Result<(), E>` with `E: Display`. Errors are logged,
//! they never reach the connection.
//!
//! Each call is spawned on its own task, a slow or panicking handler never blocks the client.
//!
//! ## Example
//! ```rust
//! # use socketioxide_client::{Client, ClientConfig, Content, Emitter};
//! let builder = Client::builder(ClientConfig::builder("localhost", 3000).build())
//!     .on("connection", async || println!("connected"))?
//!     .on("greet", async |content: Content| {
//!         println!("greeted with {content:?}");
//!     })?
//!     .on("ping", async |emitter: Emitter, _event: String, _content: Option<Content>| {
//!         emitter.emit("pong", "hello")
//!     })?;
//! # Ok::<(), socketioxide_client::Error>(())
//! ```
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, RwLock},
};

use socketioxide_client_core::Content;

use crate::{client::Emitter, errors::Error};

/// Event dispatched once the client is connected to its namespace.
pub const CONNECTION_EVENT: &str = "connection";
/// Event dispatched once, when the client is torn down.
pub const DISCONNECTION_EVENT: &str = "disconnection";
/// Event dispatched when the server refuses the namespace join.
pub const ERROR_EVENT: &str = "error";

/// The return type of a handler future.
pub trait HandlerResult: Send + 'static {
    #[doc(hidden)]
    fn into_error(self) -> Option<String>;
}

impl HandlerResult for () {
    fn into_error(self) -> Option<String> {
        None
    }
}

impl<E: fmt::Display + Send + 'static> HandlerResult for Result<(), E> {
    fn into_error(self) -> Option<String> {
        self.err().map(|e| e.to_string())
    }
}

mod private {
    #[derive(Debug, Clone, Copy)]
    pub enum Empty {}
    #[derive(Debug, Clone, Copy)]
    pub enum Payload {}
    #[derive(Debug, Clone, Copy)]
    pub enum CatchAll {}
}

/// Define a handler for an event.
/// It is implemented for async closures with one of the shapes listed in the [module](self) doc.
#[diagnostic::on_unimplemented(
    note = "Event handlers must be async closures taking `()`, `(Content)` or `(Emitter, String, Option<Content>)`",
    note = "The returned future must output `()` or `Result<(), E>` where `E: Display`"
)]
pub trait EventHandler<T>: Send + Sync + 'static {
    /// Call the handler, spawning its future.
    fn call(&self, emitter: Emitter, event: &str, content: Option<Content>);

    #[doc(hidden)]
    fn takes_payload(&self) -> bool {
        false
    }

    #[doc(hidden)]
    fn phantom(&self) -> std::marker::PhantomData<T> {
        std::marker::PhantomData
    }
}

impl<F, Fut> EventHandler<(private::Empty,)> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResult,
{
    fn call(&self, _: Emitter, event: &str, _: Option<Content>) {
        spawn_handler(event, (self)());
    }
}

impl<F, Fut> EventHandler<(private::Payload,)> for F
where
    F: Fn(Content) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResult,
{
    fn call(&self, _: Emitter, event: &str, content: Option<Content>) {
        match content {
            Some(content) => spawn_handler(event, (self)(content)),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(event, "skipping payload handler for an event without payload");
            }
        }
    }

    fn takes_payload(&self) -> bool {
        true
    }
}

impl<F, Fut> EventHandler<(private::CatchAll,)> for F
where
    F: Fn(Emitter, String, Option<Content>) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResult,
{
    fn call(&self, emitter: Emitter, event: &str, content: Option<Content>) {
        spawn_handler(event, (self)(emitter, event.to_owned(), content));
    }
}

fn spawn_handler<Fut>(event: &str, fut: Fut)
where
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResult,
{
    #[cfg(feature = "tracing")]
    let event = event.to_owned();
    #[cfg(not(feature = "tracing"))]
    let _ = event;
    tokio::spawn(async move {
        if let Some(_err) = fut.await.into_error() {
            #[cfg(feature = "tracing")]
            tracing::warn!(%event, "handler returned an error: {_err}");
        }
    });
}

/// A type erased [`EventHandler`] so it can be stored in a map.
trait ErasedEventHandler: Send + Sync + 'static {
    fn call(&self, emitter: Emitter, event: &str, content: Option<Content>);
}

struct MakeErasedHandler<H, T> {
    handler: H,
    type_: std::marker::PhantomData<T>,
}

impl<H, T> ErasedEventHandler for MakeErasedHandler<H, T>
where
    H: EventHandler<T>,
    T: Send + Sync + 'static,
{
    #[inline(always)]
    fn call(&self, emitter: Emitter, event: &str, content: Option<Content>) {
        self.handler.call(emitter, event, content);
    }
}

/// Event name to handler map. The last registration of a name wins.
#[derive(Default)]
pub(crate) struct Registry {
    handlers: RwLock<HashMap<String, Arc<dyn ErasedEventHandler>>>,
}

impl Registry {
    pub fn on<H, T>(&self, event: &str, handler: H) -> Result<(), Error>
    where
        H: EventHandler<T>,
        T: Send + Sync + 'static,
    {
        if event.is_empty() {
            return Err(Error::InvalidEventName);
        }
        if handler.takes_payload() && (event == CONNECTION_EVENT || event == DISCONNECTION_EVENT)
        {
            return Err(Error::InvalidHandlerSignature(event.to_owned()));
        }
        let handler = MakeErasedHandler {
            handler,
            type_: std::marker::PhantomData,
        };
        self.handlers
            .write()
            .unwrap()
            .insert(event.to_owned(), Arc::new(handler));
        Ok(())
    }

    /// Call the handler registered for this event, if any.
    /// Returns false when no handler is registered.
    pub fn dispatch(&self, emitter: Emitter, event: &str, content: Option<Content>) -> bool {
        let handler = self.handlers.read().unwrap().get(event).cloned();
        match handler {
            Some(handler) => {
                handler.call(emitter, event, content);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.handlers.write().unwrap().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.handlers.read().unwrap().len()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap();
        f.debug_set().entries(handlers.keys()).finish()
    }
}
