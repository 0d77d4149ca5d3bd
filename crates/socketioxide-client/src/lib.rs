#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
//! A socket.io v4 client bound to a single namespace, running on top of [`tokio`].
//!
//! ## Table of contents
//! * [Features](#features)
//! * [Usage](#usage)
//! * [Handlers](#handlers)
//! * [Connection lifecycle](#connection-lifecycle)
//! * [Backpressure](#backpressure)
//!
//! ## Features
//! * Engine.IO v4 polling handshake followed by a websocket upgrade
//! * Namespaced events with string or object payloads
//! * Keepalive and bounded reconnection with a linear backoff
//! * A bounded outbound queue that survives reconnections
//! * Pluggable [`Transport`], the default [`WsTransport`] uses `reqwest` and `tokio-tungstenite`
//!
//! ## Usage
//! ```no_run
//! use socketioxide_client::{Client, ClientConfig, Content, Emitter, WsTransport};
//!
//! # async fn doc() -> Result<(), socketioxide_client::Error> {
//! let config = ClientConfig::builder("localhost", 3000)
//!     .query("token", "secret")
//!     .build();
//!
//! let client = Client::builder(config)
//!     .on("connection", async || println!("joined"))?
//!     .on("message", async |emitter: Emitter, event: String, content: Option<Content>| {
//!         println!("{event}: {content:?}");
//!         emitter.emit("ack", "ok")
//!     })?
//!     .connect(WsTransport::default(), "/chat")
//!     .await?;
//!
//! client.emit("message", "hello")?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Handlers
//! Handlers are async closures registered per event name, see the [`handler`] module.
//! Three events are reserved:
//! * `connection`: the namespace is joined, after the first connection and after each reconnection.
//! * `disconnection`: the client is torn down, it is called exactly once.
//! * `error`: the server refused the namespace join, the handler receives the error payload.
//!
//! ## Connection lifecycle
//! A read or write failure on the websocket detaches the connection and starts a reconnection
//! sequence: a new handshake and upgrade are attempted up to
//! [`ClientConfigBuilder::reconnect_attempts`] times, the n-th attempt starting
//! `n * reconnect_delay` after the previous one. Once exhausted the client is closed.
//!
//! ## Backpressure
//! Emitted frames are queued and written in order by a background task.
//! [`Client::is_overflowing`] turns on once the queue is more than half full.
//! When the queue is full the client is closed.
pub mod handler;
pub mod transport;

pub use client::{Client, ClientBuilder, Emitter};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use errors::{Error, TransportError};
pub use handler::{EventHandler, HandlerResult};
pub use socketioxide_client_core::{Content, ProtocolVersion, SessionHeader, TransportType};
pub use transport::{Connection, PollingResponse, Transport, WsConnection, WsTransport};

mod channel;
mod client;
mod config;
mod errors;
mod handshake;
mod ns;
mod pump;
mod reconnect;
