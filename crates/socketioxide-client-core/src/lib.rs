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

//! Wire codec for the socketioxide client.
//!
//! It converts between raw engine.io / socket.io text frames and structured [`Message`]s.
//! There is no state and no I/O in this crate: every function is pure.
//!
//! The frame format handled here is:
//! ```text
//! <engine.io type>[<socket.io type>][/<namespace>,][<ack id>][JSON-stringified [event, payload]]
//! ```

pub mod de;
pub mod errors;
pub mod packet;
pub mod protocol;

pub use de::{parse_engine_type, parse_event, parse_socket_type};
pub use errors::ParseError;
pub use packet::{Content, EngineType, Message, SessionHeader, SocketEvent, SocketType};
pub use protocol::{ProtocolVersion, TransportType};
