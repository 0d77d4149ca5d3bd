//! Errors returned when a frame cannot be decoded.

/// An error that occurs when parsing a frame.
///
/// Both variants are recoverable: the frame is dropped and the connection keeps going.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The frame does not follow the engine.io / socket.io framing
    /// (empty frame, unknown type digit, bad namespace section, invalid json, missing event name...).
    #[error("malformed frame")]
    MalformedFrame,

    /// The frame was decoded but the event payload is neither a string nor a key/value mapping.
    #[error("unsupported payload type: {0}")]
    UnsupportedPayloadType(&'static str),
}
