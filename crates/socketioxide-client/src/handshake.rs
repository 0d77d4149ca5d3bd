//! Session bootstrap: the polling handshake followed by the websocket upgrade.
//!
//! ```text
//! CLIENT                                                     SERVER
//!  │  GET  ?EIO=4&transport=polling&t=...                      │
//!  │ ────────────────────────────────────────────────────────► │
//!  │  0{"sid":"abc123","pingInterval":25000,...}               │
//!  │ ◄──────────────────────────────────────────────────────── │
//!  │  POST ...&sid=abc123         40/<ns>,                     │
//!  │ ────────────────────────────────────────────────────────► │
//!  │  GET  ...&sid=abc123                                      │
//!  │ ────────────────────────────────────────────────────────► │
//!  │  40/<ns>,{"sid":"..."}                                    │
//!  │ ◄──────────────────────────────────────────────────────── │
//!  │  ws  ?EIO=4&transport=websocket&sid=abc123                │
//!  │ ───────────────────────────────────────────────────────► │
//!  │  2probe                                                   │
//!  │ ───────────────────────────────────────────────────────► │
//!  │  3probe                                                   │
//!  │ ◄─────────────────────────────────────────────────────── │
//!  │  5                                                        │
//!  │ ───────────────────────────────────────────────────────► │
//!  │  3probe | 6 | 2 | 40...                                   │
//!  │ ◄─────────────────────────────────────────────────────── │
//! ```
use std::{future::Future, time::Duration};

use socketioxide_client_core::{
    EngineType, Message, SessionHeader,
    packet::{PROBE_PING, PROBE_PONG},
};

use crate::{
    config::{ClientConfig, with_sid},
    errors::{Error, TransportError},
    ns::Namespace,
    transport::{Connection, PollingResponse, Transport},
};

/// Acquire a session and bind it to the namespace through three polling requests.
///
/// On success the namespace holds the new `sid` and is marked as initialized.
pub(crate) async fn handshake<T: Transport>(
    transport: &T,
    config: &ClientConfig,
    ns: &Namespace,
) -> Result<SessionHeader, Error> {
    let url = config.handshake_url();
    let timeout = config.request_timeout;

    let res = polling(timeout, transport.get(&url)).await?;
    let header = parse_open_packet(&res.body)?;
    #[cfg(feature = "tracing")]
    tracing::debug!(sid = %header.sid, "session acquired");

    let url = with_sid(&url, &header.sid);
    let connect = Message::connect(ns.name.as_str()).encode();
    polling(timeout, transport.post(&url, connect)).await?;

    let res = polling(timeout, transport.get(&url)).await?;
    // The server may already have queued an event after the connect acknowledgement.
    if !res.body.starts_with("40") && !res.body.starts_with("42") {
        return Err(Error::HandshakeFailed(format!(
            "check your auth or namespace: {}",
            res.body
        )));
    }

    ns.set_sid(header.sid.clone());
    ns.set_initialized();
    Ok(header)
}

/// Open the websocket of an acquired session and run the probe sequence.
///
/// The connection is closed if the probe fails.
pub(crate) async fn upgrade<T: Transport>(
    transport: &T,
    config: &ClientConfig,
    sid: &str,
) -> Result<T::Conn, Error> {
    let url = config.websocket_url(sid);
    let conn = tokio::time::timeout(config.request_timeout, transport.connect(&url))
        .await
        .map_err(TransportError::from)
        .and_then(|res| res)
        .map_err(|e| Error::UpgradeFailed(e.to_string()))?;

    match probe(&conn, config.request_timeout).await {
        Ok(()) => Ok(conn),
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid, ?e, "websocket probe failed");
            conn.close().await;
            Err(e)
        }
    }
}

async fn probe<C: Connection>(conn: &C, timeout: Duration) -> Result<(), Error> {
    write(conn, timeout, PROBE_PING).await?;
    let reply = read(conn, timeout).await?;
    if reply != PROBE_PONG {
        return Err(Error::UpgradeFailed(format!(
            "unexpected probe reply: {reply}"
        )));
    }

    let upgrade = Message::engine(EngineType::Upgrade).encode();
    write(conn, timeout, &upgrade).await?;
    let reply = read(conn, timeout).await?;
    match reply.as_str() {
        PROBE_PONG | "6" => Ok(()),
        "2" => write(conn, timeout, &Message::engine(EngineType::Pong).encode()).await,
        reply if reply.starts_with("40") => Ok(()),
        reply => Err(Error::UpgradeFailed(format!(
            "unexpected upgrade reply: {reply}"
        ))),
    }
}

async fn write<C: Connection>(conn: &C, timeout: Duration, frame: &str) -> Result<(), Error> {
    match tokio::time::timeout(timeout, conn.write_message(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::UpgradeFailed(e.to_string())),
        Err(_) => Err(Error::UpgradeFailed(TransportError::Timeout.to_string())),
    }
}

async fn read<C: Connection>(conn: &C, timeout: Duration) -> Result<String, Error> {
    match tokio::time::timeout(timeout, conn.get_message()).await {
        Ok(Ok(frame)) => Ok(frame),
        Ok(Err(e)) => Err(Error::UpgradeFailed(e.to_string())),
        Err(_) => Err(Error::UpgradeFailed(TransportError::Timeout.to_string())),
    }
}

/// Run a polling request with a deadline, any failure or non 2xx status fails the handshake.
async fn polling(
    timeout: Duration,
    req: impl Future<Output = Result<PollingResponse, TransportError>>,
) -> Result<PollingResponse, Error> {
    let res = tokio::time::timeout(timeout, req)
        .await
        .map_err(TransportError::from)
        .and_then(|res| res)
        .map_err(|e| Error::HandshakeFailed(e.to_string()))?;
    if !res.status.is_success() {
        return Err(Error::HandshakeFailed(format!(
            "unexpected status {}",
            res.status
        )));
    }
    Ok(res)
}

/// A polling body may hold several packets separated by a record separator,
/// the open packet is the first one.
fn parse_open_packet(body: &str) -> Result<SessionHeader, Error> {
    let packet = body.split('\x1e').next().unwrap_or_default();
    match packet.strip_prefix('0') {
        Some(payload) => SessionHeader::from_open_payload(payload)
            .map_err(|_| Error::HandshakeFailed(format!("invalid open packet: {packet}"))),
        None => Err(Error::HandshakeFailed(format!(
            "expected an open packet: {packet}"
        ))),
    }
}
