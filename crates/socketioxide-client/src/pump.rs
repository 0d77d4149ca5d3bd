//! The loops driving a connection generation.
//!
//! * The inbound loop reads frames and routes them by engine.io type.
//! * The outbound loop writes queued frames in order and watches the queue depth.
//! * The keepalive loop periodically queues a pong frame.
//!
//! All of them stop as soon as the channel generation changes. A read or write failure
//! detaches the connection and hands over to the reconnection sequence.
use std::{ops::ControlFlow, sync::Arc, time::Duration};

use socketioxide_client_core::{EngineType, Message, SessionHeader, SocketType, parse_engine_type};
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    client::Inner,
    errors::{Error, TransportError},
    handler::{CONNECTION_EVENT, ERROR_EVENT},
    handshake,
    transport::{Connection, Transport},
};

impl<T: Transport> Inner<T> {
    pub(crate) fn spawn_loops(self: &Arc<Self>, generation: u64, conn: Arc<T::Conn>) {
        #[cfg(feature = "tracing")]
        tracing::debug!(generation, "starting connection loops");
        let (interval, _) = conn.ping_params();
        self.spawn_task(self.clone().inbound_loop(generation, conn.clone()));
        self.spawn_task(self.clone().outbound_loop(generation, conn));
        self.spawn_task(self.clone().keepalive_loop(generation, interval));
    }

    async fn inbound_loop(self: Arc<Self>, generation: u64, conn: Arc<T::Conn>) {
        let mut signal = self.channel.subscribe();
        loop {
            let res = tokio::select! {
                res = tokio::time::timeout(self.config.request_timeout, conn.get_message()) => res,
                _ = signal.wait_for(|s| s.generation != generation) => return,
            };
            let frame = match res {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => return self.fault(generation, e),
                Err(_) => return self.fault(generation, TransportError::Timeout),
            };
            #[cfg(feature = "tracing")]
            tracing::trace!(%frame, "received frame");
            if self.handle_frame(&frame).await.is_break() {
                return;
            }
        }
    }

    async fn handle_frame(self: &Arc<Self>, frame: &str) -> ControlFlow<()> {
        let engine = match parse_engine_type(frame) {
            Ok(engine) => engine,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(frame, "dropping frame: {_e}");
                return ControlFlow::Continue(());
            }
        };
        match engine {
            EngineType::Open => self.on_open(&frame[1..]),
            EngineType::Ping => self.enqueue(Message::engine(EngineType::Pong).encode()),
            EngineType::Message => return self.on_message(frame).await,
            EngineType::Close => {
                self.teardown().await;
                return ControlFlow::Break(());
            }
            EngineType::Pong | EngineType::Upgrade | EngineType::Noop => (),
        }
        ControlFlow::Continue(())
    }

    /// A new session opened on the streaming connection: join the namespace again
    /// and call the `connection` handler once the server acknowledged it.
    fn on_open(self: &Arc<Self>, payload: &str) {
        let header = match SessionHeader::from_open_payload(payload) {
            Ok(header) => header,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(payload, "dropping open packet: {_e}");
                return;
            }
        };
        self.ns.set_sid(header.sid.clone());
        *self.session.write().unwrap() = Some(header);
        self.enqueue(Message::connect(self.ns.name.as_str()).encode());

        // The join acknowledgement is read by the inbound loop, it must not wait for it.
        let inner = self.clone();
        self.spawn_task(async move {
            let joined = tokio::time::timeout(inner.config.join_timeout, inner.ns.joined()).await;
            if joined.is_err() {
                #[cfg(feature = "tracing")]
                tracing::debug!(ns = %inner.ns.name, "no join acknowledgement, calling the connection handler anyway");
            }
            inner
                .registry
                .dispatch(inner.emitter(), CONNECTION_EVENT, None);
        });
    }

    async fn on_message(self: &Arc<Self>, frame: &str) -> ControlFlow<()> {
        let msg = match Message::decode(frame) {
            Ok(msg) => msg,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(frame, "dropping frame: {_e}");
                return ControlFlow::Continue(());
            }
        };
        if msg.event.ns != self.ns.name {
            #[cfg(feature = "tracing")]
            tracing::debug!(ns = %msg.event.ns, "dropping frame for another namespace");
            return ControlFlow::Continue(());
        }
        match msg.socket {
            SocketType::Connect => self.ns.set_initialized(),
            SocketType::Event if !msg.event.name.is_empty() => {
                let handled =
                    self.registry
                        .dispatch(self.emitter(), &msg.event.name, msg.event.content);
                if !handled {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(event = %msg.event.name, "no handler for event");
                }
            }
            SocketType::ConnectError => {
                self.registry
                    .dispatch(self.emitter(), ERROR_EVENT, msg.event.content);
            }
            SocketType::Disconnect => {
                self.teardown().await;
                return ControlFlow::Break(());
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::debug!(frame, "dropping unsupported frame");
            }
        }
        ControlFlow::Continue(())
    }

    fn enqueue(&self, frame: String) {
        if let Err(_e) = self.channel.enqueue(frame) {
            #[cfg(feature = "tracing")]
            tracing::debug!("cannot queue frame: {_e}");
        }
    }

    async fn outbound_loop(self: Arc<Self>, generation: u64, conn: Arc<T::Conn>) {
        let res = {
            let mut rx = self.channel.rx.lock().await;
            self.write_frames(&mut rx, generation, &conn).await
        };
        match res {
            Ok(()) => (),
            Err(Error::Overflow) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(ns = %self.ns.name, "outbound queue overflow, closing the client");
                self.teardown().await;
            }
            Err(Error::TransportFault(e)) => self.fault(generation, e),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("outbound loop stopped: {_e}");
            }
        }
    }

    /// Write queued frames until the generation changes.
    /// The queue depth is sampled before each dequeue to maintain the overflow state.
    async fn write_frames(
        &self,
        rx: &mut mpsc::Receiver<String>,
        generation: u64,
        conn: &T::Conn,
    ) -> Result<(), Error> {
        let mut signal = self.channel.subscribe();
        if signal.borrow().generation != generation {
            return Ok(());
        }
        if let Some(frame) = self.channel.take_stash() {
            self.write(conn, frame).await?;
        }
        let capacity = self.channel.capacity();
        loop {
            let depth = self.channel.depth();
            if depth >= capacity - 1 {
                return Err(Error::Overflow);
            }
            self.channel.set_overflowing(depth > capacity / 2);

            let frame = tokio::select! {
                biased;
                _ = signal.wait_for(|s| s.generation != generation) => return Ok(()),
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => return Ok(()),
                },
            };
            self.write(conn, frame).await?;
        }
    }

    /// A frame that could not be written is kept for the next generation.
    async fn write(&self, conn: &T::Conn, frame: String) -> Result<(), Error> {
        let res = tokio::time::timeout(self.config.request_timeout, conn.write_message(&frame))
            .await
            .map_err(TransportError::from)
            .and_then(|res| res);
        if let Err(e) = res {
            self.channel.stash(frame);
            return Err(e.into());
        }
        Ok(())
    }

    async fn keepalive_loop(self: Arc<Self>, generation: u64, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        let mut signal = self.channel.subscribe();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => (),
                _ = signal.wait_for(|s| s.generation != generation) => return,
            }
            match self.channel.enqueue(Message::engine(EngineType::Pong).encode()) {
                Ok(()) | Err(Error::Overflow) => (),
                Err(_) => return,
            }
        }
    }

    /// Detach the connection of a failed generation and start a reconnection sequence.
    /// Faults of a generation that is not the current one are ignored.
    fn fault(self: &Arc<Self>, generation: u64, _err: TransportError) {
        let Some(conn) = self.channel.detach(generation) else {
            return;
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(generation, "transport fault: {_err}");
        let inner = self.clone();
        self.spawn_task(async move {
            conn.close().await;
            inner.reconnect().await;
        });
    }

    async fn reconnect(self: Arc<Self>) {
        let mut signal = self.channel.subscribe();
        let res = {
            let mut state = self.reconnect.lock().await;
            tokio::select! {
                res = state.retry(|_| self.reconnect_attempt()) => res,
                _ = signal.wait_for(|s| !s.alive) => return,
            }
        };
        if let Err(_e) = res {
            #[cfg(feature = "tracing")]
            tracing::warn!(ns = %self.ns.name, "cannot reconnect: {_e}");
            self.teardown().await;
        }
    }

    async fn reconnect_attempt(self: &Arc<Self>) -> Result<(), Error> {
        let header = handshake::handshake(&self.transport, &self.config, &self.ns).await?;
        let conn = handshake::upgrade(&self.transport, &self.config, &header.sid).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = %header.sid, "reconnected");
        *self.session.write().unwrap() = Some(header);
        self.start(conn).await
    }
}
