#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use http::StatusCode;
use socketioxide_client::{
    ClientConfig, ClientConfigBuilder, Connection, PollingResponse, Transport, TransportError,
};
use tokio::sync::{Semaphore, mpsc, watch};

pub const SID: &str = "abc123";

pub fn open_packet(sid: &str) -> String {
    format!(
        r#"0{{"sid":"{sid}","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}}"#
    )
}

/// A config with deadlines long enough to never fire in tests.
pub fn config() -> ClientConfigBuilder {
    ClientConfig::builder("localhost", 3000).request_timeout(Duration::from_secs(3600))
}

pub async fn timeout_rcv<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timeout waiting for a value")
        .expect("channel closed")
}

pub async fn assert_no_rcv<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    // a closed channel cannot receive anything either
    let res = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(!matches!(res, Ok(Some(_))), "unexpected value: {res:?}");
}

/// Poll a condition every 10ms for at most one second.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get(String),
    Post(String, String),
    Connect(String),
}

struct State {
    requests: Mutex<Vec<Request>>,
    handshake_failures: AtomicUsize,
    reject_probe: AtomicBool,
    open_reply: Mutex<String>,
    join_reply: Mutex<String>,
    ping_interval: Mutex<Duration>,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
    conns: mpsc::UnboundedSender<ServerConn>,
}

/// A scripted [`Transport`]: polling requests are answered from its state and every
/// opened connection is handed to the test through the [`Server`].
#[derive(Clone)]
pub struct StubTransport {
    state: Arc<State>,
}

impl StubTransport {
    pub fn new() -> (Self, Server) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = State {
            requests: Mutex::new(Vec::new()),
            handshake_failures: AtomicUsize::new(0),
            reject_probe: AtomicBool::new(false),
            open_reply: Mutex::new(open_packet(SID)),
            join_reply: Mutex::new(r#"40/chat,{"sid":"ns-sid"}"#.to_string()),
            ping_interval: Mutex::new(Duration::from_secs(3600)),
            write_gate: Mutex::new(None),
            conns: tx,
        };
        let transport = Self {
            state: Arc::new(state),
        };
        (transport, Server { conns: rx })
    }

    /// The next `n` session requests are answered with a 503.
    pub fn fail_handshakes(&self, n: usize) {
        self.state.handshake_failures.store(n, Ordering::SeqCst);
    }

    pub fn reject_probe(&self) {
        self.state.reject_probe.store(true, Ordering::SeqCst);
    }

    pub fn open_reply(&self, reply: &str) {
        *self.state.open_reply.lock().unwrap() = reply.to_string();
    }

    pub fn join_reply(&self, reply: &str) {
        *self.state.join_reply.lock().unwrap() = reply.to_string();
    }

    pub fn ping_interval(&self, interval: Duration) {
        *self.state.ping_interval.lock().unwrap() = interval;
    }

    /// Block every non probe write of the next connections until a permit is added.
    pub fn gate_writes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.write_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The number of session requests, one per handshake attempt.
    pub fn handshakes(&self) -> usize {
        self.requests()
            .iter()
            .filter(|req| matches!(req, Request::Get(url) if !url.contains("&sid=")))
            .count()
    }

    fn record(&self, req: Request) {
        self.state.requests.lock().unwrap().push(req);
    }
}

impl Transport for StubTransport {
    type Conn = StubConnection;

    async fn get(&self, url: &str) -> Result<PollingResponse, TransportError> {
        self.record(Request::Get(url.to_string()));
        if url.contains("&sid=") {
            let reply = self.state.join_reply.lock().unwrap().clone();
            return Ok(PollingResponse::new(StatusCode::OK, reply));
        }
        let failed = self
            .state
            .handshake_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Ok(PollingResponse::new(StatusCode::SERVICE_UNAVAILABLE, ""))
        } else {
            let reply = self.state.open_reply.lock().unwrap().clone();
            Ok(PollingResponse::new(StatusCode::OK, reply))
        }
    }

    async fn post(&self, url: &str, body: String) -> Result<PollingResponse, TransportError> {
        self.record(Request::Post(url.to_string(), body));
        Ok(PollingResponse::new(StatusCode::OK, "ok"))
    }

    async fn connect(&self, url: &str) -> Result<StubConnection, TransportError> {
        self.record(Request::Connect(url.to_string()));
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let conn = StubConnection {
            incoming: tokio::sync::Mutex::new(client_rx),
            pending: Mutex::new(VecDeque::new()),
            outgoing: server_tx,
            closed: closed_tx,
            reject_probe: self.state.reject_probe.load(Ordering::SeqCst),
            gate: self.state.write_gate.lock().unwrap().clone(),
            ping_interval: *self.state.ping_interval.lock().unwrap(),
        };
        let server = ServerConn {
            tx: Some(client_tx),
            rx: server_rx,
            closed: closed_rx,
        };
        self.state.conns.send(server).ok();
        Ok(conn)
    }
}

/// The client half of a scripted connection.
///
/// The probe sequence is answered by the connection itself and is not recorded.
pub struct StubConnection {
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    pending: Mutex<VecDeque<String>>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: watch::Sender<bool>,
    reject_probe: bool,
    gate: Option<Arc<Semaphore>>,
    ping_interval: Duration,
}

impl Connection for StubConnection {
    async fn get_message(&self) -> Result<String, TransportError> {
        let pending = self.pending.lock().unwrap().pop_front();
        if let Some(frame) = pending {
            return Ok(frame);
        }
        let mut closed = self.closed.subscribe();
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            frame = incoming.recv() => frame.ok_or(TransportError::Closed),
            _ = closed.wait_for(|closed| *closed) => Err(TransportError::Closed),
        }
    }

    async fn write_message(&self, frame: &str) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        let reply = match frame {
            "2probe" if self.reject_probe => Some("3nope"),
            "2probe" => Some("3probe"),
            "5" => Some("6"),
            _ => None,
        };
        if let Some(reply) = reply {
            self.pending.lock().unwrap().push_back(reply.to_string());
            return Ok(());
        }

        if let Some(gate) = &self.gate {
            let mut closed = self.closed.subscribe();
            tokio::select! {
                permit = gate.acquire() => permit.map_err(|_| TransportError::Closed)?.forget(),
                _ = closed.wait_for(|closed| *closed) => return Err(TransportError::Closed),
            }
        }
        self.outgoing
            .send(frame.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn ping_params(&self) -> (Duration, Duration) {
        (self.ping_interval, self.ping_interval)
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Hands the server half of every connection opened by a [`StubTransport`].
pub struct Server {
    conns: mpsc::UnboundedReceiver<ServerConn>,
}

impl Server {
    /// Wait for the next connection, reconnections may take several backoff delays.
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(Duration::from_secs(30), self.conns.recv())
            .await
            .expect("timeout waiting for a connection")
            .expect("transport dropped")
    }
}

/// The server half of a scripted connection.
#[derive(Debug)]
pub struct ServerConn {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
    closed: watch::Receiver<bool>,
}

impl ServerConn {
    pub fn send(&self, frame: &str) {
        self.tx
            .as_ref()
            .expect("connection dropped")
            .send(frame.to_string())
            .unwrap();
    }

    /// The next frame written by the client.
    pub async fn recv(&mut self) -> String {
        timeout_rcv(&mut self.rx).await
    }

    pub async fn assert_no_frame(&mut self) {
        assert_no_rcv(&mut self.rx).await;
    }

    /// Simulate a broken connection: the next client read fails.
    pub fn drop_connection(&mut self) {
        self.tx.take();
    }

    /// Whether the client closed its half.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
