//! The outbound queue and the connection state shared by the inbound, outbound and keepalive loops.
//!
//! The channel lives as long as the client: a reconnection attaches a new connection to it,
//! bumping its generation, so frames queued while the connection was down are not lost.
//! Every loop is bound to one generation and stops as soon as the generation changes.
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{mpsc, watch};

use crate::errors::Error;

const MIN_CAPACITY: usize = 2;

/// The state broadcast to the loops each time it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Signal {
    pub generation: u64,
    pub alive: bool,
}

struct State<C> {
    alive: bool,
    conn: Option<Arc<C>>,
    generation: u64,
}

pub(crate) struct Channel<C> {
    tx: mpsc::Sender<String>,
    /// Only the outbound loop of the current generation holds this lock.
    pub rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    state: Mutex<State<C>>,
    signal: watch::Sender<Signal>,
    overflowing: AtomicBool,
    /// A frame whose write failed, written first by the next generation.
    stash: Mutex<Option<String>>,
}

impl<C> Channel<C> {
    /// The capacity is at least 2 so that the overflow watermarks stay meaningful.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(MIN_CAPACITY));
        let (signal, _) = watch::channel(Signal {
            generation: 0,
            alive: true,
        });
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            state: Mutex::new(State {
                alive: true,
                conn: None,
                generation: 0,
            }),
            signal,
            overflowing: AtomicBool::new(false),
            stash: Mutex::new(None),
        }
    }

    /// Push a frame at the back of the queue.
    ///
    /// It fails fast with [`Error::Overflow`] when the queue is full
    /// and with [`Error::Closed`] once the channel is torn down.
    pub fn enqueue(&self, frame: String) -> Result<(), Error> {
        // The state lock is held so that no frame can be queued after a teardown drained the queue.
        let state = self.state.lock().unwrap();
        if !state.alive {
            return Err(Error::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Overflow,
            mpsc::error::TrySendError::Closed(_) => Error::Closed,
        })
    }

    /// The number of queued frames.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Attach a new connection, starting a new generation.
    ///
    /// The previous connection is returned so that it can be closed.
    /// If the channel is already torn down the connection is handed back.
    #[allow(clippy::type_complexity)]
    pub fn attach(&self, conn: Arc<C>) -> Result<(u64, Option<Arc<C>>), Arc<C>> {
        let mut state = self.state.lock().unwrap();
        if !state.alive {
            return Err(conn);
        }
        let previous = state.conn.replace(conn);
        state.generation += 1;
        self.broadcast(&state);
        Ok((state.generation, previous))
    }

    /// Detach the connection of a faulty generation, stopping its loops.
    ///
    /// Only the first caller for a given generation gets the connection back,
    /// so concurrent faults of the same generation trigger a single reconnection.
    pub fn detach(&self, generation: u64) -> Option<Arc<C>> {
        let mut state = self.state.lock().unwrap();
        if !state.alive || state.generation != generation {
            return None;
        }
        let conn = state.conn.take();
        state.generation += 1;
        self.broadcast(&state);
        conn
    }

    /// Flip the channel to its terminal state.
    ///
    /// Returns `None` if the channel was already torn down,
    /// otherwise the connection that was attached, if any.
    pub fn teardown(&self) -> Option<Option<Arc<C>>> {
        let mut state = self.state.lock().unwrap();
        if !state.alive {
            return None;
        }
        state.alive = false;
        let conn = state.conn.take();
        state.generation += 1;
        self.broadcast(&state);
        Some(conn)
    }

    /// Drop every queued frame. It waits for the outbound loop to release the queue.
    pub async fn drain(&self) {
        let mut rx = self.rx.lock().await;
        while rx.try_recv().is_ok() {}
        self.stash.lock().unwrap().take();
        self.set_overflowing(false);
    }

    /// The connection of this generation, if it is still the current one.
    #[cfg(test)]
    pub fn conn(&self, generation: u64) -> Option<Arc<C>> {
        let state = self.state.lock().unwrap();
        if state.alive && state.generation == generation {
            state.conn.clone()
        } else {
            None
        }
    }

    /// The connection of the current generation.
    pub fn current(&self) -> Option<Arc<C>> {
        let state = self.state.lock().unwrap();
        state.conn.clone().filter(|_| state.alive)
    }

    #[cfg(test)]
    pub fn is_alive(&self) -> bool {
        self.state.lock().unwrap().alive
    }

    pub fn is_connected(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.alive && state.conn.is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Signal> {
        self.signal.subscribe()
    }

    pub fn set_overflowing(&self, overflowing: bool) {
        self.overflowing.store(overflowing, Ordering::Relaxed);
    }

    pub fn is_overflowing(&self) -> bool {
        self.overflowing.load(Ordering::Relaxed)
    }

    pub fn stash(&self, frame: String) {
        self.stash.lock().unwrap().replace(frame);
    }

    pub fn take_stash(&self) -> Option<String> {
        self.stash.lock().unwrap().take()
    }

    fn broadcast(&self, state: &State<C>) {
        self.signal.send_replace(Signal {
            generation: state.generation,
            alive: state.alive,
        });
    }
}

impl<C> std::fmt::Debug for Channel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Channel")
            .field("alive", &state.alive)
            .field("connected", &state.conn.is_some())
            .field("generation", &state.generation)
            .field("depth", &self.depth())
            .field("overflowing", &self.is_overflowing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Conn(u8);

    #[test]
    fn enqueue_until_full() {
        let channel = Channel::<Conn>::new(4);
        for i in 0..4 {
            channel.enqueue(i.to_string()).unwrap();
        }
        assert_eq!(channel.depth(), 4);
        assert!(matches!(channel.enqueue("5".into()), Err(Error::Overflow)));
    }

    #[test]
    fn capacity_lower_bound() {
        assert_eq!(Channel::<Conn>::new(0).capacity(), 2);
        assert_eq!(Channel::<Conn>::new(1).capacity(), 2);
        assert_eq!(Channel::<Conn>::new(16).capacity(), 16);
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let channel = Channel::<Conn>::new(4);
        channel.enqueue("a".into()).unwrap();
        channel.enqueue("b".into()).unwrap();
        let mut rx = channel.rx.lock().await;
        assert_eq!(rx.recv().await.unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap(), "b");
    }

    #[test]
    fn attach_bumps_generation() {
        let channel = Channel::new(4);
        let rx = channel.subscribe();
        let (generation, previous) = channel.attach(Arc::new(Conn(1))).unwrap();
        assert_eq!(generation, 1);
        assert!(previous.is_none());
        assert_eq!(rx.borrow().generation, 1);

        let (generation, previous) = channel.attach(Arc::new(Conn(2))).unwrap();
        assert_eq!(generation, 2);
        assert_eq!(previous.as_deref(), Some(&Conn(1)));
        assert!(channel.conn(1).is_none());
        assert_eq!(channel.conn(2).as_deref(), Some(&Conn(2)));
    }

    #[test]
    fn detach_once_per_generation() {
        let channel = Channel::new(4);
        let (generation, _) = channel.attach(Arc::new(Conn(1))).unwrap();
        assert_eq!(channel.detach(generation).as_deref(), Some(&Conn(1)));
        assert!(channel.detach(generation).is_none());
        assert!(!channel.is_connected());
        assert!(channel.is_alive());
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let channel = Channel::new(4);
        channel.attach(Arc::new(Conn(1))).unwrap();
        channel.enqueue("a".into()).unwrap();
        channel.stash("b".into());
        channel.set_overflowing(true);

        let conn = channel.teardown().unwrap();
        assert_eq!(conn.as_deref(), Some(&Conn(1)));
        assert!(channel.teardown().is_none());
        channel.drain().await;

        assert_eq!(channel.depth(), 0);
        assert!(channel.take_stash().is_none());
        assert!(!channel.is_overflowing());
        assert!(matches!(channel.enqueue("c".into()), Err(Error::Closed)));
        assert!(channel.attach(Arc::new(Conn(2))).is_err());
        assert!(!channel.subscribe().borrow().alive);
    }
}
