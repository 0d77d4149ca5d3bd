use std::sync::RwLock;

use tokio::sync::Notify;

/// The namespace the client is bound to, with the session state of the current connection generation.
#[derive(Debug)]
pub(crate) struct Namespace {
    /// The namespace name without its leading `/`. The root namespace is empty.
    pub name: String,
    state: RwLock<NsState>,
    joined: Notify,
}

#[derive(Debug, Default)]
struct NsState {
    sid: Option<String>,
    initialized: bool,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim_start_matches('/').to_string(),
            state: RwLock::default(),
            joined: Notify::new(),
        }
    }

    /// Start a new connection generation with the session id acquired by the handshake.
    pub fn set_sid(&self, sid: String) {
        let mut state = self.state.write().unwrap();
        state.sid = Some(sid);
        state.initialized = false;
    }

    pub fn sid(&self) -> Option<String> {
        self.state.read().unwrap().sid.clone()
    }

    /// Mark the namespace as joined and wake every task waiting for it.
    pub fn set_initialized(&self) {
        self.state.write().unwrap().initialized = true;
        self.joined.notify_waiters();
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().unwrap().initialized
    }

    /// Wait for the namespace join acknowledgement, returns immediately if already joined.
    pub async fn joined(&self) {
        let notified = self.joined.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent notification is not missed.
        notified.as_mut().enable();
        if self.is_initialized() {
            return;
        }
        notified.await;
    }

    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        state.initialized = false;
    }
}
