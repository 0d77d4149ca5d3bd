//! Bounded reconnection with a linear backoff.
use std::{future::Future, time::Duration};

use tokio::time::Instant;

use crate::errors::Error;

/// The attempt counter of a client.
///
/// It sits behind an async mutex in the client, which guarantees that a single
/// reconnection sequence runs at a time.
#[derive(Debug)]
pub(crate) struct ReconnectState {
    attempts: usize,
    last_attempt: Option<Instant>,
    base_delay: Duration,
    max_attempts: usize,
}

impl ReconnectState {
    pub fn new(base_delay: Duration, max_attempts: usize) -> Self {
        Self {
            attempts: 0,
            last_attempt: None,
            base_delay,
            max_attempts,
        }
    }

    /// Run `attempt` until it succeeds, at most `max_attempts` times.
    ///
    /// The n-th attempt starts `n * base_delay` after the start of the previous one,
    /// only the remaining part of that delay is slept.
    /// The counter is reset on success so the next fault gets the full budget again.
    pub async fn retry<F, Fut, R>(&mut self, mut attempt: F) -> Result<R, Error>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<R, Error>>,
    {
        let start = Instant::now();
        while self.attempts < self.max_attempts {
            self.attempts += 1;
            let n = self.attempts;
            let delay = self.base_delay.saturating_mul(n.try_into().unwrap_or(u32::MAX));
            tokio::time::sleep_until(self.last_attempt.unwrap_or(start) + delay).await;
            self.last_attempt = Some(Instant::now());

            #[cfg(feature = "tracing")]
            tracing::debug!(attempt = n, max = self.max_attempts, "reconnecting");
            match attempt(n).await {
                Ok(res) => {
                    self.attempts = 0;
                    return Ok(res);
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt = n, ?_e, "reconnection attempt failed");
                }
            }
        }
        self.attempts = 0;
        Err(Error::ReconnectExhausted)
    }
}
