//! Retry schedule for the shared progress connection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::{connect_socket, WsStream};

/// Growing wait schedule between connection attempts.
///
/// Each call to [`Backoff::next_wait`] hands out the current wait and
/// advances the schedule; the wait doubles until it saturates at the
/// cap.
pub struct Backoff {
    wait: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(first_wait: Duration, cap: Duration) -> Self {
        Self {
            wait: first_wait.min(cap),
            cap,
        }
    }

    /// Schedule used by the progress connection: half a second to
    /// start, capped at twenty seconds.
    pub fn for_channel() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(20))
    }

    pub fn next_wait(&mut self) -> Duration {
        let wait = self.wait;
        self.wait = self.wait.saturating_mul(2).min(self.cap);
        wait
    }
}

/// Re-establish the progress connection after a loss.
///
/// The connection has already failed once when this runs, so every
/// attempt is preceded by a wait from the schedule. Returns the new
/// stream, or `None` once `cancel` fires.
pub(crate) async fn reestablish(ws_url: &str, cancel: &CancellationToken) -> Option<WsStream> {
    let mut backoff = Backoff::for_channel();
    let mut attempt = 0u32;

    loop {
        let wait = backoff.next_wait();
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(wait) => {}
        }

        attempt += 1;
        tracing::info!(attempt, "Reconnecting to progress channel");
        tokio::select! {
            _ = cancel.cancelled() => return None,
            result = connect_socket(ws_url) => match result {
                Ok(stream) => {
                    tracing::info!(attempt, "Progress channel restored");
                    return Some(stream);
                }
                Err(e) => tracing::warn!(error = %e, attempt, "Connection attempt failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_schedule_doubles_to_the_cap() {
        let mut backoff = Backoff::for_channel();
        let waits: Vec<u64> = (0..8).map(|_| backoff.next_wait().as_millis() as u64).collect();
        assert_eq!(waits, [500, 1000, 2000, 4000, 8000, 16000, 20000, 20000]);
    }

    #[test]
    fn first_wait_above_the_cap_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(5));
        assert_eq!(backoff.next_wait(), Duration::from_secs(5));
        assert_eq!(backoff.next_wait(), Duration::from_secs(5));
    }

    #[test]
    fn zero_first_wait_stays_zero_until_doubled() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::from_secs(5));
        assert_eq!(backoff.next_wait(), Duration::ZERO);
        // 0 * 2 never grows; the schedule stays at zero by construction.
        assert_eq!(backoff.next_wait(), Duration::ZERO);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_any_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = reestablish("ws://localhost:9", &cancel).await;
        assert!(result.is_none());
    }
}
