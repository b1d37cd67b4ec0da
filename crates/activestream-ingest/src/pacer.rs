//! Reconnect rate limiting

use activestream_core::{sleep_or_stop, StopToken};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Keeps consecutive connection attempts at least `pause` apart.
///
/// The pause starts at the minimum, doubles after each unproductive
/// connection up to `max_backoff`, and resets once a connection delivers data.
#[derive(Debug, Clone)]
pub struct ReconnectPacer {
    min_pause: Duration,
    max_backoff: Duration,
    pause: Duration,
    last_attempt: Option<Instant>,
}

impl ReconnectPacer {
    pub fn new(min_pause: Duration, max_backoff: Duration) -> Self {
        Self {
            min_pause,
            max_backoff: max_backoff.max(min_pause),
            pause: min_pause,
            last_attempt: None,
        }
    }

    /// Current required gap between attempts
    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Time left before the next attempt is allowed
    pub fn remaining(&self) -> Duration {
        match self.last_attempt {
            Some(last) => (last + self.pause).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Sleep out the remaining pause, then register an attempt.
    /// Returns true if stopped while waiting; no attempt is registered then.
    pub async fn wait(&mut self, stop: &StopToken) -> bool {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            info!(wait_ms = remaining.as_millis() as u64, "Pacing reconnect");
            if sleep_or_stop(stop, remaining).await {
                return true;
            }
        }
        self.last_attempt = Some(Instant::now());
        false
    }

    /// The last connection delivered data
    pub fn record_success(&mut self) {
        self.pause = self.min_pause;
    }

    /// The last connection failed or closed without delivering anything
    pub fn record_failure(&mut self) {
        self.pause = (self.pause * 2).min(self.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_separated_by_min_pause() {
        let stop = StopToken::new();
        let mut pacer = ReconnectPacer::new(Duration::from_secs(20), Duration::from_secs(320));

        let start = Instant::now();
        assert!(!pacer.wait(&stop).await);
        assert_eq!(Instant::now(), start);

        assert!(!pacer.wait(&stop).await);
        assert!(Instant::now() - start >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_toward_pause() {
        let stop = StopToken::new();
        let mut pacer = ReconnectPacer::new(Duration::from_secs(20), Duration::from_secs(320));
        pacer.wait(&stop).await;

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(pacer.remaining(), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(pacer.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles_and_resets() {
        let mut pacer = ReconnectPacer::new(Duration::from_secs(20), Duration::from_secs(60));
        pacer.record_failure();
        assert_eq!(pacer.pause(), Duration::from_secs(40));
        pacer.record_failure();
        assert_eq!(pacer.pause(), Duration::from_secs(60));
        pacer.record_success();
        assert_eq!(pacer.pause(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_observes_stop() {
        let stop = StopToken::new();
        let mut pacer = ReconnectPacer::new(Duration::from_secs(20), Duration::from_secs(20));
        pacer.wait(&stop).await;
        stop.cancel();
        assert!(pacer.wait(&stop).await);
    }
}
