use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Token bucket pacing the retries of one tail
#[derive(Debug)]
pub struct RetryLimiter {
    burst: u32,
    interval: Duration,
    tokens: u32,
    last_refill: Instant,
}

impl RetryLimiter {
    /// Bucket holding `burst` tokens, regaining one every `interval`
    pub fn new(burst: u32, interval: Duration) -> Self {
        Self {
            burst: burst.max(1),
            interval,
            tokens: burst.max(1),
            last_refill: Instant::now(),
        }
    }

    /// Take a token, sleeping until one is available. Returns false when
    /// cancelled first.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        self.refill();
        if self.tokens == 0 {
            let ready = self.last_refill + self.interval;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(ready) => {}
            }
            self.refill();
        }
        self.tokens = self.tokens.saturating_sub(1);
        true
    }

    fn refill(&mut self) {
        let now = Instant::now();
        if self.tokens >= self.burst {
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = (elapsed.as_nanos() / self.interval.as_nanos().max(1))
            .min(u128::from(self.burst)) as u32;
        if earned == 0 {
            return;
        }

        self.tokens = (self.tokens + earned).min(self.burst);
        self.last_refill = if self.tokens == self.burst {
            now
        } else {
            self.last_refill + self.interval * earned
        };
    }
}
