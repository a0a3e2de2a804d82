//! Penalty-clock flood protection for the outbound pump.
//!
//! Each send advances a `penalty` timestamp by a fixed step; if the gap
//! between `penalty` and now exceeds a timeout threshold, the pump sleeps
//! until the excess is amortized down to the threshold.

use std::time::Duration;

use tokio::time::Instant;

/// Tunable parameters for the flood protector, with RFC-conventional
/// defaults (roughly matching historical ircd throttle settings).
#[derive(Debug, Clone, Copy)]
pub struct FloodParams {
    /// How far `penalty` advances per line sent.
    pub step: Duration,
    /// Maximum allowed gap between `penalty` and now before sleeping.
    pub timeout: Duration,
    /// How often, when idle, the pump emits a keepalive `PING`.
    pub keepalive_interval: Duration,
    /// Scales every duration above; tests set this near zero to collapse
    /// real-world delays into microseconds.
    pub scale: f64,
}

impl Default for FloodParams {
    fn default() -> FloodParams {
        FloodParams {
            step: Duration::from_millis(2000),
            timeout: Duration::from_millis(10_000),
            keepalive_interval: Duration::from_secs(180),
            scale: 1.0,
        }
    }
}

impl FloodParams {
    fn scaled(&self, d: Duration) -> Duration {
        Duration::from_secs_f64(d.as_secs_f64() * self.scale)
    }
}

/// Tracks the flood-protection penalty clock for one connection's pump.
pub struct FloodProtector {
    params: FloodParams,
    penalty: Instant,
}

impl FloodProtector {
    pub fn new(params: FloodParams) -> FloodProtector {
        FloodProtector {
            params,
            penalty: Instant::now(),
        }
    }

    /// Call before writing a line. Advances the penalty clock and sleeps if
    /// the accumulated penalty exceeds the timeout.
    pub async fn throttle(&mut self) {
        let now = Instant::now();
        if self.penalty < now {
            self.penalty = now;
        }
        self.penalty += self.params.scaled(self.params.step);

        let excess = self.penalty.saturating_duration_since(now);
        let timeout = self.params.scaled(self.params.timeout);
        if excess > timeout {
            tokio::time::sleep(excess - timeout).await;
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.params.scaled(self.params.keepalive_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn low_rate_sends_pass_through_without_sleeping() {
        let params = FloodParams {
            step: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(180),
            scale: 1.0,
        };
        let mut fp = FloodProtector::new(params);
        let start = Instant::now();
        for _ in 0..3 {
            fp.throttle().await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert!(Instant::now().duration_since(start) < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn saturating_rate_enforces_sleep() {
        let params = FloodParams {
            step: Duration::from_millis(500),
            timeout: Duration::from_millis(100),
            keepalive_interval: Duration::from_secs(180),
            scale: 1.0,
        };
        let mut fp = FloodProtector::new(params);
        for _ in 0..5 {
            fp.throttle().await;
        }
        // Each send adds 500ms of penalty with only a 100ms allowance, so
        // by the fifth send the pump must have slept for the excess.
        assert!(fp.penalty.saturating_duration_since(Instant::now()) <= Duration::from_millis(100) + Duration::from_millis(1));
    }
}
