//! Round synchronization.
//!
//! The protocol's fixed-duration sleeps between phase sub-steps (`spec.md`
//! §4.3) stand in for a proper round synchronizer (`spec.md` §9 design
//! note). `Pacer` gives the coordinator a single seam to wait through, so
//! tests can swap in a pacer that compresses real time without touching any
//! protocol logic.

use std::time::Duration;

use async_trait::async_trait;

/// Default pacing delay between phase sub-steps in production use.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(1500);

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Waits long enough that all peers are expected to have reached a
    /// comparable point before a new phase begins.
    async fn next_phase(&self);

    /// Waits `d` within the current phase, between two of its sub-steps.
    async fn within_phase(&self, d: Duration);
}

/// Sleeps the configured duration via the async runtime's timer. This is the
/// pacer every production node uses.
#[derive(Debug, Clone, Copy)]
pub struct FixedPacer {
    delay: Duration,
}

impl FixedPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedPacer {
    fn default() -> Self {
        Self::new(DEFAULT_PACING_DELAY)
    }
}

#[async_trait]
impl Pacer for FixedPacer {
    async fn next_phase(&self) {
        tokio::time::sleep(self.delay).await;
    }

    async fn within_phase(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// Scales every wait down by a fixed divisor. Intended for integration tests
/// and the cluster demo, where dozens of phases need to run in well under a
/// second of wall-clock time instead of the production multi-second pacing.
#[derive(Debug, Clone, Copy)]
pub struct FastPacer {
    scale_down_factor: u32,
    next_phase_delay: Duration,
}

impl FastPacer {
    pub fn new(scale_down_factor: u32) -> Self {
        let factor = scale_down_factor.max(1);
        let base_ms = DEFAULT_PACING_DELAY.as_millis() as u64;
        let next_phase_ms = (base_ms / u64::from(factor)).max(1);
        Self {
            scale_down_factor: factor,
            next_phase_delay: Duration::from_millis(next_phase_ms),
        }
    }

    fn scale(&self, d: Duration) -> Duration {
        let scaled_ms = (d.as_millis() as u64 / u64::from(self.scale_down_factor)).max(1);
        Duration::from_millis(scaled_ms)
    }
}

impl Default for FastPacer {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl Pacer for FastPacer {
    async fn next_phase(&self) {
        tokio::time::sleep(self.next_phase_delay).await;
    }

    async fn within_phase(&self, d: Duration) {
        tokio::time::sleep(self.scale(d)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn fast_pacer_is_much_quicker_than_fixed() {
        let fast = FastPacer::new(100);
        let start = Instant::now();
        fast.next_phase().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
