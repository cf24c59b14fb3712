//! Virtual clock.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use securefield_core::Environment;

/// Environment whose clock only moves when told to.
///
/// `sleep` advances the clock by the requested duration and returns at once,
/// so timeouts fire without waiting in real time. Clones share one clock.
#[derive(Debug, Clone)]
pub struct SimEnv {
    base: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl SimEnv {
    /// Clock starting at the current instant.
    #[allow(clippy::disallowed_methods)]
    pub fn new() -> Self {
        Self { base: Instant::now(), offset_nanos: Arc::new(AtomicU64::new(0)) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let env = self.clone();
        async move { env.advance(duration) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::new();
        let start = env.now();
        let other = env.clone();

        other.advance(Duration::from_millis(250));

        assert_eq!(env.now() - start, Duration::from_millis(250));
    }

    #[test]
    fn sleep_advances_only_when_polled() {
        let env = SimEnv::new();
        let start = env.now();

        let pending = env.sleep(Duration::from_secs(5));
        assert_eq!(env.now(), start);

        drop(pending);
        assert_eq!(env.elapsed(), Duration::ZERO);
    }
}
