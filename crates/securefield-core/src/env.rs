//! Environment abstraction.
//!
//! State machines take `now` as a parameter; the runtime gets it from an
//! [`Environment`]. Production uses [`SystemEnv`], simulations substitute a
//! virtual clock.

use std::{
    future::Future,
    time::{Duration, Instant},
};

/// Source of time for the runtime.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Wall-clock environment backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
