//! Synthetic traffic drivers
//!
//! Every driver is a start/stop pair returning a [`DriverHandle`]. Timers
//! run as independent Tokio tasks, separate from the sampling loop and from
//! each other; they only touch shared state through the recording calls of
//! [`MonitorContext`](crate::MonitorContext). The CPU load generator uses OS
//! threads instead so it cannot starve those tasks.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod load;
#[cfg(feature = "http-poller")]
pub mod poller;
pub mod push;
pub mod request;

pub use load::CpuLoad;
#[cfg(feature = "http-poller")]
pub use poller::HttpPoller;
pub use push::PushDriver;
pub use request::RequestDriver;

/// Convert a frequency into a timer period, floored at `min_ms`.
pub fn period_for_rate(rate_hz: f64, min_ms: u64) -> Duration {
    let ms = if rate_hz.is_finite() && rate_hz > 0.0 {
        (1000.0 / rate_hz).floor() as u64
    } else {
        1000
    };
    Duration::from_millis(ms.max(min_ms))
}

/// Running set of timer tasks sharing one cancellation token.
#[derive(Debug)]
pub struct DriverHandle {
    name: &'static str,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DriverHandle {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Spawn one periodic timer.
    ///
    /// With `immediate` the first firing happens right away, otherwise after
    /// one period. Missed firings are skipped, not bunched.
    pub(crate) fn spawn_periodic<F, Fut>(&mut self, period: Duration, immediate: bool, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let start = if immediate {
            time::Instant::now()
        } else {
            time::Instant::now() + period
        };
        self.tasks.push(tokio::spawn(async move {
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
        }));
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of timers this driver runs
    pub fn timers(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Cancel every timer. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!(driver = self.name, "driver stopped");
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
