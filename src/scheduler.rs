//! Scheduler health probe
//!
//! A background task sleeps for a fixed resolution and records how late it
//! woke up. The overshoot distribution gives the delay percentiles; the
//! share of wall time spent overshooting gives the utilization figure.

use hdrhistogram::Histogram;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MonitorError, Result};

/// Highest trackable delay: one hour, in nanoseconds
const MAX_TRACKABLE_NS: u64 = 3_600_000_000_000;

/// Scheduler figures reported in every snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerHealth {
    /// Fraction of wall time the runtime was too busy to wake the probe, 0..1
    pub utilization: f64,
    pub delay_p50_ms: f64,
    pub delay_p99_ms: f64,
    pub delay_max_ms: f64,
}

#[derive(Debug)]
struct ProbeState {
    histogram: Histogram<u64>,
    lag_since_read: Duration,
    last_read_at: Instant,
}

/// Continuously running wake-up delay histogram.
#[derive(Debug)]
pub struct SchedulerProbe {
    resolution: Duration,
    state: Arc<Mutex<ProbeState>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SchedulerProbe {
    pub fn new(resolution: Duration) -> Result<Self> {
        let histogram = Histogram::<u64>::new_with_bounds(1, MAX_TRACKABLE_NS, 3)
            .map_err(|e| MonitorError::Histogram(e.to_string()))?;
        Ok(Self {
            resolution: resolution.max(Duration::from_millis(1)),
            state: Arc::new(Mutex::new(ProbeState {
                histogram,
                lag_since_read: Duration::ZERO,
                last_read_at: Instant::now(),
            })),
            cancel: Mutex::new(None),
        })
    }

    /// Start the probe task. Must run inside a Tokio runtime; no-op if running.
    pub fn enable(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if cancel.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let task_token = token.clone();
        let state = self.state.clone();
        let resolution = self.resolution;

        tokio::spawn(async move {
            loop {
                let started = Instant::now();
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(resolution) => {}
                }
                let lag = started.elapsed().saturating_sub(resolution);
                record_lag(&state, lag);
            }
            debug!("scheduler probe stopped");
        });
        *cancel = Some(token);
    }

    /// Stop the probe task; recorded data is kept.
    pub fn disable(&self) {
        if let Some(token) = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Feed one observed wake-up delay.
    pub fn record(&self, lag: Duration) {
        record_lag(&self.state, lag);
    }

    /// Percentiles over everything since the last reset, utilization over
    /// the window since the previous read. Starts a new utilization window.
    pub fn read(&self) -> SchedulerHealth {
        self.health(true)
    }

    /// Like [`read`](Self::read) but leaves the utilization window open.
    pub fn peek(&self) -> SchedulerHealth {
        self.health(false)
    }

    fn health(&self, consume: bool) -> SchedulerHealth {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = now.duration_since(state.last_read_at);
        let utilization = if window.is_zero() {
            0.0
        } else {
            (state.lag_since_read.as_secs_f64() / window.as_secs_f64()).clamp(0.0, 1.0)
        };
        if consume {
            state.lag_since_read = Duration::ZERO;
            state.last_read_at = now;
        }

        let hist = &state.histogram;
        if hist.is_empty() {
            return SchedulerHealth {
                utilization,
                ..SchedulerHealth::default()
            };
        }
        SchedulerHealth {
            utilization,
            delay_p50_ms: ns_to_ms(hist.value_at_quantile(0.50)),
            delay_p99_ms: ns_to_ms(hist.value_at_quantile(0.99)),
            delay_max_ms: ns_to_ms(hist.max()),
        }
    }

    /// Clear the histogram and the utilization window.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.histogram.reset();
        state.lag_since_read = Duration::ZERO;
        state.last_read_at = Instant::now();
    }
}

impl Drop for SchedulerProbe {
    fn drop(&mut self) {
        self.disable();
    }
}

fn record_lag(state: &Mutex<ProbeState>, lag: Duration) {
    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    let ns = u64::try_from(lag.as_nanos()).unwrap_or(MAX_TRACKABLE_NS);
    state.histogram.saturating_record(ns);
    state.lag_since_read += lag;
}

#[inline]
fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}
