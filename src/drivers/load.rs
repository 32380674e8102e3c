//! Background CPU load generator
//!
//! Worker OS threads run a busy/sleep duty cycle so the process shows a
//! target CPU utilization while the runtime threads stay free for the
//! sampling loop and the traffic timers.

use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::Result;

/// Length of one busy+idle cycle
pub const SLICE: Duration = Duration::from_millis(100);
/// How long `stop` waits for workers before detaching them
pub const STOP_GRACE: Duration = Duration::from_millis(500);
/// Upper bound on the busy share of a slice
pub const MAX_DUTY: f64 = 0.99;

/// Busy fraction for a load percentage, clamped to `[0, MAX_DUTY]`.
pub fn duty_fraction(load_pct: f64) -> f64 {
    if !load_pct.is_finite() {
        return 0.0;
    }
    (load_pct / 100.0).clamp(0.0, MAX_DUTY)
}

/// Running load generator.
#[derive(Debug)]
pub struct CpuLoad {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    load_pct: f64,
}

impl CpuLoad {
    /// Spawn `workers` threads (at least one) each targeting `load_pct`.
    pub fn start(load_pct: f64, workers: usize) -> Result<Self> {
        let duty = duty_fraction(load_pct);
        let busy = SLICE.mul_f64(duty);
        let stop = Arc::new(AtomicBool::new(false));
        let count = workers.max(1);

        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let worker_stop = stop.clone();
            let spawned = thread::Builder::new()
                .name(format!("telemon-load-{}", i))
                .spawn(move || duty_cycle(&worker_stop, busy));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    stop.store(true, Ordering::Release);
                    return Err(e.into());
                }
            }
        }
        debug!(load_pct, workers = count, duty, "cpu load started");
        Ok(Self {
            stop,
            workers: handles,
            load_pct,
        })
    }

    pub fn load_pct(&self) -> f64 {
        self.load_pct
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Acquire) && self.workers.iter().any(|w| !w.is_finished())
    }

    /// Signal the workers and reap them off-thread.
    ///
    /// Returns immediately. Workers still alive after [`STOP_GRACE`] are
    /// detached with a warning.
    pub fn stop(&mut self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        let workers = std::mem::take(&mut self.workers);
        if workers.is_empty() {
            return;
        }
        let reaper = thread::Builder::new()
            .name("telemon-load-reaper".into())
            .spawn(move || {
                if !join_within(workers, STOP_GRACE) {
                    warn!("cpu load workers did not exit within grace period; detached");
                }
            });
        if let Err(e) = reaper {
            warn!(error = %e, "could not spawn load reaper; workers detached");
        }
    }

    /// Signal the workers and wait up to `grace` for them.
    ///
    /// Returns whether every worker exited in time.
    pub fn stop_and_wait(&mut self, grace: Duration) -> bool {
        self.stop.store(true, Ordering::Release);
        join_within(std::mem::take(&mut self.workers), grace)
    }
}

impl Drop for CpuLoad {
    fn drop(&mut self) {
        self.stop();
    }
}

fn duty_cycle(stop: &AtomicBool, busy: Duration) {
    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();
        while started.elapsed() < busy {
            hint::spin_loop();
        }
        let idle = SLICE.saturating_sub(started.elapsed());
        if !idle.is_zero() {
            thread::sleep(idle);
        }
    }
}

fn join_within(workers: Vec<JoinHandle<()>>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if workers.iter().all(|w| w.is_finished()) {
            for w in workers {
                let _ = w.join();
            }
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_fraction_clamps() {
        assert_eq!(duty_fraction(50.0), 0.5);
        assert_eq!(duty_fraction(150.0), MAX_DUTY);
        assert_eq!(duty_fraction(-5.0), 0.0);
        assert_eq!(duty_fraction(f64::NAN), 0.0);
    }

    #[test]
    fn test_start_and_stop() {
        let mut load = CpuLoad::start(20.0, 2).unwrap();
        assert_eq!(load.workers(), 2);
        assert!(load.is_running());
        assert!(load.stop_and_wait(Duration::from_secs(2)));
        assert!(!load.is_running());
        // second stop is a no-op
        load.stop();
    }
}
