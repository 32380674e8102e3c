//! Integration tests for the synthetic traffic drivers.
//!
//! This file contains tests for:
//! - Fixed-rate push driver rate and per-message cost.
//! - Synthetic request driver rate and snapshot count.
//! - Push payloads reaching subscribers only while the gate is open.
//! - Background CPU load start and stop.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use telemon::drivers::{CpuLoad, PushDriver, RequestDriver};
use telemon::{
    BroadcastHub, Channel, MonitorConfig, MonitorContext, NullPublisher, ProcessProbe, ProcessUsage, ResourceMonitor,
    SessionConfig, SessionSummary, DATA_EVENT,
};

struct FixedProbe;

#[async_trait]
impl ProcessProbe for FixedProbe {
    async fn sample(&self) -> telemon::Result<ProcessUsage> {
        Ok(ProcessUsage {
            cpu_percent: 2.0,
            resident_bytes: 24 * 1024 * 1024,
        })
    }

    fn probe_name(&self) -> &'static str {
        "fixed"
    }
}

fn monitor(tick_ms: u64) -> ResourceMonitor {
    let config = MonitorConfig::default()
        .with_tick_interval_ms(tick_ms)
        .with_live_emit_enabled(false);
    ResourceMonitor::with_probe(config, Arc::new(NullPublisher), Some(Arc::new(FixedProbe))).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_push_driver_two_hz_three_hundred_bytes() {
        let monitor = monitor(250);
        monitor.init().unwrap();
        let rec = monitor
            .start_session(
                SessionConfig::push("ws 2Hz")
                    .with_rate_hz(2.0)
                    .with_payload_bytes(300)
                    .with_duration_sec(2.0),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let done = monitor.get_session(&rec.id).unwrap();
        monitor.shutdown();
        assert!(done.finished_at.is_some());
        assert!(!done.samples.is_empty());

        let summary = SessionSummary::from_record(&done);
        assert!(summary.avg_rate > 1.0 && summary.avg_rate < 3.0, "rate {}", summary.avg_rate);
        assert!(
            summary.bytes_per_unit > 150.0 && summary.bytes_per_unit < 450.0,
            "bytes per message {}",
            summary.bytes_per_unit
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_driver_one_hz_six_seconds() {
        let monitor = monitor(500);
        monitor.init().unwrap();
        let rec = monitor
            .start_session(
                SessionConfig::poll("http 1Hz")
                    .with_polling_interval_ms(1000)
                    .with_clients_http(1)
                    .with_internal_http_driver(false)
                    .with_payload_bytes(420)
                    .with_trim(0.0, 0.0)
                    .with_duration_sec(6.0),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(6600)).await;
        let done = monitor.get_session(&rec.id).unwrap();
        monitor.shutdown();

        // 6 s / 0.5 s
        let n = done.samples.len();
        assert!((10..=13).contains(&n), "got {} samples", n);

        let summary = SessionSummary::from_record(&done);
        assert_eq!(summary.n_used, n);
        assert!(summary.avg_rate > 0.5 && summary.avg_rate < 1.5, "rate {}", summary.avg_rate);
        assert!((summary.avg_payload - 420.0).abs() < 1.0);
        assert_eq!(done.samples.iter().map(|s| s.broadcast_rate).sum::<f64>(), 0.0);
    }

    #[tokio::test]
    async fn test_push_driver_respects_gate() {
        let hub = Arc::new(BroadcastHub::new(64));
        let ctx = Arc::new(MonitorContext::new(hub.clone(), false, 400));
        let mut rx = hub.subscribe();

        let mut handle = PushDriver::new(50.0, 128).start(ctx.clone());
        assert_eq!(handle.name(), "push");
        assert_eq!(handle.timers(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err(), "closed gate must not publish");
        let (events, bytes) = ctx.totals(Channel::Broadcast);
        assert!(events >= 1);
        assert_eq!(bytes, events * 128);

        ctx.gate().set(true);
        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.event, DATA_EVENT);
        assert_eq!(msg.body.len(), 128);

        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_request_driver_runs_one_timer_per_client() {
        let ctx = Arc::new(MonitorContext::new(Arc::new(NullPublisher), false, 400));
        let mut handle = RequestDriver::new(Duration::from_millis(20), 100, 3).start(ctx.clone());
        assert_eq!(handle.name(), "request");
        assert_eq!(handle.timers(), 3);

        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.stop();
        let (events, bytes) = ctx.totals(Channel::Request);
        assert!(events >= 3, "got {} requests", events);
        assert_eq!(bytes, events * 100);
    }

    #[test]
    fn test_cpu_load_stops_within_grace() {
        let mut load = CpuLoad::start(30.0, 2).unwrap();
        assert!(load.is_running());
        assert_eq!(load.load_pct(), 30.0);
        assert_eq!(load.workers(), 2);
        std::thread::sleep(Duration::from_millis(150));
        assert!(load.stop_and_wait(Duration::from_secs(1)));
        load.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_load_is_stopped_on_finish() {
        let monitor = monitor(1000);
        let rec = monitor
            .start_session(SessionConfig::push("loaded").with_load(20.0, 1))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let done = monitor.finish_session(&rec.id).unwrap();
        assert_eq!(done.config.load_cpu_pct, Some(20.0));
        assert_eq!(monitor.active_session_id(), None);
    }
}
