//! Integration tests for the session state machine.
//!
//! This file contains tests for:
//! - Single-active invariant when starting over an active session.
//! - Idempotent finish returning the identical record.
//! - Reset, delete, lookup and listing order.
//! - Config validation at start.
//! - Sample-count and duration limits finishing a session.
//! - No sessions or drivers after shutdown.
//! - Snapshots staying inside their session's lifetime.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use telemon::{
    ChannelMode, MonitorConfig, MonitorError, NullPublisher, ProcessProbe, ProcessUsage, ResourceMonitor,
    SessionConfig,
};

struct FixedProbe;

#[async_trait]
impl ProcessProbe for FixedProbe {
    async fn sample(&self) -> telemon::Result<ProcessUsage> {
        Ok(ProcessUsage {
            cpu_percent: 1.0,
            resident_bytes: 16 * 1024 * 1024,
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
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_start_while_active_finishes_previous() {
        let monitor = monitor(1000);
        let first = monitor.start_session(SessionConfig::push("first")).unwrap();
        assert!(first.is_active());
        assert_eq!(monitor.active_session_id().as_deref(), Some(first.id.as_str()));

        let second = monitor.start_session(SessionConfig::push("second")).unwrap();
        let first_now = monitor.get_session(&first.id).unwrap();
        assert!(first_now.finished_at.is_some());
        assert_eq!(monitor.active_session_id().as_deref(), Some(second.id.as_str()));
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_double_finish_returns_identical_record() {
        let monitor = monitor(1000);
        let rec = monitor.start_session(SessionConfig::push("twice").with_rate_hz(5.0)).unwrap();
        assert!(monitor.is_push_controlled());

        let once = monitor.finish_session(&rec.id).unwrap();
        assert!(!monitor.is_push_controlled());
        let twice = monitor.finish_session(&rec.id).unwrap();
        assert_eq!(once, twice);
        assert_eq!(monitor.active_session_id(), None);
    }

    #[tokio::test]
    async fn test_finish_unknown_session() {
        let monitor = monitor(1000);
        assert!(monitor.finish_session("does-not-exist").is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let monitor = monitor(1000);
        for label in ["a", "b", "c"] {
            monitor.start_session(SessionConfig::push(label)).unwrap();
        }
        assert_eq!(monitor.reset_sessions(), 3);
        assert!(monitor.list_sessions().is_empty());
        assert_eq!(monitor.active_session_id(), None);
        assert_eq!(monitor.reset_sessions(), 0);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let monitor = monitor(1000);
        let a = monitor.start_session(SessionConfig::push("a")).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let b = monitor.start_session(SessionConfig::push("b")).unwrap();
        let ids: Vec<String> = monitor.list_sessions().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_delete_active_session() {
        let monitor = monitor(1000);
        let rec = monitor.start_session(SessionConfig::push("gone").with_rate_hz(2.0)).unwrap();
        assert!(monitor.delete_session(&rec.id));
        assert!(!monitor.is_push_controlled());
        assert_eq!(monitor.active_session_id(), None);
        assert!(monitor.get_session(&rec.id).is_none());
        assert!(!monitor.delete_session(&rec.id));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let monitor = monitor(1000);
        let err = monitor.start_session(SessionConfig::push("")).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
        assert_err!(monitor.start_session(SessionConfig::push("x").with_load(250.0, 1)));
        assert!(monitor.list_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_poll_config_is_normalized_and_meta_recorded() {
        let monitor = monitor(1000);
        let rec = assert_ok!(monitor.start_session(
            SessionConfig::poll("http")
                .with_polling_interval_ms(10)
                .with_internal_http_driver(false)
        ));
        assert_eq!(rec.config.mode, ChannelMode::Poll);
        assert_eq!(rec.config.polling_interval_ms, Some(100));
        assert_eq!(rec.meta.tick_interval_ms, 1000);
        assert_eq!(rec.meta.sensor_interval_ms, 500);
        assert_eq!(rec.meta.crate_version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sample_count_limit_finishes_session() {
        let monitor = monitor(200);
        monitor.init().unwrap();
        let rec = monitor.start_session(SessionConfig::push("three").with_sample_count(3)).unwrap();

        tokio::time::sleep(Duration::from_millis(1200)).await;
        let done = monitor.get_session(&rec.id).unwrap();
        assert!(done.finished_at.is_some());
        assert_eq!(done.samples.len(), 3);
        monitor.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duration_limit_snapshot_count() {
        let monitor = monitor(200);
        monitor.init().unwrap();
        let rec = monitor.start_session(SessionConfig::push("timed").with_duration_sec(1.0)).unwrap();

        tokio::time::sleep(Duration::from_millis(1600)).await;
        let done = monitor.get_session(&rec.id).unwrap();
        assert!(done.finished_at.is_some());
        // floor(1000 / 200) ± 1
        let n = done.samples.len();
        assert!((4..=6).contains(&n), "got {} samples", n);

        // chronological append order
        assert!(done.samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        monitor.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_is_idempotent_and_final() {
        let monitor = monitor(200);
        monitor.init().unwrap();
        assert_ok!(monitor.init());
        monitor.start_session(SessionConfig::push("bg").with_rate_hz(10.0)).unwrap();
        monitor.shutdown();
        monitor.shutdown();
        assert!(!monitor.is_running());
        assert!(!monitor.is_push_controlled());
        assert_err!(monitor.init());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_session_starts_after_shutdown() {
        let monitor = monitor(200);
        monitor.init().unwrap();
        monitor.shutdown();

        let err = monitor
            .start_session(SessionConfig::push("late").with_rate_hz(50.0))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
        assert!(!monitor.is_push_controlled());
        assert_eq!(monitor.active_session_id(), None);

        let (before, _) = monitor.totals(telemon::Channel::Broadcast);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(monitor.totals(telemon::Channel::Broadcast).0, before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshots_never_predate_their_session() {
        let monitor = monitor(200);
        monitor.init().unwrap();
        let mut ids = Vec::new();
        for i in 0..20 {
            let rec = monitor.start_session(SessionConfig::push(format!("s{}", i))).unwrap();
            ids.push(rec.id);
            tokio::time::sleep(Duration::from_millis(37 + (i % 5) * 41)).await;
        }
        monitor.shutdown();

        for id in ids {
            let rec = monitor.get_session(&id).unwrap();
            assert!(
                rec.samples.iter().all(|s| s.timestamp >= rec.started_at),
                "session {} holds a snapshot from before its start",
                rec.config.label
            );
        }
    }
}
