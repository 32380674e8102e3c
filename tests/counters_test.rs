//! Integration tests for traffic recording.
//!
//! This file contains tests for:
//! - Broadcast byte cost scaling with the subscriber count.
//! - Jitter on short interval buffers.
//! - On-demand snapshots reflecting recorded traffic and source timestamps.

use async_trait::async_trait;
use std::sync::Arc;
use telemon::interval::IntervalBuffer;
use telemon::{
    BroadcastHub, Channel, MonitorConfig, MonitorContext, MonitorError, NullPublisher, ProcessProbe, ProcessUsage,
    ResourceMonitor,
};

struct FixedProbe;

#[async_trait]
impl ProcessProbe for FixedProbe {
    async fn sample(&self) -> telemon::Result<ProcessUsage> {
        Ok(ProcessUsage {
            cpu_percent: 7.5,
            resident_bytes: 32 * 1024 * 1024,
        })
    }

    fn probe_name(&self) -> &'static str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_broadcast_cost_scales_with_subscribers() {
        let hub = Arc::new(BroadcastHub::new(8));
        let ctx = MonitorContext::new(hub.clone(), true, 400);

        ctx.record_broadcast(100);
        assert_eq!(ctx.totals(Channel::Broadcast), (1, 100));

        let _a = hub.subscribe();
        let _b = hub.subscribe();
        let _c = hub.subscribe();
        ctx.record_broadcast(100);
        assert_eq!(ctx.totals(Channel::Broadcast), (2, 400));
    }

    #[test]
    fn test_jitter_needs_two_intervals() {
        let mut buf = IntervalBuffer::new(200);
        assert_eq!(buf.std_dev(), 0.0);
        buf.record(500.0);
        assert_eq!(buf.std_dev(), 0.0);
        buf.record(700.0);
        assert!(buf.std_dev() > 0.0);
    }

    #[tokio::test]
    async fn test_sample_now_reflects_recorded_traffic() {
        let monitor =
            ResourceMonitor::with_probe(MonitorConfig::default(), Arc::new(NullPublisher), Some(Arc::new(FixedProbe)))
                .unwrap();
        for _ in 0..10 {
            monitor.record_request(420);
        }
        monitor.record_broadcast(300);

        let snap = monitor.sample_now().await;
        assert_eq!(snap.cpu_percent, 7.5);
        assert_eq!(snap.rss_mb, 32.0);
        assert_eq!(snap.total_requests, 10);
        assert_eq!(snap.total_request_bytes, 4200);
        assert_eq!(snap.total_broadcast_bytes, 300);
        assert!(snap.request_rate > 0.0);
        assert_eq!(snap.request_avg_bytes, 420.0);
        assert!(snap.ingest_ts_ms.is_some());

        // on-demand sampling leaves the baselines alone
        let again = monitor.sample_now().await;
        assert_eq!(again.request_avg_bytes, 420.0);
    }

    #[tokio::test]
    async fn test_external_source_timestamp() {
        let monitor =
            ResourceMonitor::with_probe(MonitorConfig::default(), Arc::new(NullPublisher), Some(Arc::new(FixedProbe)))
                .unwrap();
        assert_eq!(monitor.sample_now().await.source_ts_ms, None);

        let err = monitor.set_external_source_timestamp("yesterday-ish").unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));

        let ts = (chrono::Utc::now() - chrono::Duration::milliseconds(250)).to_rfc3339();
        assert_ok!(monitor.set_external_source_timestamp(&ts));
        let snap = monitor.sample_now().await;
        assert!(snap.source_ts_ms.is_some());
        assert!(snap.freshness_ms >= 200.0);
    }

    #[test]
    fn test_payload_size_observation() {
        let ctx = MonitorContext::new(Arc::new(NullPublisher), true, 400);
        assert_eq!(ctx.observed_payload_bytes(), 400);
        ctx.note_payload_size(0);
        assert_eq!(ctx.observed_payload_bytes(), 400);
        ctx.note_payload_size(512);
        assert_eq!(ctx.observed_payload_bytes(), 512);
    }
}
