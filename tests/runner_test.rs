//! Integration tests for the batch runner.
//!
//! This file contains tests for:
//! - Abort finishing the running session and skipping the rest.
//! - A short batch completing every plan in order.

use std::sync::Arc;
use std::time::Duration;
use telemon::{BatchRunner, ChannelMode, MonitorConfig, NullPublisher, ResourceMonitor, RunPlan};

fn monitor() -> ResourceMonitor {
    let config = MonitorConfig::default()
        .with_tick_interval_ms(200)
        .with_live_emit_enabled(false);
    ResourceMonitor::with_probe(config, Arc::new(NullPublisher), None).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_keeps_running_session_and_stops_batch() {
        let monitor = monitor();
        monitor.init().unwrap();
        let runner = BatchRunner::new(monitor.clone());
        let cancel = runner.cancel_token();

        let plans: Vec<RunPlan> = (0..3)
            .map(|i| RunPlan::new(ChannelMode::Push, 2.0, 5.0, 200).with_label(format!("plan {}", i)))
            .collect();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });

        let records = tokio::time::timeout(Duration::from_secs(3), runner.run(&plans))
            .await
            .expect("abort should end the batch early")
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].config.label, "plan 0");
        assert!(records[0].finished_at.is_some());
        assert_eq!(monitor.active_session_id(), None);
        assert_eq!(monitor.list_sessions().len(), 1);
        monitor.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_short_batch_runs_every_plan() {
        let monitor = monitor();
        monitor.init().unwrap();
        let plans = vec![
            RunPlan::new(ChannelMode::Push, 5.0, 0.4, 100),
            RunPlan::new(ChannelMode::Poll, 5.0, 0.4, 100).with_clients(2),
        ];

        let records = BatchRunner::new(monitor.clone()).run(&plans).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.finished_at.is_some()));
        assert_eq!(records[0].config.mode, ChannelMode::Push);
        assert_eq!(records[1].config.mode, ChannelMode::Poll);
        assert_eq!(records[1].config.clients_http, Some(2));
        monitor.shutdown();
    }
}
