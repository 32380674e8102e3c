//! Integration tests for the live-emission gate.
//!
//! This file contains tests for:
//! - Push sessions forcing the gate open and restoring it on finish.
//! - Poll sessions leaving the gate alone.
//! - Restore on reset and on back-to-back push sessions.

use std::sync::Arc;
use telemon::{MonitorConfig, NullPublisher, ResourceMonitor, SessionConfig};

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(live_emit: bool) -> ResourceMonitor {
        let config = MonitorConfig::default().with_live_emit_enabled(live_emit);
        ResourceMonitor::with_probe(config, Arc::new(NullPublisher), None).unwrap()
    }

    #[tokio::test]
    async fn test_push_session_forces_and_restores_gate() {
        let monitor = monitor(false);
        assert!(!monitor.is_live_emit_enabled());

        let rec = monitor.start_session(SessionConfig::push("ws")).unwrap();
        assert!(monitor.is_live_emit_enabled());

        monitor.finish_session(&rec.id).unwrap();
        assert!(!monitor.is_live_emit_enabled());
    }

    #[tokio::test]
    async fn test_push_session_keeps_open_gate_open() {
        let monitor = monitor(true);
        let rec = monitor.start_session(SessionConfig::push("ws")).unwrap();
        assert!(monitor.is_live_emit_enabled());
        monitor.finish_session(&rec.id);
        assert!(monitor.is_live_emit_enabled());
    }

    #[tokio::test]
    async fn test_poll_session_does_not_touch_gate() {
        let monitor = monitor(false);
        let rec = monitor
            .start_session(SessionConfig::poll("http").with_internal_http_driver(false))
            .unwrap();
        assert!(!monitor.is_live_emit_enabled());
        monitor.finish_session(&rec.id);
        assert!(!monitor.is_live_emit_enabled());
    }

    #[tokio::test]
    async fn test_back_to_back_push_sessions_restore_original_value() {
        let monitor = monitor(false);
        let _first = monitor.start_session(SessionConfig::push("a")).unwrap();
        let second = monitor.start_session(SessionConfig::push("b")).unwrap();
        assert!(monitor.is_live_emit_enabled());
        monitor.finish_session(&second.id);
        assert!(!monitor.is_live_emit_enabled());
    }

    #[tokio::test]
    async fn test_reset_restores_forced_gate() {
        let monitor = monitor(false);
        monitor.start_session(SessionConfig::push("ws")).unwrap();
        assert!(monitor.is_live_emit_enabled());
        assert_eq!(monitor.reset_sessions(), 1);
        assert!(!monitor.is_live_emit_enabled());
    }

    #[tokio::test]
    async fn test_manual_toggle() {
        let monitor = monitor(true);
        monitor.set_live_emit_enabled(false);
        assert!(!monitor.is_live_emit_enabled());
        monitor.set_live_emit_enabled(true);
        assert!(monitor.is_live_emit_enabled());
    }
}
