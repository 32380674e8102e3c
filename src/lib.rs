//! Telemon: live resource monitor and measurement-session engine
//!
//! Samples process and scheduler health on a fixed tick, tracks per-channel
//! traffic rates, byte costs and jitter for a push channel and a
//! request/response channel, and records labelled measurement sessions
//! while synthetic drivers generate controlled traffic.
//!
//! # Features
//! - `process-stats`: (Default) Real OS process sampling via `sysinfo`.
//! - `http-poller`: (Default) Real network poller via `reqwest`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telemon::{BroadcastHub, MonitorConfig, ResourceMonitor, SessionConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Arc::new(BroadcastHub::default());
//! let monitor = ResourceMonitor::new(MonitorConfig::from_env(), hub.clone())?;
//! monitor.init()?;
//!
//! // Push 2 messages/s of 300 bytes for 5 seconds
//! let session = monitor.start_session(
//!     SessionConfig::push("ws 2Hz").with_rate_hz(2.0).with_payload_bytes(300).with_duration_sec(5.0),
//! )?;
//! tokio::time::sleep(std::time::Duration::from_secs(6)).await;
//!
//! let record = monitor.get_session(&session.id).expect("session exists");
//! println!("{}", telemon::export::sessions_to_csv(&[record]));
//! monitor.shutdown();
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Environment-driven monitor configuration
pub mod config;
/// Shared counters, gate and publisher handed to drivers
pub mod context;
/// Cumulative counters and the rolling rate window
pub mod counters;
/// Synthetic traffic and CPU load drivers
pub mod drivers;
/// Error type and result alias
pub mod error;
/// CSV export of session snapshots
pub mod export;
/// Live-emission gate with session override
pub mod gate;
/// Bounded inter-arrival buffer and jitter
pub mod interval;
/// Sampling loop and session engine
pub mod monitor;
/// Outbound publish/subscribe seam
pub mod publisher;
/// Sequential batch of sessions
pub mod runner;
/// Throttled OS process sampling
pub mod sampler;
/// Scheduler wake-up delay probe
pub mod scheduler;
/// Session configuration and records
pub mod session;
/// Metrics snapshot
pub mod snapshot;
/// Per-session statistics
pub mod summary;

// Re-export public API
pub use crate::config::MonitorConfig;
pub use crate::context::MonitorContext;
pub use crate::counters::Channel;
pub use crate::error::{MonitorError, Result};
pub use crate::gate::LiveEmitGate;
pub use crate::monitor::ResourceMonitor;
pub use crate::publisher::{BroadcastHub, NullPublisher, Publisher, PushMessage, DATA_EVENT};
pub use crate::runner::{plan_matrix, BatchRunner, RunPlan};
pub use crate::sampler::{ProcessProbe, ProcessUsage};
pub use crate::session::{ChannelMode, SessionConfig, SessionMeta, SessionRecord};
pub use crate::snapshot::{Snapshot, METRICS_EVENT};
pub use crate::summary::SessionSummary;
