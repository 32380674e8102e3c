//! Sequential, abortable batch of measurement sessions

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::monitor::ResourceMonitor;
use crate::session::{ChannelMode, SessionConfig, SessionRecord};

/// Extra wait after a session's duration so its final tick lands
pub const SETTLE: Duration = Duration::from_millis(600);

/// One scenario of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub label: String,
    pub mode: ChannelMode,
    /// Target rate per client (messages or requests per second)
    pub hz: f64,
    pub duration_sec: f64,
    pub payload_bytes: u64,
    /// Simulated clients (push subscribers or pollers)
    pub clients: usize,
    pub load_cpu_pct: Option<f64>,
    pub load_workers: Option<usize>,
    pub warmup_sec: Option<f64>,
    pub cooldown_sec: Option<f64>,
}

impl RunPlan {
    pub fn new(mode: ChannelMode, hz: f64, duration_sec: f64, payload_bytes: u64) -> Self {
        Self {
            label: plan_label(mode, hz, payload_bytes, 0, 0.0),
            mode,
            hz,
            duration_sec,
            payload_bytes,
            clients: 1,
            load_cpu_pct: None,
            load_workers: None,
            warmup_sec: None,
            cooldown_sec: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_clients(mut self, clients: usize) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_load(mut self, cpu_pct: f64, workers: usize) -> Self {
        self.load_cpu_pct = Some(cpu_pct);
        self.load_workers = Some(workers);
        self
    }

    pub fn with_trim(mut self, warmup_sec: f64, cooldown_sec: f64) -> Self {
        self.warmup_sec = Some(warmup_sec);
        self.cooldown_sec = Some(cooldown_sec);
        self
    }

    /// Session configuration for this plan.
    ///
    /// Push plans run one driver at `hz × clients`. Poll plans run `clients`
    /// synthetic pollers at `hz` each.
    pub fn session_config(&self) -> SessionConfig {
        let clients = self.clients.max(1);
        let mut cfg = SessionConfig::new(self.label.clone(), self.mode)
            .with_duration_sec(self.duration_sec)
            .with_payload_bytes(self.payload_bytes);
        match self.mode {
            ChannelMode::Push => {
                cfg = cfg.with_rate_hz(self.hz * clients as f64).with_clients_ws(clients);
            }
            ChannelMode::Poll => {
                let period_ms = (1000.0 / self.hz.max(0.001)).round().max(50.0) as u64;
                cfg = cfg
                    .with_polling_interval_ms(period_ms)
                    .with_clients_http(clients)
                    .with_internal_http_driver(false);
            }
        }
        cfg.load_cpu_pct = self.load_cpu_pct;
        cfg.load_workers = self.load_workers;
        cfg.warmup_sec = self.warmup_sec;
        cfg.cooldown_sec = self.cooldown_sec;
        cfg
    }

    /// Wall time the runner waits before finishing the session
    pub fn wait(&self) -> Duration {
        let secs = if self.duration_sec.is_finite() && self.duration_sec > 0.0 {
            self.duration_sec
        } else {
            0.0
        };
        Duration::from_secs_f64(secs) + SETTLE
    }
}

/// `WS@2Hz payload=360B + load=50% cWs=3`
fn plan_label(mode: ChannelMode, hz: f64, payload_bytes: u64, clients: usize, load_pct: f64) -> String {
    let (prefix, client_tag) = match mode {
        ChannelMode::Push => ("WS", "cWs"),
        ChannelMode::Poll => ("HTTP", "cHttp"),
    };
    let mut label = format!("{}@{}Hz payload={}B", prefix, hz, payload_bytes);
    if load_pct > 0.0 {
        label.push_str(&format!(" + load={}%", load_pct));
    }
    if clients > 0 {
        label.push_str(&format!(" {}={}", client_tag, clients));
    }
    label
}

/// Cross product of modes, rates, loads and client counts.
pub fn plan_matrix(
    modes: &[ChannelMode],
    rates_hz: &[f64],
    loads_pct: &[f64],
    clients: &[usize],
    duration_sec: f64,
    payload_bytes: u64,
) -> Vec<RunPlan> {
    let mut plans = Vec::new();
    for &mode in modes {
        for &hz in rates_hz {
            for &load in loads_pct {
                for &n in clients {
                    let mut plan = RunPlan::new(mode, hz, duration_sec, payload_bytes)
                        .with_clients(n)
                        .with_label(plan_label(mode, hz, payload_bytes, n, load));
                    if load > 0.0 {
                        plan = plan.with_load(load, 1);
                    }
                    plans.push(plan);
                }
            }
        }
    }
    plans
}

/// Runs plans one after another against one monitor.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    monitor: ResourceMonitor,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(monitor: ResourceMonitor) -> Self {
        Self {
            monitor,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts the batch when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every plan, returning the finished records.
    ///
    /// On cancellation the running session is finished normally and kept;
    /// no further plans start.
    pub async fn run(&self, plans: &[RunPlan]) -> Result<Vec<SessionRecord>> {
        let mut records = Vec::with_capacity(plans.len());
        for (i, plan) in plans.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let rec = self.monitor.start_session(plan.session_config())?;
            info!(
                session_id = %rec.id,
                plan = i + 1,
                of = plans.len(),
                label = %plan.label,
                "batch session running"
            );

            let aborted = tokio::select! {
                _ = self.cancel.cancelled() => true,
                _ = tokio::time::sleep(plan.wait()) => false,
            };

            match self.monitor.finish_session(&rec.id) {
                Some(done) => records.push(done),
                None => warn!(session_id = %rec.id, "session vanished before finish"),
            }
            if aborted {
                info!(completed = records.len(), "batch cancelled");
                break;
            }
        }
        Ok(records)
    }
}
