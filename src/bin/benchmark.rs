//! Push vs. polling measurement benchmark
//!
//! Runs a matrix of sessions (modes × rates × CPU loads × clients) against
//! an in-process monitor with synthetic drivers, then prints a markdown
//! report and optionally writes the raw snapshots as CSV.
//!
//! Environment:
//! - `MEASURE_MODES` (default `ws,polling`)
//! - `MEASURE_HZ_SET` (default `1,2`)
//! - `MEASURE_LOAD_SET` (default `0`)
//! - `MEASURE_CLIENTS_SET` (default `1`)
//! - `MEASURE_DURATION_SEC` (default `6`)
//! - `MEASURE_PAYLOAD` (default `360`)
//! - `MEASURE_WARMUP_SEC`, `MEASURE_COOLDOWN_SEC` (default `0`)
//! - `MEASURE_CSV` output path for the raw snapshots
//! - `RUST_LOG` log filter (default `info`)

use chrono::Local;
use std::error::Error;
use std::sync::Arc;
use telemon::{
    export, plan_matrix, BatchRunner, ChannelMode, MonitorConfig, NullPublisher, ResourceMonitor, SessionSummary,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_or(key, "").trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(default)
}

fn parse_list<T: std::str::FromStr>(raw: &str) -> Vec<T> {
    raw.split(',').filter_map(|s| s.trim().parse::<T>().ok()).collect()
}

fn generate_report(summaries: &[SessionSummary], duration_sec: f64) {
    println!("\n# Push vs. Polling Benchmark Results");
    println!("\n**Generated**: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("**Session length**: {}s", duration_sec);

    println!("\n| Label | n (used/total) | Rate [/s] | ±CI95 | Bytes/s | Payload [B] | Jitter [ms] | Freshness [ms] | CPU [%] | RSS [MB] | ELU | p99 [ms] |");
    println!("|-------|----------------|-----------|-------|---------|-------------|-------------|----------------|---------|----------|-----|----------|");
    for s in summaries {
        println!(
            "| {} | {}/{} | {:.2} | {:.2} | {:.0} | {:.1} | {:.1} | {:.0} | {:.1} | {:.1} | {:.3} | {:.2} |",
            s.label,
            s.n_used,
            s.n_total,
            s.avg_rate,
            s.ci95_rate,
            s.avg_bytes_rate,
            s.bytes_per_unit,
            s.avg_jitter_ms,
            s.avg_freshness_ms,
            s.avg_cpu,
            s.avg_rss,
            s.avg_elu,
            s.avg_delay_p99,
        );
    }

    let by_mode = |mode: ChannelMode| summaries.iter().filter(move |s| s.mode == mode);
    let mean = |it: &mut dyn Iterator<Item = f64>| {
        let (sum, n) = it.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    };
    println!("\n## Per-mode averages");
    println!("\n| Mode | CPU [%] | Bytes/s | Jitter [ms] | Freshness [ms] |");
    println!("|------|---------|---------|-------------|----------------|");
    for mode in [ChannelMode::Push, ChannelMode::Poll] {
        if by_mode(mode).next().is_none() {
            continue;
        }
        println!(
            "| {} | {:.2} | {:.0} | {:.2} | {:.0} |",
            mode,
            mean(&mut by_mode(mode).map(|s| s.avg_cpu)),
            mean(&mut by_mode(mode).map(|s| s.avg_bytes_rate)),
            mean(&mut by_mode(mode).map(|s| s.avg_jitter_ms)),
            mean(&mut by_mode(mode).map(|s| s.avg_freshness_ms)),
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let modes: Vec<ChannelMode> = parse_list(&env_or("MEASURE_MODES", "ws,polling"));
    let rates: Vec<f64> = parse_list::<f64>(&env_or("MEASURE_HZ_SET", "1,2"))
        .into_iter()
        .filter(|hz| hz.is_finite() && *hz > 0.0)
        .collect();
    let loads: Vec<f64> = parse_list(&env_or("MEASURE_LOAD_SET", "0"));
    let clients: Vec<usize> = parse_list(&env_or("MEASURE_CLIENTS_SET", "1"));
    let duration_sec = env_f64("MEASURE_DURATION_SEC", 6.0);
    let payload = env_f64("MEASURE_PAYLOAD", 360.0).max(1.0) as u64;
    let warmup = env_f64("MEASURE_WARMUP_SEC", 0.0);
    let cooldown = env_f64("MEASURE_COOLDOWN_SEC", 0.0);

    let plans: Vec<_> = plan_matrix(&modes, &rates, &loads, &clients, duration_sec, payload)
        .into_iter()
        .map(|p| p.with_trim(warmup, cooldown))
        .collect();
    if plans.is_empty() {
        warn!("nothing to run; check MEASURE_MODES and MEASURE_HZ_SET");
        return Ok(());
    }

    println!("Push vs. Polling Benchmark");
    println!("==========================");
    println!("Sessions: {} | Duration: {}s each", plans.len(), duration_sec);

    let monitor = ResourceMonitor::new(MonitorConfig::from_env(), Arc::new(NullPublisher))?;
    monitor.init()?;
    monitor.set_live_emit_enabled(false);

    let runner = BatchRunner::new(monitor.clone());
    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current session");
            cancel.cancel();
        }
    });

    let records = runner.run(&plans).await?;
    monitor.shutdown();

    if records.is_empty() {
        println!("\n⚠️  No sessions completed");
        return Ok(());
    }
    println!("\n✓ Completed {} of {} sessions", records.len(), plans.len());

    let summaries: Vec<SessionSummary> = records.iter().map(SessionSummary::from_record).collect();
    generate_report(&summaries, duration_sec);

    if let Ok(path) = std::env::var("MEASURE_CSV") {
        std::fs::write(&path, export::sessions_to_csv(&records))?;
        println!("\nRaw snapshots written to {}", path);
    }
    Ok(())
}
