//! Per-session statistics over the trimmed snapshot window

use serde::Serialize;

use crate::session::{ChannelMode, SessionRecord};

/// Aggregate figures for one session.
///
/// Rates and byte rates are time-weighted by each snapshot's `tickMs`; the
/// spread figures (median, trimmed mean, std-dev, CI) treat each snapshot as
/// one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub label: String,
    pub mode: ChannelMode,
    pub clients_http: usize,
    pub clients_ws: usize,
    pub load_cpu_pct: f64,
    pub warmup_sec: f64,
    pub cooldown_sec: f64,
    /// Snapshots used after trimming
    pub n_used: usize,
    /// Snapshots recorded in total
    pub n_total: usize,

    pub avg_cpu: f64,
    pub avg_rss: f64,
    pub avg_elu: f64,
    pub avg_delay_p99: f64,
    pub avg_jitter_ms: f64,
    pub avg_freshness_ms: f64,

    pub avg_rate: f64,
    pub rate_median: f64,
    pub rate_trimmed: f64,
    pub rate_std: f64,
    pub ci95_rate: f64,
    pub rel_ci_rate: f64,

    pub avg_bytes_rate: f64,
    pub bytes_median: f64,
    pub bytes_trimmed: f64,
    pub bytes_std: f64,
    pub ci95_bytes: f64,
    pub rel_ci_bytes: f64,

    pub avg_payload: f64,
    pub bytes_per_unit: f64,
}

impl SessionSummary {
    pub fn from_record(rec: &SessionRecord) -> Self {
        let samples = rec.trimmed_samples();
        let channel = rec.mode().channel();
        let n = samples.len().max(1) as f64;

        let mut cpu = 0.0;
        let mut rss = 0.0;
        let mut elu = 0.0;
        let mut p99 = 0.0;
        let mut fresh = 0.0;
        let mut jitter = 0.0;
        let mut dt = 0.0;
        let mut rate_time = 0.0;
        let mut bytes_time = 0.0;
        for s in &samples {
            let w = (s.tick_ms / 1000.0).max(0.0);
            cpu += s.cpu_percent;
            rss += s.rss_mb;
            elu += s.utilization;
            p99 += s.delay_p99_ms;
            fresh += s.freshness_ms;
            jitter += s.jitter_ms(channel);
            dt += w;
            rate_time += s.rate(channel) * w;
            bytes_time += s.bytes_rate(channel) * w;
        }

        let dt_sum = if dt > 0.0 {
            dt
        } else {
            let first = samples.first().map(|s| s.tick_ms).unwrap_or(0.0);
            n * first / 1000.0
        };
        let dt_sum = dt_sum.max(0.0001);
        let avg_rate = rate_time / dt_sum;
        let avg_bytes_rate = bytes_time / dt_sum;
        let avg_payload = if rate_time > 0.0 { bytes_time / rate_time } else { 0.0 };
        let bytes_per_unit = if avg_payload > 0.0 {
            avg_payload
        } else {
            avg_bytes_rate / avg_rate.max(0.0001)
        };

        let rates: Vec<f64> = samples.iter().map(|s| s.rate(channel)).collect();
        let bytes: Vec<f64> = samples.iter().map(|s| s.bytes_rate(channel)).collect();
        let rate_std = std_dev(&rates);
        let bytes_std = std_dev(&bytes);
        let ci95_rate = ci95(rate_std, rates.len());
        let ci95_bytes = ci95(bytes_std, bytes.len());

        let clients = |v: Option<usize>, m: ChannelMode| if rec.mode() == m { v.unwrap_or(0) } else { 0 };

        Self {
            id: rec.id.clone(),
            label: rec.config.label.clone(),
            mode: rec.mode(),
            clients_http: clients(rec.config.clients_http, ChannelMode::Poll),
            clients_ws: clients(rec.config.clients_ws, ChannelMode::Push),
            load_cpu_pct: rec.config.load_cpu_pct.unwrap_or(0.0).max(0.0).floor(),
            warmup_sec: rec.config.warmup_sec.unwrap_or(0.0),
            cooldown_sec: rec.config.cooldown_sec.unwrap_or(0.0),
            n_used: samples.len(),
            n_total: rec.samples.len(),
            avg_cpu: cpu / n,
            avg_rss: rss / n,
            avg_elu: elu / n,
            avg_delay_p99: p99 / n,
            avg_jitter_ms: jitter / n,
            avg_freshness_ms: fresh / n,
            avg_rate,
            rate_median: median(&rates),
            rate_trimmed: trimmed_mean(&rates, 0.1),
            rate_std,
            ci95_rate,
            rel_ci_rate: if avg_rate != 0.0 { ci95_rate / avg_rate } else { 0.0 },
            avg_bytes_rate,
            bytes_median: median(&bytes),
            bytes_trimmed: trimmed_mean(&bytes, 0.1),
            bytes_std,
            ci95_bytes,
            rel_ci_bytes: if avg_bytes_rate != 0.0 { ci95_bytes / avg_bytes_rate } else { 0.0 },
            avg_payload,
            bytes_per_unit,
        }
    }
}

// ============================================================================
// Statistics helpers
// ============================================================================

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); 0 below two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let var = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// 95 % confidence half-width of the mean
pub fn ci95(std: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    1.96 * std / (n as f64).sqrt()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let v = sorted(values);
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    }
}

/// Mean after dropping `frac` of the values from each end
pub fn trimmed_mean(values: &[f64], frac: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let v = sorted(values);
    let k = (v.len() as f64 * frac).floor() as usize;
    if 2 * k >= v.len() {
        return mean(&v);
    }
    mean(&v[k..v.len() - k])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_trimmed_mean_drops_outliers() {
        let mut v: Vec<f64> = (0..10).map(|_| 2.0).collect();
        v[0] = 100.0;
        v[9] = -50.0;
        assert_eq!(trimmed_mean(&v, 0.1), 2.0);
        // too few values to trim
        assert_eq!(trimmed_mean(&[1.0, 3.0], 0.1), 2.0);
    }

    #[test]
    fn test_std_dev_and_ci() {
        assert_eq!(std_dev(&[5.0]), 0.0);
        let s = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((s - 2.138).abs() < 1e-3);
        assert!((ci95(2.0, 4) - 1.96).abs() < 1e-12);
        assert_eq!(ci95(2.0, 0), 0.0);
    }
}
