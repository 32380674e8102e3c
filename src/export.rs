//! Flat CSV export of session snapshots
//!
//! One row per snapshot. The column order is part of the format and must not
//! change.

use crate::session::SessionRecord;
use crate::snapshot::Snapshot;

/// Header of [`sessions_to_csv`], in order
pub const CSV_COLUMNS: [&str; 25] = [
    "sessionId",
    "label",
    "mode",
    "startedAt",
    "finishedAt",
    "sampleIndex",
    "ts",
    "cpu",
    "rssMB",
    "heapUsedMB",
    "elu",
    "elDelayP99Ms",
    "httpReqRate",
    "wsMsgRate",
    "httpBytesRate",
    "wsBytesRate",
    "httpAvgBytesPerReq",
    "wsAvgBytesPerMsg",
    "httpJitterMs",
    "wsJitterMs",
    "tickMs",
    "dataFreshnessMs",
    "sourceTsMs",
    "ingestTsMs",
    "emitTsMs",
];

/// Render every snapshot of `sessions` as CSV, header first, `\n` separated.
pub fn sessions_to_csv(sessions: &[SessionRecord]) -> String {
    let mut rows = Vec::with_capacity(1 + sessions.iter().map(|s| s.samples.len()).sum::<usize>());
    rows.push(CSV_COLUMNS.join(","));
    for rec in sessions {
        // the label is the only free-text field; quote it as a JSON string
        let label = serde_json::to_string(&rec.config.label).unwrap_or_else(|_| String::from("\"\""));
        let started = rec.started_at_iso();
        let finished = rec.finished_at_iso().unwrap_or_default();
        for (idx, sample) in rec.samples.iter().enumerate() {
            rows.push(row(rec, &label, &started, &finished, idx + 1, sample));
        }
    }
    rows.join("\n")
}

fn row(rec: &SessionRecord, label: &str, started: &str, finished: &str, index: usize, s: &Snapshot) -> String {
    let opt = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
    [
        rec.id.clone(),
        label.to_string(),
        rec.mode().as_str().to_string(),
        started.to_string(),
        finished.to_string(),
        index.to_string(),
        s.ts_iso(),
        format!("{:.3}", s.cpu_percent),
        format!("{:.3}", s.rss_mb),
        format!("{:.3}", s.heap_used_mb),
        format!("{:.4}", s.utilization),
        format!("{:.2}", s.delay_p99_ms),
        format!("{:.3}", s.request_rate),
        format!("{:.3}", s.broadcast_rate),
        format!("{:.3}", s.request_bytes_rate),
        format!("{:.3}", s.broadcast_bytes_rate),
        format!("{:.2}", s.request_avg_bytes),
        format!("{:.2}", s.broadcast_avg_bytes),
        format!("{:.2}", s.request_jitter_ms),
        format!("{:.2}", s.broadcast_jitter_ms),
        format!("{:.0}", s.tick_ms),
        format!("{:.0}", s.freshness_ms),
        opt(s.source_ts_ms),
        opt(s.ingest_ts_ms),
        opt(s.emit_ts_ms),
    ]
    .join(",")
}
