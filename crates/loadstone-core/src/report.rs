//! C9 Report Emitter: snapshots the aggregator and hands it to an injected
//! [`ArtifactWriter`] (§4.9). HTML/chart rendering is out of core scope
//! (§1) — the JSON writer here is the one concrete adapter this crate ships.

use serde::Serialize;

use crate::config::{compute_verdict, RunConfig, Verdict};
use crate::error::LoadstoneError;
use crate::metrics::MetricsSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub validation_failures: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub current_tps: f64,
    pub total_bytes: u64,
    pub verdict: VerdictReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result")]
pub enum VerdictReport {
    Pass,
    Fail { reasons: Vec<String> },
}

impl From<Verdict> for VerdictReport {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Pass => VerdictReport::Pass,
            Verdict::Fail { reasons } => VerdictReport::Fail { reasons },
        }
    }
}

/// Build the final [`Report`] from a metrics snapshot, percentiles, and the
/// effective run config's thresholds (§8 scenario 6).
pub fn build_report(snapshot: &MetricsSnapshot, percentiles: (u64, u64, u64), config: &RunConfig) -> Report {
    let (p50_ms, p95_ms, p99_ms) = percentiles;
    let error_pct = if snapshot.total > 0 {
        snapshot.failed as f64 / snapshot.total as f64 * 100.0
    } else {
        0.0
    };
    let verdict = compute_verdict(&config.thresholds, p95_ms, error_pct, snapshot.current_tps);

    let min_ms = snapshot.all_samples.iter().copied().min().unwrap_or(0);
    let max_ms = snapshot.all_samples.iter().copied().max().unwrap_or(0);
    let mean_ms = if !snapshot.all_samples.is_empty() {
        snapshot.all_samples.iter().sum::<u64>() as f64 / snapshot.all_samples.len() as f64
    } else {
        0.0
    };

    Report {
        total: snapshot.total,
        succeeded: snapshot.succeeded,
        failed: snapshot.failed,
        validation_failures: snapshot.validation_failures,
        p50_ms,
        p95_ms,
        p99_ms,
        min_ms,
        max_ms,
        mean_ms,
        current_tps: snapshot.current_tps,
        total_bytes: snapshot.total_bytes,
        verdict: verdict.into(),
    }
}

/// Injected output sink (§1 "an ArtifactWriter consumes the aggregated
/// metrics"). Parsing/rendering of any richer artifact (HTML, charts) is
/// deliberately not implemented here.
pub trait ArtifactWriter {
    fn write(&self, report: &Report) -> Result<(), LoadstoneError>;
}

/// Writes the report as pretty-printed JSON to a file path.
pub struct JsonFileArtifactWriter {
    path: std::path::PathBuf,
}

impl JsonFileArtifactWriter {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArtifactWriter for JsonFileArtifactWriter {
    fn write(&self, report: &Report) -> Result<(), LoadstoneError> {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StepConfig, SuccessCriteria, Thresholds};
    use crate::metrics::MetricsAggregator;
    use std::collections::HashMap;

    fn make_config() -> RunConfig {
        RunConfig {
            test_ms: 1000,
            ramp_up_ms: 0,
            ramp_down_ms: 0,
            target_tps: 1.0,
            max_vus: 1,
            request_timeout_ms: 1000,
            step_sequence: vec![StepConfig {
                step_name: "ping".to_string(),
                inter_step_delay_ms: 0,
                enabled: true,
                criteria: None,
            }],
            thresholds: Thresholds {
                max_rt_ms: 2000,
                max_error_pct: 5.0,
                min_tps: 0.0,
            },
            global_criteria: SuccessCriteria::default(),
        }
    }

    fn empty_snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            start: chrono::Utc::now(),
            end: None,
            total: 0,
            succeeded: 0,
            failed: 0,
            validation_failures: 0,
            all_samples: vec![],
            current_vus: 0,
            current_tps: 0.0,
            per_step_samples: HashMap::new(),
            recent_results: vec![],
            total_bytes: 0,
        }
    }

    #[test]
    fn build_report_computes_pass_verdict_for_clean_run() {
        let mut snapshot = empty_snapshot();
        snapshot.total = 10;
        snapshot.succeeded = 10;
        snapshot.all_samples = vec![10, 20, 30];
        let config = make_config();
        let report = build_report(&snapshot, (20, 30, 30), &config);
        assert!(matches!(report.verdict, VerdictReport::Pass));
    }

    #[test]
    fn build_report_computes_fail_verdict_when_threshold_exceeded() {
        let mut snapshot = empty_snapshot();
        snapshot.total = 10;
        snapshot.succeeded = 10;
        let mut config = make_config();
        config.thresholds.max_rt_ms = 100;
        let report = build_report(&snapshot, (50, 2500, 2600), &config);
        assert!(matches!(report.verdict, VerdictReport::Fail { .. }));
    }

    #[test]
    fn json_artifact_writer_writes_parseable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let writer = JsonFileArtifactWriter::new(&path);
        let agg = MetricsAggregator::new();
        let snapshot = agg.snapshot();
        let config = make_config();
        let report = build_report(&snapshot, (0, 0, 0), &config);
        writer.write(&report).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["total"], 0);
    }
}
