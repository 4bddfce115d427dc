//! C7 Metrics Aggregator: thread-safe counters, per-step samples, rolling
//! TPS, and percentile computation (§4.7).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::http::executor::ExecutionOutcome;

const MAX_ALL_SAMPLES: usize = 10_000;
const MAX_RECENT_RESULTS: usize = 50;
const ROLLING_TPS_WINDOW_SECS: i64 = 10;

/// A trimmed record of one completed request, kept in the bounded
/// `recent_results` ring for live inspection.
#[derive(Debug, Clone)]
pub struct RecordedResult {
    pub step_name: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub is_success: bool,
    pub captured_at: DateTime<Utc>,
}

struct Inner {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    total: u64,
    succeeded: u64,
    failed: u64,
    validation_failures: u64,
    all_samples: VecDeque<u64>,
    per_step_samples: HashMap<String, Vec<u64>>,
    recent_results: VecDeque<RecordedResult>,
    tps_window: VecDeque<Instant>,
    total_bytes: u64,
}

/// Shared, mutated concurrently by every virtual user. Hold behind an `Arc`.
pub struct MetricsAggregator {
    inner: Mutex<Inner>,
    current_vus: AtomicU32,
}

/// Deep, point-in-time copy safe to hand to the Report Emitter.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub validation_failures: u64,
    pub all_samples: Vec<u64>,
    pub current_vus: u32,
    pub current_tps: f64,
    pub per_step_samples: HashMap<String, Vec<u64>>,
    pub recent_results: Vec<RecordedResult>,
    pub total_bytes: u64,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                start: Utc::now(),
                end: None,
                total: 0,
                succeeded: 0,
                failed: 0,
                validation_failures: 0,
                all_samples: VecDeque::new(),
                per_step_samples: HashMap::new(),
                recent_results: VecDeque::new(),
                tps_window: VecDeque::new(),
                total_bytes: 0,
            }),
            current_vus: AtomicU32::new(0),
        }
    }

    /// Record one completed request. O(1) amortised under a single coarse
    /// lock; overflow of either bounded collection drops the oldest entry
    /// silently (§7 "Aggregator overflow").
    pub fn record(&self, outcome: &ExecutionOutcome) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");

        inner.total += 1;
        if outcome.is_success {
            inner.succeeded += 1;
        } else {
            inner.failed += 1;
            if !outcome.validation.is_success() {
                inner.validation_failures += 1;
            }
        }

        inner.all_samples.push_back(outcome.response_time_ms);
        if inner.all_samples.len() > MAX_ALL_SAMPLES {
            inner.all_samples.pop_front();
        }
        inner.total_bytes += outcome.response_bytes;

        inner
            .per_step_samples
            .entry(outcome.step_name.clone())
            .or_default()
            .push(outcome.response_time_ms);

        inner.recent_results.push_back(RecordedResult {
            step_name: outcome.step_name.clone(),
            status_code: outcome.status_code,
            response_time_ms: outcome.response_time_ms,
            is_success: outcome.is_success,
            captured_at: outcome.captured_at,
        });
        if inner.recent_results.len() > MAX_RECENT_RESULTS {
            inner.recent_results.pop_front();
        }

        let now = Instant::now();
        inner.tps_window.push_back(now);
        prune_tps_window(&mut inner.tps_window, now);
    }

    pub fn set_current_vus(&self, count: u32) {
        self.current_vus.store(count, Ordering::Relaxed);
    }

    pub fn current_vus(&self) -> u32 {
        self.current_vus.load(Ordering::Relaxed)
    }

    pub fn mark_ended(&self) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        inner.end = Some(Utc::now());
    }

    /// Percentile over current `all_samples`: sort ascending, take the
    /// element at `ceil(n*p/100) - 1`, clamped to `[0, n-1]`. Returns 0 for
    /// empty samples (§4.7).
    pub fn percentile(&self, p: f64) -> u64 {
        let inner = self.inner.lock().expect("metrics mutex poisoned");
        percentile_of(&inner.all_samples, p)
    }

    /// Count of results captured within the trailing 10 seconds, / 10 (§4.7).
    pub fn current_tps(&self) -> f64 {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        let now = Instant::now();
        prune_tps_window(&mut inner.tps_window, now);
        inner.tps_window.len() as f64 / ROLLING_TPS_WINDOW_SECS as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        let now = Instant::now();
        prune_tps_window(&mut inner.tps_window, now);
        MetricsSnapshot {
            start: inner.start,
            end: inner.end,
            total: inner.total,
            succeeded: inner.succeeded,
            failed: inner.failed,
            validation_failures: inner.validation_failures,
            all_samples: inner.all_samples.iter().copied().collect(),
            current_vus: self.current_vus(),
            current_tps: inner.tps_window.len() as f64 / ROLLING_TPS_WINDOW_SECS as f64,
            per_step_samples: inner.per_step_samples.clone(),
            recent_results: inner.recent_results.iter().cloned().collect(),
            total_bytes: inner.total_bytes,
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn prune_tps_window(window: &mut VecDeque<Instant>, now: Instant) {
    let cutoff = std::time::Duration::from_secs(ROLLING_TPS_WINDOW_SECS as u64);
    while let Some(front) = window.front() {
        if now.duration_since(*front) > cutoff {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn percentile_of(samples: &VecDeque<u64>, p: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let idx = ((p / 100.0) * sorted.len() as f64).ceil() as isize - 1;
    let idx = idx.clamp(0, sorted.len() as isize - 1) as usize;
    sorted[idx]
}
