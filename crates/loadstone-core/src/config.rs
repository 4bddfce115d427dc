//! Run configuration (§3 SuccessCriteria / RunConfig, §6 external interface).
//!
//! Parsing of the surrounding config *file* format is an ambient concern
//! (§10.3 of SPEC_FULL.md) — this module defines the shapes and decodes them
//! from the JSON document the operator supplies; it does not resolve the
//! `PostmanCollectionPath`/`CsvDataPath` locators themselves, that's
//! [`crate::loaders`]'s job.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRule {
    Present,
    Equals,
    Contains,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderCheck {
    pub name: String,
    pub rule: HeaderRule,
    #[serde(default)]
    pub expected: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonPathRule {
    Present,
    IsNumber,
    IsString,
    Equals,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonPathCheck {
    pub path: String,
    pub rule: JsonPathRule,
    #[serde(default)]
    pub expected: Option<String>,
}

/// §3 SuccessCriteria. Every field is optional; only present fields are
/// evaluated by [`crate::validator`], and all present fields must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default)]
    pub accepted_status_codes: Option<HashSet<u16>>,
    #[serde(default)]
    pub max_response_time_ms: Option<u64>,
    #[serde(default)]
    pub body_regex: Option<String>,
    #[serde(default)]
    pub body_must_contain: Option<Vec<String>>,
    #[serde(default)]
    pub header_checks: Option<Vec<HeaderCheck>>,
    #[serde(default)]
    pub json_path_checks: Option<Vec<JsonPathCheck>>,
    #[serde(default)]
    pub min_body_bytes: Option<u64>,
    #[serde(default)]
    pub max_body_bytes: Option<u64>,
}

/// One entry in `RunConfig.step_sequence` (§3, §6 `IterationSettings[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepConfig {
    pub step_name: String,
    #[serde(default, rename = "IntervalMs")]
    pub inter_step_delay_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, rename = "SuccessCriteria")]
    pub criteria: Option<SuccessCriteria>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_rt_ms: u64,
    pub max_error_pct: f64,
    pub min_tps: f64,
}

/// §3 RunConfig — the target load shape and the per-request success predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub test_ms: u64,
    pub ramp_up_ms: u64,
    pub ramp_down_ms: u64,
    pub target_tps: f64,
    pub max_vus: u32,
    pub request_timeout_ms: u64,
    pub step_sequence: Vec<StepConfig>,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub global_criteria: SuccessCriteria,
}

impl RunConfig {
    /// Total wall-clock run duration before the drain grace period (§5).
    pub fn total_ms(&self) -> u64 {
        self.ramp_up_ms + self.test_ms + self.ramp_down_ms
    }

    /// Resolve the effective criteria for a step: its own, or the run's
    /// global default (§4.1 of spec.md's criteria precedence note in §3).
    pub fn criteria_for(&self, step: &StepConfig) -> SuccessCriteria {
        step.criteria.clone().unwrap_or_else(|| self.global_criteria.clone())
    }

    /// Pre-start configuration validation (§7 "Configuration invalid").
    /// Returns every violation found; an empty vec means the config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_vus == 0 {
            errors.push("max_vus must be positive".to_string());
        }
        if self.target_tps <= 0.0 {
            errors.push("target_tps must be positive".to_string());
        }
        if self.request_timeout_ms == 0 {
            errors.push("request_timeout_ms must be positive".to_string());
        }
        if self.test_ms == 0 && self.ramp_up_ms == 0 && self.ramp_down_ms == 0 {
            errors.push("at least one of ramp_up_ms/test_ms/ramp_down_ms must be positive".to_string());
        }
        if self.step_sequence.is_empty() {
            errors.push("step_sequence must not be empty".to_string());
        }
        if self.step_sequence.iter().all(|s| !s.enabled) && !self.step_sequence.is_empty() {
            errors.push("at least one step must be enabled".to_string());
        }
        errors
    }
}

/// The final pass/fail verdict computed from a snapshot against thresholds
/// (§8 scenario 6). Not derived from individual failures (§7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail { reasons: Vec<String> },
}

pub fn compute_verdict(
    thresholds: &Thresholds,
    p95_ms: u64,
    error_pct: f64,
    current_tps: f64,
) -> Verdict {
    let mut reasons = Vec::new();
    if p95_ms > thresholds.max_rt_ms {
        reasons.push("max response time exceeded".to_string());
    }
    if error_pct > thresholds.max_error_pct {
        reasons.push("max error rate exceeded".to_string());
    }
    if current_tps < thresholds.min_tps {
        reasons.push("minimum TPS not reached".to_string());
    }
    if reasons.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail { reasons }
    }
}

// ---------------------------------------------------------------------------
// External configuration document (§6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutputSettings {
    pub html_report_path: String,
    #[serde(default = "default_console_interval_ms")]
    pub console_update_interval_ms: u64,
}

fn default_console_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionSettings {
    pub test_duration_ms: u64,
    pub ramp_up_time_ms: u64,
    pub ramp_down_time_ms: u64,
    pub iteration_settings: Vec<StepConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PerformanceSettings {
    pub target_transactions_per_second: f64,
    pub max_concurrent_users: u32,
    pub request_timeout_ms: u64,
    /// Reserved; the current core performs no automatic retry (§6, §9 Open
    /// Questions — documented as unused by decision, not guessed at).
    #[serde(default)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawThresholds {
    pub max_response_time_ms: u64,
    pub max_error_rate_percent: f64,
    pub min_transactions_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawGlobalSuccessCriteria {
    #[serde(default)]
    pub default_http_status_codes: Option<HashSet<u16>>,
    #[serde(default)]
    pub default_response_time_max_ms: Option<u64>,
    #[serde(default)]
    pub ignore_ssl_errors: bool,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default)]
    pub max_redirects: u32,
}

/// The on-disk configuration document shape named in §6. Parsing it is an
/// ambient concern; this struct only decodes the JSON, `into_run_config`
/// assembles the internal [`RunConfig`] the engine actually drives on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CliConfigDocument {
    pub postman_collection_path: String,
    pub csv_data_path: String,
    #[serde(default)]
    pub column_mapping_path: Option<String>,
    pub output_settings: OutputSettings,
    pub execution_settings: ExecutionSettings,
    pub performance_settings: PerformanceSettings,
    pub thresholds: RawThresholds,
    #[serde(default)]
    pub global_success_criteria: Option<RawGlobalSuccessCriteria>,
}

impl CliConfigDocument {
    /// Build the internal [`RunConfig`] the engine drives on. Global success
    /// criteria become `global_criteria.accepted_status_codes` /
    /// `max_response_time_ms`. `ignore_ssl_errors`/`follow_redirects`/
    /// `max_redirects` are decoded but currently unused — the shared
    /// `HttpClient` always verifies certificates and follows reqwest's
    /// default redirect policy.
    pub fn into_run_config(self) -> RunConfig {
        let mut global_criteria = SuccessCriteria::default();
        if let Some(g) = &self.global_success_criteria {
            global_criteria.accepted_status_codes = g.default_http_status_codes.clone();
            global_criteria.max_response_time_ms = g.default_response_time_max_ms;
        }

        RunConfig {
            test_ms: self.execution_settings.test_duration_ms,
            ramp_up_ms: self.execution_settings.ramp_up_time_ms,
            ramp_down_ms: self.execution_settings.ramp_down_time_ms,
            target_tps: self.performance_settings.target_transactions_per_second,
            max_vus: self.performance_settings.max_concurrent_users,
            request_timeout_ms: self.performance_settings.request_timeout_ms,
            step_sequence: self.execution_settings.iteration_settings,
            thresholds: Thresholds {
                max_rt_ms: self.thresholds.max_response_time_ms,
                max_error_pct: self.thresholds.max_error_rate_percent,
                min_tps: self.thresholds.min_transactions_per_second,
            },
            global_criteria,
        }
    }
}
