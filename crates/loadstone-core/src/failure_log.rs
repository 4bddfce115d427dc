//! C10 Failure Logger: appends a structured record per failed result,
//! grouped by logical endpoint, one append-only log per endpoint (§4.9).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::http::executor::ExecutionOutcome;

/// One structured line written to a per-endpoint failure log.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub endpoint_key: String,
    pub step_name: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub reasons: Vec<String>,
    pub error_message: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl FailureRecord {
    /// One tab-separated line, the on-disk format an `ArtifactWriter` (or a
    /// direct file sink) appends verbatim.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{} {}\t{}\t{}ms\t{}\t{}",
            self.captured_at.to_rfc3339(),
            self.step_name,
            self.method,
            self.url,
            self.status_code,
            self.response_time_ms,
            self.reasons.join("; "),
            self.error_message.as_deref().unwrap_or(""),
        )
    }
}

/// Derive the logical endpoint key: the step name if non-empty, else the
/// first three path segments of the URL (§4.9).
pub fn endpoint_key_for(step_name: &str, url: &str) -> String {
    if !step_name.is_empty() {
        return step_name.to_string();
    }
    let path = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or("");
    path.split('/').filter(|s| !s.is_empty()).take(3).collect::<Vec<_>>().join("/")
}

/// Groups failure records by endpoint key, serialising concurrent appends
/// with a lock per endpoint (§5 "the Failure Logger file handles").
pub struct FailureLogger {
    logs: Mutex<HashMap<String, Vec<FailureRecord>>>,
}

impl FailureLogger {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Record `outcome` if it was not successful; a no-op otherwise.
    pub fn record_if_failed(&self, outcome: &ExecutionOutcome) {
        if outcome.is_success {
            return;
        }
        let endpoint_key = endpoint_key_for(&outcome.step_name, &outcome.url);
        let record = FailureRecord {
            endpoint_key: endpoint_key.clone(),
            step_name: outcome.step_name.clone(),
            method: outcome.method.clone(),
            url: outcome.url.clone(),
            status_code: outcome.status_code,
            response_time_ms: outcome.response_time_ms,
            reasons: outcome.validation.failures.clone(),
            error_message: outcome.error_message.clone(),
            captured_at: outcome.captured_at,
        };
        let mut logs = self.logs.lock().expect("failure logger mutex poisoned");
        logs.entry(endpoint_key).or_default().push(record);
    }

    pub fn endpoints(&self) -> Vec<String> {
        let logs = self.logs.lock().expect("failure logger mutex poisoned");
        logs.keys().cloned().collect()
    }

    pub fn records_for(&self, endpoint_key: &str) -> Vec<FailureRecord> {
        let logs = self.logs.lock().expect("failure logger mutex poisoned");
        logs.get(endpoint_key).cloned().unwrap_or_default()
    }
}

impl Default for FailureLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationOutcome;

    fn failing_outcome(step: &str, url: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            step_name: step.to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            status_code: 500,
            response_time_ms: 20,
            response_bytes: 0,
            is_success: false,
            validation: ValidationOutcome {
                failures: vec!["status not accepted".to_string()],
            },
            error_message: None,
            captured_at: Utc::now(),
            body: String::new(),
        }
    }

    fn passing_outcome(step: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            step_name: step.to_string(),
            method: "GET".to_string(),
            url: "http://x/y".to_string(),
            status_code: 200,
            response_time_ms: 5,
            response_bytes: 0,
            is_success: true,
            validation: ValidationOutcome::default(),
            error_message: None,
            captured_at: Utc::now(),
            body: String::new(),
        }
    }

    #[test]
    fn endpoint_key_prefers_step_name() {
        assert_eq!(endpoint_key_for("login", "http://x/a/b/c/d"), "login");
    }

    #[test]
    fn endpoint_key_falls_back_to_first_three_path_segments() {
        assert_eq!(
            endpoint_key_for("", "https://api.example.com/v1/users/42/profile"),
            "v1/users/42"
        );
    }

    #[test]
    fn successful_outcome_is_not_recorded() {
        let logger = FailureLogger::new();
        logger.record_if_failed(&passing_outcome("ping"));
        assert!(logger.endpoints().is_empty());
    }

    #[test]
    fn failed_outcome_is_grouped_by_endpoint() {
        let logger = FailureLogger::new();
        logger.record_if_failed(&failing_outcome("login", "http://x/auth"));
        logger.record_if_failed(&failing_outcome("login", "http://x/auth"));
        logger.record_if_failed(&failing_outcome("checkout", "http://x/cart"));

        assert_eq!(logger.records_for("login").len(), 2);
        assert_eq!(logger.records_for("checkout").len(), 1);
    }

    #[test]
    fn failure_record_line_contains_key_fields() {
        let logger = FailureLogger::new();
        logger.record_if_failed(&failing_outcome("login", "http://x/auth"));
        let records = logger.records_for("login");
        let line = records[0].to_line();
        assert!(line.contains("login"));
        assert!(line.contains("500"));
        assert!(line.contains("status not accepted"));
    }

    #[test]
    fn unknown_endpoint_returns_empty_vec() {
        let logger = FailureLogger::new();
        assert!(logger.records_for("nothing").is_empty());
    }
}
