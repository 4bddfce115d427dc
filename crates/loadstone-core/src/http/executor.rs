//! C5: sends a [`ResolvedRequest`] through the shared [`HttpClient`], times
//! it, classifies the outcome, and runs it past the [`crate::validator`]
//! (§4.5).

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, warn};

use crate::http::client::HttpClient;
use crate::request_builder::ResolvedRequest;
use crate::validator::{self, ResponseContext, ValidationOutcome};
use crate::config::SuccessCriteria;

/// Mirrors §3's `ExecutionResult`, immutable once recorded.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub step_name: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub response_bytes: u64,
    pub is_success: bool,
    pub validation: ValidationOutcome,
    pub error_message: Option<String>,
    pub captured_at: chrono::DateTime<Utc>,
    pub body: String,
}

/// Send `request`, classify the result per §4.5, and validate against
/// `criteria`. Never returns `Err` — every outcome, including transport
/// failure and timeout, is represented as data (§7: only pre-start errors
/// are fatal).
pub async fn execute(
    client: &HttpClient,
    request: &ResolvedRequest,
    step_name: &str,
    criteria: &SuccessCriteria,
    timeout: Duration,
) -> ExecutionOutcome {
    let start = Instant::now();
    let method = request.method.to_string();

    let send_result = tokio::time::timeout(timeout, client.send(request)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let captured_at = Utc::now();

    match send_result {
        Err(_elapsed) => {
            warn!(step = step_name, timeout_ms = timeout.as_millis() as u64, "request timed out");
            ExecutionOutcome {
                step_name: step_name.to_string(),
                method,
                url: request.url.clone(),
                status_code: 408,
                response_time_ms: elapsed_ms.max(timeout.as_millis() as u64),
                response_bytes: 0,
                is_success: false,
                validation: ValidationOutcome::default(),
                error_message: Some("request timed out".to_string()),
                captured_at,
                body: String::new(),
            }
        }
        Ok(Err(transport_err)) => {
            error!(step = step_name, error = %transport_err, "transport failure");
            ExecutionOutcome {
                step_name: step_name.to_string(),
                method,
                url: request.url.clone(),
                status_code: 0,
                response_time_ms: elapsed_ms,
                response_bytes: 0,
                is_success: false,
                validation: ValidationOutcome::default(),
                error_message: Some(transport_err.to_string()),
                captured_at,
                body: String::new(),
            }
        }
        Ok(Ok(raw)) => {
            let ctx = ResponseContext {
                status_code: raw.status,
                headers: raw.headers,
                body: raw.body.clone(),
                elapsed_ms,
            };
            let validation = validator::evaluate(criteria, &ctx);
            let is_success = (200..300).contains(&raw.status) && validation.is_success();
            ExecutionOutcome {
                step_name: step_name.to_string(),
                method,
                url: request.url.clone(),
                status_code: raw.status,
                response_time_ms: elapsed_ms,
                response_bytes: raw.size_bytes,
                is_success,
                validation,
                error_message: None,
                captured_at,
                body: raw.body,
            }
        }
    }
}
