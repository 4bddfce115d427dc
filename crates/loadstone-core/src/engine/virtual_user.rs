//! Per-VU iteration loop (§4.8 "Per-VU loop").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::collection::{ColumnMapping, DataRow, RequestCollection};
use crate::config::RunConfig;
use crate::failure_log::FailureLogger;
use crate::http::client::HttpClient;
use crate::metrics::MetricsAggregator;
use crate::request_builder::build_request;
use crate::script::{self, ScriptContext};
use crate::sequence::{self, AuthPrelude};
use crate::variables::VariableStore;

/// Sleep for `duration`, returning early if `cancel` fires. Every suspension
/// point in the VU loop must observe cancellation (§5).
async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel.cancelled() => {}
    }
}

/// Run one virtual user until `cancel` fires or `deadline` has passed at an
/// iteration boundary. `prelude` is the optional auth prelude shared across
/// all VUs in the run.
pub async fn run(
    collection: Arc<RequestCollection>,
    mapping: Arc<ColumnMapping>,
    rows: Arc<Vec<DataRow>>,
    run_config: Arc<RunConfig>,
    prelude: Option<Arc<Vec<crate::collection::RequestTemplate>>>,
    client: Arc<HttpClient>,
    metrics: Arc<MetricsAggregator>,
    failure_logger: Arc<FailureLogger>,
    cancel: CancellationToken,
    deadline: tokio::time::Instant,
) {
    let mut rng = StdRng::from_entropy();
    let mut store = VariableStore::new();
    let timeout = Duration::from_millis(run_config.request_timeout_ms);

    loop {
        if cancel.is_cancelled() || tokio::time::Instant::now() >= deadline {
            break;
        }

        // Re-pick a fresh random row every iteration (§4.8 step 3, §9
        // "Scheduler freshness bug" — do not pin one row per VU).
        let row = pick_row(&rows, &mut rng);
        let fresh = VariableStore::from_row(&mapping, &[], row);
        store.merge(&fresh);

        for step in &run_config.step_sequence {
            if cancel.is_cancelled() {
                break;
            }
            if !step.enabled {
                continue;
            }
            let Some(template) = collection.find(&step.step_name) else {
                continue;
            };

            let prelude_ref = prelude.as_deref().map(|steps| AuthPrelude { steps });
            let prelude_outcomes = sequence::ensure_prerequisites(
                template,
                prelude_ref.as_ref(),
                &client,
                &mut store,
                timeout,
            )
            .await;
            for outcome in &prelude_outcomes {
                metrics.record(outcome);
                failure_logger.record_if_failed(outcome);
            }

            let mut pre_ctx = ScriptContext {
                temp: HashMap::new(),
                store: &mut store,
                response_body: "",
                request_body: "",
            };
            script::run(&template.pre_script, &mut pre_ctx);

            let resolved = build_request(template, &store);
            let criteria = run_config.criteria_for(step);
            let outcome = crate::http::executor::execute(
                &client,
                &resolved,
                &step.step_name,
                &criteria,
                timeout,
            )
            .await;

            metrics.record(&outcome);
            failure_logger.record_if_failed(&outcome);

            let request_body_text = match &resolved.body {
                Some(crate::request_builder::ResolvedBody::Raw { bytes, .. }) => {
                    String::from_utf8_lossy(bytes).into_owned()
                }
                _ => String::new(),
            };
            let mut ctx = ScriptContext {
                temp: HashMap::new(),
                store: &mut store,
                response_body: &outcome.body,
                request_body: &request_body_text,
            };
            script::run(&template.post_script, &mut ctx);

            cancellable_sleep(Duration::from_millis(step.inter_step_delay_ms), &cancel).await;
        }

        let jitter_ms: u64 = rng.gen_range(0..1_000);
        cancellable_sleep(Duration::from_millis(jitter_ms), &cancel).await;
    }
}

fn pick_row<'a>(rows: &'a [DataRow], rng: &mut StdRng) -> &'a DataRow {
    static EMPTY: once_cell::sync::Lazy<DataRow> = once_cell::sync::Lazy::new(DataRow::new);
    if rows.is_empty() {
        return &EMPTY;
    }
    let idx = rng.gen_range(0..rows.len());
    &rows[idx]
}
