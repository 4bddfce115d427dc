//! C8 Scheduler & VU Pool: the RampUp/Steady/RampDown/Drain phase state
//! machine (§4.8).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collection::{ColumnMapping, DataRow, RequestCollection, RequestTemplate};
use crate::config::RunConfig;
use crate::engine::virtual_user;
use crate::engine::EngineStatus;
use crate::error::LoadstoneError;
use crate::failure_log::FailureLogger;
use crate::http::client::HttpClient;
use crate::metrics::MetricsAggregator;

const DRAIN_GRACE: Duration = Duration::from_secs(10);
const CONTROL_TICK: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RampUp,
    Steady,
    RampDown,
    Drain,
}

/// The current phase and target active-VU count for `elapsed` into the run
/// (§4.8's state table).
pub fn phase_and_target(config: &RunConfig, elapsed: Duration) -> (Phase, u32) {
    let elapsed_ms = elapsed.as_millis() as u64;
    let ramp_up = config.ramp_up_ms;
    let steady_end = ramp_up + config.test_ms;
    let total = config.total_ms();

    if elapsed_ms <= ramp_up && ramp_up > 0 {
        let target = (config.max_vus as f64 * elapsed_ms as f64 / ramp_up as f64).floor() as u32;
        (Phase::RampUp, target.min(config.max_vus))
    } else if elapsed_ms <= steady_end {
        (Phase::Steady, config.max_vus)
    } else if elapsed_ms <= total && config.ramp_down_ms > 0 {
        let into_ramp_down = (elapsed_ms - steady_end) as f64;
        let fraction = 1.0 - into_ramp_down / config.ramp_down_ms as f64;
        let target = (config.max_vus as f64 * fraction).floor();
        (Phase::RampDown, target.max(0.0) as u32)
    } else {
        (Phase::Drain, 0)
    }
}

pub struct EngineHandle {
    pub cancel_token: CancellationToken,
    pub metrics: Arc<MetricsAggregator>,
    pub failure_logger: Arc<FailureLogger>,
}

pub struct EngineConfig {
    pub collection: RequestCollection,
    pub mapping: ColumnMapping,
    pub rows: Vec<DataRow>,
    pub run_config: RunConfig,
    pub prelude: Option<Vec<RequestTemplate>>,
}

/// Start executing a run asynchronously. Returns a handle immediately; the
/// scheduler and all virtual users run in a background task.
pub async fn run_test(config: EngineConfig) -> Result<EngineHandle, LoadstoneError> {
    let errors = config.run_config.validate();
    if !errors.is_empty() {
        return Err(LoadstoneError::Validation(errors.join("; ")));
    }

    let cancel_token = CancellationToken::new();
    let metrics = Arc::new(MetricsAggregator::new());
    let failure_logger = Arc::new(FailureLogger::new());

    let handle = EngineHandle {
        cancel_token: cancel_token.clone(),
        metrics: metrics.clone(),
        failure_logger: failure_logger.clone(),
    };

    let client = Arc::new(
        HttpClient::builder()
            .timeout(Duration::from_millis(config.run_config.request_timeout_ms))
            .build()?,
    );

    let collection = Arc::new(config.collection);
    let mapping = Arc::new(config.mapping);
    let rows = Arc::new(config.rows);
    let run_config = Arc::new(config.run_config);
    let prelude = config.prelude.map(Arc::new);

    tokio::spawn(drive(
        collection,
        mapping,
        rows,
        run_config,
        prelude,
        client,
        metrics,
        failure_logger,
        cancel_token,
    ));

    Ok(handle)
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    collection: Arc<RequestCollection>,
    mapping: Arc<ColumnMapping>,
    rows: Arc<Vec<DataRow>>,
    run_config: Arc<RunConfig>,
    prelude: Option<Arc<Vec<RequestTemplate>>>,
    client: Arc<HttpClient>,
    metrics: Arc<MetricsAggregator>,
    failure_logger: Arc<FailureLogger>,
    cancel_token: CancellationToken,
) {
    let start = Instant::now();
    let total = Duration::from_millis(run_config.total_ms());
    let deadline = start + total;
    let active = Arc::new(AtomicU32::new(0));
    let mut vus: JoinSet<()> = JoinSet::new();

    let mut ticker = tokio::time::interval(CONTROL_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel_token.cancelled() => {
                info!("scheduler cancelled, stopping VU spawning");
                break;
            }
        }

        let elapsed = start.elapsed();
        let (phase, target) = phase_and_target(&run_config, elapsed);
        let current = active.load(Ordering::Relaxed);
        metrics.set_current_vus(current);

        if matches!(phase, Phase::Drain) {
            break;
        }

        if current < target {
            for _ in current..target {
                active.fetch_add(1, Ordering::Relaxed);
                let active = Arc::clone(&active);
                let collection = Arc::clone(&collection);
                let mapping = Arc::clone(&mapping);
                let rows = Arc::clone(&rows);
                let run_config = Arc::clone(&run_config);
                let prelude = prelude.clone();
                let client = Arc::clone(&client);
                let metrics = Arc::clone(&metrics);
                let failure_logger = Arc::clone(&failure_logger);
                let cancel = cancel_token.clone();

                vus.spawn(async move {
                    virtual_user::run(
                        collection,
                        mapping,
                        rows,
                        run_config,
                        prelude,
                        client,
                        metrics,
                        failure_logger,
                        cancel,
                        deadline,
                    )
                    .await;
                    active.fetch_sub(1, Ordering::Relaxed);
                });
            }
        }
    }

    cancel_token.cancel();
    metrics.set_current_vus(active.load(Ordering::Relaxed));

    let drain_result = tokio::time::timeout(DRAIN_GRACE, async {
        while vus.join_next().await.is_some() {}
    })
    .await;

    if drain_result.is_err() {
        warn!("drain grace period elapsed with virtual users still in flight");
    }

    metrics.set_current_vus(0);
    metrics.mark_ended();
}
