//! Headless CLI entry point (§6, SPEC_FULL.md §10.5).

use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;
use loadstone_core::config::CliConfigDocument;
use loadstone_core::engine::{self, EngineConfig};
use loadstone_core::loaders::{
    CollectionLoader, JsonCollectionLoader, JsonColumnMappingLoader, RowLoader,
};
use loadstone_core::report::{ArtifactWriter, JsonFileArtifactWriter};
use loadstone_core::{collection::ColumnMapping, LoadstoneError};
use tracing::{error, info};

/// Data-driven HTTP load generator.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the run configuration document (§6).
    config: std::path::PathBuf,

    /// Skip the interactive confirmation prompt.
    #[arg(short = 'y', long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal error");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<(), LoadstoneError> {
    let doc_text = std::fs::read_to_string(&args.config)?;
    let doc: CliConfigDocument = serde_json::from_str(&doc_text)?;

    let collection = JsonCollectionLoader::new(&doc.postman_collection_path).load()?;
    let rows = loadstone_core::loaders::CsvRowLoader::new(&doc.csv_data_path).load()?;
    let mapping = match &doc.column_mapping_path {
        Some(path) => JsonColumnMappingLoader::new(path).load()?,
        None => ColumnMapping::default(),
    };
    let html_report_path = doc.output_settings.html_report_path.clone();
    let run_config = doc.into_run_config();

    let errors = run_config.validate();
    if !errors.is_empty() {
        return Err(LoadstoneError::Validation(errors.join("; ")));
    }

    if !args.yes && !confirm_start(&run_config)? {
        info!("aborted by operator");
        return Ok(());
    }

    let engine_config = EngineConfig {
        collection,
        mapping,
        rows,
        run_config: run_config.clone(),
        prelude: None,
    };

    info!(
        max_vus = run_config.max_vus,
        target_tps = run_config.target_tps,
        "starting run"
    );
    let handle = engine::run_test(engine_config).await?;

    let cancel_on_ctrl_c = handle.cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling run");
            cancel_on_ctrl_c.cancel();
        }
    });

    let total_ms = run_config.total_ms();
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_millis(total_ms)) => {}
        _ = handle.cancel_token.cancelled() => {}
    }
    handle.cancel_token.cancel();

    // give the drive loop's own drain grace period a moment to finish before
    // snapshotting; metrics reflect whatever landed by then either way.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let snapshot = handle.metrics.snapshot();
    let percentiles = (
        handle.metrics.percentile(50.0),
        handle.metrics.percentile(95.0),
        handle.metrics.percentile(99.0),
    );
    let report = loadstone_core::report::build_report(&snapshot, percentiles, &run_config);

    let writer = JsonFileArtifactWriter::new(&html_report_path);
    writer.write(&report)?;
    info!(path = %html_report_path, "report written");

    write_failure_logs(&handle.failure_logger, &html_report_path)?;

    match &report.verdict {
        loadstone_core::report::VerdictReport::Pass => info!("verdict: PASS"),
        loadstone_core::report::VerdictReport::Fail { reasons } => {
            info!(?reasons, "verdict: FAIL")
        }
    }

    Ok(())
}

fn confirm_start(run_config: &loadstone_core::config::RunConfig) -> Result<bool, LoadstoneError> {
    println!(
        "About to run {} VUs for {}ms against {} step(s). Continue? [y/N] ",
        run_config.max_vus,
        run_config.total_ms(),
        run_config.step_sequence.len()
    );
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Writes one append-only log file per endpoint beside the report artifact
/// (§6 "a directory of per-endpoint append-only failure logs beside it").
fn write_failure_logs(
    logger: &loadstone_core::failure_log::FailureLogger,
    report_path: &str,
) -> Result<(), LoadstoneError> {
    let report_path = std::path::Path::new(report_path);
    let dir = report_path
        .parent()
        .map(|p| p.join("failure-logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("failure-logs"));
    std::fs::create_dir_all(&dir)?;

    for endpoint in logger.endpoints() {
        let records = logger.records_for(&endpoint);
        let file_name = endpoint.replace('/', "_");
        let path = dir.join(format!("{file_name}.log"));
        let mut content = String::new();
        for record in &records {
            content.push_str(&record.to_line());
            content.push('\n');
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}
