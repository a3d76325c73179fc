pub mod batch;
pub mod cli;
pub mod error;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod settings;

use std::path::PathBuf;

use tracing::info;

pub use batch::{
    BatchConfig, BatchError, BatchOutcome, BatchRunner, FailurePolicy, FileFailure, ReportOrder,
    discover_files,
};
pub use error::AppError;
pub use report::{ReportError, render_report, write_report};
pub use settings::{ConfigError, resolve_settings};

/// What a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub report: PathBuf,
    pub outcome: BatchOutcome,
}

/// Runs the batch described by `config` and writes its report.
///
/// Nothing is written when the batch itself fails.
pub async fn execute(config: BatchConfig, show_progress: bool) -> Result<RunSummary, AppError> {
    let report = config.report_path();
    let runner = BatchRunner::new(config).with_progress(show_progress);
    let outcome = runner.run().await?;
    write_report(&outcome.results, &report).await?;
    info!(
        report = %report.display(),
        rows = outcome.results.len(),
        shape_mismatches = outcome.shape_mismatches(),
        skipped = outcome.failures.len(),
        "report written"
    );
    Ok(RunSummary { report, outcome })
}
