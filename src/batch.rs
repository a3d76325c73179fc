use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use clap::ValueEnum;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use volume_metrics_engine::calc_metrics;
use volume_metrics_types::{MetricOutcome, MetricResult, Volume, VolumeError};

use crate::progress::BatchProgress;
use crate::report::REPORT_SUFFIX;

/// What to do when a volume in the directory cannot be read.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FailurePolicy {
    /// Log the file, leave it out of the report, keep going.
    #[default]
    Skip,
    /// Abort the batch; no report is written.
    FailFast,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Skip => "skip",
            FailurePolicy::FailFast => "fail-fast",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(FailurePolicy::Skip),
            "fail-fast" | "fail_fast" | "abort" => Ok(FailurePolicy::FailFast),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ReportOrder {
    /// Order in which comparisons finished.
    #[default]
    Arrival,
    /// Sorted by file name.
    Name,
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub template: PathBuf,
    pub directory: PathBuf,
    pub parallel_limit: NonZeroUsize,
    pub extension: String,
    pub failure_policy: FailurePolicy,
    pub report_order: ReportOrder,
    pub output: Option<PathBuf>,
}

impl BatchConfig {
    pub fn new(template: PathBuf, directory: PathBuf, parallel_limit: NonZeroUsize) -> Self {
        Self {
            template,
            directory,
            parallel_limit,
            extension: volume_metrics_nrrd::EXTENSION.to_string(),
            failure_policy: FailurePolicy::default(),
            report_order: ReportOrder::default(),
            output: None,
        }
    }

    /// `<directory>/<template name up to the first dot>+correlation-metrics.csv`
    /// unless an explicit output path was configured.
    pub fn report_path(&self) -> PathBuf {
        if let Some(output) = self.output.as_ref() {
            return output.clone();
        }
        let file_name = self
            .template
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file_name.split('.').next().unwrap_or_default();
        self.directory.join(format!("{stem}{REPORT_SUFFIX}"))
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub image: String,
    pub path: PathBuf,
    pub error: VolumeError,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<MetricResult>,
    pub failures: Vec<FileFailure>,
}

impl BatchOutcome {
    pub fn shape_mismatches(&self) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome.values().is_none())
            .count()
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to load template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: VolumeError,
    },

    #[error("failed to scan {}: {source}", path.display())]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {image}: {source}")]
    Read {
        image: String,
        #[source]
        source: VolumeError,
    },

    #[error("batch task failed: {message}")]
    Task { message: String },
}

enum TaskError {
    Read(FileFailure),
    Stage(String),
}

pub struct BatchRunner {
    config: BatchConfig,
    show_progress: bool,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Loads the template, compares every discovered volume against it and
    /// returns the collected results once every task has finished.
    pub async fn run(&self) -> Result<BatchOutcome, BatchError> {
        let config = &self.config;
        let template_path = config.template.clone();
        let (template, _) = load_volume(template_path.clone(), None)
            .await
            .map_err(|err| match err {
                TaskError::Read(failure) => BatchError::Template {
                    path: template_path.clone(),
                    source: failure.error,
                },
                TaskError::Stage(message) => BatchError::Task { message },
            })?;
        info!(
            template = %template_path.display(),
            shape = %template.shape(),
            "loaded template"
        );
        let template = Arc::new(template);

        let files = discover_files(&config.directory, &config.extension).await?;
        info!(
            directory = %config.directory.display(),
            volumes = files.len(),
            parallel = config.parallel_limit.get(),
            "starting batch"
        );

        let progress = if self.show_progress {
            BatchProgress::new(files.len() as u64)
        } else {
            BatchProgress::hidden()
        };

        let limit = config.parallel_limit.get();
        let load_permits = Arc::new(Semaphore::new(limit));
        let compute_permits = Arc::new(Semaphore::new(limit));
        let (tx, rx) = mpsc::channel::<MetricResult>(limit.saturating_mul(2));
        let collector = tokio::spawn(collect_results(rx));

        let mut tasks = JoinSet::new();
        for path in files {
            tasks.spawn(process_file(
                path,
                Arc::clone(&template),
                Arc::clone(&load_permits),
                Arc::clone(&compute_permits),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|err| TaskError::Stage(err.to_string()));
            match outcome.and_then(|inner| inner) {
                Ok(image) => progress.advance(&image),
                Err(TaskError::Read(failure)) => match config.failure_policy {
                    FailurePolicy::Skip => {
                        warn!(
                            image = %failure.image,
                            error = %failure.error,
                            "skipping unreadable volume"
                        );
                        progress.advance(&failure.image);
                        failures.push(failure);
                    }
                    FailurePolicy::FailFast => {
                        tasks.abort_all();
                        collector.abort();
                        progress.abandon(&format!("failed on {}", failure.image));
                        return Err(BatchError::Read {
                            image: failure.image,
                            source: failure.error,
                        });
                    }
                },
                Err(TaskError::Stage(message)) => {
                    tasks.abort_all();
                    collector.abort();
                    progress.abandon("batch task failed");
                    return Err(BatchError::Task { message });
                }
            }
        }

        let mut results = collector.await.map_err(|err| BatchError::Task {
            message: err.to_string(),
        })?;
        if config.report_order == ReportOrder::Name {
            results.sort_by(|a, b| a.image.cmp(&b.image));
        }
        progress.finish(results.len(), failures.len());

        Ok(BatchOutcome { results, failures })
    }
}

/// Regular files in `directory` whose name ends with `.<extension>`, sorted by
/// name.
pub async fn discover_files(directory: &Path, extension: &str) -> Result<Vec<PathBuf>, BatchError> {
    let discover_err = |source| BatchError::Discover {
        path: directory.to_path_buf(),
        source,
    };
    let suffix = format!(".{extension}");
    let mut entries = tokio::fs::read_dir(directory).await.map_err(discover_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discover_err)? {
        let path = entry.path();
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(&suffix));
        if !matches {
            continue;
        }
        // Follows symlinks so linked volumes are picked up too.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => {}
            Err(err) => warn!(path = %path.display(), error = %err, "cannot stat entry"),
        }
    }
    files.sort();
    Ok(files)
}

async fn process_file(
    path: PathBuf,
    template: Arc<Volume>,
    load_permits: Arc<Semaphore>,
    compute_permits: Arc<Semaphore>,
    results: mpsc::Sender<MetricResult>,
) -> Result<String, TaskError> {
    let image = file_label(&path);
    let started = Instant::now();

    let permit = load_permits
        .acquire_owned()
        .await
        .map_err(|err| TaskError::Stage(err.to_string()))?;
    let (volume, load_permit) = load_volume(path.clone(), Some(permit)).await?;
    let loaded_in = started.elapsed();

    // The load permit is held until compute capacity frees up, so loaded
    // volumes waiting for the compute stage stay bounded.
    let permit = compute_permits
        .acquire_owned()
        .await
        .map_err(|err| TaskError::Stage(err.to_string()))?;
    drop(load_permit);
    let outcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        calc_metrics(&template, &volume)
    })
    .await
    .map_err(|err| TaskError::Stage(err.to_string()))?;

    if let Some(message) = outcome.error_message() {
        warn!(image = %image, "{message}");
    }
    debug!(
        image = %image,
        load = ?loaded_in,
        total = ?started.elapsed(),
        computed = matches!(outcome, MetricOutcome::Computed(_)),
        "compared volume"
    );

    results
        .send(MetricResult::new(image.clone(), outcome))
        .await
        .map_err(|_| TaskError::Stage("result collector stopped".to_string()))?;
    Ok(image)
}

/// Reads a volume on the blocking pool, holding `permit` until the read is
/// done even if the awaiting task is aborted. The permit is handed back with
/// the volume.
async fn load_volume(
    path: PathBuf,
    permit: Option<OwnedSemaphorePermit>,
) -> Result<(Volume, Option<OwnedSemaphorePermit>), TaskError> {
    let image = file_label(&path);
    let (loaded, permit) = tokio::task::spawn_blocking({
        let path = path.clone();
        move || (volume_metrics_nrrd::load(&path), permit)
    })
    .await
    .map_err(|err| TaskError::Stage(err.to_string()))?;
    match loaded {
        Ok(volume) => Ok((volume, permit)),
        Err(error) => Err(TaskError::Read(FileFailure { image, path, error })),
    }
}

/// Single owner of the result collection; appends in arrival order.
async fn collect_results(mut rx: mpsc::Receiver<MetricResult>) -> Vec<MetricResult> {
    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    results
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
