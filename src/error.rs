use thiserror::Error;

use crate::batch::BatchError;
use crate::report::ReportError;
use crate::settings::ConfigError;

/// Fatal errors of a run; each one ends the process with a non-zero status.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Report(#[from] ReportError),
}
