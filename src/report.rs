use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use volume_metrics_types::MetricResult;

pub const REPORT_HEADER: [&str; 5] = ["Image", "NMI", "MSE", "Correlation Coefficient", "NCC"];
pub const REPORT_SUFFIX: &str = "+correlation-metrics.csv";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {0}")]
    Csv(#[from] csv::Error),
}

/// One CSV row; `None` cells are written empty.
#[derive(Serialize)]
struct ReportRow<'a> {
    image: &'a str,
    nmi: Option<f64>,
    mse: Option<f64>,
    correlation: Option<f64>,
    ncc: Option<f64>,
}

impl<'a> ReportRow<'a> {
    fn from_result(result: &'a MetricResult) -> Self {
        let values = result.outcome.values();
        Self {
            image: &result.image,
            nmi: values.map(|v| v.nmi),
            mse: values.map(|v| v.mse),
            correlation: values.map(|v| v.correlation),
            ncc: values.map(|v| v.ncc),
        }
    }
}

/// Encodes `results` as CSV with a fixed header, one row per result, in
/// the given order.
pub fn render_report(results: &[MetricResult]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(REPORT_HEADER)?;
    for result in results {
        writer.serialize(ReportRow::from_result(result))?;
    }
    writer
        .into_inner()
        .map_err(|err| ReportError::Csv(csv::Error::from(err.into_error())))
}

pub async fn write_report(results: &[MetricResult], path: &Path) -> Result<(), ReportError> {
    let encoded = render_report(results)?;
    tokio::fs::write(path, encoded)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
}
