//! Similarity metrics between a template volume and a candidate volume.
//!
//! Everything here is pure and stateless; reductions fan out over rayon.

pub mod histogram;
pub mod information;
pub mod stats;

pub use histogram::{BINS, Histogram, JointHistogram, RANGE_MAX, RANGE_MIN, bin_index};
pub use information::{EntropyTerms, entropy, joint_entropy, normalized_mutual_information};
pub use stats::{
    CenteredSums, mean_squared_error, normalized_cross_correlation, pearson_correlation,
};

use volume_metrics_types::{MetricOutcome, MetricValues, Volume};

/// Computes every metric of `candidate` against `template`.
///
/// Volumes of different shapes are not an error: the outcome records both
/// shapes and carries no values.
pub fn calc_metrics(template: &Volume, candidate: &Volume) -> MetricOutcome {
    if template.shape() != candidate.shape() {
        return MetricOutcome::ShapeMismatch {
            template: template.shape().clone(),
            candidate: candidate.shape().clone(),
        };
    }
    MetricOutcome::Computed(compute_values(template.data(), candidate.data()))
}

/// Metric values for two flattened arrays of equal length.
pub fn compute_values(template: &[f64], candidate: &[f64]) -> MetricValues {
    let (terms, (mse, centered)) = rayon::join(
        || EntropyTerms::of(template, candidate),
        || {
            rayon::join(
                || mean_squared_error(template, candidate),
                || CenteredSums::of(template, candidate),
            )
        },
    );
    MetricValues {
        nmi: terms.normalized_mutual_information(),
        mse,
        correlation: centered.pearson(),
        ncc: centered.ncc(),
    }
}
