use crate::histogram::{Histogram, JointHistogram};

/// Shannon entropy (natural log) of `counts` normalized by `total`.
///
/// `total` is the element count of the volume, not the number of binned
/// samples, so out-of-range intensities lower the probability mass.
pub fn entropy(counts: &[u64], total: usize) -> f64 {
    let total = total as f64;
    -counts
        .iter()
        .map(|&count| count as f64 / total)
        .filter(|&p| p > 0.0)
        .map(|p| p * p.ln())
        .sum::<f64>()
}

pub fn joint_entropy(joint: &JointHistogram, total: usize) -> f64 {
    entropy(joint.counts(), total)
}

/// Marginal and joint entropies of a volume pair.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EntropyTerms {
    pub first: f64,
    pub second: f64,
    pub joint: f64,
}

impl EntropyTerms {
    pub fn of(first: &[f64], second: &[f64]) -> Self {
        let total = first.len();
        let (marginals, joint) = rayon::join(
            || {
                rayon::join(
                    || Histogram::of(first),
                    || Histogram::of(second),
                )
            },
            || JointHistogram::of(first, second),
        );
        Self {
            first: entropy(marginals.0.counts(), total),
            second: entropy(marginals.1.counts(), total),
            joint: joint_entropy(&joint, total),
        }
    }

    pub fn mutual_information(&self) -> f64 {
        self.first + self.second - self.joint
    }

    /// `2·MI / (H1 + H2)`. When both marginals are empty (constant or fully
    /// out-of-range inputs) the quotient is `0/0` and the result is NaN.
    pub fn normalized_mutual_information(&self) -> f64 {
        2.0 * self.mutual_information() / (self.first + self.second)
    }
}

pub fn normalized_mutual_information(first: &[f64], second: &[f64]) -> f64 {
    EntropyTerms::of(first, second).normalized_mutual_information()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_distribution_entropy() {
        let counts = [5u64, 5, 5, 5];
        let h = entropy(&counts, 20);
        assert!((h - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn empty_bins_contribute_nothing() {
        assert_eq!(entropy(&[0, 10, 0], 10), 0.0);
    }

    #[test]
    fn constant_inputs_make_nmi_nan() {
        let a = vec![7.0; 16];
        let b = vec![9.0; 16];
        assert!(normalized_mutual_information(&a, &b).is_nan());
    }

    #[test]
    fn independent_halves_have_zero_mutual_information() {
        let a = [0.0, 0.0, 1.0, 1.0];
        let b = [0.0, 1.0, 0.0, 1.0];
        let terms = EntropyTerms::of(&a, &b);
        assert!(terms.mutual_information().abs() < 1e-12);
        assert!(terms.normalized_mutual_information().abs() < 1e-12);
    }
}
