use rayon::prelude::*;

/// Number of uniform bins per axis.
pub const BINS: usize = 256;
/// Fixed intensity range shared by every histogram, independent of the data.
pub const RANGE_MIN: f64 = 0.0;
pub const RANGE_MAX: f64 = 256.0;

const CHUNK: usize = 1 << 15;

/// Maps an intensity to its bin. The right edge is closed: `RANGE_MAX` falls
/// in the last bin. Values outside the range and NaN are dropped.
#[inline]
pub fn bin_index(value: f64) -> Option<usize> {
    if !(RANGE_MIN..=RANGE_MAX).contains(&value) {
        return None;
    }
    let scaled = (value - RANGE_MIN) * BINS as f64 / (RANGE_MAX - RANGE_MIN);
    Some((scaled as usize).min(BINS - 1))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u64>,
}

impl Histogram {
    pub fn of(values: &[f64]) -> Self {
        let counts = values
            .par_chunks(CHUNK)
            .fold(
                || vec![0u64; BINS],
                |mut acc, chunk| {
                    for &value in chunk {
                        if let Some(bin) = bin_index(value) {
                            acc[bin] += 1;
                        }
                    }
                    acc
                },
            )
            .reduce(|| vec![0u64; BINS], merge_counts);
        Self { counts }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Samples that landed inside the range.
    pub fn binned(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Row-major `BINS x BINS` counts; the row is the first volume's bin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JointHistogram {
    counts: Vec<u64>,
}

impl JointHistogram {
    /// A pair is counted only when both samples are in range.
    pub fn of(first: &[f64], second: &[f64]) -> Self {
        assert_eq!(first.len(), second.len());
        let counts = first
            .par_chunks(CHUNK)
            .zip(second.par_chunks(CHUNK))
            .fold(
                || vec![0u64; BINS * BINS],
                |mut acc, (a, b)| {
                    for (&x, &y) in a.iter().zip(b) {
                        if let (Some(row), Some(col)) = (bin_index(x), bin_index(y)) {
                            acc[row * BINS + col] += 1;
                        }
                    }
                    acc
                },
            )
            .reduce(|| vec![0u64; BINS * BINS], merge_counts);
        Self { counts }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.counts[row * BINS + col]
    }
}

fn merge_counts(mut left: Vec<u64>, right: Vec<u64>) -> Vec<u64> {
    for (dst, src) in left.iter_mut().zip(right) {
        *dst += src;
    }
    left
}
