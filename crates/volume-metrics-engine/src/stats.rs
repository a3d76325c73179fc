use rayon::prelude::*;

const CHUNK: usize = 1 << 15;

/// Sums of centered products, the shared core of Pearson and NCC.
///
/// `constant` is set when either input has every sample equal. Centered sums
/// of such an input are not reliably zero once its mean has been rounded.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CenteredSums {
    pub sxx: f64,
    pub syy: f64,
    pub sxy: f64,
    pub constant: bool,
}

impl CenteredSums {
    pub fn of(first: &[f64], second: &[f64]) -> Self {
        assert_eq!(first.len(), second.len());
        let ((mean_x, mean_y), (flat_x, flat_y)) = rayon::join(
            || rayon::join(|| mean(first), || mean(second)),
            || rayon::join(|| is_constant(first), || is_constant(second)),
        );
        let sums = first
            .par_chunks(CHUNK)
            .zip(second.par_chunks(CHUNK))
            .map(|(a, b)| {
                let mut sums = CenteredSums::default();
                for (&x, &y) in a.iter().zip(b) {
                    let dx = x - mean_x;
                    let dy = y - mean_y;
                    sums.sxx += dx * dx;
                    sums.syy += dy * dy;
                    sums.sxy += dx * dy;
                }
                sums
            })
            .reduce(CenteredSums::default, |l, r| CenteredSums {
                sxx: l.sxx + r.sxx,
                syy: l.syy + r.syy,
                sxy: l.sxy + r.sxy,
                constant: false,
            });
        CenteredSums {
            constant: flat_x || flat_y,
            ..sums
        }
    }

    /// Pearson coefficient clamped to [-1, 1]; NaN when either side has no
    /// variance.
    pub fn pearson(&self) -> f64 {
        if self.constant {
            return f64::NAN;
        }
        (self.sxy / (self.sxx.sqrt() * self.syy.sqrt())).clamp(-1.0, 1.0)
    }

    /// Normalized cross-correlation, exactly 0 for a zero denominator.
    pub fn ncc(&self) -> f64 {
        let denominator = (self.sxx * self.syy).sqrt();
        if self.constant || denominator == 0.0 {
            0.0
        } else {
            self.sxy / denominator
        }
    }
}

/// True when every sample equals the first one; empty inputs count as
/// constant.
fn is_constant(values: &[f64]) -> bool {
    match values.first() {
        Some(&first) => values.par_iter().all(|&v| v == first),
        None => true,
    }
}

pub fn mean(values: &[f64]) -> f64 {
    values.par_chunks(CHUNK).map(|c| c.iter().sum::<f64>()).sum::<f64>() / values.len() as f64
}

pub fn mean_squared_error(first: &[f64], second: &[f64]) -> f64 {
    assert_eq!(first.len(), second.len());
    let total = first
        .par_chunks(CHUNK)
        .zip(second.par_chunks(CHUNK))
        .map(|(a, b)| {
            a.iter()
                .zip(b)
                .map(|(&x, &y)| (x - y) * (x - y))
                .sum::<f64>()
        })
        .sum::<f64>();
    total / first.len() as f64
}

pub fn pearson_correlation(first: &[f64], second: &[f64]) -> f64 {
    CenteredSums::of(first, second).pearson()
}

pub fn normalized_cross_correlation(first: &[f64], second: &[f64]) -> f64 {
    CenteredSums::of(first, second).ncc()
}
