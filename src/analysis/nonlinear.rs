//! Nonlinear analysis module for HRV algorithms.
//!
//! Provides Poincare plot metrics (SD1, SD2, their eigenvectors and the
//! SD1/SD2 ratio) and sample entropy.
//!
//! # Example
//! ```rust
//! use hrv_correct::analysis::nonlinear::calc_poincare_metrics;
//!
//! let data = [1000.0, 1010.0, 1001.0, 1030.0, 1049.0];
//! let poincare = calc_poincare_metrics(&data).unwrap();
//! assert!(poincare.sd1 < poincare.sd2);
//! ```

use anyhow::anyhow;
use anyhow::Result;
use nalgebra::DMatrix;
use nalgebra::DVectorView;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Results of Poincare plot analysis.
///
/// SD1 is the dispersion perpendicular to the line of identity and
/// reflects short-term variability, SD2 the dispersion along it. The
/// eigenvectors give the orientation of the fitted ellipse axes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default)]
pub struct PoincareAnalysisResult {
    pub sd1: f64,
    pub sd1_eigenvector: [f64; 2],
    pub sd2: f64,
    pub sd2_eigenvector: [f64; 2],
    pub sd_ratio: f64,
}

/// Calculates Poincare plot metrics SD1 and SD2 with their eigenvectors.
///
/// Each NN interval is plotted against its successor; SD1 and SD2 are the
/// square roots of the eigenvalues of the covariance matrix of that point
/// cloud, ordered such that SD1 < SD2.
///
/// # Arguments
/// - `data`: A slice of NN intervals in milliseconds.
///
/// # Errors
///
/// This function will return an error if the input slice has fewer than
/// two elements.
pub fn calc_poincare_metrics(data: &[f64]) -> Result<PoincareAnalysisResult> {
    if data.len() < 2 {
        return Err(anyhow!(
            "Data must contain at least two elements for Poincare metrics calculation."
        ));
    }

    let points_a = DVectorView::from(&data[0..data.len() - 1]);
    let points_b = DVectorView::from(&data[1..]);

    // Center the data
    let poincare_matrix = {
        let mut centered = DMatrix::from_columns(&[points_a, points_b]);
        let col_means = centered.row_mean();
        for mut row in centered.row_iter_mut() {
            row -= &col_means;
        }
        centered
    };

    // Covariance matrix and eigen decomposition
    let poincare_cov =
        poincare_matrix.transpose() * &poincare_matrix / (poincare_matrix.nrows() as f64 - 1.0);
    let ev = nalgebra::SymmetricEigen::new(poincare_cov);

    // Ensure SD1 < SD2 by convention
    let (sd1, sd2, sd1_vec, sd2_vec) = if ev.eigenvalues[0] < ev.eigenvalues[1] {
        (
            ev.eigenvalues[0].sqrt(),
            ev.eigenvalues[1].sqrt(),
            [ev.eigenvectors.column(0)[0], ev.eigenvectors.column(0)[1]],
            [ev.eigenvectors.column(1)[0], ev.eigenvectors.column(1)[1]],
        )
    } else {
        (
            ev.eigenvalues[1].sqrt(),
            ev.eigenvalues[0].sqrt(),
            [ev.eigenvectors.column(1)[0], ev.eigenvectors.column(1)[1]],
            [ev.eigenvectors.column(0)[0], ev.eigenvectors.column(0)[1]],
        )
    };

    Ok(PoincareAnalysisResult {
        sd1,
        sd1_eigenvector: sd1_vec,
        sd2,
        sd2_eigenvector: sd2_vec,
        sd_ratio: sd1 / sd2,
    })
}

/// Calculates the sample entropy of an NN interval series.
///
/// Sample entropy is the negative logarithm of the conditional probability
/// that two templates of length `dim` that match within `tolerance`
/// (Chebyshev distance) still match when extended by one sample. Lower
/// values indicate a more regular series.
///
/// # Arguments
///
/// * `data` - A slice of NN intervals in milliseconds.
/// * `dim` - Template length. Default is 2.
/// * `tolerance` - Match tolerance in milliseconds. Default is 0.2 times
///   the standard deviation of the series.
///
/// # Errors
///
/// This function will return an error if the series is shorter than
/// `dim + 2`, if the tolerance is not positive, or if no template pair
/// matches within the tolerance.
pub fn calc_sample_entropy(
    data: &[f64],
    dim: Option<usize>,
    tolerance: Option<f64>,
) -> Result<f64> {
    let m = dim.unwrap_or(2);
    if m == 0 {
        return Err(anyhow!("Template length must be at least 1."));
    }
    if data.len() < m + 2 {
        return Err(anyhow!(
            "Data must contain at least dim + 2 elements for sample entropy."
        ));
    }
    let r = match tolerance {
        Some(r) if r > 0.0 => r,
        Some(_) => return Err(anyhow!("Tolerance must be positive.")),
        None => 0.2 * DVectorView::from(data).variance().sqrt(),
    };

    // the same template count for both lengths keeps the ratio unbiased
    let templates = data.len() - m;
    let matches_m = similar_template_pairs(data, m, templates, r);
    let matches_m1 = similar_template_pairs(data, m + 1, templates, r);
    if matches_m == 0 || matches_m1 == 0 {
        return Err(anyhow!(
            "No template pairs match within the tolerance; sample entropy is undefined."
        ));
    }
    Ok((matches_m as f64 / matches_m1 as f64).ln())
}

/// Counts template pairs whose Chebyshev distance stays within `r`.
fn similar_template_pairs(data: &[f64], len: usize, templates: usize, r: f64) -> usize {
    let mut pairs = 0;
    for i in 0..templates {
        for j in i + 1..templates {
            let dist = (0..len)
                .map(|k| (data[i + k] - data[j + k]).abs())
                .fold(0.0, f64::max);
            if dist <= r {
                pairs += 1;
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_poincare_metrics() {
        let data = [1000.0, 1010.0, 1001.0, 1030.0, 1049.0];
        let poincare = calc_poincare_metrics(&data).unwrap();
        assert!(poincare.sd1 < poincare.sd2); // SD1 should always be smaller than SD2
        assert!(poincare.sd1 > 0.0, "SD1 should be positive.");
        assert!(poincare.sd2 > 0.0, "SD2 should be positive.");
        assert!(
            poincare.sd1_eigenvector[0] != 0.0,
            "SD1 eigenvector should not be zero."
        );
        assert!(
            poincare.sd2_eigenvector[0] != 0.0,
            "SD2 eigenvector should not be zero."
        );
        assert!((poincare.sd_ratio - poincare.sd1 / poincare.sd2).abs() < 1e-12);
    }

    #[test]
    fn test_poincare_metrics_error() {
        let data = [1000.0];
        let result = calc_poincare_metrics(&data);
        assert!(
            result.is_err(),
            "Poincare metrics should fail with less than 2 elements."
        );
    }

    #[test]
    fn test_sample_entropy_constant_series() {
        // a perfectly regular series has zero conditional surprise
        let data = vec![800.0; 50];
        let sampen = calc_sample_entropy(&data, None, Some(1.0)).unwrap();
        assert!(sampen.abs() < 1e-12);
    }

    #[test]
    fn test_sample_entropy_random_exceeds_regular() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let random: Vec<f64> = (0..200)
            .map(|_| 1000.0 + rng.gen_range(-100.0..100.0))
            .collect();
        let regular: Vec<f64> = (0..200)
            .map(|i| if i % 2 == 0 { 950.0 } else { 1050.0 })
            .collect();
        let tolerance = Some(20.0);
        let sampen_random = calc_sample_entropy(&random, None, tolerance).unwrap();
        let sampen_regular = calc_sample_entropy(&regular, None, tolerance).unwrap();
        assert!(sampen_random > sampen_regular);
        assert!(sampen_regular.abs() < 1e-12);
    }

    #[test]
    fn test_sample_entropy_too_short() {
        let data = [800.0, 810.0, 820.0];
        assert!(calc_sample_entropy(&data, None, None).is_err());
    }

    #[test]
    fn test_sample_entropy_invalid_tolerance() {
        let data = vec![800.0; 20];
        assert!(calc_sample_entropy(&data, None, Some(0.0)).is_err());
    }
}
