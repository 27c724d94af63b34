//! This module provides functionality for Detrended Fluctuation Analysis (DFA).
//!
//! DFA estimates the statistical self-affinity of a signal and is used on
//! NN interval series to detect long-range correlations. The conventional
//! HRV parameters are the short-term scaling exponent alpha1 (windows of
//! 4 to 16 beats) and the long-term exponent alpha2 (17 to 64 beats),
//! available through [`DFAnalysis::short_term`] and
//! [`DFAnalysis::long_term`].
//!
//! The module includes:
//!
//! - `DetrendAlgorithm` trait: Defines the interface for detrending algorithms.
//! - `DetrendStrategy` enum: Linear detrending or a custom algorithm.
//! - `DFAnalysis` struct: The scaling exponent, intercept, R-squared value,
//!   and log-transformed window sizes and fluctuation amplitudes.
//!
//! # Example
//!
//! ```rust
//! use hrv_correct::analysis::dfa::{DFAnalysis, DetrendStrategy};
//! use rand;
//! // your data series
//! let data = (0..128).map(|_| rand::random::<f64>()).collect::<Vec<f64>>();
//! let windows = vec![4, 8, 16, 32];
//!
//! let analysis = DFAnalysis::dfa(&data, &windows, DetrendStrategy::Linear).unwrap();
//! println!("Alpha: {}", analysis.alpha);
//! ```
//!
//! # References
//!
//! - Peng, C.-K. et al. (1995). *Quantification of scaling exponents and
//!   crossover phenomena in nonstationary heartbeat time series*. Chaos, 5, 82-87.

use anyhow::anyhow;
use anyhow::Result;
use core::f64;
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::DVectorView;
use rayon::iter::ParallelIterator;
use rayon::slice::ParallelSlice;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A trait representing a detrending algorithm for time series data.
///
/// Implementors of this trait should provide a method to remove trends
/// from the given data.
#[cfg_attr(test, mockall::automock)]
pub trait DetrendAlgorithm {
    /// Removes trends from the provided data and returns the detrended data.
    ///
    /// # Parameters
    ///
    /// - `data`: A slice of f64 values representing the time series data to be detrended.
    ///
    /// # Returns
    ///
    /// A `Result` containing a vector of f64 values representing the detrended data on success,
    /// or an error on failure.
    fn detrend(&self, data: &[f64]) -> Result<Vec<f64>>;
}

/// Available detrend strategies for the DFA algorithm.
/// User provided algorithms can be passed via the `Custom` variant.
pub enum DetrendStrategy {
    /// Linear detrending algorithm using least squares regression.
    Linear,
    /// A custom detrending algorithm that implements the `DetrendAlgorithm` trait.
    /// The algorithm is wrapped in a `Box` to allow for dynamic dispatch and must
    /// also implement the `Sync` and `Send` traits to ensure thread safety.
    Custom(Box<dyn DetrendAlgorithm + Sync + Send>),
}

// implement the trait for the enum to dispatch calculation
impl DetrendAlgorithm for DetrendStrategy {
    fn detrend(&self, data: &[f64]) -> Result<Vec<f64>> {
        match self {
            DetrendStrategy::Linear => LinearDetrend.detrend(data),
            DetrendStrategy::Custom(detrender) => detrender.detrend(data),
        }
    }
}

/// A linear detrending algorithm using least squares regression.
pub struct LinearDetrend;

impl DetrendAlgorithm for LinearDetrend {
    fn detrend(&self, data: &[f64]) -> Result<Vec<f64>> {
        if data.len() < 2 {
            return Err(anyhow!(
                "Data must contain at least two elements for detrending."
            ));
        }
        let x: Vec<f64> = (0..data.len()).map(|i| i as f64).collect();
        let ((a, b), _) = linear_fit(&x, data)?;
        let detrended: Vec<f64> = data
            .iter()
            .zip(x.iter())
            .map(|(&y, &i)| y - (a * i + b))
            .collect();

        Ok(detrended)
    }
}

/// A struct representing Detrended Fluctuation Analysis (DFA) results.
///
/// # Fields
///
/// * `alpha` - The scaling exponent, which indicates the presence of long-range correlations.
/// * `intercept` - The intercept of the linear fit in the log-log plot.
/// * `r_squared` - The coefficient of determination, which indicates the goodness of fit.
/// * `log_n` - A vector containing the logarithm of the box sizes used in the analysis.
/// * `log_f` - A vector containing the logarithm of the fluctuation function values corresponding to the box sizes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct DFAnalysis {
    pub alpha: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub log_n: Vec<f64>,
    pub log_f: Vec<f64>,
}

impl DFAnalysis {
    /// Performs Detrended Fluctuation Analysis (DFA) on the provided data.
    ///
    /// # Arguments
    ///
    /// - `data`: A slice of `f64` representing the input time series data.
    /// - `windows`: A slice of `usize` specifying the window sizes to use for the fluctuation analysis.
    /// - `detrender`: A `DetrendStrategy` implementation used to remove trends from each segment.
    ///
    /// # Returns
    ///
    /// A `DFAnalysis` instance with the estimated scaling exponent, the
    /// intercept and coefficient of determination of the log-log
    /// regression, and the log-transformed window sizes and fluctuation
    /// amplitudes.
    ///
    /// # Errors
    ///
    /// This method returns an error if:
    /// - `windows` is empty.
    /// - The length of the input data is less than four times the largest window size.
    /// - The smallest window size is less than 4.
    /// - The `detrender` fails to detrend a segment.
    ///
    /// # Algorithm Overview
    ///
    /// 1. **Integration**:
    ///    - The input data is transformed into a cumulative deviation profile (mean-centered).
    ///
    /// 2. **Segment Detrending**:
    ///    - The profile is divided into non-overlapping segments of each
    ///      window size, and each segment is detrended using the provided
    ///      `DetrendStrategy`.
    ///
    /// 3. **Variance Calculation**:
    ///    - Variances of the detrended segments are computed.
    ///
    /// 4. **Log-Log Regression**:
    ///    - The log-transformed window sizes (`log_n`) and fluctuations (`log_f`) are
    ///      used to perform a linear regression, yielding the scaling exponent `alpha`.
    pub fn dfa(data: &[f64], windows: &[usize], detrender: DetrendStrategy) -> Result<Self> {
        if windows.is_empty() {
            return Err(anyhow!("Windows must not be empty"));
        }
        let windows = {
            let mut _w = windows.to_owned();
            _w.sort();
            _w
        };
        if data.len() < 4 * *windows.last().unwrap() {
            return Err(anyhow!(
                "Data length must be at least 4x the size of the largest window"
            ));
        }
        if *windows.first().unwrap() < 4 {
            return Err(anyhow!("Minimum window size must be at least 4"));
        }
        let data = DVectorView::from(data);
        let mean = data.mean();
        let integrated: Vec<f64> = data
            .iter()
            .scan(0.0, |state, &x| {
                *state += x - mean;
                Some(*state)
            })
            .collect();

        // Calculate fluctuations for each window size
        let mut log_n: Vec<f64> = Vec::with_capacity(windows.len());
        let mut log_f: Vec<f64> = Vec::with_capacity(windows.len());

        for window in windows {
            let (fluctuation, n_segments) = integrated
                .par_chunks(window)
                .filter_map(|slice| -> Option<Result<f64>> {
                    if slice.len() != window {
                        None
                    } else {
                        match detrender.detrend(slice) {
                            Ok(data) => {
                                let detrended = DVector::from(data);
                                let var = detrended.variance();
                                Some(Ok(var))
                            }
                            Err(e) => Some(Err(e)),
                        }
                    }
                })
                .collect::<Result<Vec<f64>, _>>()?
                .iter()
                .fold((0f64, 0usize), |(fluctuation, n_segments), f| {
                    (fluctuation + f, n_segments + 1)
                });
            if n_segments > 0 {
                let f_n = (fluctuation / n_segments as f64).sqrt();
                log_n.push((window as f64).ln());
                log_f.push(f_n.ln());
            }
        }

        // Linear regression on log-log data
        let ((alpha, intercept), r_squared) = linear_fit(&log_n, &log_f)?;

        Ok(DFAnalysis {
            alpha,
            intercept,
            r_squared,
            log_n,
            log_f,
        })
    }

    /// Short-term scaling exponent alpha1 over windows of 4 to 16 beats.
    ///
    /// See [`DFAnalysis::dfa`] for the errors; the series must hold at
    /// least 64 samples.
    pub fn short_term(data: &[f64], detrender: DetrendStrategy) -> Result<Self> {
        let windows: Vec<usize> = (4..=16).collect();
        Self::dfa(data, &windows, detrender)
    }

    /// Long-term scaling exponent alpha2 over windows of 17 to 64 beats.
    ///
    /// See [`DFAnalysis::dfa`] for the errors; the series must hold at
    /// least 256 samples.
    pub fn long_term(data: &[f64], detrender: DetrendStrategy) -> Result<Self> {
        let windows: Vec<usize> = (17..=64).collect();
        Self::dfa(data, &windows, detrender)
    }
}

/// Performs linear regression on the provided data.
///
/// Returns the slope and intercept of the best-fit line and the
/// coefficient of determination (R-squared value).
///
/// # Errors
///
/// This function returns an error if:
/// - The length of `x` is less than 2.
/// - The lengths of `x` and `y` do not match.
fn linear_fit(x: &[f64], y: &[f64]) -> Result<((f64, f64), f64)> {
    if x.len() < 2 {
        return Err(anyhow!(
            "Data must contain at least two elements for linear fit."
        ));
    }
    if x.len() != y.len() {
        return Err(anyhow!("X and Y data must have the same length."));
    }
    let prob_matrix = DMatrix::from_columns(&[
        DVector::from_column_slice(x),
        DVector::from_element(x.len(), 1.0),
    ]);
    let y = DVectorView::from(y);
    let result = lstsq::lstsq(&prob_matrix, &y.into(), f64::EPSILON).map_err(|e| anyhow!(e))?;

    let y_mean = y.mean();
    let tss: f64 = y.iter().map(|&yi| (yi - y_mean).powi(2)).sum();
    let r_squared = 1.0 - (result.residuals / tss);

    Ok(((result.solution[0], result.solution[1]), r_squared))
}
