//! Derivation of NN interval series from R-peak timestamps.

use anyhow::{anyhow, Result};

/// Computes the NN interval series for a sequence of R-peak timestamps.
///
/// # Arguments
///
/// * `r_peaks` - Strictly increasing beat timestamps in seconds.
///
/// # Returns
///
/// A vector of intervals in milliseconds, one element shorter than the
/// input, where entry `i` spans `r_peaks[i]` to `r_peaks[i + 1]`.
///
/// # Errors
///
/// This function will return an error if fewer than two peaks are given
/// or if the timestamps are not strictly increasing.
///
/// # Examples
///
/// ```
/// use hrv_correct::preprocessing::nni::nn_intervals;
/// let peaks = vec![0.0, 0.8, 1.6, 2.5];
/// let nni = nn_intervals(&peaks).unwrap();
/// assert_eq!(nni.len(), 3);
/// assert!((nni[2] - 900.0).abs() < 1e-9);
/// ```
pub fn nn_intervals(r_peaks: &[f64]) -> Result<Vec<f64>> {
    if r_peaks.len() < 2 {
        return Err(anyhow!(
            "At least two R-peaks are required to derive NN intervals."
        ));
    }
    r_peaks
        .windows(2)
        .map(|pair| {
            if pair[1] > pair[0] {
                Ok((pair[1] - pair[0]) * 1e3)
            } else {
                Err(anyhow!("R-peak timestamps must be strictly increasing."))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nn_intervals() {
        let peaks = vec![0.0, 0.8, 1.65, 2.4];
        let nni = nn_intervals(&peaks).unwrap();
        assert_eq!(nni.len(), peaks.len() - 1);
        assert!((nni[0] - 800.0).abs() < 1e-9);
        assert!((nni[1] - 850.0).abs() < 1e-9);
        assert!((nni[2] - 750.0).abs() < 1e-9);
    }

    #[test]
    fn test_nn_intervals_too_short() {
        assert!(nn_intervals(&[1.0]).is_err());
        assert!(nn_intervals(&[]).is_err());
    }

    #[test]
    fn test_nn_intervals_not_increasing() {
        let peaks = vec![0.0, 0.8, 0.8, 2.4];
        assert!(nn_intervals(&peaks).is_err());
    }
}
