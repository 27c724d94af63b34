//! This module provides functions to calculate time-domain measures of heart rate variability (HRV).
//!
//! Currently the following metrics can be calculated:
//! - Basic NN interval, NN difference and heart rate statistics
//! - Standard Deviation of NN intervals (SDNN)
//! - Root Mean Square of Successive Differences (RMSSD)
//! - Standard Deviation of Successive Differences (SDSD)
//! - NN50 / pNN50
//! - SDNN index and SDANN over fixed-length segments
//! - Triangular index based on the NN interval histogram

use std::collections::HashMap;

use anyhow::anyhow;
use anyhow::Result;
use nalgebra::DVector;
use nalgebra::DVectorView;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Basic statistics of an NN interval series \[ms\].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NniSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Basic statistics of the absolute successive NN interval differences \[ms\].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NniDifferencesSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Basic statistics of the instantaneous heart rate series \[bpm\].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HrSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

/// Calculates count, mean, minimum and maximum of an NN interval series.
///
/// # Errors
///
/// This function will return an error if the input slice is empty.
pub fn nni_parameters(data: &[f64]) -> Result<NniSummary> {
    if data.is_empty() {
        return Err(anyhow!(
            "Data must contain at least one element for NNI parameters."
        ));
    }
    let (min, max) = min_max(data);
    Ok(NniSummary {
        count: data.len(),
        mean: DVectorView::from(data).mean(),
        min,
        max,
    })
}

/// Calculates count, mean, minimum and maximum of the absolute successive
/// differences of an NN interval series.
///
/// # Errors
///
/// This function will return an error if the input slice contains fewer
/// than two elements.
pub fn nni_differences_parameters(data: &[f64]) -> Result<NniDifferencesSummary> {
    let diffs = successive_differences(data, "NNI difference parameters")?;
    let abs: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
    let (min, max) = min_max(&abs);
    Ok(NniDifferencesSummary {
        count: abs.len(),
        mean: DVectorView::from(abs.as_slice()).mean(),
        min,
        max,
    })
}

/// Calculates mean, minimum, maximum and standard deviation of the
/// instantaneous heart rate series derived from NN intervals.
///
/// # Errors
///
/// This function will return an error if the input slice is empty or
/// contains non-positive intervals.
pub fn hr_parameters(data: &[f64]) -> Result<HrSummary> {
    if data.is_empty() {
        return Err(anyhow!(
            "Data must contain at least one element for HR parameters."
        ));
    }
    if data.iter().any(|&nni| !(nni > 0.0)) {
        return Err(anyhow!("NN intervals must be positive for HR parameters."));
    }
    let hr = DVector::from_iterator(data.len(), data.iter().map(|&nni| 60_000.0 / nni));
    let (min, max) = min_max(hr.as_slice());
    Ok(HrSummary {
        mean: hr.mean(),
        min,
        max,
        std_dev: hr.variance().sqrt(),
    })
}

/// Calculates the Standard Deviation of NN intervals (SDNN) from a slice
/// of NN intervals.
///
/// # Arguments
///
/// * `data` - A slice of f64 values representing NN intervals.
///
/// # Returns
///
/// * `Result<f64>` - The SDNN value if the calculation is successful, otherwise an error.
///
/// # Errors
///
/// This function will return an error if the input slice contains fewer than two elements.
pub fn calc_sdnn(data: &[f64]) -> Result<f64> {
    if data.len() < 2 {
        Err(anyhow!(
            "Data must contain at least two elements for SDNN calculation."
        ))
    } else {
        let variance = DVectorView::from(data).variance();
        Ok(variance.sqrt())
    }
}

/// Calculates the Root Mean Square of Successive Differences (RMSSD) from a slice of NN intervals.
///
/// RMSSD is a time-domain measure of heart rate variability, which is the square root of the mean
/// of the squares of the successive differences between adjacent NN intervals.
///
/// # Arguments
///
/// * `data` - A slice of f64 values representing NN intervals.
///
/// # Returns
///
/// * `Result<f64>` - The RMSSD value if the calculation is successful, otherwise an error.
///
/// # Errors
///
/// This function will return an error if the input slice contains fewer than two elements.
pub fn calc_rmssd(data: &[f64]) -> Result<f64> {
    let diffs = successive_differences(data, "RMSSD")?;
    Ok((diffs.dot(&diffs) / (diffs.len() as f64)).sqrt())
}

/// Calculates the Standard Deviation of Successive Differences (SDSD) from
/// a slice of NN intervals.
///
/// # Errors
///
/// This function will return an error if the input slice contains fewer than two elements.
pub fn calc_sdsd(data: &[f64]) -> Result<f64> {
    let diffs = successive_differences(data, "SDSD")?;
    Ok(diffs.variance().sqrt())
}

/// Counts the successive NN interval differences larger than 50 ms (NN50).
///
/// # Errors
///
/// This function will return an error if the input slice contains fewer than two elements.
pub fn calc_nn50(data: &[f64]) -> Result<usize> {
    let diffs = successive_differences(data, "NN50")?;
    Ok(diffs.iter().filter(|d| d.abs() > 50.0).count())
}

/// Calculates the percentage of successive NN interval differences larger
/// than 50 ms (pNN50).
///
/// # Errors
///
/// This function will return an error if the input slice contains fewer than two elements.
pub fn calc_pnn50(data: &[f64]) -> Result<f64> {
    let nn50 = calc_nn50(data)?;
    Ok(nn50 as f64 / (data.len() - 1) as f64 * 100.0)
}

/// Calculates the SDNN index: the mean of the SDNN values of all complete
/// fixed-length segments of the series.
///
/// # Arguments
///
/// * `data` - A slice of f64 values representing NN intervals.
/// * `duration` - Segment length in seconds. Default is 300.0.
///
/// # Errors
///
/// This function will return an error if the series does not span at least
/// one complete segment.
pub fn calc_sdnn_index(data: &[f64], duration: Option<f64>) -> Result<f64> {
    let segments = time_segments(data, duration)?;
    if segments.is_empty() {
        return Err(anyhow!(
            "Data must span at least one complete segment for the SDNN index."
        ));
    }
    let sdnn: Vec<f64> = segments
        .iter()
        .map(|segment| calc_sdnn(segment))
        .collect::<Result<_>>()?;
    Ok(DVectorView::from(sdnn.as_slice()).mean())
}

/// Calculates the SDANN: the standard deviation of the mean NN interval of
/// all complete fixed-length segments of the series.
///
/// # Arguments
///
/// * `data` - A slice of f64 values representing NN intervals.
/// * `duration` - Segment length in seconds. Default is 300.0.
///
/// # Errors
///
/// This function will return an error if the series does not span at least
/// two complete segments.
pub fn calc_sdann(data: &[f64], duration: Option<f64>) -> Result<f64> {
    let segments = time_segments(data, duration)?;
    if segments.len() < 2 {
        return Err(anyhow!(
            "Data must span at least two complete segments for SDANN."
        ));
    }
    let means: Vec<f64> = segments
        .iter()
        .map(|segment| DVectorView::from(segment.as_slice()).mean())
        .collect();
    Ok(DVectorView::from(means.as_slice()).variance().sqrt())
}

/// Calculates the triangular index: the number of NN intervals divided by
/// the height of the NN interval histogram.
///
/// # Arguments
///
/// * `data` - A slice of f64 values representing NN intervals.
/// * `binsize` - Histogram bin width in milliseconds. Default is 7.8125
///   (1/128 s, the conventional ECG sampling grid).
///
/// # Errors
///
/// This function will return an error if the input slice is empty or the
/// bin size is not positive.
pub fn calc_triangular_index(data: &[f64], binsize: Option<f64>) -> Result<f64> {
    let binsize = binsize.unwrap_or(7.8125);
    if data.is_empty() {
        return Err(anyhow!(
            "Data must contain at least one element for the triangular index."
        ));
    }
    if binsize <= 0.0 {
        return Err(anyhow!("Histogram bin size must be positive."));
    }
    let mut histogram: HashMap<i64, usize> = HashMap::new();
    for &value in data {
        *histogram
            .entry((value / binsize).floor() as i64)
            .or_insert(0) += 1;
    }
    let height = histogram.values().copied().max().unwrap_or(1);
    Ok(data.len() as f64 / height as f64)
}

fn successive_differences(data: &[f64], metric: &str) -> Result<DVector<f64>> {
    if data.len() < 2 {
        return Err(anyhow!(
            "Data must contain at least two elements for {metric} calculation."
        ));
    }
    let points_a = DVectorView::from(&data[0..data.len() - 1]);
    let points_b = DVectorView::from(&data[1..]);
    Ok(points_b - points_a)
}

fn min_max(data: &[f64]) -> (f64, f64) {
    data.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        })
}

/// Splits the series into segments of `duration` seconds of cumulative
/// interval time. The trailing partial segment is dropped.
fn time_segments(data: &[f64], duration: Option<f64>) -> Result<Vec<Vec<f64>>> {
    let duration = duration.unwrap_or(300.0);
    if duration <= 0.0 {
        return Err(anyhow!("Segment duration must be positive."));
    }
    let segment_ms = duration * 1e3;
    let mut segments = Vec::new();
    let mut current = Vec::new();
    let mut elapsed = 0.0;
    for &nni in data {
        current.push(nni);
        elapsed += nni;
        if elapsed >= segment_ms {
            segments.push(std::mem::take(&mut current));
            elapsed = 0.0;
        }
    }
    Ok(segments)
}
