//! Ectopic beat and outlier removal for NN interval series.
//!
//! Detected R-peaks are never perfect: a missed beat produces two short
//! intervals, a premature beat produces a short interval followed by a
//! compensatory pause, and occasional detector glitches produce isolated
//! values far outside the physiological range. This module scans an NN
//! interval series together with the R-peak timestamps that produced it,
//! replaces implausible values with a local median and drops spurious
//! samples from both series in one batch, so downstream statistics run on
//! a clean tachogram.
//!
//! The classifier compares each interval against the mean and median of
//! the ten intervals trailing it (excluding its direct predecessor) and
//! needs two intervals of lookahead, so the first eleven and last two
//! samples are only ever touched by the absolute range filter.
//!
//! # Example
//!
//! ```
//! use hrv_correct::preprocessing::ectopic::correct_ectopic_beats;
//!
//! let intervals = vec![800.0; 16];
//! let peaks: Vec<f64> = (0..=16).map(|i| i as f64 * 0.8).collect();
//! let corrected = correct_ectopic_beats(&peaks, &intervals).unwrap();
//! // a clean series comes back unchanged
//! assert_eq!(corrected.intervals, intervals);
//! assert_eq!(corrected.peak_times, &peaks[1..]);
//! ```

use std::collections::BTreeSet;

use log::debug;
use nalgebra::DVectorView;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Trailing intervals used as the local reference window.
const WINDOW_LEN: usize = 10;
/// Distance from the evaluated index to the start of its window; the
/// window ends one short of the direct predecessor.
const WINDOW_OFFSET: usize = WINDOW_LEN + 1;
/// Intervals required after the evaluated index.
const LOOKAHEAD: usize = 2;
/// Smallest series the corrector accepts.
const MIN_INTERVALS: usize = WINDOW_OFFSET + LOOKAHEAD;

/// Two intervals below this fraction of the local mean, followed by one
/// above it, read as a split beat.
const SHORT_FRACTION: f64 = 0.75;
/// Relative deviation from the local mean tolerated before a value is
/// clamped to the local median.
const DEVIATION_FRACTION: f64 = 0.15;

/// Errors reported by the correction engine.
#[derive(Debug, Error, PartialEq)]
pub enum CorrectionError {
    /// Malformed input: mismatched series lengths, non-monotonic peak
    /// timestamps or non-positive intervals.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Too few intervals for the sliding-window classifier.
    #[error("insufficient data: need at least {required} intervals, got {actual}")]
    InsufficientData { required: usize, actual: usize },
}

/// A corrected `(peak_times, intervals)` pair.
///
/// Both series have the same length; `peak_times[i]` is the timestamp in
/// seconds at which interval `i` ends, `intervals[i]` the interval in
/// milliseconds. The counters report how much the corrector changed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedSeries {
    /// Beat timestamps after correction \[s\].
    pub peak_times: Vec<f64>,
    /// NN intervals after correction \[ms\].
    pub intervals: Vec<f64>,
    /// Intervals replaced by their local median.
    pub substitutions: usize,
    /// Samples deleted from both series.
    pub removals: usize,
}

/// Removes ectopic beats and outliers from an NN interval series.
///
/// The corrector runs three passes over owned copies of its input:
///
/// 1. every interval outside `[min_nni, max_nni]` is marked for removal
///    (the first interval is exempt),
/// 2. every interval with a full ten-sample window behind it and two
///    samples ahead is classified against the local mean and median;
///    split-beat and compensatory-pause patterns substitute the median and
///    mark the trailing spurious sample, any other deviation beyond 15 %
///    of the local mean substitutes the median in place,
/// 3. all marked indices are deleted from both series at once, so the
///    classification in pass 2 always reads pre-deletion values.
///
/// The rules of pass 2 are deliberately evaluated in sequence without an
/// early exit; a later rule reads, and may overwrite, the substitution of
/// an earlier one. Substituted medians are not re-checked against the
/// absolute range.
#[derive(Debug, Clone)]
pub struct EctopicCorrector {
    min_nni: f64,
    max_nni: f64,
}

impl Default for EctopicCorrector {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl EctopicCorrector {
    /// Creates a corrector with the given absolute range limits in
    /// milliseconds. The defaults of 300 ms and 6000 ms correspond to
    /// heart rates of 200 bpm and 30 bpm.
    ///
    /// # Arguments
    ///
    /// * `min_nni` - Lower range limit \[ms\]. Default is 300.0.
    /// * `max_nni` - Upper range limit \[ms\]. Default is 6000.0.
    pub fn new(min_nni: Option<f64>, max_nni: Option<f64>) -> Self {
        Self {
            min_nni: min_nni.unwrap_or(300.0),
            max_nni: max_nni.unwrap_or(6000.0),
        }
    }

    pub fn min_nni(&self) -> f64 {
        self.min_nni
    }

    pub fn max_nni(&self) -> f64 {
        self.max_nni
    }

    /// Corrects an NN interval series and its R-peak timestamps.
    ///
    /// # Arguments
    ///
    /// * `peak_times` - Strictly increasing beat timestamps \[s\], one
    ///   more entry than `intervals`.
    /// * `intervals` - NN intervals \[ms\], `intervals[i]` spanning
    ///   `peak_times[i]` to `peak_times[i + 1]`.
    ///
    /// # Returns
    ///
    /// A [`CorrectedSeries`] with equally long timestamp and interval
    /// vectors, at most as long as `intervals`. The inputs are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// [`CorrectionError::InvalidInput`] if the series lengths do not
    /// match, the timestamps are not strictly increasing or an interval is
    /// not positive. [`CorrectionError::InsufficientData`] if fewer than
    /// 13 intervals are provided, in which case no index has both the
    /// ten-sample window and the two-sample lookahead.
    pub fn apply(
        &self,
        peak_times: &[f64],
        intervals: &[f64],
    ) -> Result<CorrectedSeries, CorrectionError> {
        validate_series(peak_times, intervals)?;
        if intervals.len() < MIN_INTERVALS {
            return Err(CorrectionError::InsufficientData {
                required: MIN_INTERVALS,
                actual: intervals.len(),
            });
        }

        let mut nni = intervals.to_vec();
        // timestamp i marks the end of interval i
        let mut peaks = peak_times[1..].to_vec();
        let mut remove = BTreeSet::new();
        let mut substitutions = 0usize;

        // absolute range filter; index 0 stays unchecked
        for (i, &value) in nni.iter().enumerate().skip(1) {
            if value < self.min_nni || value > self.max_nni {
                remove.insert(i);
            }
        }

        let low = 1.0 - DEVIATION_FRACTION;
        let high = 1.0 + DEVIATION_FRACTION;
        for i in WINDOW_OFFSET..nni.len() - LOOKAHEAD {
            // the window sees substitutions applied at earlier indices,
            // deletions are deferred until after the scan
            let (local_mean, local_median) = {
                let window = &nni[i - WINDOW_OFFSET..i - 1];
                (DVectorView::from(window).mean(), median(window))
            };
            let short = SHORT_FRACTION * local_mean;
            let mut replaced = false;

            // missed beat: the split halves read as two short intervals
            // with a recovered interval behind them
            if nni[i] < short && nni[i + 1] < short && nni[i + 2] > short {
                nni[i] = local_median;
                remove.insert(i + 1);
                replaced = true;
            }
            // premature beat followed by a compensatory pause; the beat
            // timestamp moves to match the substituted interval
            if nni[i] < low * local_mean
                && nni[i + 1] > high * local_mean
                && nni[i + 2] > short
            {
                nni[i] = local_median;
                peaks[i] = peaks[i - 1] + nni[i] / 1000.0;
                remove.insert(i + 1);
                replaced = true;
            }
            // deviation clamp; re-reads the value a rule above may have
            // already substituted
            if nni[i] > high * local_mean || nni[i] < low * local_mean {
                nni[i] = local_median;
                replaced = true;
            }

            if replaced {
                substitutions += 1;
            }
        }

        let removals = remove.len();
        let kept = nni.len() - removals;
        let intervals = filter_indices(nni, &remove);
        let peak_times = filter_indices(peaks, &remove);
        debug!(
            "NNI correction: {substitutions} substitution(s), {removals} removal(s), {kept} sample(s) kept"
        );

        Ok(CorrectedSeries {
            peak_times,
            intervals,
            substitutions,
            removals,
        })
    }
}

/// Corrects an NN interval series with the default physiological range of
/// 300 ms to 6000 ms. See [`EctopicCorrector::apply`].
pub fn correct_ectopic_beats(
    peak_times: &[f64],
    intervals: &[f64],
) -> Result<CorrectedSeries, CorrectionError> {
    EctopicCorrector::default().apply(peak_times, intervals)
}

fn validate_series(peak_times: &[f64], intervals: &[f64]) -> Result<(), CorrectionError> {
    if peak_times.len() != intervals.len() + 1 {
        return Err(CorrectionError::InvalidInput(format!(
            "expected {} peak timestamps for {} intervals, got {}",
            intervals.len() + 1,
            intervals.len(),
            peak_times.len()
        )));
    }
    if let Some(idx) = peak_times.windows(2).position(|pair| !(pair[1] > pair[0])) {
        return Err(CorrectionError::InvalidInput(format!(
            "peak timestamps must be strictly increasing (violated at index {})",
            idx + 1
        )));
    }
    if let Some(idx) = intervals.iter().position(|&value| !(value > 0.0)) {
        return Err(CorrectionError::InvalidInput(format!(
            "interval at index {idx} is not positive"
        )));
    }
    Ok(())
}

fn median(window: &[f64]) -> f64 {
    let mut sorted = window.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn filter_indices(values: Vec<f64>, remove: &BTreeSet<usize>) -> Vec<f64> {
    values
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !remove.contains(i))
        .map(|(_, value)| value)
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use super::*;

    /// Cumulative peak timestamps in seconds matching an interval series.
    fn peaks_from(intervals: &[f64]) -> Vec<f64> {
        let mut peaks = Vec::with_capacity(intervals.len() + 1);
        let mut t = 0.0;
        peaks.push(t);
        for &nni in intervals {
            t += nni / 1000.0;
            peaks.push(t);
        }
        peaks
    }

    fn series(leading: usize, pattern: &[f64], trailing: usize) -> Vec<f64> {
        let mut nni = vec![800.0; leading];
        nni.extend_from_slice(pattern);
        nni.extend(std::iter::repeat(800.0).take(trailing));
        nni
    }

    #[test]
    fn clean_series_is_a_fixed_point() {
        let nni = vec![800.0; 20];
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals, nni);
        assert_eq!(corrected.peak_times, &peaks[1..]);
        assert_eq!(corrected.substitutions, 0);
        assert_eq!(corrected.removals, 0);
    }

    #[test]
    fn mild_variation_stays_untouched() {
        // alternating values 2.5 % around the mean never trip a rule
        let nni: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 780.0 } else { 820.0 })
            .collect();
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals, nni);
        assert_eq!(corrected.removals, 0);
    }

    #[test]
    fn missed_beat_is_merged() {
        // the split pair 390/410 follows eleven regular intervals, so the
        // first half is classified with a full window behind it
        let nni = series(11, &[390.0, 410.0, 790.0], 10);
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();

        let mut expected = vec![800.0; 12];
        expected.push(790.0);
        expected.extend(std::iter::repeat(800.0).take(10));
        assert_eq!(corrected.intervals, expected);
        assert_eq!(corrected.intervals.len(), nni.len() - 1);
        assert_eq!(corrected.peak_times.len(), corrected.intervals.len());
        assert_eq!(corrected.removals, 1);
        // the split-beat rule keeps the detected timestamp of the first half
        assert!((corrected.peak_times[11] - (11.0 * 0.8 + 0.39)).abs() < 1e-9);
    }

    #[test]
    fn compensatory_pause_is_collapsed() {
        let nni = series(11, &[550.0, 1050.0], 11);
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();

        assert_eq!(corrected.intervals, vec![800.0; 23]);
        assert_eq!(corrected.intervals.len(), nni.len() - 1);
        assert_eq!(corrected.removals, 1);
        // the pause rule recomputes the timestamp from the substituted value
        assert!((corrected.peak_times[11] - (11.0 * 0.8 + 0.8)).abs() < 1e-9);
    }

    #[test]
    fn long_interval_is_removed_by_range_filter() {
        let nni = series(12, &[6500.0], 10);
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals, vec![800.0; 22]);
        assert_eq!(corrected.peak_times.len(), 22);
        assert_eq!(corrected.removals, 1);
        assert!(corrected.intervals.iter().all(|&v| v <= 6000.0));
    }

    #[test]
    fn short_interval_is_removed_by_range_filter() {
        // 13 intervals is the acceptance boundary; the classifier has no
        // evaluable index yet and only the range filter acts
        let mut nni = vec![800.0; 13];
        nni[5] = 250.0;
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals, vec![800.0; 12]);
        assert_eq!(corrected.substitutions, 0);
        assert_eq!(corrected.removals, 1);
    }

    #[test]
    fn first_interval_is_exempt_from_range_filter() {
        let mut nni = vec![800.0; 20];
        nni[0] = 6500.0;
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals.len(), 20);
        assert_eq!(corrected.intervals[0], 6500.0);
        assert_eq!(corrected.removals, 0);
    }

    #[test]
    fn leading_samples_are_never_classified() {
        // same split pattern as the missed-beat case, but with only ten
        // regular intervals in front: index 10 has no full window and must
        // survive, while index 11 still gets clamped to its window median
        let nni = series(10, &[390.0, 410.0, 790.0], 10);
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals.len(), nni.len());
        assert_eq!(corrected.intervals[10], 390.0);
        assert_eq!(corrected.intervals[11], 800.0);
        assert_eq!(corrected.removals, 0);
    }

    #[test]
    fn trailing_samples_are_never_classified() {
        for offset in 1..=2 {
            let mut nni = vec![800.0; 20];
            let idx = nni.len() - offset;
            // far off the local trend yet inside the absolute range
            nni[idx] = 1500.0;
            let peaks = peaks_from(&nni);
            let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
            assert_eq!(corrected.intervals, nni);
            assert_eq!(corrected.removals, 0);
        }
    }

    #[test]
    fn substituted_median_can_leave_the_range() {
        // a window full of out-of-range values yields an out-of-range
        // median; the substitution is not re-checked against the limits
        let nni = series(0, &[6500.0; 11], 9);
        let peaks = peaks_from(&nni);
        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals.len(), corrected.peak_times.len());
        // indices 1..=10 fall to the range filter, index 0 is exempt
        assert_eq!(corrected.removals, 10);
        assert!(corrected.intervals.iter().any(|&v| v > 6000.0));
    }

    #[test]
    fn rejects_short_series() {
        let nni = vec![800.0; 12];
        let peaks = peaks_from(&nni);
        let err = correct_ectopic_beats(&peaks, &nni).unwrap_err();
        assert_eq!(
            err,
            CorrectionError::InsufficientData {
                required: 13,
                actual: 12
            }
        );
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let nni = vec![800.0; 15];
        let peaks = peaks_from(&nni);
        let err = correct_ectopic_beats(&peaks[..15], &nni).unwrap_err();
        assert!(matches!(err, CorrectionError::InvalidInput(_)));
    }

    #[test]
    fn rejects_non_monotonic_peaks() {
        let nni = vec![800.0; 15];
        let mut peaks = peaks_from(&nni);
        peaks[4] = peaks[5];
        let err = correct_ectopic_beats(&peaks, &nni).unwrap_err();
        assert!(matches!(err, CorrectionError::InvalidInput(_)));
    }

    #[test]
    fn rejects_non_positive_intervals() {
        let mut nni = vec![800.0; 15];
        nni[7] = 0.0;
        let peaks = peaks_from(&vec![800.0; 15]);
        let err = correct_ectopic_beats(&peaks, &nni).unwrap_err();
        assert!(matches!(err, CorrectionError::InvalidInput(_)));
    }

    #[test]
    fn inputs_are_not_mutated() {
        let nni = series(11, &[390.0, 410.0, 790.0], 10);
        let peaks = peaks_from(&nni);
        let nni_before = nni.clone();
        let peaks_before = peaks.clone();
        correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(nni, nni_before);
        assert_eq!(peaks, peaks_before);
    }

    #[test]
    fn custom_range_limits() {
        let mut nni = vec![800.0; 20];
        nni[5] = 1100.0;
        let peaks = peaks_from(&nni);
        let corrector = EctopicCorrector::new(Some(500.0), Some(1000.0));
        assert_eq!(corrector.min_nni(), 500.0);
        assert_eq!(corrector.max_nni(), 1000.0);
        let corrected = corrector.apply(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals.len(), 19);
    }

    #[test]
    fn corrected_noisy_series_is_stable() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut nni: Vec<f64> = (0..300)
            .map(|_| 1000.0 + rng.gen_range(-10.0..10.0))
            .collect();
        // inject detector artifacts
        nni[50] = 6500.0;
        nni[120] = 6500.0;
        nni[200] = 480.0;
        nni[201] = 520.0;
        let peaks = peaks_from(&nni);

        let corrected = correct_ectopic_beats(&peaks, &nni).unwrap();
        assert_eq!(corrected.intervals.len(), corrected.peak_times.len());
        assert!(corrected.intervals.len() < nni.len());
        assert!(corrected
            .intervals
            .iter()
            .all(|&v| (300.0..=6000.0).contains(&v)));

        // a cleaned series is a fixed point of the corrector
        let peaks_again = peaks_from(&corrected.intervals);
        let again = correct_ectopic_beats(&peaks_again, &corrected.intervals).unwrap();
        assert_eq!(again.intervals, corrected.intervals);
        assert_eq!(again.removals, 0);
    }
}
