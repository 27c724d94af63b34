//! This module provides functions to calculate frequency-domain measures of heart rate variability (HRV).
//!
//! The NN interval tachogram is an irregularly sampled signal, so it is
//! first resampled onto a uniform grid by linear interpolation over the
//! cumulative beat time. A Welch periodogram (Hann window, mean-detrended,
//! overlapping segments) then yields the power spectral density, which is
//! integrated over the conventional ULF, VLF, LF and HF bands.
//!
//! # Example
//!
//! ```rust
//! use hrv_correct::analysis::frequency::welch_psd;
//!
//! let nni: Vec<f64> = (0..600)
//!     .map(|i| 1000.0 + 50.0 * (2.0 * std::f64::consts::PI * 0.1 * i as f64).sin())
//!     .collect();
//! let analysis = welch_psd(&nni, None, None).unwrap();
//! // a 0.1 Hz modulation lands in the LF band
//! assert!(analysis.lf.power > analysis.hf.power);
//! ```

use anyhow::anyhow;
use anyhow::Result;
use nalgebra::DVectorView;
use realfft::RealFftPlanner;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Frequency band limits in Hz, each as `(lower, upper)`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBands {
    pub ulf: (f64, f64),
    pub vlf: (f64, f64),
    pub lf: (f64, f64),
    pub hf: (f64, f64),
}

impl Default for FrequencyBands {
    fn default() -> Self {
        Self {
            ulf: (0.0, 0.003),
            vlf: (0.003, 0.04),
            lf: (0.04, 0.15),
            hf: (0.15, 0.4),
        }
    }
}

/// Parameters of the Welch periodogram.
#[derive(Debug, Clone, Copy)]
pub struct WelchConfig {
    /// Uniform resampling rate of the tachogram \[Hz\]. Default is 4.0.
    pub resample_rate: f64,
    /// Segment length in samples; clamped to the resampled signal length.
    /// Default is 256.
    pub segment_len: usize,
    /// Fraction of overlap between consecutive segments. Default is 0.5.
    pub overlap: f64,
}

impl Default for WelchConfig {
    fn default() -> Self {
        Self {
            resample_rate: 4.0,
            segment_len: 256,
            overlap: 0.5,
        }
    }
}

/// Power measures of a single frequency band.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct BandPower {
    /// Band limits \[Hz\].
    pub band: (f64, f64),
    /// Absolute power \[ms^2\].
    pub power: f64,
    /// Power relative to the total power \[%\].
    pub relative_power: f64,
    /// Frequency of the largest PSD value inside the band \[Hz\]; NaN when
    /// the spectral resolution leaves no bin inside the band.
    pub peak_frequency: f64,
}

/// Results of the Welch spectral analysis.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct FrequencyDomainAnalysis {
    pub ulf: BandPower,
    pub vlf: BandPower,
    pub lf: BandPower,
    pub hf: BandPower,
    /// Sum of the four band powers \[ms^2\].
    pub total_power: f64,
    /// Ratio of absolute LF to absolute HF power.
    pub lf_hf_ratio: f64,
    /// Frequency axis of the estimated PSD \[Hz\].
    pub frequencies: Vec<f64>,
    /// One-sided power spectral density \[ms^2/Hz\].
    pub psd: Vec<f64>,
}

/// Estimates the power spectral density of an NN interval series with
/// Welch's method and integrates it over the given frequency bands.
///
/// # Arguments
///
/// * `nni` - A slice of NN intervals in milliseconds.
/// * `bands` - Frequency band limits. Defaults to ULF 0-0.003 Hz,
///   VLF 0.003-0.04 Hz, LF 0.04-0.15 Hz and HF 0.15-0.4 Hz.
/// * `config` - Welch parameters. Defaults to 4 Hz resampling, 256-sample
///   segments and 50 % overlap.
///
/// # Errors
///
/// This function will return an error if the series holds fewer than two
/// intervals, contains non-positive intervals, the configuration is
/// invalid, or the resampled signal is too short for a single segment.
pub fn welch_psd(
    nni: &[f64],
    bands: Option<FrequencyBands>,
    config: Option<WelchConfig>,
) -> Result<FrequencyDomainAnalysis> {
    let bands = bands.unwrap_or_default();
    let config = config.unwrap_or_default();
    if nni.len() < 2 {
        return Err(anyhow!(
            "Data must contain at least two elements for spectral analysis."
        ));
    }
    if nni.iter().any(|&value| !(value > 0.0)) {
        return Err(anyhow!("NN intervals must be positive."));
    }
    if config.resample_rate <= 0.0 {
        return Err(anyhow!("Resampling rate must be positive."));
    }
    if !(0.0..1.0).contains(&config.overlap) {
        return Err(anyhow!("Segment overlap must be in [0, 1)."));
    }

    let resampled = resample_tachogram(nni, config.resample_rate);
    let segment_len = config.segment_len.min(resampled.len());
    if segment_len < 2 {
        return Err(anyhow!(
            "Resampled signal is too short for spectral analysis."
        ));
    }

    let (frequencies, psd) = welch_periodogram(
        &resampled,
        segment_len,
        config.overlap,
        config.resample_rate,
    )?;

    let ulf = integrate_band(&frequencies, &psd, bands.ulf);
    let vlf = integrate_band(&frequencies, &psd, bands.vlf);
    let lf = integrate_band(&frequencies, &psd, bands.lf);
    let hf = integrate_band(&frequencies, &psd, bands.hf);
    let total_power = ulf.power + vlf.power + lf.power + hf.power;
    let lf_hf_ratio = lf.power / hf.power;

    let relative = |band: BandPower| BandPower {
        relative_power: if total_power > 0.0 {
            band.power / total_power * 100.0
        } else {
            0.0
        },
        ..band
    };

    Ok(FrequencyDomainAnalysis {
        ulf: relative(ulf),
        vlf: relative(vlf),
        lf: relative(lf),
        hf: relative(hf),
        total_power,
        lf_hf_ratio,
        frequencies,
        psd,
    })
}

/// Resamples the tachogram onto a uniform grid by linear interpolation
/// over the cumulative beat time.
fn resample_tachogram(nni: &[f64], rate: f64) -> Vec<f64> {
    let mut times = Vec::with_capacity(nni.len());
    let mut elapsed = 0.0;
    for &value in nni {
        elapsed += value / 1e3;
        times.push(elapsed);
    }
    let start = times[0];
    let span = times[times.len() - 1] - start;
    let samples = (span * rate).floor() as usize + 1;
    (0..samples)
        .map(|k| interpolate(&times, nni, start + k as f64 / rate))
        .collect()
}

fn interpolate(times: &[f64], values: &[f64], t: f64) -> f64 {
    let idx = times.partition_point(|&x| x < t);
    if idx == 0 {
        values[0]
    } else if idx >= times.len() {
        values[values.len() - 1]
    } else {
        let weight = (t - times[idx - 1]) / (times[idx] - times[idx - 1]);
        values[idx - 1] + (values[idx] - values[idx - 1]) * weight
    }
}

/// Averaged one-sided periodogram over Hann-windowed, mean-detrended,
/// overlapping segments.
fn welch_periodogram(
    signal: &[f64],
    segment_len: usize,
    overlap: f64,
    rate: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let hop = ((segment_len as f64 * (1.0 - overlap)).round() as usize).max(1);
    let hann: Vec<f64> = (0..segment_len)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / (segment_len as f64 - 1.0);
            0.5 * (1.0 - phase.cos())
        })
        .collect();
    let window_power: f64 = hann.iter().map(|w| w * w).sum();

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(segment_len);
    let bins = segment_len / 2 + 1;
    let mut psd = vec![0.0; bins];
    let mut segments = 0usize;

    let mut start = 0;
    while start + segment_len <= signal.len() {
        let mut buffer = signal[start..start + segment_len].to_vec();
        let segment_mean = DVectorView::from(buffer.as_slice()).mean();
        for (sample, weight) in buffer.iter_mut().zip(&hann) {
            *sample = (*sample - segment_mean) * weight;
        }
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut buffer, &mut spectrum)?;
        for (accumulated, value) in psd.iter_mut().zip(&spectrum) {
            *accumulated += value.norm_sqr();
        }
        segments += 1;
        start += hop;
    }
    if segments == 0 {
        return Err(anyhow!("Signal is shorter than a single Welch segment."));
    }

    let scale = 1.0 / (rate * window_power * segments as f64);
    for (k, value) in psd.iter_mut().enumerate() {
        *value *= scale;
        // one-sided spectrum; DC and an even-length Nyquist bin are unique
        let nyquist = segment_len % 2 == 0 && k == bins - 1;
        if k != 0 && !nyquist {
            *value *= 2.0;
        }
    }
    let frequencies = (0..bins)
        .map(|k| k as f64 * rate / segment_len as f64)
        .collect();
    Ok((frequencies, psd))
}

fn integrate_band(frequencies: &[f64], psd: &[f64], band: (f64, f64)) -> BandPower {
    let df = if frequencies.len() > 1 {
        frequencies[1] - frequencies[0]
    } else {
        0.0
    };
    let mut power = 0.0;
    let mut peak = f64::NAN;
    let mut peak_value = f64::NEG_INFINITY;
    for (&frequency, &density) in frequencies.iter().zip(psd) {
        if frequency >= band.0 && frequency < band.1 {
            power += density * df;
            if density > peak_value {
                peak_value = density;
                peak = frequency;
            }
        }
    }
    BandPower {
        band,
        power,
        relative_power: 0.0,
        peak_frequency: peak,
    }
}
