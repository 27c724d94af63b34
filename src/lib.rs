//! HRV (Heart Rate Variability) Computation
//!
//! This crate contains functions and utilities for cleaning NN interval
//! series and calculating HRV metrics. The `preprocessing` module derives
//! NN intervals from R-peak timestamps and removes ectopic beats and
//! outliers; the `analysis` module provides time-domain, frequency-domain
//! and nonlinear HRV measures computed on the cleaned series.

pub mod analysis;
pub mod preprocessing;
