//! This module contains submodules for preprocessing tasks in HRV algorithms.
//!
//! The `nni` submodule derives NN interval series from R-peak timestamps.
//! The `ectopic` submodule removes ectopic beats and outliers from the
//! derived series before any statistics are computed.
pub mod ectopic;
pub mod nni;
