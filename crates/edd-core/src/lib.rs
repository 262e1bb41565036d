//! Peak fitting for energy-dispersive diffraction scans.
//!
//! Patterns of a horizontal and a vertical detector are split into boxes,
//! each box is fitted with pseudo-Voigt peaks on a linear background, and the
//! per-point results are folded into one time series per peak.

pub mod config;
pub mod domain;
pub mod fitting;
pub mod numerics;
pub mod scan;
pub mod source;
pub mod store;

pub use config::{FitEddConfig, FitJob, FitPlan};
pub use domain::{EddError, EddErrorCategory, EddResult};
pub use scan::{BatchReport, ScanFitReport, fit_scan, run_batch};
