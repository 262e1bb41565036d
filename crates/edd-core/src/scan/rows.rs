//! Layout of the per-peak time-series rows.

use super::positioners::MAX_POSITIONERS;
use crate::domain::Detector;
use crate::fitting::{PEAK_RESULT_WIDTH, PeakFitResult};

/// Six positioner angles, delta, theta and the five fitted quantities.
pub const ROW_WIDTH: usize = MAX_POSITIONERS + 2 + PEAK_RESULT_WIDTH;

pub const DELTA_COLUMN: usize = MAX_POSITIONERS;
pub const THETA_COLUMN: usize = MAX_POSITIONERS + 1;
pub const POSITION_COLUMN: usize = MAX_POSITIONERS + 2;

pub type PeakRow = [f64; ROW_WIDTH];

/// Builds the row stored for one detector at one scan point.
///
/// Delta is the detector offset; theta stays zero until an angle calibration
/// is applied downstream.
pub fn peak_row(angles: &[f64; MAX_POSITIONERS], detector: Detector, fit: &PeakFitResult) -> PeakRow {
    let mut row = [0.0; ROW_WIDTH];
    row[..MAX_POSITIONERS].copy_from_slice(angles);
    row[DELTA_COLUMN] = detector.offset_degrees();
    row[THETA_COLUMN] = 0.0;
    row[POSITION_COLUMN..].copy_from_slice(&fit.to_array());
    row
}

pub fn peak_dataset_name(peak: usize) -> String {
    format!("peak_{peak:04}")
}

pub fn uncertainty_dataset_name(peak: usize) -> String {
    format!("uncertaintyPeak_{peak:04}")
}

/// Column legend stored next to the peak datasets.
pub fn info_peak_text(positioners: &[String]) -> String {
    let names = positioners
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "[{names}], delta, theta, position in channel, Intensity, FWHM, shape factor, goodness factor"
    )
}
