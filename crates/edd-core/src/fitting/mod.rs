//! Peak fitting inside spectral boxes and the per-detector box orchestration.

pub mod boxes;
mod guess;
pub mod peak_fit;

pub use boxes::{BoxLayout, DetectorFits, FitDiagnosticsSink, NullDiagnosticsSink, fit_all_peaks};
pub use peak_fit::PseudoVoigtFitter;

use crate::domain::{EddError, EddResult};
use serde::Serialize;

/// Free parameters of one pseudo-Voigt peak: position, intensity, FWHM, eta.
pub const PARAMETERS_PER_PEAK: usize = 4;
/// Linear background under each box: offset and slope.
pub const BACKGROUND_PARAMETERS: usize = 2;
/// Fields of a [`PeakFitResult`] as stored in diagnostics.
pub const PEAK_RESULT_WIDTH: usize = 5;

/// Half-open channel window `[low, high)` expected to hold `peak_count` peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FitRange {
    pub low: usize,
    pub high: usize,
    pub peak_count: usize,
}

impl FitRange {
    pub fn new(low: usize, high: usize, peak_count: usize) -> Self {
        Self {
            low,
            high,
            peak_count,
        }
    }

    pub fn width(&self) -> usize {
        self.high.saturating_sub(self.low)
    }

    pub fn parameter_count(&self) -> usize {
        BACKGROUND_PARAMETERS + PARAMETERS_PER_PEAK * self.peak_count
    }

    /// Checks the window against a pattern of `channels` samples.
    pub fn validate(&self, channels: usize) -> EddResult<()> {
        if self.peak_count == 0 {
            return Err(EddError::configuration(
                "INPUT.PEAK_COUNT",
                format!(
                    "box [{}, {}) must expect at least one peak",
                    self.low, self.high
                ),
            ));
        }
        if self.low >= self.high {
            return Err(EddError::configuration(
                "INPUT.FIT_RANGE",
                format!(
                    "fit range low channel {} must be below high channel {}",
                    self.low, self.high
                ),
            ));
        }
        if self.high > channels {
            return Err(EddError::configuration(
                "INPUT.FIT_RANGE",
                format!(
                    "fit range [{}, {}) exceeds pattern of {} channels",
                    self.low, self.high, channels
                ),
            ));
        }
        Ok(())
    }
}

/// Fitted quantities of one peak. The same shape carries one-sigma
/// uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PeakFitResult {
    pub position: f64,
    pub intensity: f64,
    pub fwhm: f64,
    pub shape_factor: f64,
    pub goodness: f64,
}

impl PeakFitResult {
    pub const NAN: Self = Self {
        position: f64::NAN,
        intensity: f64::NAN,
        fwhm: f64::NAN,
        shape_factor: f64::NAN,
        goodness: f64::NAN,
    };

    pub fn to_array(&self) -> [f64; PEAK_RESULT_WIDTH] {
        [
            self.position,
            self.intensity,
            self.fwhm,
            self.shape_factor,
            self.goodness,
        ]
    }

    pub fn is_nan(&self) -> bool {
        self.to_array().iter().all(|value| value.is_nan())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    /// The optimizer ran out of iterations or could not start.
    NotConverged,
    /// The box holds no local maximum above its noise to start from.
    NoPeakFound,
    /// The normal matrix could not be inverted at the optimum.
    SingularCovariance,
    /// A peak left its box or lost its intensity.
    Unphysical,
    /// A peak is narrower than one channel or its intensity is within three
    /// standard errors of zero.
    Insignificant,
}

impl FitStatus {
    pub const fn is_converged(self) -> bool {
        matches!(self, Self::Converged)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::NotConverged => "not_converged",
            Self::NoPeakFound => "no_peak_found",
            Self::SingularCovariance => "singular_covariance",
            Self::Unphysical => "unphysical",
            Self::Insignificant => "insignificant",
        }
    }
}

/// Linear background `offset + slope * (x - reference)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Background {
    pub offset: f64,
    pub slope: f64,
    pub reference: f64,
}

impl Background {
    pub fn eval(&self, x: f64) -> f64 {
        self.offset + self.slope * (x - self.reference)
    }
}

/// Outcome of fitting one box of one pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxFit {
    pub range: FitRange,
    pub values: Vec<PeakFitResult>,
    pub uncertainties: Vec<PeakFitResult>,
    pub background: Background,
    pub status: FitStatus,
    pub iterations: usize,
    /// Model (peaks plus background) over `range`.
    pub fitted_curve: Vec<f64>,
}

impl BoxFit {
    /// Result for a box that could not be fitted at all.
    pub fn failed(range: FitRange, status: FitStatus, background: Background) -> Self {
        let fitted_curve = (range.low..range.high)
            .map(|channel| background.eval(channel as f64))
            .collect();
        Self {
            range,
            values: vec![PeakFitResult::NAN; range.peak_count],
            uncertainties: vec![PeakFitResult::NAN; range.peak_count],
            background,
            status,
            iterations: 0,
            fitted_curve,
        }
    }

    pub fn channels(&self) -> Vec<f64> {
        (self.range.low..self.range.high)
            .map(|channel| channel as f64)
            .collect()
    }

    pub fn background_curve(&self) -> Vec<f64> {
        (self.range.low..self.range.high)
            .map(|channel| self.background.eval(channel as f64))
            .collect()
    }
}

/// Fits the expected number of peaks inside one box of a pattern.
///
/// Implementations never fail on convergence problems; those are reported
/// through [`BoxFit::status`] with NaN uncertainties. Errors are reserved for
/// invalid ranges.
pub trait PeakFitter {
    fn fit(&self, pattern: &[f64], range: FitRange) -> EddResult<BoxFit>;
}

#[cfg(test)]
mod tests {
    use super::{BoxFit, Background, FitRange, FitStatus, PeakFitResult};

    #[test]
    fn range_validation_rejects_inverted_and_out_of_bounds_windows() {
        let inverted = FitRange::new(40, 20, 1)
            .validate(100)
            .expect_err("inverted range must fail");
        assert_eq!(inverted.code(), "INPUT.FIT_RANGE");

        let outside = FitRange::new(90, 120, 1)
            .validate(100)
            .expect_err("range beyond pattern must fail");
        assert_eq!(outside.code(), "INPUT.FIT_RANGE");

        let no_peaks = FitRange::new(10, 20, 0)
            .validate(100)
            .expect_err("zero peaks must fail");
        assert_eq!(no_peaks.code(), "INPUT.PEAK_COUNT");

        FitRange::new(0, 100, 2)
            .validate(100)
            .expect("full-width range is valid");
    }

    #[test]
    fn failed_box_fit_carries_nan_sentinels() {
        let range = FitRange::new(10, 14, 2);
        let background = Background {
            offset: 3.0,
            slope: 0.5,
            reference: 10.0,
        };
        let fit = BoxFit::failed(range, FitStatus::NoPeakFound, background);

        assert_eq!(fit.values.len(), 2);
        assert!(fit.uncertainties.iter().all(PeakFitResult::is_nan));
        assert_eq!(fit.fitted_curve, vec![3.0, 3.5, 4.0, 4.5]);
        assert_eq!(fit.channels(), vec![10.0, 11.0, 12.0, 13.0]);
        assert!(!fit.status.is_converged());
    }
}
