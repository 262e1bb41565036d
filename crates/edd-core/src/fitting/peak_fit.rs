use super::guess::initial_guess;
use super::{
    BACKGROUND_PARAMETERS, Background, BoxFit, FitRange, FitStatus, PARAMETERS_PER_PEAK,
    PeakFitResult, PeakFitter,
};
use crate::domain::{EddError, EddResult};
use crate::numerics::{
    DenseMatrix, LeastSquaresProblem, LevMarSettings, PseudoVoigt, minimize, normal_matrix,
    symmetric_scaled_invert,
};
use tracing::{debug, trace};

const DEFAULT_MIN_FWHM: f64 = 1.0e-3;
/// Narrowest peak, in channels, that is not a single-sample spike.
const MIN_RESOLVED_FWHM: f64 = 1.0;
/// Fitted intensities must exceed this many standard errors.
const MIN_INTENSITY_SIGMAS: f64 = 3.0;

/// Least-squares fit of pseudo-Voigt peaks on a linear background.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoVoigtFitter {
    settings: LevMarSettings,
    min_fwhm: f64,
}

impl Default for PseudoVoigtFitter {
    fn default() -> Self {
        Self::new(LevMarSettings::default())
    }
}

impl PseudoVoigtFitter {
    pub fn new(settings: LevMarSettings) -> Self {
        Self {
            settings,
            min_fwhm: DEFAULT_MIN_FWHM,
        }
    }

    pub fn settings(&self) -> &LevMarSettings {
        &self.settings
    }
}

impl PeakFitter for PseudoVoigtFitter {
    fn fit(&self, pattern: &[f64], range: FitRange) -> EddResult<BoxFit> {
        range.validate(pattern.len())?;
        if range.width() <= range.parameter_count() {
            return Err(EddError::configuration(
                "INPUT.FIT_RANGE",
                format!(
                    "fit range [{}, {}) has {} channels, too few for {} peaks",
                    range.low,
                    range.high,
                    range.width(),
                    range.peak_count
                ),
            ));
        }

        let counts = &pattern[range.low..range.high];
        let Some(guess) = initial_guess(counts, range) else {
            debug!(low = range.low, high = range.high, "no peak found in box");
            let floor = counts.iter().copied().fold(f64::INFINITY, f64::min);
            let background = Background {
                offset: if floor.is_finite() { floor } else { 0.0 },
                slope: 0.0,
                reference: range.low as f64,
            };
            return Ok(BoxFit::failed(range, FitStatus::NoPeakFound, background));
        };

        let problem = BoxProblem {
            range,
            counts,
            min_fwhm: self.min_fwhm,
            max_fwhm: range.width() as f64,
        };
        let mut initial = vec![guess.background.offset, guess.background.slope];
        for peak in &guess.peaks {
            initial.extend([peak.position, peak.intensity, peak.fwhm, peak.shape_factor]);
        }

        let report = match minimize(&problem, &initial, &self.settings) {
            Ok(report) => report,
            Err(error) => {
                debug!(low = range.low, high = range.high, %error, "box optimizer did not start");
                let mut fit = problem.box_fit(&initial, FitStatus::NotConverged, 0);
                fit.uncertainties = vec![PeakFitResult::NAN; range.peak_count];
                return Ok(fit);
            }
        };

        let status = if !report.converged() {
            FitStatus::NotConverged
        } else if !problem.is_physical(&report.params) {
            FitStatus::Unphysical
        } else {
            FitStatus::Converged
        };
        let mut fit = problem.box_fit(&report.params, status, report.iterations);

        let sigmas = if status.is_converged() {
            problem.standard_errors(&report.params, report.chi_square)
        } else {
            None
        };
        match sigmas {
            Some(sigmas) if !is_significant(&report.params, &sigmas) => {
                fit.status = FitStatus::Insignificant;
                fit.uncertainties = vec![PeakFitResult::NAN; range.peak_count];
            }
            Some(sigmas) => {
                fit.uncertainties = peak_slices(&sigmas)
                    .map(|sigma| PeakFitResult {
                        position: sigma[0],
                        intensity: sigma[1],
                        fwhm: sigma[2],
                        shape_factor: sigma[3],
                        goodness: 0.0,
                    })
                    .collect();
            }
            None => {
                if status.is_converged() {
                    fit.status = FitStatus::SingularCovariance;
                }
                fit.uncertainties = vec![PeakFitResult::NAN; range.peak_count];
            }
        }
        sort_by_position(&mut fit);

        if fit.status.is_converged() {
            trace!(low = range.low, high = range.high, iterations = fit.iterations, "box fit converged");
        } else {
            debug!(
                low = range.low,
                high = range.high,
                status = fit.status.as_str(),
                iterations = fit.iterations,
                "box fit failed"
            );
        }
        Ok(fit)
    }
}

fn is_significant(params: &[f64], sigmas: &[f64]) -> bool {
    peak_slices(params).zip(peak_slices(sigmas)).all(|(peak, sigma)| {
        peak[2] >= MIN_RESOLVED_FWHM && peak[1] > MIN_INTENSITY_SIGMAS * sigma[1]
    })
}

fn peak_slices(params: &[f64]) -> impl Iterator<Item = &[f64]> {
    params[BACKGROUND_PARAMETERS..].chunks_exact(PARAMETERS_PER_PEAK)
}

fn sort_by_position(fit: &mut BoxFit) {
    let mut order: Vec<usize> = (0..fit.values.len()).collect();
    order.sort_by(|a, b| fit.values[*a].position.total_cmp(&fit.values[*b].position));
    fit.values = order.iter().map(|index| fit.values[*index]).collect();
    fit.uncertainties = order.iter().map(|index| fit.uncertainties[*index]).collect();
}

/// Parameters are `[offset, slope, (position, intensity, fwhm, eta) * N]`.
struct BoxProblem<'a> {
    range: FitRange,
    counts: &'a [f64],
    min_fwhm: f64,
    max_fwhm: f64,
}

impl BoxProblem<'_> {
    fn background(&self, params: &[f64]) -> Background {
        Background {
            offset: params[0],
            slope: params[1],
            reference: self.range.low as f64,
        }
    }

    fn peaks<'p>(&self, params: &'p [f64]) -> impl Iterator<Item = PseudoVoigt> + 'p {
        peak_slices(params).map(|peak| PseudoVoigt::new(peak[0], peak[1], peak[2], peak[3]))
    }

    fn model(&self, params: &[f64], x: f64) -> f64 {
        self.background(params).eval(x) + self.peaks(params).map(|peak| peak.eval(x)).sum::<f64>()
    }

    fn channel(&self, index: usize) -> f64 {
        (self.range.low + index) as f64
    }

    fn is_physical(&self, params: &[f64]) -> bool {
        let low = self.range.low as f64;
        let high = self.range.high as f64;
        params.iter().all(|value| value.is_finite())
            && self.peaks(params).all(|peak| {
                peak.position >= low && peak.position < high && peak.intensity > 0.0 && peak.fwhm > 0.0
            })
    }

    fn r_squared(&self, params: &[f64]) -> f64 {
        let n = self.counts.len() as f64;
        let mean = self.counts.iter().sum::<f64>() / n;
        let total: f64 = self.counts.iter().map(|y| (y - mean).powi(2)).sum();
        let residual: f64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(index, y)| (self.model(params, self.channel(index)) - y).powi(2))
            .sum();
        if total > 0.0 { 1.0 - residual / total } else { f64::NAN }
    }

    /// One-sigma errors from `(J^T J)^-1 * chi^2 / (n - p)`.
    fn standard_errors(&self, params: &[f64], chi_square: f64) -> Option<Vec<f64>> {
        let observations = self.observation_count();
        let parameters = self.parameter_count();
        let dof = observations.checked_sub(parameters).filter(|dof| *dof > 0)?;
        let mut jacobian = DenseMatrix::zeros(observations, parameters);
        self.jacobian(params, &mut jacobian);
        let covariance = symmetric_scaled_invert(&normal_matrix(&jacobian)).ok()?;
        let variance_scale = chi_square / dof as f64;
        let sigmas: Vec<f64> = (0..parameters)
            .map(|index| (covariance[(index, index)] * variance_scale).sqrt())
            .collect();
        sigmas.iter().all(|sigma| sigma.is_finite()).then_some(sigmas)
    }

    fn box_fit(&self, params: &[f64], status: FitStatus, iterations: usize) -> BoxFit {
        let goodness = self.r_squared(params);
        let values = peak_slices(params)
            .map(|peak| PeakFitResult {
                position: peak[0],
                intensity: peak[1],
                fwhm: peak[2],
                shape_factor: peak[3],
                goodness,
            })
            .collect();
        let fitted_curve = (0..self.counts.len())
            .map(|index| self.model(params, self.channel(index)))
            .collect();
        BoxFit {
            range: self.range,
            values,
            uncertainties: Vec::new(),
            background: self.background(params),
            status,
            iterations,
            fitted_curve,
        }
    }
}

impl LeastSquaresProblem for BoxProblem<'_> {
    fn parameter_count(&self) -> usize {
        self.range.parameter_count()
    }

    fn observation_count(&self) -> usize {
        self.counts.len()
    }

    fn residuals(&self, params: &[f64], out: &mut [f64]) {
        for (index, (slot, y)) in out.iter_mut().zip(self.counts).enumerate() {
            *slot = self.model(params, self.channel(index)) - y;
        }
    }

    fn jacobian(&self, params: &[f64], out: &mut DenseMatrix) {
        let reference = self.range.low as f64;
        for index in 0..self.counts.len() {
            let x = self.channel(index);
            out[(index, 0)] = 1.0;
            out[(index, 1)] = x - reference;
            for (peak_index, peak) in self.peaks(params).enumerate() {
                let gradient = peak.gradient(x);
                let col = BACKGROUND_PARAMETERS + peak_index * PARAMETERS_PER_PEAK;
                out[(index, col)] = gradient.d_position;
                out[(index, col + 1)] = gradient.d_intensity;
                out[(index, col + 2)] = gradient.d_fwhm;
                out[(index, col + 3)] = gradient.d_shape_factor;
            }
        }
    }

    fn constrain(&self, params: &mut [f64]) {
        for peak in params[BACKGROUND_PARAMETERS..].chunks_exact_mut(PARAMETERS_PER_PEAK) {
            peak[2] = peak[2].clamp(self.min_fwhm, self.max_fwhm);
            peak[3] = peak[3].clamp(0.0, 1.0);
        }
    }
}
