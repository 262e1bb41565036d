use super::DenseMatrix;
use super::linalg::{CholeskyError, cholesky_solve};

const DAMPING_GROWTH: f64 = 10.0;
const MIN_DAMPING: f64 = 1.0e-12;
const RELATIVE_DIAGONAL_FLOOR: f64 = 1.0e-12;

/// A nonlinear least-squares problem `min sum_i r_i(p)^2`.
pub trait LeastSquaresProblem {
    fn parameter_count(&self) -> usize;

    fn observation_count(&self) -> usize;

    /// Writes `model(p) - data` into `out`.
    fn residuals(&self, params: &[f64], out: &mut [f64]);

    /// Writes `d model_i / d p_j` into the `observations x parameters` matrix.
    fn jacobian(&self, params: &[f64], out: &mut DenseMatrix);

    /// Projects a trial point back into the feasible region.
    fn constrain(&self, _params: &mut [f64]) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevMarSettings {
    pub max_iterations: usize,
    pub relative_tolerance: f64,
    pub step_tolerance: f64,
    pub initial_damping: f64,
    pub max_damping: f64,
}

impl Default for LevMarSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            relative_tolerance: 1.0e-10,
            step_tolerance: 1.0e-10,
            initial_damping: 1.0e-3,
            max_damping: 1.0e16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ResidualConverged,
    StepConverged,
    ExactFit,
    /// No damped step lowers the cost any more after at least one accepted
    /// step: the gradient vanishes to working precision.
    Stalled,
    /// No damped step lowers the cost below its value at the initial guess.
    NoProgress,
    MaxIterations,
}

impl Termination {
    pub const fn converged(self) -> bool {
        !matches!(self, Self::MaxIterations | Self::NoProgress)
    }

    const fn stalled(accepted_step: bool) -> Self {
        if accepted_step { Self::Stalled } else { Self::NoProgress }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevMarReport {
    pub params: Vec<f64>,
    pub residuals: Vec<f64>,
    pub chi_square: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl LevMarReport {
    pub fn converged(&self) -> bool {
        self.termination.converged()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LevMarError {
    #[error("least-squares problem has no free parameters")]
    NoParameters,
    #[error("initial guess has {actual} parameters, problem expects {expected}")]
    ParameterCountMismatch { expected: usize, actual: usize },
    #[error("{observations} observations cannot determine {parameters} parameters")]
    Underdetermined {
        observations: usize,
        parameters: usize,
    },
    #[error("residuals are not finite at the initial guess")]
    NonFiniteInitialResiduals,
}

/// Levenberg-Marquardt with Marquardt's diagonal scaling.
pub fn minimize<P: LeastSquaresProblem>(
    problem: &P,
    initial: &[f64],
    settings: &LevMarSettings,
) -> Result<LevMarReport, LevMarError> {
    let parameters = problem.parameter_count();
    let observations = problem.observation_count();
    if parameters == 0 {
        return Err(LevMarError::NoParameters);
    }
    if initial.len() != parameters {
        return Err(LevMarError::ParameterCountMismatch {
            expected: parameters,
            actual: initial.len(),
        });
    }
    if observations < parameters {
        return Err(LevMarError::Underdetermined {
            observations,
            parameters,
        });
    }

    let mut params = initial.to_vec();
    problem.constrain(&mut params);
    let mut residuals = vec![0.0; observations];
    problem.residuals(&params, &mut residuals);
    let mut chi_square = sum_of_squares(&residuals);
    if !chi_square.is_finite() {
        return Err(LevMarError::NonFiniteInitialResiduals);
    }

    let mut jacobian = DenseMatrix::zeros(observations, parameters);
    let mut trial = vec![0.0; parameters];
    let mut trial_residuals = vec![0.0; observations];
    let mut damping = settings.initial_damping;
    let mut accepted_step = false;

    for iteration in 1..=settings.max_iterations {
        if chi_square == 0.0 {
            return Ok(report(params, residuals, chi_square, iteration - 1, Termination::ExactFit));
        }

        problem.jacobian(&params, &mut jacobian);
        let normal = normal_matrix(&jacobian);
        let gradient = gradient(&jacobian, &residuals);
        let diagonal_floor = (0..parameters)
            .map(|index| normal[(index, index)])
            .fold(0.0_f64, f64::max)
            * RELATIVE_DIAGONAL_FLOOR;

        loop {
            let step = match damped_step(&normal, &gradient, damping, diagonal_floor) {
                Ok(step) => step,
                Err(_) => {
                    damping *= DAMPING_GROWTH;
                    if damping > settings.max_damping {
                        return Ok(report(
                            params,
                            residuals,
                            chi_square,
                            iteration,
                            Termination::stalled(accepted_step),
                        ));
                    }
                    continue;
                }
            };

            for ((slot, current), delta) in trial.iter_mut().zip(&params).zip(&step) {
                *slot = current + delta;
            }
            problem.constrain(&mut trial);
            problem.residuals(&trial, &mut trial_residuals);
            let trial_chi_square = sum_of_squares(&trial_residuals);

            if trial_chi_square.is_finite() && trial_chi_square < chi_square {
                let reduction = (chi_square - trial_chi_square) / chi_square;
                let step_norm = trial
                    .iter()
                    .zip(&params)
                    .map(|(next, current)| (next - current).powi(2))
                    .sum::<f64>()
                    .sqrt();
                let param_norm = params.iter().map(|value| value * value).sum::<f64>().sqrt();

                params.copy_from_slice(&trial);
                residuals.copy_from_slice(&trial_residuals);
                chi_square = trial_chi_square;
                damping = (damping / DAMPING_GROWTH).max(MIN_DAMPING);
                accepted_step = true;

                if chi_square == 0.0 {
                    return Ok(report(params, residuals, chi_square, iteration, Termination::ExactFit));
                }
                if reduction <= settings.relative_tolerance {
                    return Ok(report(
                        params,
                        residuals,
                        chi_square,
                        iteration,
                        Termination::ResidualConverged,
                    ));
                }
                if step_norm <= settings.step_tolerance * (param_norm + settings.step_tolerance) {
                    return Ok(report(
                        params,
                        residuals,
                        chi_square,
                        iteration,
                        Termination::StepConverged,
                    ));
                }
                break;
            }

            damping *= DAMPING_GROWTH;
            if damping > settings.max_damping {
                return Ok(report(
                    params,
                    residuals,
                    chi_square,
                    iteration,
                    Termination::stalled(accepted_step),
                ));
            }
        }
    }

    Ok(report(
        params,
        residuals,
        chi_square,
        settings.max_iterations,
        Termination::MaxIterations,
    ))
}

/// `J^T J` for an `observations x parameters` Jacobian.
pub fn normal_matrix(jacobian: &DenseMatrix) -> DenseMatrix {
    let parameters = jacobian.ncols();
    let mut normal = DenseMatrix::zeros(parameters, parameters);
    for row in 0..parameters {
        for col in row..parameters {
            let mut sum = 0.0;
            for observation in 0..jacobian.nrows() {
                sum += jacobian[(observation, row)] * jacobian[(observation, col)];
            }
            normal[(row, col)] = sum;
            normal[(col, row)] = sum;
        }
    }
    normal
}

fn gradient(jacobian: &DenseMatrix, residuals: &[f64]) -> Vec<f64> {
    (0..jacobian.ncols())
        .map(|col| {
            residuals
                .iter()
                .enumerate()
                .map(|(observation, residual)| jacobian[(observation, col)] * residual)
                .sum()
        })
        .collect()
}

fn damped_step(
    normal: &DenseMatrix,
    gradient: &[f64],
    damping: f64,
    diagonal_floor: f64,
) -> Result<Vec<f64>, CholeskyError> {
    let mut damped = normal.clone();
    for index in 0..gradient.len() {
        let diagonal = normal[(index, index)].max(diagonal_floor);
        damped[(index, index)] += damping * diagonal;
    }
    let rhs: Vec<f64> = gradient.iter().map(|value| -value).collect();
    cholesky_solve(&damped, &rhs)
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|value| value * value).sum()
}

fn report(
    params: Vec<f64>,
    residuals: Vec<f64>,
    chi_square: f64,
    iterations: usize,
    termination: Termination,
) -> LevMarReport {
    LevMarReport {
        params,
        residuals,
        chi_square,
        iterations,
        termination,
    }
}
