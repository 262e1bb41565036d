//! Cholesky factorisation for the symmetric positive-definite normal
//! matrices `J^T J` of the least-squares fits.

use super::DenseMatrix;

/// A pivot below this fraction of its original diagonal entry is treated as
/// lost to cancellation.
const RELATIVE_PIVOT_FLOOR: f64 = 1.0e-13;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CholeskyError {
    #[error("expected a non-empty square matrix, got {rows}x{cols}")]
    Shape { rows: usize, cols: usize },
    #[error("matrix is not positive definite at pivot {pivot_index}")]
    NotPositiveDefinite { pivot_index: usize },
    #[error("right-hand side has {actual} entries, matrix has {expected} rows")]
    RhsLength { expected: usize, actual: usize },
}

/// Lower-triangular `L` with `A = L L^T`.
struct Cholesky {
    lower: DenseMatrix,
}

impl Cholesky {
    fn factor(matrix: &DenseMatrix) -> Result<Self, CholeskyError> {
        let n = square_dimension(matrix)?;
        let mut lower = DenseMatrix::zeros(n, n);
        for col in 0..n {
            let original = matrix[(col, col)];
            let pivot = original - (0..col).map(|k| lower[(col, k)].powi(2)).sum::<f64>();
            if !(original.is_finite() && pivot > original * RELATIVE_PIVOT_FLOOR) {
                return Err(CholeskyError::NotPositiveDefinite { pivot_index: col });
            }
            let root = pivot.sqrt();
            lower[(col, col)] = root;
            for row in col + 1..n {
                let dot: f64 = (0..col).map(|k| lower[(row, k)] * lower[(col, k)]).sum();
                lower[(row, col)] = (matrix[(row, col)] - dot) / root;
            }
        }
        Ok(Self { lower })
    }

    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, CholeskyError> {
        let n = self.lower.nrows();
        if rhs.len() != n {
            return Err(CholeskyError::RhsLength {
                expected: n,
                actual: rhs.len(),
            });
        }
        // L y = b
        let mut x = rhs.to_vec();
        for row in 0..n {
            let dot: f64 = (0..row).map(|k| self.lower[(row, k)] * x[k]).sum();
            x[row] = (x[row] - dot) / self.lower[(row, row)];
        }
        // L^T x = y
        for row in (0..n).rev() {
            let dot: f64 = (row + 1..n).map(|k| self.lower[(k, row)] * x[k]).sum();
            x[row] = (x[row] - dot) / self.lower[(row, row)];
        }
        Ok(x)
    }
}

fn square_dimension(matrix: &DenseMatrix) -> Result<usize, CholeskyError> {
    let (rows, cols) = (matrix.nrows(), matrix.ncols());
    if rows == 0 || rows != cols {
        return Err(CholeskyError::Shape { rows, cols });
    }
    Ok(rows)
}

/// Solves `A x = rhs` for symmetric positive-definite `A`.
pub fn cholesky_solve(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, CholeskyError> {
    Cholesky::factor(matrix)?.solve(rhs)
}

/// Inverse of a symmetric positive-definite matrix, factored on the
/// unit-diagonal rescaling `D^-1/2 A D^-1/2` so parameters of very different
/// magnitude share one conditioning threshold.
pub fn symmetric_scaled_invert(matrix: &DenseMatrix) -> Result<DenseMatrix, CholeskyError> {
    let n = square_dimension(matrix)?;
    let mut scale = Vec::with_capacity(n);
    for index in 0..n {
        let diagonal = matrix[(index, index)];
        if !(diagonal.is_finite() && diagonal > 0.0) {
            return Err(CholeskyError::NotPositiveDefinite { pivot_index: index });
        }
        scale.push(diagonal.sqrt());
    }

    let scaled = DenseMatrix::from_fn(n, n, |row, col| {
        matrix[(row, col)] / (scale[row] * scale[col])
    });
    let factor = Cholesky::factor(&scaled)?;

    let mut inverse = DenseMatrix::zeros(n, n);
    let mut basis = vec![0.0; n];
    for col in 0..n {
        basis.fill(0.0);
        basis[col] = 1.0;
        for (row, value) in factor.solve(&basis)?.into_iter().enumerate() {
            inverse[(row, col)] = value / (scale[row] * scale[col]);
        }
    }
    Ok(inverse)
}

#[cfg(test)]
mod tests {
    use super::{CholeskyError, cholesky_solve, symmetric_scaled_invert};
    use crate::numerics::DenseMatrix;

    fn matrix(rows: &[&[f64]]) -> DenseMatrix {
        DenseMatrix::from_fn(rows.len(), rows[0].len(), |row, col| rows[row][col])
    }

    #[test]
    fn solves_a_positive_definite_system() {
        let a = matrix(&[&[4.0, 2.0, 0.4], &[2.0, 5.0, 1.0], &[0.4, 1.0, 3.0]]);
        let expected = [1.0, -2.0, 0.5];
        let rhs: Vec<f64> = (0..3)
            .map(|row| (0..3).map(|col| a[(row, col)] * expected[col]).sum())
            .collect();

        let x = cholesky_solve(&a, &rhs).expect("positive definite");
        for (actual, expected) in x.iter().zip(expected) {
            assert!((actual - expected).abs() < 1.0e-12, "{actual} vs {expected}");
        }
    }

    #[test]
    fn rejects_semidefinite_and_misshaped_input() {
        let rank_one = matrix(&[&[1.0, 2.0], &[2.0, 4.0]]);
        assert_eq!(
            cholesky_solve(&rank_one, &[1.0, 1.0]).expect_err("rank deficient"),
            CholeskyError::NotPositiveDefinite { pivot_index: 1 }
        );
        assert_eq!(
            cholesky_solve(&DenseMatrix::zeros(2, 3), &[1.0, 1.0]).expect_err("not square"),
            CholeskyError::Shape { rows: 2, cols: 3 }
        );
        let identity = matrix(&[&[1.0, 0.0], &[0.0, 1.0]]);
        assert_eq!(
            cholesky_solve(&identity, &[1.0]).expect_err("short rhs"),
            CholeskyError::RhsLength {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn scaled_inverse_handles_mixed_parameter_magnitudes() {
        let a = matrix(&[&[4.0e12, 2.0e3], &[2.0e3, 3.0e-3]]);
        let inverse = symmetric_scaled_invert(&a).expect("scaled inverse");
        for row in 0..2 {
            for col in 0..2 {
                let product: f64 = (0..2).map(|k| a[(row, k)] * inverse[(k, col)]).sum();
                let expected = if row == col { 1.0 } else { 0.0 };
                assert!((product - expected).abs() < 1.0e-8, "({row},{col}) = {product}");
            }
        }
    }

    #[test]
    fn scaled_inverse_rejects_zero_diagonal() {
        let a = matrix(&[&[1.0, 0.0], &[0.0, 0.0]]);
        assert_eq!(
            symmetric_scaled_invert(&a).expect_err("zero diagonal"),
            CholeskyError::NotPositiveDefinite { pivot_index: 1 }
        );
    }
}
