pub mod levmar;
pub mod linalg;
pub mod lineshape;

pub use levmar::{
    LeastSquaresProblem, LevMarError, LevMarReport, LevMarSettings, Termination, minimize,
    normal_matrix,
};
pub use linalg::{CholeskyError, symmetric_scaled_invert};
pub use lineshape::{PseudoVoigt, PseudoVoigtGradient};

use faer::Mat;

pub type DenseMatrix = Mat<f64>;
