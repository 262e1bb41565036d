//! Pseudo-Voigt peak profile parameterised by its full width at half maximum.
//!
//! `f(x) = I * [eta * L(x) + (1 - eta) * G(x)]` with
//! `G(x) = exp(-4 ln2 u^2)`, `L(x) = 1 / (1 + 4 u^2)` and `u = (x - x0) / w`.
//! Both components share the same FWHM `w`, so `f(x0 +- w/2) = I / 2` for
//! every mixing factor `eta`.

use std::f64::consts::LN_2;

const FOUR_LN2: f64 = 4.0 * LN_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoVoigt {
    pub position: f64,
    pub intensity: f64,
    pub fwhm: f64,
    pub shape_factor: f64,
}

/// Partial derivatives of the profile at one abscissa.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoVoigtGradient {
    pub d_position: f64,
    pub d_intensity: f64,
    pub d_fwhm: f64,
    pub d_shape_factor: f64,
}

impl PseudoVoigt {
    pub fn new(position: f64, intensity: f64, fwhm: f64, shape_factor: f64) -> Self {
        Self {
            position,
            intensity,
            fwhm,
            shape_factor,
        }
    }

    fn components(&self, x: f64) -> (f64, f64, f64) {
        let u = (x - self.position) / self.fwhm;
        let gaussian = (-FOUR_LN2 * u * u).exp();
        let lorentzian = 1.0 / (1.0 + 4.0 * u * u);
        (u, gaussian, lorentzian)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let (_, gaussian, lorentzian) = self.components(x);
        self.intensity
            * (self.shape_factor * lorentzian + (1.0 - self.shape_factor) * gaussian)
    }

    pub fn gradient(&self, x: f64) -> PseudoVoigtGradient {
        let (u, gaussian, lorentzian) = self.components(x);
        let eta = self.shape_factor;
        let w = self.fwhm;

        let dg_dx0 = gaussian * 2.0 * FOUR_LN2 * u / w;
        let dg_dw = dg_dx0 * u;
        let dl_dx0 = lorentzian * lorentzian * 8.0 * u / w;
        let dl_dw = dl_dx0 * u;

        PseudoVoigtGradient {
            d_position: self.intensity * (eta * dl_dx0 + (1.0 - eta) * dg_dx0),
            d_intensity: eta * lorentzian + (1.0 - eta) * gaussian,
            d_fwhm: self.intensity * (eta * dl_dw + (1.0 - eta) * dg_dw),
            d_shape_factor: self.intensity * (lorentzian - gaussian),
        }
    }
}
