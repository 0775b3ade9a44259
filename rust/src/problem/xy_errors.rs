use crate::errors::{NestedError, NestedResult};
use crate::prior::{PriorExt, PriorRef, UniformPrior};

/// Per-datum 2x2 covariance of `(x, y)` with its inverse and determinant cached.
#[derive(Debug, Clone)]
pub struct XYErrors {
    /// `(var_x, cov, var_y)` per datum.
    covariance: Vec<[f64; 3]>,
    /// `(inv_xx, inv_xy, inv_yy)` per datum.
    inverse: Vec<[f64; 3]>,
    determinant: Vec<f64>,
    nuisance: PriorRef,
}

impl XYErrors {
    pub(super) fn new(xdata: &[f64], covariance: Vec<[[f64; 2]; 2]>) -> NestedResult<Self> {
        let n = xdata.len();
        let covariance = match covariance.len() {
            1 => vec![covariance[0]; n],
            len if len == n => covariance,
            len => {
                return Err(NestedError::invalid(format!(
                    "{len} covariance matrices for {n} data points"
                )))
            }
        };

        let mut entries = Vec::with_capacity(n);
        let mut inverse = Vec::with_capacity(n);
        let mut determinant = Vec::with_capacity(n);
        for (i, c) in covariance.iter().enumerate() {
            let (sxx, sxy, syy) = (c[0][0], 0.5 * (c[0][1] + c[1][0]), c[1][1]);
            let det = sxx * syy - sxy * sxy;
            if !(det.is_finite() && det > 0.0 && sxx > 0.0) {
                return Err(NestedError::invalid(format!(
                    "covariance of datum {i} is not positive definite"
                )));
            }
            entries.push([sxx, sxy, syy]);
            inverse.push([syy / det, -sxy / det, sxx / det]);
            determinant.push(det);
        }

        let low = xdata.iter().copied().fold(f64::INFINITY, f64::min);
        let high = xdata.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let half = if high > low { 0.5 * (high - low) } else { 1.0 };
        Ok(Self {
            covariance: entries,
            inverse,
            determinant,
            nuisance: UniformPrior::new(low - half, high + half).shared(),
        })
    }

    /// `r^T C^-1 r` for datum `i`.
    pub fn quadratic(&self, i: usize, rx: f64, ry: f64) -> f64 {
        let [a, b, c] = self.inverse[i];
        a * rx * rx + 2.0 * b * rx * ry + c * ry * ry
    }

    /// `C^-1 r` for datum `i`.
    pub fn solve(&self, i: usize, rx: f64, ry: f64) -> (f64, f64) {
        let [a, b, c] = self.inverse[i];
        (a * rx + b * ry, b * rx + c * ry)
    }

    pub fn covariance(&self, i: usize) -> [f64; 3] {
        self.covariance[i]
    }

    pub fn determinant(&self, i: usize) -> f64 {
        self.determinant[i]
    }

    /// Uniform over the x-range widened by half its span on either side.
    pub fn nuisance_prior(&self) -> PriorRef {
        self.nuisance.clone()
    }
}
