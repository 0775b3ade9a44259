use nalgebra::{DMatrix, DVector};

use crate::errors::{NestedError, NestedResult};

/// Relative singular-value cutoff below which a design is treated as rank deficient.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Solution of a weighted linear least-squares problem.
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub params: Vec<f64>,
    /// `sum_k w_k (y_k - (A p)_k)^2` at the solution.
    pub chisq: f64,
    /// `ln det(A' W A)`.
    pub log_det: f64,
    /// `(A' W A)^-1`.
    pub covariance: DMatrix<f64>,
}

impl LinearFit {
    pub fn stdevs(&self) -> Vec<f64> {
        self.covariance.diagonal().iter().map(|v: &f64| v.max(0.0).sqrt()).collect()
    }
}

/// Minimise `sum_k w_k (y_k - (A p)_k)^2` through an SVD of `sqrt(W) A`.
pub fn weighted_least_squares(design: &DMatrix<f64>, target: &[f64], weights: &[f64]) -> NestedResult<LinearFit> {
    let (nrows, ncols) = design.shape();
    if target.len() != nrows || weights.len() != nrows {
        return Err(NestedError::invalid(format!(
            "design has {nrows} rows but {} targets and {} weights",
            target.len(),
            weights.len()
        )));
    }
    if nrows < ncols {
        return Err(NestedError::ConvergenceFailure(format!(
            "{ncols} parameters cannot be fitted to {nrows} values"
        )));
    }

    let roots: Vec<f64> = weights.iter().map(|w| w.max(0.0).sqrt()).collect();
    let scaled = DMatrix::from_fn(nrows, ncols, |k, j| roots[k] * design[(k, j)]);
    let rhs = DVector::from_iterator(nrows, target.iter().zip(&roots).map(|(y, r)| y * r));

    if ncols == 0 {
        return Ok(LinearFit {
            params: Vec::new(),
            chisq: rhs.norm_squared(),
            log_det: 0.0,
            covariance: DMatrix::zeros(0, 0),
        });
    }

    let svd = scaled.clone().svd(true, true);
    let singular = &svd.singular_values;
    let largest = singular.max();
    if !(largest > 0.0) || singular.min() <= SINGULAR_TOLERANCE * largest {
        return Err(NestedError::ConvergenceFailure(
            "design matrix is rank deficient".to_string(),
        ));
    }
    let solution = svd
        .solve(&rhs, 0.0)
        .map_err(|msg| NestedError::ConvergenceFailure(msg.to_string()))?;
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| NestedError::ConvergenceFailure("SVD without right vectors".to_string()))?;

    let inv_sq = DMatrix::from_diagonal(&singular.map(|s| 1.0 / (s * s)));
    let covariance = v_t.transpose() * inv_sq * v_t;
    let residual = &rhs - &scaled * &solution;

    Ok(LinearFit {
        params: solution.iter().copied().collect(),
        chisq: residual.norm_squared(),
        log_det: 2.0 * singular.iter().map(|s: &f64| s.ln()).sum::<f64>(),
        covariance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_line() {
        let x: [f64; 5] = [0.0, 1.0, 2.0, 3.0, 4.0];
        let design = DMatrix::from_fn(5, 2, |k, j| x[k].powi(j as i32));
        let target: Vec<f64> = x.iter().map(|x| 0.4 + 0.5 * x).collect();
        let fit = weighted_least_squares(&design, &target, &[1.0, 2.0, 1.0, 0.5, 1.0]).unwrap();
        assert!((fit.params[0] - 0.4).abs() < 1e-12 && (fit.params[1] - 0.5).abs() < 1e-12, "{:?}", fit.params);
        assert!(fit.chisq < 1e-20);
    }

    #[test]
    fn constant_fit_is_weighted_mean() {
        let design = DMatrix::from_element(3, 1, 1.0);
        let fit = weighted_least_squares(&design, &[1.0, 2.0, 4.0], &[1.0, 1.0, 2.0]).unwrap();
        assert!((fit.params[0] - 2.75).abs() < 1e-12);
        assert!((fit.log_det - 4.0f64.ln()).abs() < 1e-12);
        assert!((fit.stdevs()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rank_deficient_design_fails() {
        let design = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let err = weighted_least_squares(&design, &[1.0, 2.0, 3.0], &[1.0; 3]).unwrap_err();
        assert!(matches!(err, NestedError::ConvergenceFailure(_)), "{err}");
    }
}
