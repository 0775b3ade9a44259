//! Bivariate normal noise on `(x, y)` for errors-in-x-and-y problems.

use nalgebra::{DMatrix, Matrix2, Vector2};
use std::f64::consts::PI;

use super::{split_pars, weighted_sum, ErrorDistribution, Hyper};
use crate::problem::Problem;

/// Per-datum covariance `scale^2 * C_i`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gauss2dDistribution;

fn scale_of(hyper: &[f64]) -> f64 {
    hyper.first().copied().unwrap_or(1.0)
}

impl ErrorDistribution for Gauss2dDistribution {
    fn name(&self) -> &'static str {
        "gauss2d"
    }

    fn hypers(&self) -> Vec<Hyper> {
        vec![Hyper::scale()]
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        let (pars, hyper) = split_pars(problem, allpars);
        let s = scale_of(hyper);
        let Some(errors) = problem.xy_errors() else {
            return vec![f64::NEG_INFINITY; problem.ndata()];
        };
        if !(s > 0.0) {
            return vec![f64::NEG_INFINITY; problem.ndata()];
        }
        let res = problem.residuals(pars, None);
        (0..problem.ndata())
            .map(|i| {
                let q = errors.quadratic(i, res[2 * i], res[2 * i + 1]);
                -0.5 * q / (s * s) - (2.0 * PI).ln() - 2.0 * s.ln() - 0.5 * errors.determinant(i).ln()
            })
            .collect()
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, hyper) = split_pars(problem, allpars);
        let s = scale_of(hyper);
        let Some(errors) = problem.xy_errors() else {
            return f64::NEG_INFINITY;
        };
        if !(s > 0.0) {
            return f64::NEG_INFINITY;
        }
        let chisq: f64 = problem.weighted_res_sq(pars).iter().sum();
        let log_dets: Vec<f64> = (0..problem.ndata()).map(|i| errors.determinant(i).ln()).collect();
        -0.5 * chisq / (s * s)
            - problem.sum_weight() * ((2.0 * PI).ln() + 2.0 * s.ln())
            - 0.5 * weighted_sum(problem, &log_dets)
    }

    /// Full 2x2 density per datum with the covariance inverted by nalgebra.
    fn log_likelihood_alt(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, hyper) = split_pars(problem, allpars);
        let s = scale_of(hyper);
        let Some(errors) = problem.xy_errors() else {
            return f64::NEG_INFINITY;
        };
        let res = problem.residuals(pars, None);
        let data: Vec<f64> = (0..problem.ndata())
            .map(|i| {
                let [sxx, sxy, syy] = errors.covariance(i);
                let cov = Matrix2::new(sxx, sxy, sxy, syy) * (s * s);
                let Some(inv) = cov.try_inverse() else {
                    return f64::NEG_INFINITY;
                };
                let r = Vector2::new(res[2 * i], res[2 * i + 1]);
                -0.5 * r.dot(&(inv * r)) - (2.0 * PI).ln() - 0.5 * cov.determinant().ln()
            })
            .collect();
        weighted_sum(problem, &data)
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        let (pars, hyper) = split_pars(problem, allpars);
        let n = problem.ndata();
        let np = pars.len();
        let s = scale_of(hyper);
        let Some(errors) = problem.xy_errors() else {
            return DMatrix::zeros(n, positions.len());
        };
        let model_np = problem.model_npars();
        let res = problem.residuals(pars, None);
        let jac = problem.partial(pars);
        let s2 = s * s;
        DMatrix::from_fn(n, positions.len(), |i, j| {
            let pos = positions[j];
            let (u, v) = errors.solve(i, res[2 * i], res[2 * i + 1]);
            if pos < np {
                // rx depends only on this datum's nuisance x
                let dx = if pos == model_np + i { u } else { 0.0 };
                (v * jac[(i, pos)] + dx) / s2
            } else if pos == np {
                errors.quadratic(i, res[2 * i], res[2 * i + 1]) / (s2 * s) - 2.0 / s
            } else {
                0.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_support::check_consistency;
    use crate::model::{PolynomialModel, WithPriors};
    use crate::prior::{PriorExt, UniformPrior};

    fn problem() -> Problem {
        let model = PolynomialModel::new(1).with_prior(UniformPrior::new(-5.0, 5.0).shared());
        Problem::errors_in_xy(
            Box::new(model),
            vec![0.0, 1.0, 2.5, 3.0, 4.2],
            vec![0.3, 1.2, 2.4, 3.3, 4.0],
            vec![
                [[0.2, 0.05], [0.05, 0.3]],
                [[0.1, 0.0], [0.0, 0.1]],
                [[0.3, -0.1], [-0.1, 0.2]],
                [[0.2, 0.0], [0.0, 0.4]],
                [[0.25, 0.02], [0.02, 0.15]],
            ],
        )
        .unwrap()
    }

    #[test]
    fn consistent_including_nuisance_parameters() {
        let allpars = [0.1, 0.95, 0.1, 1.1, 2.3, 3.2, 4.0, 1.3];
        let fit_index: Vec<isize> = (0..8).collect();
        check_consistency(&Gauss2dDistribution, &problem(), &allpars, &fit_index);
    }

    #[test]
    fn weighted_sum_matches_reference() {
        let problem = problem().with_weights(vec![1.0, 2.0, 0.5, 1.0, 1.5]).unwrap();
        let allpars = [0.0, 1.0, 0.0, 1.0, 2.5, 3.0, 4.2, 0.8];
        check_consistency(&Gauss2dDistribution, &problem, &allpars, &[0, 3, -1]);
    }
}
