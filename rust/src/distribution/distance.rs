use nalgebra::DMatrix;

use super::{split_pars, ErrorDistribution};
use crate::problem::Problem;

/// Minus the length of the closed tour encoded in the parameters.
///
/// Only meaningful for ordering problems; weights are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceDistribution;

impl ErrorDistribution for DistanceDistribution {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn accepts_weight(&self) -> bool {
        false
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        let (pars, _) = split_pars(problem, allpars);
        problem.result(pars).into_iter().map(|leg| -leg).collect()
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, _) = split_pars(problem, allpars);
        match problem.tour() {
            Some(tour) => -tour.length(pars),
            None => f64::NEG_INFINITY,
        }
    }

    /// Recomputes every leg from the city coordinates instead of the table.
    fn log_likelihood_alt(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, _) = split_pars(problem, allpars);
        let Some(tour) = problem.tour() else {
            return f64::NEG_INFINITY;
        };
        let coords = tour.coords();
        let mut length = 0.0;
        for k in 0..pars.len() {
            let (a, b) = (pars[k], pars[(k + 1) % pars.len()]);
            let (Some(ca), Some(cb)) = (coords.get(a as usize), coords.get(b as usize)) else {
                return f64::NEG_INFINITY;
            };
            if a < 0.0 || b < 0.0 {
                return f64::NEG_INFINITY;
            }
            length += tour.distance().between(*ca, *cb);
        }
        -length
    }

    fn partial_log_l_data(&self, problem: &Problem, _allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        DMatrix::zeros(problem.ndata(), positions.len())
    }
}
