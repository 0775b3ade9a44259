use nalgebra::DMatrix;
use statrs::function::gamma::ln_gamma;

use super::{observed, split_pars, weighted_sum, ErrorDistribution};
use crate::problem::Problem;

/// Counts drawn with rate equal to the model prediction. No hyperparameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonDistribution;

fn log_term(count: f64, rate: f64) -> f64 {
    if rate < 0.0 || rate.is_nan() {
        return f64::NEG_INFINITY;
    }
    if rate == 0.0 {
        return if count == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    count * rate.ln() - rate - ln_gamma(count + 1.0)
}

impl ErrorDistribution for PoissonDistribution {
    fn name(&self) -> &'static str {
        "poisson"
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        let (pars, _) = split_pars(problem, allpars);
        problem
            .result(pars)
            .iter()
            .zip(observed(problem))
            .map(|(rate, count)| log_term(count, *rate))
            .collect()
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, _) = split_pars(problem, allpars);
        let rates = problem.result(pars);
        if rates.iter().any(|r| *r < 0.0 || r.is_nan()) {
            return f64::NEG_INFINITY;
        }
        let counts = observed(problem);
        if rates.iter().zip(&counts).any(|(r, c)| *r == 0.0 && *c > 0.0) {
            return f64::NEG_INFINITY;
        }
        let log_rates: Vec<f64> = rates
            .iter()
            .zip(&counts)
            .map(|(r, c)| if *c == 0.0 { 0.0 } else { c * r.ln() })
            .collect();
        let norms: Vec<f64> = counts.iter().map(|c| ln_gamma(c + 1.0)).collect();
        weighted_sum(problem, &log_rates) - weighted_sum(problem, &rates) - weighted_sum(problem, &norms)
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        let (pars, _) = split_pars(problem, allpars);
        let rates = problem.result(pars);
        let counts = observed(problem);
        let jac = problem.partial(pars);
        DMatrix::from_fn(rates.len(), positions.len(), |k, j| {
            let pos = positions[j];
            if pos < pars.len() {
                (counts[k] / rates[k] - 1.0) * jac[(k, pos)]
            } else {
                0.0
            }
        })
    }
}
