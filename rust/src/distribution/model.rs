//! Evidence of the model structure with its parameters integrated out.
//!
//! The model is linearised around the walker's parameters; the Gaussian integral over
//! the parameters is then exact for models linear in them and a Laplace approximation
//! otherwise.

use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

use super::{observed, split_pars, ErrorDistribution, Hyper, NUMERIC_STEP};
use crate::optimisers::linear::weighted_least_squares;
use crate::problem::Problem;

#[derive(Debug, Clone, Copy, Default)]
pub struct ModelDistribution;

/// Linearised problem: design matrix, target and precision weights per element.
struct Linearised {
    design: DMatrix<f64>,
    target: Vec<f64>,
    precision: Vec<f64>,
    /// `sum_k w_k (ln s_k + 0.5 ln 2pi)`
    norm: f64,
}

fn linearise(problem: &Problem, pars: &[f64], scale: f64) -> Linearised {
    let ydata = observed(problem);
    let fit = problem.result(pars);
    let design = problem.partial(pars);
    let weights = problem.element_weights();
    let mut precision = Vec::with_capacity(ydata.len());
    let mut target = Vec::with_capacity(ydata.len());
    let mut norm = 0.0;
    for k in 0..ydata.len() {
        let w = weights.as_ref().map_or(1.0, |w| w[k]);
        let acc = problem.element_accuracy(k);
        let s = if acc > 0.0 { scale.hypot(acc) } else { scale };
        precision.push(w / (s * s));
        norm += w * (s.ln() + 0.5 * (2.0 * PI).ln());
        let offset: f64 = (0..pars.len()).map(|j| design[(k, j)] * pars[j]).sum();
        target.push(ydata[k] - fit[k] + offset);
    }
    Linearised {
        design,
        target,
        precision,
        norm,
    }
}

/// Sum of parameter log priors at `beta`; `None` when a prior is missing.
fn log_prior(problem: &Problem, beta: &[f64]) -> Option<f64> {
    (0..beta.len())
        .map(|j| problem.prior(j).map(|p| p.log_result(beta[j])))
        .sum()
}

fn assemble(problem: &Problem, lin: &Linearised, beta: &[f64], chisq: f64, log_det: f64) -> f64 {
    let Some(prior) = log_prior(problem, beta) else {
        return f64::NEG_INFINITY;
    };
    let np = beta.len() as f64;
    -0.5 * chisq - lin.norm + prior + 0.5 * np * (2.0 * PI).ln() - 0.5 * log_det
}

fn scale_of(hyper: &[f64]) -> f64 {
    hyper.first().copied().unwrap_or(1.0)
}

impl ErrorDistribution for ModelDistribution {
    fn name(&self) -> &'static str {
        "model"
    }

    fn hypers(&self) -> Vec<Hyper> {
        vec![Hyper::scale()]
    }

    /// The evidence is a single number for the whole data set.
    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        vec![self.log_likelihood(problem, allpars)]
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, hyper) = split_pars(problem, allpars);
        let scale = scale_of(hyper);
        if !(scale > 0.0) {
            return f64::NEG_INFINITY;
        }
        let lin = linearise(problem, pars, scale);
        let np = pars.len();
        let nk = lin.target.len();

        let mut ata = DMatrix::zeros(np, np);
        let mut atb = DVector::zeros(np);
        let mut chisq = 0.0;
        for k in 0..nk {
            let w = lin.precision[k];
            chisq += w * lin.target[k] * lin.target[k];
            for a in 0..np {
                atb[a] += w * lin.design[(k, a)] * lin.target[k];
                for b in 0..np {
                    ata[(a, b)] += w * lin.design[(k, a)] * lin.design[(k, b)];
                }
            }
        }
        if np == 0 {
            return assemble(problem, &lin, &[], chisq, 0.0);
        }
        let Some(chol) = ata.clone().cholesky() else {
            return f64::NEG_INFINITY;
        };
        let beta = chol.solve(&atb);
        // chisq at the minimum: y'Wy - b'beta
        let chisq = chisq - atb.dot(&beta);
        let log_det = 2.0 * chol.l().diagonal().iter().map(|d: &f64| d.ln()).sum::<f64>();
        assemble(problem, &lin, beta.as_slice(), chisq.max(0.0), log_det)
    }

    /// Same evidence through an SVD least-squares solve.
    fn log_likelihood_alt(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, hyper) = split_pars(problem, allpars);
        let scale = scale_of(hyper);
        if !(scale > 0.0) {
            return f64::NEG_INFINITY;
        }
        let lin = linearise(problem, pars, scale);
        match weighted_least_squares(&lin.design, &lin.target, &lin.precision) {
            Ok(fit) => assemble(problem, &lin, &fit.params, fit.chisq, fit.log_det),
            Err(_) => f64::NEG_INFINITY,
        }
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        let np = problem.npars();
        let mut shifted = allpars.to_vec();
        DMatrix::from_fn(1, positions.len(), |_, j| {
            let pos = positions[j];
            if pos < np {
                return 0.0;
            }
            let h = NUMERIC_STEP * (1.0 + allpars[pos].abs());
            shifted[pos] = allpars[pos] + h;
            let up = self.log_likelihood(problem, &shifted);
            shifted[pos] = allpars[pos] - h;
            let down = self.log_likelihood(problem, &shifted);
            shifted[pos] = allpars[pos];
            (up - down) / (2.0 * h)
        })
    }

    /// Parameters are integrated out, so only the scale carries a gradient.
    fn partial_log_l(&self, problem: &Problem, allpars: &[f64], fit_index: &[isize]) -> Vec<f64> {
        let positions = super::resolve_all(fit_index, problem.npars(), allpars.len());
        self.partial_log_l_data(problem, allpars, &positions)
            .row(0)
            .iter()
            .copied()
            .collect()
    }
}
