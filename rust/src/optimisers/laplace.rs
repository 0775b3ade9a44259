//! Laplace approximation of the evidence around the posterior mode.

use nalgebra::DMatrix;
use std::f64::consts::PI;

use super::{NelderMead, OptimisationResults, WithMaxIter, WithSigma0, WithThreshold};
use crate::distribution::{resolve_index, Likelihood};
use crate::errors::{NestedError, NestedResult};
use crate::prior::PriorRef;
use crate::problem::Problem;

const HESSIAN_STEP: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct LaplaceEvidence {
    /// Full `allpars` at the posterior mode.
    pub allpars: Vec<f64>,
    pub log_l: f64,
    pub log_z: f64,
    /// Standard deviations of the free coordinates from the inverse Hessian.
    pub stdevs: Vec<f64>,
    pub fit: OptimisationResults,
}

struct Posterior<'a> {
    problem: &'a Problem,
    likelihood: &'a Likelihood,
    base: Vec<f64>,
    free: Vec<usize>,
    priors: Vec<PriorRef>,
}

impl Posterior<'_> {
    fn allpars(&self, point: &[f64]) -> Vec<f64> {
        let mut allpars = self.base.clone();
        for (pos, value) in self.free.iter().zip(point) {
            allpars[*pos] = *value;
        }
        allpars
    }

    fn log_prior(&self, point: &[f64]) -> f64 {
        self.priors.iter().zip(point).map(|(p, x)| p.log_result(*x)).sum()
    }

    fn neg_log_post(&self, point: &[f64]) -> f64 {
        let prior = self.log_prior(point);
        if !prior.is_finite() {
            return f64::INFINITY;
        }
        -(self.likelihood.log_likelihood(self.problem, &self.allpars(point)) + prior)
    }

    fn hessian(&self, point: &[f64]) -> DMatrix<f64> {
        let d = point.len();
        let steps: Vec<f64> = point.iter().map(|x| HESSIAN_STEP * (1.0 + x.abs())).collect();
        let f = |shift: &[(usize, f64)]| {
            let mut p = point.to_vec();
            for (k, h) in shift {
                p[*k] += h;
            }
            self.neg_log_post(&p)
        };
        let f0 = f(&[]);
        let mut hess = DMatrix::zeros(d, d);
        for a in 0..d {
            let ha = steps[a];
            hess[(a, a)] = (f(&[(a, ha)]) - 2.0 * f0 + f(&[(a, -ha)])) / (ha * ha);
            for b in 0..a {
                let hb = steps[b];
                let value = (f(&[(a, ha), (b, hb)]) - f(&[(a, ha), (b, -hb)]) - f(&[(a, -ha), (b, hb)])
                    + f(&[(a, -ha), (b, -hb)]))
                    / (4.0 * ha * hb);
                hess[(a, b)] = value;
                hess[(b, a)] = value;
            }
        }
        hess
    }
}

/// Evidence from a Gaussian approximation of the posterior at its mode.
///
/// Free coordinates are the problem parameters plus the free hyperparameters of
/// `likelihood`; every free coordinate needs a prior. `initial` defaults to the prior
/// medians.
pub fn laplace_evidence(problem: &Problem, likelihood: &Likelihood, initial: Option<Vec<f64>>) -> NestedResult<LaplaceEvidence> {
    let np = problem.npars();
    let len = np + likelihood.nhyper();
    let mut free: Vec<usize> = (0..np).collect();
    free.extend(
        likelihood
            .free_hyper_index()
            .into_iter()
            .filter_map(|k| resolve_index(k, np, len)),
    );
    let priors = free
        .iter()
        .map(|pos| {
            likelihood.prior(problem, *pos).ok_or_else(|| {
                NestedError::LimitViolation(format!("parameter {pos} has no prior"))
            })
        })
        .collect::<NestedResult<Vec<_>>>()?;

    let mut base = vec![0.0; np];
    base.extend_from_slice(likelihood.hyper_values());
    let start = match initial {
        Some(start) if start.len() == free.len() => start,
        Some(start) => {
            return Err(NestedError::invalid(format!(
                "{} starting values for {} free coordinates",
                start.len(),
                free.len()
            )))
        }
        None => priors.iter().map(|p| p.unit_to_domain(0.5)).collect(),
    };

    let posterior = Posterior {
        problem,
        likelihood,
        base,
        free,
        priors,
    };

    let optimiser = NelderMead::new()
        .with_max_iter(2000 * (posterior.free.len() + 1))
        .with_threshold(1e-10)
        .with_sigma0(0.1)
        .with_position_tolerance(1e-9)
        .with_strict_convergence();
    let first = optimiser.run(|p: &[f64]| posterior.neg_log_post(p), start);
    // restart once from the best vertex
    let fit = optimiser.run(|p: &[f64]| posterior.neg_log_post(p), first.x.clone());
    if !fit.fun.is_finite() {
        return Err(NestedError::ConvergenceFailure(format!(
            "no finite posterior found: {}",
            fit.message
        )));
    }

    let d = posterior.free.len();
    let hessian = posterior.hessian(&fit.x);
    let Some(chol) = hessian.clone().cholesky() else {
        return Err(NestedError::ConvergenceFailure(
            "Hessian at the posterior mode is not positive definite".to_string(),
        ));
    };
    let log_det = 2.0 * chol.l().diagonal().iter().map(|v: &f64| v.ln()).sum::<f64>();
    let covariance = chol.inverse();
    let allpars = posterior.allpars(&fit.x);
    let log_l = likelihood.log_likelihood(problem, &allpars);

    log::debug!(
        "Laplace evidence over {d} coordinates: {} after {} iterations",
        fit.message,
        fit.nit
    );

    Ok(LaplaceEvidence {
        log_z: -fit.fun + 0.5 * d as f64 * (2.0 * PI).ln() - 0.5 * log_det,
        stdevs: covariance.diagonal().iter().map(|v: &f64| v.max(0.0).sqrt()).collect(),
        allpars,
        log_l,
        fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_support::line_problem;
    use crate::distribution::{ErrorDistribution, ModelDistribution};

    #[test]
    fn agrees_with_linear_evidence() {
        let problem = line_problem();
        let likelihood = Likelihood::from_name("gauss").unwrap().with_hyper_values(&[0.3]);
        let laplace = laplace_evidence(&problem, &likelihood, None).unwrap();
        let exact = ModelDistribution.log_likelihood(&problem, &[0.0, 0.0, 0.3]);
        assert!((laplace.log_z - exact).abs() < 1e-3, "{} vs {exact}", laplace.log_z);
        assert!(laplace.stdevs.iter().all(|s| *s > 0.0));
        assert_eq!(laplace.allpars.len(), 3);
    }

    #[test]
    fn missing_prior_is_a_limit_violation() {
        let xdata = vec![0.0, 1.0, 2.0];
        let model = crate::model::PolynomialModel::new(0);
        let problem = Problem::classic(Box::new(model), xdata, vec![1.0, 1.1, 0.9]).unwrap();
        let likelihood = Likelihood::from_name("gauss").unwrap();
        assert!(problem.prior(0).is_none());
        let err = laplace_evidence(&problem, &likelihood, None).unwrap_err();
        assert!(matches!(err, NestedError::LimitViolation(_)));
    }
}
