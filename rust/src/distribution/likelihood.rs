use std::fmt;
use std::sync::Arc;

use super::{distribution_from_name, resolve_all, ErrorDistribution, NUMERIC_STEP};
use crate::errors::{NestedError, NestedResult};
use crate::prior::PriorRef;
use crate::problem::Problem;

/// Extra log-likelihood term added to every evaluation.
pub type Constraint = Arc<dyn Fn(&Problem, &[f64]) -> f64 + Send + Sync>;

/// An error distribution with the sampling status of its hyperparameters.
///
/// A hyperparameter is free, and sampled under a prior, only when limits were given
/// for it. Otherwise it stays at its fixed value.
#[derive(Clone)]
pub struct Likelihood {
    distribution: Arc<dyn ErrorDistribution>,
    hyper_priors: Vec<Option<PriorRef>>,
    hyper_values: Vec<f64>,
    constrain: Option<Constraint>,
}

impl fmt::Debug for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Likelihood")
            .field("distribution", &self.distribution.name())
            .field("hyper_values", &self.hyper_values)
            .field("free", &self.free_hyper_index())
            .field("constrained", &self.constrain.is_some())
            .finish()
    }
}

impl Likelihood {
    pub fn new(distribution: Arc<dyn ErrorDistribution>) -> Self {
        let hypers = distribution.hypers();
        Self {
            hyper_priors: vec![None; hypers.len()],
            hyper_values: hypers.iter().map(|h| h.default).collect(),
            distribution,
            constrain: None,
        }
    }

    pub fn from_name(name: &str) -> NestedResult<Self> {
        Ok(Self::new(distribution_from_name(name)?))
    }

    /// Limits for the leading hyperparameters; each one given becomes free.
    pub fn with_limits(mut self, limits: &[(f64, f64)]) -> NestedResult<Self> {
        let hypers = self.distribution.hypers();
        if limits.len() > hypers.len() {
            return Err(NestedError::invalid(format!(
                "{} limits given but the {} distribution has {} hyperparameters",
                limits.len(),
                self.distribution.name(),
                hypers.len()
            )));
        }
        for (j, (low, high)) in limits.iter().enumerate() {
            let prior = hypers[j].kind.prior(*low, *high)?;
            let value = self.hyper_values[j];
            if prior.is_out_of_limits(value) {
                self.hyper_values[j] = prior.unit_to_domain(0.5);
            }
            self.hyper_priors[j] = Some(prior);
        }
        Ok(self)
    }

    /// Fixed (or starting) values for the leading hyperparameters.
    pub fn with_hyper_values(mut self, values: &[f64]) -> Self {
        for (slot, value) in self.hyper_values.iter_mut().zip(values) {
            *slot = *value;
        }
        self
    }

    pub fn with_constrain<F>(mut self, constrain: F) -> Self
    where
        F: Fn(&Problem, &[f64]) -> f64 + Send + Sync + 'static,
    {
        self.constrain = Some(Arc::new(constrain));
        self
    }

    pub fn distribution(&self) -> &dyn ErrorDistribution {
        self.distribution.as_ref()
    }

    pub fn nhyper(&self) -> usize {
        self.hyper_values.len()
    }

    pub fn hyper_values(&self) -> &[f64] {
        &self.hyper_values
    }

    pub fn hyper_names(&self) -> Vec<&'static str> {
        self.distribution.hypers().iter().map(|h| h.name).collect()
    }

    /// `fit_index` entries of the free hyperparameters: `-k` for the k-th one.
    pub fn free_hyper_index(&self) -> Vec<isize> {
        (0..self.nhyper())
            .filter(|j| self.hyper_priors[*j].is_some())
            .map(|j| -((j + 1) as isize))
            .collect()
    }

    pub fn hyper_prior(&self, j: usize) -> Option<PriorRef> {
        self.hyper_priors.get(j).cloned().flatten()
    }

    /// Prior at absolute position `pos` of `allpars`.
    pub fn prior(&self, problem: &Problem, pos: usize) -> Option<PriorRef> {
        let np = problem.npars();
        if pos < np {
            problem.prior(pos)
        } else {
            self.hyper_prior(pos - np)
        }
    }

    /// Rejects problem features the distribution cannot honour.
    pub fn check(&self, problem: &Problem) -> NestedResult<()> {
        if problem.has_weights() && !self.distribution.accepts_weight() {
            return Err(NestedError::invalid(format!(
                "the {} distribution does not accept weights",
                self.distribution.name()
            )));
        }
        Ok(())
    }

    /// Log-likelihood with NaN mapped to `-inf`.
    pub fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let mut logl = self.distribution.log_likelihood(problem, allpars);
        if let Some(constrain) = &self.constrain {
            logl += constrain(problem, allpars);
        }
        if logl.is_nan() {
            f64::NEG_INFINITY
        } else {
            logl
        }
    }

    pub fn partial_log_l(&self, problem: &Problem, allpars: &[f64], fit_index: &[isize]) -> Vec<f64> {
        let mut grad = self.distribution.partial_log_l(problem, allpars, fit_index);
        if let Some(constrain) = &self.constrain {
            let mut shifted = allpars.to_vec();
            for (g, pos) in grad.iter_mut().zip(resolve_all(fit_index, problem.npars(), allpars.len())) {
                let h = NUMERIC_STEP * (1.0 + allpars[pos].abs());
                shifted[pos] = allpars[pos] + h;
                let up = constrain(problem, &shifted);
                shifted[pos] = allpars[pos] - h;
                let down = constrain(problem, &shifted);
                shifted[pos] = allpars[pos];
                *g += (up - down) / (2.0 * h);
            }
        }
        grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_support::line_problem;
    use crate::problem::Distance;

    #[test]
    fn hypers_are_fixed_until_limited() {
        let likelihood = Likelihood::from_name("gauss").unwrap();
        assert_eq!(likelihood.hyper_values(), &[1.0]);
        assert!(likelihood.free_hyper_index().is_empty());

        let likelihood = likelihood.with_limits(&[(0.01, 10.0)]).unwrap();
        assert_eq!(likelihood.free_hyper_index(), vec![-1]);
        let problem = line_problem();
        let prior = likelihood.prior(&problem, 2).expect("scale prior");
        assert_eq!(prior.name(), "jeffreys");
        assert!(likelihood.prior(&problem, 0).is_some());
    }

    #[test]
    fn bad_limits_are_rejected() {
        let err = Likelihood::from_name("gauss").unwrap().with_limits(&[(-1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, NestedError::LimitViolation(_)));
        let err = Likelihood::from_name("gauss")
            .unwrap()
            .with_limits(&[(0.1, 1.0), (0.1, 1.0)])
            .unwrap_err();
        assert!(matches!(err, NestedError::InvalidInput(_)));
    }

    #[test]
    fn exponential_power_follows_scale() {
        let likelihood = Likelihood::from_name("exponential")
            .unwrap()
            .with_limits(&[(0.1, 10.0), (1.0, 3.0)])
            .unwrap();
        assert_eq!(likelihood.free_hyper_index(), vec![-1, -2]);
        assert_eq!(likelihood.hyper_names(), vec!["scale", "power"]);

        // -1 is the scale, right after the two line parameters
        let problem = line_problem();
        let len = problem.npars() + likelihood.nhyper();
        assert_eq!(crate::distribution::resolve_index(-1, problem.npars(), len), Some(2));
        assert_eq!(crate::distribution::resolve_index(-2, problem.npars(), len), Some(3));
        let prior = likelihood.prior(&problem, 2).expect("scale prior");
        assert_eq!(prior.low_limit(), 0.1);
    }

    #[test]
    fn constrain_and_nan_handling() {
        let problem = line_problem();
        let plain = Likelihood::from_name("gauss").unwrap();
        let base = plain.log_likelihood(&problem, &[0.4, 0.5, 0.3]);
        let constrained = plain.clone().with_constrain(|_, pars| -pars[0].abs());
        let logl = constrained.log_likelihood(&problem, &[0.4, 0.5, 0.3]);
        assert!((logl - (base - 0.4)).abs() < 1e-12);
        let grad = constrained.partial_log_l(&problem, &[0.4, 0.5, 0.3], &[0]);
        let plain_grad = plain.partial_log_l(&problem, &[0.4, 0.5, 0.3], &[0]);
        assert!((grad[0] - (plain_grad[0] - 1.0)).abs() < 1e-6);
        assert_eq!(plain.log_likelihood(&problem, &[f64::NAN, 0.5, 0.3]), f64::NEG_INFINITY);
    }

    #[test]
    fn weights_need_a_weight_aware_distribution() {
        let tour = Problem::salesman(vec![0.0, 1.0, 1.0], vec![0.0, 0.0, 1.0], Distance::Euclid)
            .unwrap()
            .with_weights(vec![1.0, 1.0, 2.0])
            .unwrap();
        assert!(Likelihood::from_name("distance").unwrap().check(&tour).is_err());
        assert!(Likelihood::from_name("gauss").unwrap().check(&line_problem()).is_ok());
    }
}
