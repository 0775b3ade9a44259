//! Error distributions: the log-likelihood of the data given a parameter vector.
//!
//! `allpars` is the problem parameters followed by the distribution's hyperparameters.
//! Positions are absolute indices into `allpars`; walker `fit_index` entries may also be
//! negative, `-k` selecting the k-th hyperparameter (see [`resolve_index`]).

use nalgebra::DMatrix;
use std::fmt;
use std::sync::Arc;

use crate::errors::{NestedError, NestedResult};
use crate::prior::{JeffreysPrior, PriorExt, PriorRef, UniformPrior};
use crate::problem::Problem;

mod bernoulli;
mod distance;
mod gauss2d;
mod likelihood;
mod mixed;
mod model;
mod poisson;
mod scaled;

pub use bernoulli::BernoulliDistribution;
pub use distance::DistanceDistribution;
pub use gauss2d::Gauss2dDistribution;
pub use likelihood::{Constraint, Likelihood};
pub use mixed::MixedDistribution;
pub use model::ModelDistribution;
pub use poisson::PoissonDistribution;
pub use scaled::{
    CauchyDistribution, ExponentialDistribution, GaussDistribution, LaplaceDistribution,
    UniformDistribution,
};

const NUMERIC_STEP: f64 = 1e-6;

/// Role of a hyperparameter; decides the shape of its prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HyperKind {
    Scale,
    Power,
    Fraction,
}

impl HyperKind {
    /// Prior over `[low, high]`: Jeffreys for scales, uniform otherwise.
    pub fn prior(&self, low: f64, high: f64) -> NestedResult<PriorRef> {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(NestedError::LimitViolation(format!(
                "hyperparameter limits [{low}, {high}] are not a finite interval"
            )));
        }
        match self {
            HyperKind::Scale if low <= 0.0 => Err(NestedError::LimitViolation(format!(
                "scale limits need a positive lower bound, got {low}"
            ))),
            HyperKind::Scale => Ok(JeffreysPrior::new(low, high).shared()),
            HyperKind::Power => Ok(UniformPrior::new(low, high).shared()),
            HyperKind::Fraction => Ok(UniformPrior::new(low.max(0.0), high.min(1.0)).shared()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyper {
    pub name: &'static str,
    pub kind: HyperKind,
    pub default: f64,
}

impl Hyper {
    pub const fn scale() -> Self {
        Self {
            name: "scale",
            kind: HyperKind::Scale,
            default: 1.0,
        }
    }
}

pub trait ErrorDistribution: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn hypers(&self) -> Vec<Hyper> {
        Vec::new()
    }

    fn nhyper(&self) -> usize {
        self.hypers().len()
    }

    fn accepts_weight(&self) -> bool {
        true
    }

    /// Unweighted log-likelihood of each residual element.
    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64>;

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64;

    /// Reference implementation: weighted sum of [`ErrorDistribution::log_l_data`].
    fn log_likelihood_alt(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        weighted_sum(problem, &self.log_l_data(problem, allpars))
    }

    /// `d log_l_data[k] / d allpars[positions[j]]` as an `(elements x positions)` matrix.
    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64>;

    /// Gradient of the log-likelihood w.r.t. the `fit_index` entries.
    fn partial_log_l(&self, problem: &Problem, allpars: &[f64], fit_index: &[isize]) -> Vec<f64> {
        let positions = resolve_all(fit_index, problem.npars(), allpars.len());
        let data = self.partial_log_l_data(problem, allpars, &positions);
        weighted_column_sums(problem, &data)
    }

    /// Central-difference gradient of [`ErrorDistribution::log_likelihood`].
    fn numeric_partial_log_l(&self, problem: &Problem, allpars: &[f64], fit_index: &[isize]) -> Vec<f64> {
        let mut shifted = allpars.to_vec();
        resolve_all(fit_index, problem.npars(), allpars.len())
            .into_iter()
            .map(|pos| {
                let h = NUMERIC_STEP * (1.0 + allpars[pos].abs());
                shifted[pos] = allpars[pos] + h;
                let up = self.log_likelihood(problem, &shifted);
                shifted[pos] = allpars[pos] - h;
                let down = self.log_likelihood(problem, &shifted);
                shifted[pos] = allpars[pos];
                (up - down) / (2.0 * h)
            })
            .collect()
    }
}

/// Absolute position of a `fit_index` entry in an `allpars` of length `len` whose first
/// `npars` entries are problem parameters.
///
/// Non-negative entries are positions; `-k` is the k-th hyperparameter, at `npars + k - 1`.
pub fn resolve_index(index: isize, npars: usize, len: usize) -> Option<usize> {
    let pos = if index >= 0 {
        index as usize
    } else {
        npars + index.unsigned_abs() - 1
    };
    (pos < len).then_some(pos)
}

pub(crate) fn resolve_all(fit_index: &[isize], npars: usize, len: usize) -> Vec<usize> {
    fit_index
        .iter()
        .filter_map(|k| resolve_index(*k, npars, len))
        .collect()
}

/// `sum(w_k v_k)`, with unit weights when the problem has none.
pub(crate) fn weighted_sum(problem: &Problem, values: &[f64]) -> f64 {
    match problem.element_weights() {
        Some(w) if w.len() == values.len() => values.iter().zip(&w).map(|(v, w)| v * w).sum(),
        _ => values.iter().sum(),
    }
}

pub(crate) fn weighted_column_sums(problem: &Problem, data: &DMatrix<f64>) -> Vec<f64> {
    let weights = problem.element_weights().filter(|w| w.len() == data.nrows());
    (0..data.ncols())
        .map(|j| {
            let column = data.column(j);
            match &weights {
                Some(w) => column.iter().zip(w).map(|(v, w)| v * w).sum(),
                None => column.sum(),
            }
        })
        .collect()
}

/// Observed values flattened to the residual layout (datum-major).
pub(crate) fn observed(problem: &Problem) -> Vec<f64> {
    let ydata = &problem.data().ydata;
    (0..ydata.nrows())
        .flat_map(|i| (0..ydata.ncols()).map(move |o| ydata[(i, o)]))
        .collect()
}

/// Split `allpars` into problem parameters and hyperparameters.
pub(crate) fn split_pars<'a>(problem: &Problem, allpars: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    allpars.split_at(problem.npars().min(allpars.len()))
}

/// Build a distribution from its name.
///
/// `mixed` pairs a Gauss core with Cauchy wings.
pub fn distribution_from_name(name: &str) -> NestedResult<Arc<dyn ErrorDistribution>> {
    let distribution: Arc<dyn ErrorDistribution> = match name.to_ascii_lowercase().as_str() {
        "gauss" => Arc::new(GaussDistribution),
        "laplace" => Arc::new(LaplaceDistribution),
        "cauchy" => Arc::new(CauchyDistribution),
        "poisson" => Arc::new(PoissonDistribution),
        "bernoulli" | "categorical" => Arc::new(BernoulliDistribution),
        "uniform" => Arc::new(UniformDistribution),
        "exponential" => Arc::new(ExponentialDistribution),
        "mixed" => Arc::new(MixedDistribution::new(
            Arc::new(GaussDistribution),
            Arc::new(CauchyDistribution),
        )),
        "model" => Arc::new(ModelDistribution),
        "distance" => Arc::new(DistanceDistribution),
        "gauss2d" => Arc::new(Gauss2dDistribution),
        _ => {
            return Err(NestedError::UnknownName {
                kind: "distribution",
                name: name.to_string(),
            })
        }
    };
    Ok(distribution)
}
