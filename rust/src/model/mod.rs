//! Parametric models the sampler fits.
//!
//! A model maps `xdata` and a parameter vector to predictions laid out datum-major:
//! for `N` data points and `nout` outputs the result has length `N * nout` and entry
//! `i * nout + o` is output `o` at datum `i`. Jacobians share that row layout.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use std::fmt;

use crate::prior::PriorRef;

mod compound;
mod fixed;
mod gauss;
mod polynomial;
mod splines;
mod stack;

pub use compound::{CompoundModel, Operation};
pub use fixed::{FixedModel, FixedValue};
pub use gauss::GaussModel;
pub use polynomial::PolynomialModel;
pub use splines::SplinesModel;
pub use stack::StackModel;

const NUMERIC_STEP: f64 = 1e-6;

pub trait Model: fmt::Debug + Send + Sync {
    fn name(&self) -> String;

    fn npars(&self) -> usize;

    fn nout(&self) -> usize {
        1
    }

    fn result(&self, xdata: &[f64], params: &[f64]) -> Vec<f64>;

    /// Jacobian of `result` w.r.t. the parameters, `(N * nout) x npars`.
    fn partial(&self, xdata: &[f64], params: &[f64]) -> DMatrix<f64> {
        let base_len = xdata.len() * self.nout();
        let mut jac = DMatrix::zeros(base_len, params.len());
        let mut shifted = params.to_vec();
        for k in 0..params.len() {
            let h = NUMERIC_STEP * (1.0 + params[k].abs());
            shifted[k] = params[k] + h;
            let up = self.result(xdata, &shifted);
            shifted[k] = params[k] - h;
            let down = self.result(xdata, &shifted);
            shifted[k] = params[k];
            for row in 0..base_len {
                jac[(row, k)] = (up[row] - down[row]) / (2.0 * h);
            }
        }
        jac
    }

    /// Derivative of `result` w.r.t. `x`, same layout as `result`.
    fn derivative(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        let up: Vec<f64> = xdata
            .iter()
            .map(|x| x + NUMERIC_STEP * (1.0 + x.abs()))
            .collect();
        let down: Vec<f64> = xdata
            .iter()
            .map(|x| x - NUMERIC_STEP * (1.0 + x.abs()))
            .collect();
        let ru = self.result(&up, params);
        let rd = self.result(&down, params);
        let nout = self.nout();
        ru.iter()
            .zip(&rd)
            .enumerate()
            .map(|(row, (u, d))| (u - d) / (up[row / nout] - down[row / nout]))
            .collect()
    }

    /// Prior of parameter `k`, or `None` when the model carries no prior for it.
    fn prior(&self, k: usize) -> Option<PriorRef>;

    /// Period of output `o` when that output is an angle-like quantity.
    fn cyclic(&self, _output: usize) -> Option<f64> {
        None
    }

    /// Whether the parameter count may change through `grow`/`shrink`.
    fn is_dynamic(&self) -> bool {
        false
    }

    /// Whether `vary` can alter the internal structure.
    fn is_modifiable(&self) -> bool {
        false
    }

    /// Prior on the number of parameters of a dynamic model.
    fn grow_prior(&self) -> Option<PriorRef> {
        None
    }

    /// Add one parameter; returns the position where it was inserted.
    fn grow(&mut self, _rng: &mut StdRng) -> Option<usize> {
        None
    }

    /// Suggested value for a freshly inserted parameter, given the old parameters.
    fn grow_value(&self, _params: &[f64], _position: usize) -> Option<f64> {
        None
    }

    /// Remove one parameter; returns the position that was removed.
    fn shrink(&mut self, _rng: &mut StdRng) -> Option<usize> {
        None
    }

    /// Change the structure without changing `npars`.
    fn vary(&mut self, _rng: &mut StdRng) -> bool {
        false
    }

    fn box_clone(&self) -> Box<dyn Model>;
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Priors attached to a model. Positions past the end reuse the last prior, so one prior
/// covers every parameter of a growing model.
#[derive(Debug, Clone, Default)]
pub struct PriorSet(Vec<PriorRef>);

impl PriorSet {
    pub fn get(&self, k: usize) -> Option<PriorRef> {
        self.0.get(k).or_else(|| self.0.last()).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub trait WithPriors: Sized {
    fn set_priors(&mut self, priors: Vec<PriorRef>);

    fn with_priors(mut self, priors: Vec<PriorRef>) -> Self {
        self.set_priors(priors);
        self
    }

    fn with_prior(self, prior: PriorRef) -> Self {
        self.with_priors(vec![prior])
    }
}

macro_rules! impl_with_priors {
    ($($model:ty),*) => {
        $(impl WithPriors for $model {
            fn set_priors(&mut self, priors: Vec<PriorRef>) {
                self.priors = PriorSet(priors);
            }
        })*
    };
}

impl_with_priors!(PolynomialModel, GaussModel, SplinesModel);

#[cfg(test)]
pub(crate) fn assert_partial_matches_numeric(model: &dyn Model, xdata: &[f64], params: &[f64]) {
    let analytic = model.partial(xdata, params);
    let mut shifted = params.to_vec();
    for k in 0..params.len() {
        let h = 1e-6 * (1.0 + params[k].abs());
        shifted[k] = params[k] + h;
        let up = model.result(xdata, &shifted);
        shifted[k] = params[k] - h;
        let down = model.result(xdata, &shifted);
        shifted[k] = params[k];
        for row in 0..up.len() {
            let numeric = (up[row] - down[row]) / (2.0 * h);
            assert!(
                (numeric - analytic[(row, k)]).abs() < 1e-5 * (1.0 + numeric.abs()),
                "{}: d(row {row})/d(par {k}) analytic {} numeric {numeric}",
                model.name(),
                analytic[(row, k)]
            );
        }
    }
}
