use nalgebra::DMatrix;
use rand::rngs::StdRng;

use super::{Model, PriorSet};
use crate::prior::{ExponentialPrior, PriorExt, PriorRef};

/// `f(x) = p_0 + p_1 x + ... + p_d x^d`.
///
/// A dynamic polynomial moves its degree between `min_degree` and `max_degree`; the
/// highest coefficient is the one added or dropped.
#[derive(Debug, Clone)]
pub struct PolynomialModel {
    degree: usize,
    range: Option<(usize, usize)>,
    pub(super) priors: PriorSet,
    grow_prior: PriorRef,
    cyclic: Option<f64>,
}

impl PolynomialModel {
    pub fn new(degree: usize) -> Self {
        Self {
            degree,
            range: None,
            priors: PriorSet::default(),
            grow_prior: ExponentialPrior::new(1.0).shared(),
            cyclic: None,
        }
    }

    /// Dynamic polynomial starting at `min_degree`.
    pub fn dynamic(min_degree: usize, max_degree: usize) -> Self {
        let max_degree = max_degree.max(min_degree);
        Self {
            range: Some((min_degree, max_degree)),
            ..Self::new(min_degree)
        }
    }

    pub fn with_grow_prior(mut self, prior: PriorRef) -> Self {
        self.grow_prior = prior;
        self
    }

    /// Treat the output as periodic with the given period.
    pub fn with_cyclic(mut self, period: f64) -> Self {
        self.cyclic = Some(period.abs());
        self
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl Model for PolynomialModel {
    fn name(&self) -> String {
        format!("Polynomial: f(x) = sum p_k x^k, k <= {}", self.degree)
    }

    fn npars(&self) -> usize {
        self.degree + 1
    }

    fn result(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        xdata
            .iter()
            .map(|&x| params.iter().rev().fold(0.0, |acc, p| acc * x + p))
            .collect()
    }

    fn partial(&self, xdata: &[f64], params: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(xdata.len(), params.len(), |i, k| xdata[i].powi(k as i32))
    }

    fn derivative(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        xdata
            .iter()
            .map(|&x| {
                params
                    .iter()
                    .enumerate()
                    .skip(1)
                    .rev()
                    .fold(0.0, |acc, (k, p)| acc * x + k as f64 * p)
            })
            .collect()
    }

    fn prior(&self, k: usize) -> Option<PriorRef> {
        self.priors.get(k)
    }

    fn cyclic(&self, _output: usize) -> Option<f64> {
        self.cyclic
    }

    fn is_dynamic(&self) -> bool {
        self.range.is_some()
    }

    fn grow_prior(&self) -> Option<PriorRef> {
        self.range.map(|_| self.grow_prior.clone())
    }

    fn grow(&mut self, _rng: &mut StdRng) -> Option<usize> {
        let (_, max) = self.range?;
        if self.degree >= max {
            return None;
        }
        self.degree += 1;
        Some(self.degree)
    }

    fn grow_value(&self, _params: &[f64], _position: usize) -> Option<f64> {
        Some(0.0)
    }

    fn shrink(&mut self, _rng: &mut StdRng) -> Option<usize> {
        let (min, _) = self.range?;
        if self.degree <= min {
            return None;
        }
        self.degree -= 1;
        Some(self.degree + 1)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
