use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::Rng;

use super::{Model, PriorSet};
use crate::prior::{ExponentialPrior, PriorExt, PriorRef};

const ORDER: usize = 3;

/// Cubic B-spline on a set of knots; `npars = nknots + 2`.
///
/// A dynamic spline inserts or removes interior knots; a modifiable spline moves an interior
/// knot between its neighbours. The outer knots never move.
#[derive(Debug, Clone)]
pub struct SplinesModel {
    knots: Vec<f64>,
    knot_range: Option<(usize, usize)>,
    modifiable: bool,
    pub(super) priors: PriorSet,
    grow_prior: PriorRef,
}

impl SplinesModel {
    /// `knots` are sorted internally; at least two are needed to span the domain.
    pub fn new(mut knots: Vec<f64>) -> Self {
        knots.sort_by(|a, b| a.total_cmp(b));
        if knots.len() < 2 {
            let k = knots.first().copied().unwrap_or(0.0);
            knots = vec![k, k + 1.0];
        }
        Self {
            knots,
            knot_range: None,
            modifiable: false,
            priors: PriorSet::default(),
            grow_prior: ExponentialPrior::new(1.0).shared(),
        }
    }

    /// Equidistant knots over `[low, high]`.
    pub fn uniform(nknots: usize, low: f64, high: f64) -> Self {
        let n = nknots.max(2);
        let step = (high - low) / (n - 1) as f64;
        Self::new((0..n).map(|k| low + k as f64 * step).collect())
    }

    /// Let the knot count move between `min_knots` and `max_knots`.
    pub fn dynamic(mut self, min_knots: usize, max_knots: usize) -> Self {
        let min_knots = min_knots.max(2);
        self.knot_range = Some((min_knots, max_knots.max(min_knots)));
        self
    }

    pub fn modifiable(mut self) -> Self {
        self.modifiable = true;
        self
    }

    pub fn with_grow_prior(mut self, prior: PriorRef) -> Self {
        self.grow_prior = prior;
        self
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Values of the `npars` basis functions at `x`; all zero outside the knot span.
    fn basis(&self, x: f64) -> Vec<f64> {
        let m = self.knots.len();
        let mut values = vec![0.0; m + ORDER - 1];
        let (first, last) = (self.knots[0], self.knots[m - 1]);
        if !(first..=last).contains(&x) {
            return values;
        }

        let t = |j: usize| -> f64 {
            if j < ORDER {
                first
            } else if j - ORDER >= m {
                last
            } else {
                self.knots[j - ORDER]
            }
        };

        let j = self.knots.partition_point(|&k| k <= x).saturating_sub(1).min(m - 2);
        let span = j + ORDER;

        let mut n = [0.0; ORDER + 1];
        let mut left = [0.0; ORDER + 1];
        let mut right = [0.0; ORDER + 1];
        n[0] = 1.0;
        for d in 1..=ORDER {
            left[d] = x - t(span + 1 - d);
            right[d] = t(span + d) - x;
            let mut saved = 0.0;
            for r in 0..d {
                let temp = n[r] / (right[r + 1] + left[d - r]);
                n[r] = saved + right[r + 1] * temp;
                saved = left[d - r] * temp;
            }
            n[d] = saved;
        }
        for (r, value) in n.iter().enumerate() {
            values[span - ORDER + r] = *value;
        }
        values
    }
}

impl Model for SplinesModel {
    fn name(&self) -> String {
        format!("Splines: cubic on {} knots", self.knots.len())
    }

    fn npars(&self) -> usize {
        self.knots.len() + ORDER - 1
    }

    fn result(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        xdata
            .iter()
            .map(|&x| self.basis(x).iter().zip(params).map(|(b, p)| b * p).sum())
            .collect()
    }

    fn partial(&self, xdata: &[f64], _params: &[f64]) -> DMatrix<f64> {
        let np = self.npars();
        let mut jac = DMatrix::zeros(xdata.len(), np);
        for (i, &x) in xdata.iter().enumerate() {
            for (k, b) in self.basis(x).into_iter().enumerate() {
                jac[(i, k)] = b;
            }
        }
        jac
    }

    fn prior(&self, k: usize) -> Option<PriorRef> {
        self.priors.get(k)
    }

    fn is_dynamic(&self) -> bool {
        self.knot_range.is_some()
    }

    fn is_modifiable(&self) -> bool {
        self.modifiable
    }

    fn grow_prior(&self) -> Option<PriorRef> {
        self.knot_range.map(|_| self.grow_prior.clone())
    }

    fn grow(&mut self, rng: &mut StdRng) -> Option<usize> {
        let (_, max) = self.knot_range?;
        if self.knots.len() >= max {
            return None;
        }
        let j = rng.random_range(0..self.knots.len() - 1);
        let (a, b) = (self.knots[j], self.knots[j + 1]);
        let knot = a + rng.random::<f64>() * (b - a);
        if knot <= a || knot >= b {
            return None;
        }
        self.knots.insert(j + 1, knot);
        Some(j + 2)
    }

    fn grow_value(&self, params: &[f64], position: usize) -> Option<f64> {
        let before = params.get(position.checked_sub(1)?)?;
        let after = params.get(position).unwrap_or(before);
        Some(0.5 * (before + after))
    }

    fn shrink(&mut self, rng: &mut StdRng) -> Option<usize> {
        let (min, _) = self.knot_range?;
        let m = self.knots.len();
        if m <= min || m < 3 {
            return None;
        }
        let j = rng.random_range(1..m - 1);
        self.knots.remove(j);
        Some(j + 1)
    }

    fn vary(&mut self, rng: &mut StdRng) -> bool {
        let m = self.knots.len();
        if !self.modifiable || m < 3 {
            return false;
        }
        let j = rng.random_range(1..m - 1);
        let (a, b) = (self.knots[j - 1], self.knots[j + 1]);
        let knot = a + rng.random::<f64>() * (b - a);
        if knot <= a || knot >= b {
            return false;
        }
        self.knots[j] = knot;
        true
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
