use nalgebra::DMatrix;
use std::collections::BTreeMap;

use super::Model;
use crate::prior::PriorRef;

/// Replacement for one parameter of a [`FixedModel`].
#[derive(Debug, Clone)]
pub enum FixedValue {
    Value(f64),
    /// The parameter becomes a function of `x`, with its own free parameters.
    Model(Box<dyn Model>),
}

/// Wraps a parent model and pins some of its parameters.
///
/// The free parameters are the parent's unpinned parameters, in order, followed by the
/// parameters of every sub-model in position order.
#[derive(Debug, Clone)]
pub struct FixedModel {
    parent: Box<dyn Model>,
    fixed: BTreeMap<usize, FixedValue>,
}

impl FixedModel {
    pub fn new(parent: Box<dyn Model>, fixed: BTreeMap<usize, FixedValue>) -> Self {
        let np = parent.npars();
        let fixed = fixed.into_iter().filter(|(k, _)| *k < np).collect();
        Self { parent, fixed }
    }

    fn free_positions(&self) -> Vec<usize> {
        (0..self.parent.npars())
            .filter(|k| !self.fixed.contains_key(k))
            .collect()
    }

    fn sub_models(&self) -> impl Iterator<Item = (usize, &dyn Model)> {
        self.fixed.iter().filter_map(|(k, v)| match v {
            FixedValue::Model(m) => Some((*k, m.as_ref())),
            FixedValue::Value(_) => None,
        })
    }

    fn has_sub_models(&self) -> bool {
        self.sub_models().next().is_some()
    }

    /// Parent parameter vector at one `x`.
    fn parent_params(&self, x: f64, params: &[f64]) -> Vec<f64> {
        let free = self.free_positions();
        let mut full = vec![0.0; self.parent.npars()];
        for (slot, value) in free.iter().zip(params) {
            full[*slot] = *value;
        }
        let mut offset = free.len();
        for (k, value) in &self.fixed {
            full[*k] = match value {
                FixedValue::Value(v) => *v,
                FixedValue::Model(m) => {
                    let np = m.npars();
                    let v = m.result(&[x], &params[offset..offset + np])[0];
                    offset += np;
                    v
                }
            };
        }
        full
    }
}

impl Model for FixedModel {
    fn name(&self) -> String {
        format!("{} with {} fixed", self.parent.name(), self.fixed.len())
    }

    fn npars(&self) -> usize {
        self.parent.npars() - self.fixed.len() + self.sub_models().map(|(_, m)| m.npars()).sum::<usize>()
    }

    fn nout(&self) -> usize {
        self.parent.nout()
    }

    fn result(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        if !self.has_sub_models() {
            let full = self.parent_params(0.0, params);
            return self.parent.result(xdata, &full);
        }
        xdata
            .iter()
            .flat_map(|&x| {
                let full = self.parent_params(x, params);
                self.parent.result(&[x], &full)
            })
            .collect()
    }

    fn partial(&self, xdata: &[f64], params: &[f64]) -> DMatrix<f64> {
        let nout = self.nout();
        let free = self.free_positions();
        let mut jac = DMatrix::zeros(xdata.len() * nout, params.len());
        for (i, &x) in xdata.iter().enumerate() {
            let full = self.parent_params(x, params);
            let pj = self.parent.partial(&[x], &full);
            for o in 0..nout {
                let row = i * nout + o;
                for (col, slot) in free.iter().enumerate() {
                    jac[(row, col)] = pj[(o, *slot)];
                }
                let mut offset = free.len();
                for (k, m) in self.sub_models() {
                    let np = m.npars();
                    let sj = m.partial(&[x], &params[offset..offset + np]);
                    for q in 0..np {
                        jac[(row, offset + q)] = pj[(o, k)] * sj[(0, q)];
                    }
                    offset += np;
                }
            }
        }
        jac
    }

    fn prior(&self, k: usize) -> Option<PriorRef> {
        let free = self.free_positions();
        if let Some(slot) = free.get(k) {
            return self.parent.prior(*slot);
        }
        let mut offset = free.len();
        for (_, m) in self.sub_models() {
            if k < offset + m.npars() {
                return m.prior(k - offset);
            }
            offset += m.npars();
        }
        None
    }

    fn cyclic(&self, output: usize) -> Option<f64> {
        self.parent.cyclic(output)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{assert_partial_matches_numeric, GaussModel, PolynomialModel};

    #[test]
    fn pinned_value_removes_parameter() {
        let fixed = BTreeMap::from([(0, FixedValue::Value(2.0))]);
        let model = FixedModel::new(Box::new(GaussModel::new()), fixed);
        assert_eq!(model.npars(), 2);
        let y = model.result(&[1.0], &[1.0, 0.5]);
        assert!((y[0] - 2.0).abs() < 1e-12);
        assert_partial_matches_numeric(&model, &[0.3, 1.4], &[1.0, 0.5]);
    }

    #[test]
    fn sub_model_parameter_varies_with_x() {
        // Gauss whose centre drifts linearly with x.
        let fixed = BTreeMap::from([(1, FixedValue::Model(Box::new(PolynomialModel::new(1))))]);
        let model = FixedModel::new(Box::new(GaussModel::new()), fixed);
        assert_eq!(model.npars(), 4);
        let params = [1.5, 0.8, 0.2, 0.5];
        assert_partial_matches_numeric(&model, &[0.0, 0.7, 1.9], &params);
    }
}
