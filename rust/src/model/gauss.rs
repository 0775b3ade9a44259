use nalgebra::DMatrix;

use super::{Model, PriorSet};
use crate::prior::PriorRef;

/// `f(x) = a exp(-0.5 ((x - c) / w)^2)` with parameters `[a, c, w]`.
#[derive(Debug, Clone, Default)]
pub struct GaussModel {
    pub(super) priors: PriorSet,
}

impl GaussModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Model for GaussModel {
    fn name(&self) -> String {
        "Gauss: f(x) = a exp(-0.5 ((x - c) / w)^2)".to_string()
    }

    fn npars(&self) -> usize {
        3
    }

    fn result(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        let (a, c, w) = (params[0], params[1], params[2]);
        xdata
            .iter()
            .map(|x| {
                let z = (x - c) / w;
                a * (-0.5 * z * z).exp()
            })
            .collect()
    }

    fn partial(&self, xdata: &[f64], params: &[f64]) -> DMatrix<f64> {
        let (a, c, w) = (params[0], params[1], params[2]);
        let mut jac = DMatrix::zeros(xdata.len(), 3);
        for (i, x) in xdata.iter().enumerate() {
            let z = (x - c) / w;
            let e = (-0.5 * z * z).exp();
            jac[(i, 0)] = e;
            jac[(i, 1)] = a * e * z / w;
            jac[(i, 2)] = a * e * z * z / w;
        }
        jac
    }

    fn derivative(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        let (a, c, w) = (params[0], params[1], params[2]);
        xdata
            .iter()
            .map(|x| {
                let z = (x - c) / w;
                -a * (-0.5 * z * z).exp() * z / w
            })
            .collect()
    }

    fn prior(&self, k: usize) -> Option<PriorRef> {
        self.priors.get(k)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
