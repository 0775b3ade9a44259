use nalgebra::DMatrix;

use super::Model;
use crate::prior::PriorRef;

/// Several single-output models evaluated on the same `x`, one output each.
#[derive(Debug, Clone)]
pub struct StackModel {
    models: Vec<Box<dyn Model>>,
}

impl StackModel {
    pub fn new(models: Vec<Box<dyn Model>>) -> Self {
        Self { models }
    }

    fn offsets(&self) -> Vec<usize> {
        self.models
            .iter()
            .scan(0, |acc, m| {
                let start = *acc;
                *acc += m.npars();
                Some(start)
            })
            .collect()
    }
}

impl Model for StackModel {
    fn name(&self) -> String {
        let names: Vec<String> = self.models.iter().map(|m| m.name()).collect();
        format!("Stack[{}]", names.join("; "))
    }

    fn npars(&self) -> usize {
        self.models.iter().map(|m| m.npars()).sum()
    }

    fn nout(&self) -> usize {
        self.models.len()
    }

    fn result(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        let nout = self.nout();
        let mut out = vec![0.0; xdata.len() * nout];
        for (o, (model, start)) in self.models.iter().zip(self.offsets()).enumerate() {
            let y = model.result(xdata, &params[start..start + model.npars()]);
            for (i, v) in y.into_iter().enumerate() {
                out[i * nout + o] = v;
            }
        }
        out
    }

    fn partial(&self, xdata: &[f64], params: &[f64]) -> DMatrix<f64> {
        let nout = self.nout();
        let mut jac = DMatrix::zeros(xdata.len() * nout, params.len());
        for (o, (model, start)) in self.models.iter().zip(self.offsets()).enumerate() {
            let np = model.npars();
            let pj = model.partial(xdata, &params[start..start + np]);
            for i in 0..xdata.len() {
                for k in 0..np {
                    jac[(i * nout + o, start + k)] = pj[(i, k)];
                }
            }
        }
        jac
    }

    fn derivative(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        let nout = self.nout();
        let mut out = vec![0.0; xdata.len() * nout];
        for (o, (model, start)) in self.models.iter().zip(self.offsets()).enumerate() {
            let d = model.derivative(xdata, &params[start..start + model.npars()]);
            for (i, v) in d.into_iter().enumerate() {
                out[i * nout + o] = v;
            }
        }
        out
    }

    fn prior(&self, k: usize) -> Option<PriorRef> {
        let mut offset = 0;
        for model in &self.models {
            if k < offset + model.npars() {
                return model.prior(k - offset);
            }
            offset += model.npars();
        }
        None
    }

    fn cyclic(&self, output: usize) -> Option<f64> {
        self.models.get(output).and_then(|m| m.cyclic(0))
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
