use nalgebra::DMatrix;

use super::Model;
use crate::prior::PriorRef;

/// How the two branches of a [`CompoundModel`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Mul,
    Div,
    /// The right model is evaluated on the output of the left one.
    Pipe,
}

impl Operation {
    fn symbol(&self) -> &'static str {
        match self {
            Operation::Add => "+",
            Operation::Mul => "*",
            Operation::Div => "/",
            Operation::Pipe => "|",
        }
    }
}

/// Binary tree node combining two single-output models.
///
/// Parameters are the left model's followed by the right model's.
#[derive(Debug, Clone)]
pub struct CompoundModel {
    operation: Operation,
    left: Box<dyn Model>,
    right: Box<dyn Model>,
}

impl CompoundModel {
    pub fn new(operation: Operation, left: Box<dyn Model>, right: Box<dyn Model>) -> Self {
        Self {
            operation,
            left,
            right,
        }
    }

    pub fn add(left: Box<dyn Model>, right: Box<dyn Model>) -> Self {
        Self::new(Operation::Add, left, right)
    }

    pub fn mul(left: Box<dyn Model>, right: Box<dyn Model>) -> Self {
        Self::new(Operation::Mul, left, right)
    }

    pub fn div(left: Box<dyn Model>, right: Box<dyn Model>) -> Self {
        Self::new(Operation::Div, left, right)
    }

    pub fn pipe(left: Box<dyn Model>, right: Box<dyn Model>) -> Self {
        Self::new(Operation::Pipe, left, right)
    }

    fn split<'p>(&self, params: &'p [f64]) -> (&'p [f64], &'p [f64]) {
        params.split_at(self.left.npars().min(params.len()))
    }
}

impl Model for CompoundModel {
    fn name(&self) -> String {
        format!(
            "({}) {} ({})",
            self.left.name(),
            self.operation.symbol(),
            self.right.name()
        )
    }

    fn npars(&self) -> usize {
        self.left.npars() + self.right.npars()
    }

    fn result(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        let (pl, pr) = self.split(params);
        let fl = self.left.result(xdata, pl);
        if self.operation == Operation::Pipe {
            return self.right.result(&fl, pr);
        }
        let fr = self.right.result(xdata, pr);
        fl.iter()
            .zip(&fr)
            .map(|(a, b)| match self.operation {
                Operation::Add => a + b,
                Operation::Mul => a * b,
                Operation::Div => a / b,
                Operation::Pipe => unreachable!("pipe handled above"),
            })
            .collect()
    }

    fn partial(&self, xdata: &[f64], params: &[f64]) -> DMatrix<f64> {
        let (pl, pr) = self.split(params);
        let nl = pl.len();
        let n = xdata.len();
        let fl = self.left.result(xdata, pl);
        let jl = self.left.partial(xdata, pl);
        let mut jac = DMatrix::zeros(n, params.len());

        if self.operation == Operation::Pipe {
            let slope = self.right.derivative(&fl, pr);
            let jr = self.right.partial(&fl, pr);
            for i in 0..n {
                for k in 0..nl {
                    jac[(i, k)] = slope[i] * jl[(i, k)];
                }
                for k in 0..pr.len() {
                    jac[(i, nl + k)] = jr[(i, k)];
                }
            }
            return jac;
        }

        let fr = self.right.result(xdata, pr);
        let jr = self.right.partial(xdata, pr);
        for i in 0..n {
            let (dl, dr) = match self.operation {
                Operation::Add => (1.0, 1.0),
                Operation::Mul => (fr[i], fl[i]),
                Operation::Div => (1.0 / fr[i], -fl[i] / (fr[i] * fr[i])),
                Operation::Pipe => unreachable!("pipe handled above"),
            };
            for k in 0..nl {
                jac[(i, k)] = dl * jl[(i, k)];
            }
            for k in 0..pr.len() {
                jac[(i, nl + k)] = dr * jr[(i, k)];
            }
        }
        jac
    }

    fn derivative(&self, xdata: &[f64], params: &[f64]) -> Vec<f64> {
        let (pl, pr) = self.split(params);
        let dl = self.left.derivative(xdata, pl);
        if self.operation == Operation::Pipe {
            let fl = self.left.result(xdata, pl);
            let slope = self.right.derivative(&fl, pr);
            return slope.iter().zip(&dl).map(|(s, d)| s * d).collect();
        }
        let fl = self.left.result(xdata, pl);
        let fr = self.right.result(xdata, pr);
        let dr = self.right.derivative(xdata, pr);
        (0..xdata.len())
            .map(|i| match self.operation {
                Operation::Add => dl[i] + dr[i],
                Operation::Mul => dl[i] * fr[i] + fl[i] * dr[i],
                Operation::Div => (dl[i] * fr[i] - fl[i] * dr[i]) / (fr[i] * fr[i]),
                Operation::Pipe => unreachable!("pipe handled above"),
            })
            .collect()
    }

    fn prior(&self, k: usize) -> Option<PriorRef> {
        let nl = self.left.npars();
        if k < nl {
            self.left.prior(k)
        } else {
            self.right.prior(k - nl)
        }
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{assert_partial_matches_numeric, GaussModel, PolynomialModel};

    fn branches() -> (Box<dyn Model>, Box<dyn Model>) {
        (Box::new(PolynomialModel::new(1)), Box::new(GaussModel::new()))
    }

    #[test]
    fn every_operation_has_consistent_partials() {
        let xdata = [0.1, 0.8, 1.5, 2.2];
        let params = [1.5, 0.3, 2.0, 1.0, 0.7];
        for op in [Operation::Add, Operation::Mul, Operation::Div, Operation::Pipe] {
            let (left, right) = branches();
            let model = CompoundModel::new(op, left, right);
            assert_eq!(model.npars(), 5);
            assert_partial_matches_numeric(&model, &xdata, &params);
            let d = model.derivative(&xdata, &params);
            for (i, x) in xdata.iter().enumerate() {
                let h = 1e-6;
                let numeric = (model.result(&[x + h], &params)[0] - model.result(&[x - h], &params)[0]) / (2.0 * h);
                assert!((d[i] - numeric).abs() < 1e-5, "{op:?} derivative at {x}");
            }
        }
    }

    #[test]
    fn addition_sums_branches() {
        let (left, right) = branches();
        let model = CompoundModel::add(left, right);
        let y = model.result(&[1.0], &[1.0, 1.0, 2.0, 1.0, 1.0]);
        assert!((y[0] - 4.0).abs() < 1e-12);
    }
}
