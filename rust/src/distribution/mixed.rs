use nalgebra::DMatrix;
use std::sync::Arc;

use super::{split_pars, weighted_sum, ErrorDistribution, Hyper, HyperKind};
use crate::logspace::log_add_exp;
use crate::problem::Problem;

/// Two-component mixture `f * first + (1 - f) * second`.
///
/// Hyperparameters are those of `first`, then those of `second`, then the fraction `f`.
#[derive(Debug, Clone)]
pub struct MixedDistribution {
    first: Arc<dyn ErrorDistribution>,
    second: Arc<dyn ErrorDistribution>,
}

struct Parts {
    first: Vec<f64>,
    second: Vec<f64>,
    fraction: f64,
}

impl MixedDistribution {
    pub fn new(first: Arc<dyn ErrorDistribution>, second: Arc<dyn ErrorDistribution>) -> Self {
        Self { first, second }
    }

    fn parts(&self, problem: &Problem, allpars: &[f64]) -> Parts {
        let (pars, hyper) = split_pars(problem, allpars);
        let n1 = self.first.nhyper();
        let n2 = self.second.nhyper();
        let defaults = self.hypers();
        let hyper_at = |j: usize| hyper.get(j).copied().unwrap_or(defaults[j].default);

        let mut first = pars.to_vec();
        first.extend((0..n1).map(hyper_at));
        let mut second = pars.to_vec();
        second.extend((n1..n1 + n2).map(hyper_at));
        Parts {
            first,
            second,
            fraction: hyper_at(n1 + n2),
        }
    }

    /// Component log-likelihoods per element, or `None` for a fraction outside [0, 1].
    fn components(&self, problem: &Problem, parts: &Parts) -> Option<(Vec<f64>, Vec<f64>)> {
        if !(0.0..=1.0).contains(&parts.fraction) {
            return None;
        }
        Some((
            self.first.log_l_data(problem, &parts.first),
            self.second.log_l_data(problem, &parts.second),
        ))
    }
}

impl ErrorDistribution for MixedDistribution {
    fn name(&self) -> &'static str {
        "mixed"
    }

    fn hypers(&self) -> Vec<Hyper> {
        let mut hypers = self.first.hypers();
        hypers.extend(self.second.hypers());
        hypers.push(Hyper {
            name: "fraction",
            kind: HyperKind::Fraction,
            default: 0.5,
        });
        hypers
    }

    fn accepts_weight(&self) -> bool {
        self.first.accepts_weight() && self.second.accepts_weight()
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        let parts = self.parts(problem, allpars);
        let Some((l1, l2)) = self.components(problem, &parts) else {
            return vec![f64::NEG_INFINITY; problem.ndata() * problem.nout()];
        };
        let (lf, lg) = (parts.fraction.ln(), (1.0 - parts.fraction).ln());
        l1.iter()
            .zip(&l2)
            .map(|(a, b)| log_add_exp(lf + a, lg + b))
            .collect()
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        weighted_sum(problem, &self.log_l_data(problem, allpars))
    }

    /// Mixes the component densities directly, without log-space guarding.
    fn log_likelihood_alt(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let parts = self.parts(problem, allpars);
        let Some((l1, l2)) = self.components(problem, &parts) else {
            return f64::NEG_INFINITY;
        };
        let f = parts.fraction;
        let mixed: Vec<f64> = l1
            .iter()
            .zip(&l2)
            .map(|(a, b)| (f * a.exp() + (1.0 - f) * b.exp()).ln())
            .collect();
        weighted_sum(problem, &mixed)
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        let np = problem.npars();
        let n1 = self.first.nhyper();
        let n2 = self.second.nhyper();
        let parts = self.parts(problem, allpars);
        let nrows = problem.ndata() * problem.nout();
        let Some((l1, l2)) = self.components(problem, &parts) else {
            return DMatrix::zeros(nrows, positions.len());
        };

        // positions in each component's own allpars
        let map1: Vec<Option<usize>> = positions
            .iter()
            .map(|&p| (p < np + n1).then_some(p))
            .collect();
        let map2: Vec<Option<usize>> = positions
            .iter()
            .map(|&p| {
                if p < np {
                    Some(p)
                } else if p >= np + n1 && p < np + n1 + n2 {
                    Some(p - n1)
                } else {
                    None
                }
            })
            .collect();
        let q1: Vec<usize> = map1.iter().flatten().copied().collect();
        let q2: Vec<usize> = map2.iter().flatten().copied().collect();
        let d1 = self.first.partial_log_l_data(problem, &parts.first, &q1);
        let d2 = self.second.partial_log_l_data(problem, &parts.second, &q2);

        let f = parts.fraction;
        let (lf, lg) = (f.ln(), (1.0 - f).ln());
        let mut out = DMatrix::zeros(l1.len(), positions.len());
        for k in 0..l1.len() {
            let m = log_add_exp(lf + l1[k], lg + l2[k]);
            let e1 = (l1[k] - m).exp();
            let e2 = (l2[k] - m).exp();
            let (mut c1, mut c2) = (0, 0);
            for (j, &pos) in positions.iter().enumerate() {
                let mut value = 0.0;
                if map1[j].is_some() {
                    value += f * e1 * d1[(k, c1)];
                    c1 += 1;
                }
                if map2[j].is_some() {
                    value += (1.0 - f) * e2 * d2[(k, c2)];
                    c2 += 1;
                }
                if pos == np + n1 + n2 {
                    value = e1 - e2;
                }
                out[(k, j)] = value;
            }
        }
        out
    }
}
