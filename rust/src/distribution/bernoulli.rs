use nalgebra::DMatrix;

use super::{split_pars, weighted_sum, ErrorDistribution};
use crate::problem::Problem;

/// Class labels with model-predicted probabilities.
///
/// A single-output model predicts `P(label = 1)`. A model with `k` outputs predicts
/// unnormalised probabilities of labels `0..k` (categorical).
#[derive(Debug, Clone, Copy, Default)]
pub struct BernoulliDistribution;

fn labels(problem: &Problem) -> Vec<usize> {
    problem
        .data()
        .ydata
        .column(0)
        .iter()
        .map(|y| y.round().max(0.0) as usize)
        .collect()
}

fn width(problem: &Problem, result: &[f64]) -> usize {
    (result.len() / problem.ndata().max(1)).max(1)
}

impl ErrorDistribution for BernoulliDistribution {
    fn name(&self) -> &'static str {
        "bernoulli"
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        let (pars, _) = split_pars(problem, allpars);
        let probs = problem.result(pars);
        let width = width(problem, &probs);
        labels(problem)
            .into_iter()
            .enumerate()
            .map(|(i, label)| {
                if width == 1 {
                    let p = probs[i];
                    if !(0.0..=1.0).contains(&p) {
                        return f64::NEG_INFINITY;
                    }
                    if label == 1 {
                        p.ln()
                    } else {
                        (-p).ln_1p()
                    }
                } else {
                    let row = &probs[i * width..(i + 1) * width];
                    if row.iter().any(|p| *p < 0.0 || p.is_nan()) {
                        return f64::NEG_INFINITY;
                    }
                    let total: f64 = row.iter().sum();
                    row.get(label).map_or(f64::NEG_INFINITY, |p| (p / total).ln())
                }
            })
            .collect()
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        let (pars, _) = split_pars(problem, allpars);
        let probs = problem.result(pars);
        let width = width(problem, &probs);
        let labels = labels(problem);
        if width == 1 {
            if probs.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return f64::NEG_INFINITY;
            }
            let hits: Vec<f64> = labels
                .iter()
                .zip(&probs)
                .map(|(l, p)| if *l == 1 { p.ln() } else { 0.0 })
                .collect();
            let misses: Vec<f64> = labels
                .iter()
                .zip(&probs)
                .map(|(l, p)| if *l == 1 { 0.0 } else { (1.0 - p).ln() })
                .collect();
            return weighted_sum(problem, &hits) + weighted_sum(problem, &misses);
        }
        if probs.iter().any(|p| *p < 0.0 || p.is_nan()) {
            return f64::NEG_INFINITY;
        }
        let chosen: Vec<f64> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| probs.get(i * width + l).map_or(f64::NEG_INFINITY, |p| p.ln()))
            .collect();
        let totals: Vec<f64> = probs.chunks(width).map(|row| row.iter().sum::<f64>().ln()).collect();
        weighted_sum(problem, &chosen) - weighted_sum(problem, &totals)
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        let (pars, _) = split_pars(problem, allpars);
        let probs = problem.result(pars);
        let width = width(problem, &probs);
        let labels = labels(problem);
        let jac = problem.partial(pars);
        DMatrix::from_fn(labels.len(), positions.len(), |i, j| {
            let pos = positions[j];
            if pos >= pars.len() {
                return 0.0;
            }
            if width == 1 {
                let p = probs[i];
                let dl = if labels[i] == 1 { 1.0 / p } else { -1.0 / (1.0 - p) };
                return dl * jac[(i, pos)];
            }
            let row = i * width;
            let total: f64 = probs[row..row + width].iter().sum();
            let dtotal: f64 = (0..width).map(|c| jac[(row + c, pos)]).sum();
            let c = row + labels[i];
            jac[(c, pos)] / probs[c] - dtotal / total
        })
    }
}
