//! Weighted posterior samples collected by the nested sampler.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::logspace::{log_ordering, log_sum_exp};
use crate::problem::Problem;
use crate::walker::Walker;

/// A discarded (or final live) walker with its posterior weight.
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: usize,
    pub parent: Option<usize>,
    pub problem: Arc<Problem>,
    pub parameters: Vec<f64>,
    pub hyper_parameters: Vec<f64>,
    pub log_l: f64,
    /// Log posterior weight; the weights of a normalised list sum to one.
    pub log_w: f64,
}

impl Sample {
    pub fn from_walker(walker: &Walker, log_w: f64) -> Self {
        Self {
            id: walker.id,
            parent: walker.parent,
            problem: walker.problem.clone(),
            parameters: walker.parameters().to_vec(),
            hyper_parameters: walker.hyper_parameters().to_vec(),
            log_l: walker.log_l,
            log_w,
        }
    }

    pub fn weight(&self) -> f64 {
        self.log_w.exp()
    }

    pub fn npars(&self) -> usize {
        self.parameters.len()
    }

    /// Model prediction of this sample at `xdata`; empty for model-free problems.
    pub fn result(&self, xdata: &[f64]) -> Vec<f64> {
        self.problem
            .model()
            .map(|m| m.result(xdata, &self.parameters))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SampleList {
    samples: Vec<Sample>,
}

impl SampleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// `ln(sum(exp(log_w)))`.
    pub fn log_total(&self) -> f64 {
        let log_ws: Vec<f64> = self.samples.iter().map(|s| s.log_w).collect();
        log_sum_exp(&log_ws)
    }

    /// Shift the log weights so that the weights sum to one.
    pub fn normalise(&mut self) {
        let total = self.log_total();
        if total.is_finite() {
            for sample in &mut self.samples {
                sample.log_w -= total;
            }
        }
    }

    /// Keep the `max_size` samples with the largest `log_w`.
    pub fn weed(&mut self, max_size: usize) {
        if self.samples.len() <= max_size {
            return;
        }
        self.samples.sort_by(|a, b| log_ordering(b.log_w, a.log_w));
        self.samples.truncate(max_size);
        self.samples.sort_by_key(|s| s.id);
    }

    /// Parameter count carrying the largest total weight.
    pub fn modal_npars(&self) -> usize {
        let mut mass: BTreeMap<usize, f64> = BTreeMap::new();
        for sample in &self.samples {
            *mass.entry(sample.npars()).or_default() += sample.weight();
        }
        mass.into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(0, |(np, _)| np)
    }

    fn modal(&self) -> (Vec<&Sample>, f64) {
        let np = self.modal_npars();
        let chosen: Vec<&Sample> = self.samples.iter().filter(|s| s.npars() == np).collect();
        let total = chosen.iter().map(|s| s.weight()).sum();
        (chosen, total)
    }

    fn weighted_mean<F: Fn(&Sample) -> &[f64]>(&self, field: F) -> Vec<f64> {
        let (chosen, total) = self.modal();
        let Some(first) = chosen.first() else {
            return Vec::new();
        };
        let mut mean = vec![0.0; field(first).len()];
        if !(total > 0.0) {
            return mean;
        }
        for sample in &chosen {
            let w = sample.weight() / total;
            for (m, v) in mean.iter_mut().zip(field(sample)) {
                *m += w * v;
            }
        }
        mean
    }

    /// Weighted mean of the parameters over samples with the modal parameter count.
    pub fn parameters(&self) -> Vec<f64> {
        self.weighted_mean(|s| &s.parameters)
    }

    pub fn hyper_parameters(&self) -> Vec<f64> {
        self.weighted_mean(|s| &s.hyper_parameters)
    }

    /// Weighted standard deviations matching [`SampleList::parameters`].
    pub fn stdevs(&self) -> Vec<f64> {
        let mean = self.parameters();
        let (chosen, total) = self.modal();
        if !(total > 0.0) {
            return vec![0.0; mean.len()];
        }
        let mut var = vec![0.0; mean.len()];
        for sample in &chosen {
            let w = sample.weight() / total;
            for ((v, m), x) in var.iter_mut().zip(&mean).zip(&sample.parameters) {
                *v += w * (x - m) * (x - m);
            }
        }
        var.into_iter().map(f64::sqrt).collect()
    }

    /// Mean of the first hyperparameter, the noise scale for most distributions.
    pub fn scale(&self) -> Option<f64> {
        self.hyper_parameters().first().copied()
    }

    pub fn max_likelihood_parameters(&self) -> Vec<f64> {
        self.samples
            .iter()
            .max_by(|a, b| log_ordering(a.log_l, b.log_l))
            .map(|s| s.parameters.clone())
            .unwrap_or_default()
    }

    /// Parameters of the highest-weight sample.
    pub fn modal_parameters(&self) -> Vec<f64> {
        self.samples
            .iter()
            .max_by(|a, b| log_ordering(a.log_w, b.log_w))
            .map(|s| s.parameters.clone())
            .unwrap_or_default()
    }

    /// Per-coordinate weighted medians over samples with the modal parameter count.
    pub fn median_parameters(&self) -> Vec<f64> {
        let (chosen, total) = self.modal();
        let Some(first) = chosen.first() else {
            return Vec::new();
        };
        (0..first.npars())
            .map(|k| {
                let mut column: Vec<(f64, f64)> = chosen.iter().map(|s| (s.parameters[k], s.weight())).collect();
                column.sort_by(|a, b| a.0.total_cmp(&b.0));
                let half = 0.5 * total;
                let mut acc = 0.0;
                for (value, w) in &column {
                    acc += w;
                    if acc >= half {
                        return *value;
                    }
                }
                column.last().map_or(f64::NAN, |c| c.0)
            })
            .collect()
    }

    /// Posterior predictive mean and standard deviation of the model at `xdata`.
    pub fn predictive(&self, xdata: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let total: f64 = self.samples.iter().map(|s| s.weight()).sum();
        let mut mean = Vec::new();
        let mut second = Vec::new();
        if !(total > 0.0) {
            return (mean, second);
        }
        for sample in &self.samples {
            let w = sample.weight() / total;
            let fit = sample.result(xdata);
            if mean.is_empty() {
                mean = vec![0.0; fit.len()];
                second = vec![0.0; fit.len()];
            }
            for ((m, s), f) in mean.iter_mut().zip(second.iter_mut()).zip(&fit) {
                *m += w * f;
                *s += w * f * f;
            }
        }
        let stdev = mean
            .iter()
            .zip(&second)
            .map(|(m, s)| (s - m * m).max(0.0).sqrt())
            .collect();
        (mean, stdev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_support::line_problem;

    fn sample(id: usize, parameters: Vec<f64>, log_l: f64, log_w: f64) -> Sample {
        Sample {
            id,
            parent: None,
            problem: Arc::new(line_problem()),
            parameters,
            hyper_parameters: vec![0.5],
            log_l,
            log_w,
        }
    }

    fn list() -> SampleList {
        let mut list = SampleList::new();
        list.push(sample(0, vec![0.0, 1.0], -3.0, 1.0f64.ln()));
        list.push(sample(1, vec![1.0, 1.0], -1.0, 2.0f64.ln()));
        list.push(sample(2, vec![2.0, 1.0], -2.0, 1.0f64.ln()));
        list
    }

    #[test]
    fn normalised_weights_sum_to_one() {
        let mut list = list();
        list.normalise();
        let total: f64 = list.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-12, "sum of weights {total}");
    }

    #[test]
    fn summaries() {
        let list = list();
        let mean = list.parameters();
        assert!((mean[0] - 1.0).abs() < 1e-12 && (mean[1] - 1.0).abs() < 1e-12, "{mean:?}");
        let sd = list.stdevs();
        assert!((sd[0] - 0.5f64.sqrt()).abs() < 1e-12, "{sd:?}");
        assert_eq!(sd[1], 0.0);
        assert_eq!(list.max_likelihood_parameters(), vec![1.0, 1.0]);
        assert_eq!(list.modal_parameters(), vec![1.0, 1.0]);
        assert_eq!(list.median_parameters(), vec![1.0, 1.0]);
        assert_eq!(list.scale(), Some(0.5));

        let (pred, spread) = list.predictive(&[0.0, 1.0]);
        assert!((pred[0] - 1.0).abs() < 1e-12 && (pred[1] - 2.0).abs() < 1e-12, "{pred:?}");
        assert!(spread[0] > 0.0);
    }

    #[test]
    fn weed_keeps_largest_weights() {
        let mut list = list();
        list.weed(2);
        let ids: Vec<usize> = list.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&1));
        let kept_min = list.iter().map(|s| s.log_w).fold(f64::INFINITY, f64::min);
        assert!(kept_min >= 0.0);
    }
}
