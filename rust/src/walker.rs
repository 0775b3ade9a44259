//! Walkers and the live ensemble.

use std::collections::HashSet;
use std::sync::Arc;

use crate::distribution::{resolve_all, resolve_index, Likelihood};
use crate::errors::{NestedError, NestedResult};
use crate::logspace::log_ordering;
use crate::problem::Problem;

/// Relative tolerance on a stored log-likelihood against its recomputation.
const LOG_L_TOLERANCE: f64 = 1e-9;

/// One member of the live ensemble.
#[derive(Debug, Clone)]
pub struct Walker {
    pub id: usize,
    /// Id of the walker this one was cloned from; `None` for seeds.
    pub parent: Option<usize>,
    /// Shared until a dynamic move needs a private model.
    pub problem: Arc<Problem>,
    /// Problem parameters followed by hyperparameters.
    pub allpars: Vec<f64>,
    /// Free positions; a negative entry `-k` frees the k-th hyperparameter.
    pub fit_index: Vec<isize>,
    pub log_l: f64,
    pub log_w: f64,
    /// Iteration at which the walker was (re)born.
    pub start: usize,
}

impl Walker {
    pub fn new(id: usize, problem: Arc<Problem>, allpars: Vec<f64>, fit_index: Vec<isize>, start: usize) -> Self {
        Self {
            id,
            parent: None,
            problem,
            allpars,
            fit_index,
            log_l: f64::NEG_INFINITY,
            log_w: f64::NEG_INFINITY,
            start,
        }
    }

    /// Copy of this walker under a new id, with this walker as parent.
    pub fn copy_as(&self, id: usize, start: usize) -> Self {
        Self {
            id,
            parent: Some(self.id),
            start,
            log_w: f64::NEG_INFINITY,
            ..self.clone()
        }
    }

    pub fn npars(&self) -> usize {
        self.problem.npars()
    }

    pub fn parameters(&self) -> &[f64] {
        &self.allpars[..self.npars().min(self.allpars.len())]
    }

    pub fn hyper_parameters(&self) -> &[f64] {
        &self.allpars[self.npars().min(self.allpars.len())..]
    }

    /// Absolute positions of the free coordinates.
    pub fn fit_positions(&self) -> Vec<usize> {
        resolve_all(&self.fit_index, self.npars(), self.allpars.len())
    }

    /// Private, mutable problem for structural moves.
    pub fn problem_mut(&mut self) -> &mut Problem {
        Arc::make_mut(&mut self.problem)
    }

    /// Insert a free parameter at `position`, shifting later parameter indices.
    pub fn insert_parameter(&mut self, position: usize, value: f64) {
        self.allpars.insert(position, value);
        for k in self.fit_index.iter_mut() {
            if *k >= position as isize {
                *k += 1;
            }
        }
        self.fit_index.push(position as isize);
    }

    /// Remove the parameter at `position` and its `fit_index` entry.
    pub fn remove_parameter(&mut self, position: usize) {
        if position >= self.allpars.len() {
            return;
        }
        self.allpars.remove(position);
        self.fit_index.retain(|k| *k != position as isize);
        for k in self.fit_index.iter_mut() {
            if *k > position as isize {
                *k -= 1;
            }
        }
    }

    /// Verify the layout of `allpars` and `fit_index` and that `log_l` matches a recomputation.
    pub fn check(&self, likelihood: &Likelihood) -> NestedResult<()> {
        let expected = self.problem.npars() + likelihood.nhyper();
        if self.allpars.len() != expected {
            return Err(NestedError::invariant(format!(
                "walker {} has {} parameters, expected {expected}",
                self.id,
                self.allpars.len()
            )));
        }
        let mut seen = HashSet::new();
        for k in &self.fit_index {
            let pos = resolve_index(*k, self.problem.npars(), self.allpars.len()).ok_or_else(|| {
                NestedError::invariant(format!("walker {}: fit index {k} out of range", self.id))
            })?;
            if !seen.insert(pos) {
                return Err(NestedError::invariant(format!(
                    "walker {}: position {pos} is free twice",
                    self.id
                )));
            }
        }
        let fresh = likelihood.log_likelihood(&self.problem, &self.allpars);
        let same = fresh == self.log_l || (fresh - self.log_l).abs() <= LOG_L_TOLERANCE * (1.0 + fresh.abs());
        if !same {
            return Err(NestedError::invariant(format!(
                "walker {}: stored logL {} but recomputed {fresh}",
                self.id, self.log_l
            )));
        }
        Ok(())
    }
}

/// The live ensemble together with the running evidence bookkeeping.
#[derive(Debug, Clone)]
pub struct WalkerList {
    walkers: Vec<Walker>,
    next_id: usize,
    pub iteration: usize,
    pub replacements: usize,
    pub log_z: f64,
    pub info: f64,
}

impl Default for WalkerList {
    fn default() -> Self {
        Self::new()
    }
}

impl WalkerList {
    pub fn new() -> Self {
        Self {
            walkers: Vec::new(),
            next_id: 0,
            iteration: 0,
            replacements: 0,
            log_z: f64::NEG_INFINITY,
            info: 0.0,
        }
    }

    /// Reserve the next walker id; ids are never reused.
    pub fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn push(&mut self, walker: Walker) {
        self.next_id = self.next_id.max(walker.id + 1);
        self.walkers.push(walker);
    }

    pub fn len(&self) -> usize {
        self.walkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walkers.is_empty()
    }

    pub fn walkers(&self) -> &[Walker] {
        &self.walkers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Walker> {
        self.walkers.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Walker> {
        self.walkers.get(index)
    }

    /// Put `walker` in slot `index`, counting the replacement.
    pub fn replace(&mut self, index: usize, walker: Walker) {
        if let Some(slot) = self.walkers.get_mut(index) {
            self.next_id = self.next_id.max(walker.id + 1);
            *slot = walker;
            self.replacements += 1;
        }
    }

    /// Ascending `log_l`, NaN first.
    pub fn sort_by_log_l(&mut self) {
        self.walkers.sort_by(|a, b| log_ordering(a.log_l, b.log_l));
    }

    pub fn max_log_l(&self) -> f64 {
        self.walkers
            .iter()
            .map(|w| w.log_l)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_log_l(&self) -> f64 {
        self.walkers.iter().map(|w| w.log_l).fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_support::line_problem;
    use crate::model::PolynomialModel;

    fn walker(likelihood: &Likelihood) -> Walker {
        let problem = Arc::new(line_problem());
        let allpars = vec![0.4, 0.5, 0.3];
        let mut walker = Walker::new(0, problem.clone(), allpars, vec![0, 1], 0);
        walker.log_l = likelihood.log_likelihood(&problem, &walker.allpars);
        walker
    }

    #[test]
    fn check_detects_corruption() {
        let likelihood = Likelihood::from_name("gauss").unwrap().with_hyper_values(&[0.3]);
        let mut w = walker(&likelihood);
        assert!(w.check(&likelihood).is_ok());

        w.allpars[0] += 0.1;
        let err = w.check(&likelihood).unwrap_err();
        assert!(err.is_fatal(), "{err}");

        let mut w = walker(&likelihood);
        w.fit_index = vec![0, 0];
        assert!(w.check(&likelihood).is_err());

        let mut w = walker(&likelihood);
        w.allpars.push(1.0);
        assert!(w.check(&likelihood).is_err());
    }

    #[test]
    fn insert_and_remove_shift_fit_index() {
        let problem = Problem::classic(Box::new(PolynomialModel::dynamic(1, 4)), vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        let mut w = Walker::new(3, Arc::new(problem), vec![1.0, 2.0, 0.5], vec![0, 1, -1], 0);
        w.insert_parameter(1, 9.0);
        assert_eq!(w.allpars, vec![1.0, 9.0, 2.0, 0.5]);
        assert_eq!(w.fit_index, vec![0, 2, -1, 1]);
        w.remove_parameter(2);
        assert_eq!(w.allpars, vec![1.0, 9.0, 0.5]);
        assert_eq!(w.fit_index, vec![0, -1, 1]);

        let child = w.copy_as(10, 5);
        assert_eq!(child.parent, Some(3));
        assert_eq!(child.start, 5);
    }

    #[test]
    fn list_assigns_monotone_ids() {
        let likelihood = Likelihood::from_name("gauss").unwrap();
        let mut list = WalkerList::new();
        for _ in 0..3 {
            let mut w = walker(&likelihood);
            w.id = list.next_id();
            list.push(w);
        }
        assert_eq!(list.next_id(), 3);
        let ids: Vec<usize> = list.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(list.log_z, f64::NEG_INFINITY);
    }
}
