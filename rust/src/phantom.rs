//! Interim walkers kept from accepted engine moves.

use std::collections::BTreeMap;

use crate::distribution::Likelihood;
use crate::engine::UnitRange;
use crate::walker::Walker;

/// Phantoms needed before their spread is trusted as a unit range.
pub const MIN_PHANTOMS: usize = 10;

/// Phantoms kept per parameter count.
pub const DEFAULT_PHANTOM_CAP: usize = 2000;

/// Accepted interim walkers, per parameter count, sorted by ascending `log_l`.
#[derive(Debug, Clone)]
pub struct PhantomCollection {
    store: BTreeMap<usize, Vec<Walker>>,
    minpars: usize,
    cap: usize,
}

impl Default for PhantomCollection {
    fn default() -> Self {
        Self::new(MIN_PHANTOMS, DEFAULT_PHANTOM_CAP)
    }
}

impl PhantomCollection {
    pub fn new(minpars: usize, cap: usize) -> Self {
        Self {
            store: BTreeMap::new(),
            minpars: minpars.max(1),
            cap: cap.max(1),
        }
    }

    /// Store a copy of `walker` when it lies above `low_l`.
    pub fn add(&mut self, walker: &Walker, low_l: f64) {
        if !(walker.log_l > low_l) {
            return;
        }
        let list = self.store.entry(walker.npars()).or_default();
        let at = list.partition_point(|w| w.log_l <= walker.log_l);
        list.insert(at, walker.clone());
        if list.len() > self.cap {
            list.remove(0);
        }
    }

    /// Drop every phantom at or below the floor.
    pub fn prune(&mut self, low_l: f64) {
        for list in self.store.values_mut() {
            let below = list.partition_point(|w| w.log_l <= low_l);
            list.drain(..below);
        }
        self.store.retain(|_, list| !list.is_empty());
    }

    pub fn len(&self) -> usize {
        self.store.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn count(&self, npars: usize) -> usize {
        self.store.get(&npars).map_or(0, Vec::len)
    }

    pub fn phantoms(&self, npars: usize) -> &[Walker] {
        self.store.get(&npars).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unit range of the phantoms with `npars` parameters; `None` when too few remain.
    pub fn unit_range(&self, npars: usize, likelihood: &Likelihood) -> Option<UnitRange> {
        let list = self.store.get(&npars)?;
        if list.len() < self.minpars {
            return None;
        }
        Some(UnitRange::from_walkers(list, likelihood))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::distribution::test_support::line_problem;

    fn walker(id: usize, log_l: f64) -> Walker {
        let mut w = Walker::new(id, Arc::new(line_problem()), vec![0.1 * id as f64, 0.5, 0.3], vec![0, 1], 0);
        w.log_l = log_l;
        w
    }

    #[test]
    fn keeps_sorted_and_prunes_to_the_floor() {
        let mut phantoms = PhantomCollection::new(3, 100);
        for (id, log_l) in [(0, -3.0), (1, -1.0), (2, -2.0), (3, -5.0), (4, -0.5)] {
            phantoms.add(&walker(id, log_l), -4.0);
        }
        assert_eq!(phantoms.len(), 4, "the walker below the floor must be refused");
        let levels: Vec<f64> = phantoms.phantoms(2).iter().map(|w| w.log_l).collect();
        assert_eq!(levels, vec![-3.0, -2.0, -1.0, -0.5]);

        phantoms.prune(-2.0);
        let levels: Vec<f64> = phantoms.phantoms(2).iter().map(|w| w.log_l).collect();
        assert_eq!(levels, vec![-1.0, -0.5]);
        assert!(phantoms.phantoms(2).iter().all(|w| w.log_l > -2.0));

        phantoms.prune(0.0);
        assert!(phantoms.is_empty());
    }

    #[test]
    fn unit_range_needs_enough_phantoms() {
        let likelihood = Likelihood::from_name("gauss").unwrap();
        let mut phantoms = PhantomCollection::new(3, 100);
        phantoms.add(&walker(1, -1.0), -10.0);
        phantoms.add(&walker(2, -2.0), -10.0);
        assert!(phantoms.unit_range(2, &likelihood).is_none());
        phantoms.add(&walker(5, -3.0), -10.0);
        let range = phantoms.unit_range(2, &likelihood).expect("three phantoms");
        // first coefficients span 0.1..0.5 under U(-5, 5)
        assert!((range.range(2, 0) - 0.04).abs() < 1e-12, "{}", range.range(2, 0));
        assert_eq!(phantoms.count(3), 0);
    }

    #[test]
    fn cap_drops_the_lowest() {
        let mut phantoms = PhantomCollection::new(1, 2);
        for (id, log_l) in [(0, -3.0), (1, -1.0), (2, -2.0)] {
            phantoms.add(&walker(id, log_l), -10.0);
        }
        let levels: Vec<f64> = phantoms.phantoms(2).iter().map(|w| w.log_l).collect();
        assert_eq!(levels, vec![-2.0, -1.0]);
    }
}
