//! Engines for problems whose free parameters are a permutation of city indices.
//!
//! Every proposal permutes the values at the free positions, so the multiset of
//! `allpars` never changes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{engine_core, Engine, EngineContext, EngineCore};
use crate::distribution::resolve_all;
use crate::errors::{NestedError, NestedResult};
use crate::problem::Tour;
use crate::walker::Walker;

/// Longest block rebuilt by the shuffle and near engines.
const MAX_BLOCK: usize = 8;

/// Apply `propose` to the free values of the walker up to `maxtrials` times and keep the
/// first permutation above `low_l`.
fn permute<F>(
    core: &mut EngineCore,
    walker: &mut Walker,
    low_l: f64,
    fit_index: Option<&[isize]>,
    ctx: &EngineContext,
    mut propose: F,
) -> NestedResult<usize>
where
    F: FnMut(&mut StdRng, &Tour, &mut [f64]) -> bool,
{
    core.report.calls += 1;
    let tour = walker
        .problem
        .tour()
        .ok_or_else(|| NestedError::invalid("ordering engines need a salesman problem"))?
        .clone();
    let mut positions = match fit_index {
        Some(index) => resolve_all(index, walker.npars(), walker.allpars.len()),
        None => walker.fit_positions(),
    };
    positions.sort_unstable();
    positions.retain(|p| *p < walker.npars());
    let original: Vec<f64> = positions.iter().map(|p| walker.allpars[*p]).collect();

    for _ in 0..core.maxtrials {
        let mut values = original.clone();
        if !propose(&mut core.rng, &tour, &mut values) || values == original {
            core.report.failed += 1;
            continue;
        }
        let mut allpars = walker.allpars.clone();
        for (pos, v) in positions.iter().zip(&values) {
            allpars[*pos] = *v;
        }
        let log_l = core.log_l(&walker.problem, &allpars);
        if core.judge(log_l, low_l) {
            core.accept(walker, allpars, log_l, low_l, ctx);
            return Ok(1);
        }
    }
    Ok(0)
}

/// Random `(start, end)` with `start < end < n`.
fn span(rng: &mut StdRng, n: usize) -> (usize, usize) {
    let a = rng.random_range(0..n - 1);
    let b = rng.random_range(a + 1..n);
    (a, b)
}

fn shuffle_all(rng: &mut StdRng, _tour: &Tour, values: &mut [f64]) -> bool {
    values.shuffle(rng);
    true
}

/// Cut a block and reinsert it elsewhere.
fn move_block(rng: &mut StdRng, _tour: &Tour, values: &mut [f64]) -> bool {
    let n = values.len();
    if n < 3 {
        return false;
    }
    let len = rng.random_range(1..=(n / 2).max(1));
    let from = rng.random_range(0..=n - len);
    let mut rest: Vec<f64> = values[..from].iter().chain(&values[from + len..]).copied().collect();
    let to = rng.random_range(0..=rest.len());
    if to == from {
        return false;
    }
    for (k, v) in values[from..from + len].iter().enumerate() {
        rest.insert(to + k, *v);
    }
    values.copy_from_slice(&rest);
    true
}

fn reverse_block(rng: &mut StdRng, _tour: &Tour, values: &mut [f64]) -> bool {
    let n = values.len();
    if n < 3 {
        return false;
    }
    let (a, b) = span(rng, n);
    values[a..=b].reverse();
    true
}

fn shuffle_block(rng: &mut StdRng, _tour: &Tour, values: &mut [f64]) -> bool {
    let n = values.len();
    if n < 3 {
        return false;
    }
    let len = rng.random_range(2..=n.min(MAX_BLOCK));
    let from = rng.random_range(0..=n - len);
    values[from..from + len].shuffle(rng);
    true
}

fn switch_pair(rng: &mut StdRng, _tour: &Tour, values: &mut [f64]) -> bool {
    let n = values.len();
    if n < 2 {
        return false;
    }
    let (a, b) = span(rng, n);
    values.swap(a, b);
    true
}

/// Undo the first crossing found from a random starting leg (a 2-opt move).
fn uncross(rng: &mut StdRng, tour: &Tour, values: &mut [f64]) -> bool {
    let n = values.len();
    if n < 4 {
        return false;
    }
    let offset = rng.random_range(0..n - 2);
    for i in (offset..n - 2).chain(0..offset) {
        for j in i + 2..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (a, b) = (values[i], values[i + 1]);
            let (c, d) = (values[j], values[(j + 1) % n]);
            let now = tour.leg(a, b) + tour.leg(c, d);
            let swapped = tour.leg(a, c) + tour.leg(b, d);
            if swapped < now - 1e-12 {
                values[i + 1..=j].reverse();
                return true;
            }
        }
    }
    false
}

/// Rebuild a block by repeatedly visiting the nearest remaining city.
fn nearest_block(rng: &mut StdRng, tour: &Tour, values: &mut [f64]) -> bool {
    let n = values.len();
    if n < 4 {
        return false;
    }
    let len = rng.random_range(2..=(n - 1).min(MAX_BLOCK));
    let from = rng.random_range(0..=n - len);
    let mut current = values[(from + n - 1) % n];
    let mut remaining = values[from..from + len].to_vec();
    for slot in values[from..from + len].iter_mut() {
        let nearest = remaining
            .iter()
            .enumerate()
            .min_by(|x, y| tour.leg(current, *x.1).total_cmp(&tour.leg(current, *y.1)))
            .map(|(k, _)| k)
            .unwrap_or(0);
        current = remaining.swap_remove(nearest);
        *slot = current;
    }
    true
}

macro_rules! ordering_engine {
    ($(#[$doc:meta])* $name:ident, $label:literal, $propose:path) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            core: EngineCore,
        }

        impl $name {
            pub fn new(core: EngineCore) -> Self {
                Self { core }
            }
        }

        impl Engine for $name {
            fn name(&self) -> &'static str {
                $label
            }

            fn execute(
                &mut self,
                walker: &mut Walker,
                low_l: f64,
                fit_index: Option<&[isize]>,
                ctx: &EngineContext,
            ) -> NestedResult<usize> {
                permute(&mut self.core, walker, low_l, fit_index, ctx, $propose)
            }

            engine_core!();
        }
    };
}

ordering_engine!(
    /// Seeds a tour with a random permutation.
    StartOrderEngine,
    "startorder",
    shuffle_all
);
ordering_engine!(MoveEngine, "move", move_block);
ordering_engine!(ReverseEngine, "reverse", reverse_block);
ordering_engine!(ShuffleEngine, "shuffle", shuffle_block);
ordering_engine!(SwitchEngine, "switch", switch_pair);
ordering_engine!(
    /// Removes self-crossings of the tour.
    LoopEngine,
    "loop",
    uncross
);
ordering_engine!(
    /// Greedy nearest-neighbour reconstruction of a sub-tour.
    NearEngine,
    "near",
    nearest_block
);
