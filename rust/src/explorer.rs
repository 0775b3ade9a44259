//! Diffuses freshly cloned walkers above the new floor.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::distribution::Likelihood;
use crate::engine::{Engine, EngineContext, EngineReport, UnitRange, DEFAULT_MAXTRIALS};
use crate::errors::NestedResult;
use crate::phantom::PhantomCollection;
use crate::walker::Walker;

/// Iterations without a single successful move before a stall is reported.
pub const STALL_LIMIT: usize = 10;

/// Applies the configured engines, in random order, to each walker scheduled for update.
#[derive(Debug)]
pub struct Explorer {
    likelihood: Arc<Likelihood>,
    engines: Vec<Box<dyn Engine>>,
    rng: StdRng,
    rate: f64,
    maxtrials: usize,
    threads: bool,
    stall: usize,
}

/// Run the engines on one walker until its move or call budget is spent.
fn explore_walker(
    engines: &mut [Box<dyn Engine>],
    order_rng: &mut StdRng,
    walker: &mut Walker,
    low_l: f64,
    budget: (usize, usize),
    ctx: &EngineContext,
) -> NestedResult<usize> {
    let (max_moves, max_calls) = budget;
    let mut order: Vec<usize> = (0..engines.len()).collect();
    let mut moves = 0;
    let mut calls = 0;
    while calls < max_calls && moves < max_moves && !order.is_empty() {
        order.shuffle(order_rng);
        for k in &order {
            moves += engines[*k].execute(walker, low_l, None, ctx)?;
            calls += 1;
            if calls >= max_calls || moves >= max_moves {
                break;
            }
        }
    }
    for engine in engines.iter_mut() {
        engine.release(walker.id);
    }
    Ok(moves)
}

impl Explorer {
    pub fn new(likelihood: Arc<Likelihood>, engines: Vec<Box<dyn Engine>>, seed: u64) -> Self {
        Self {
            likelihood,
            engines,
            rng: StdRng::seed_from_u64(seed),
            rate: 1.0,
            maxtrials: DEFAULT_MAXTRIALS,
            threads: false,
            stall: 0,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        if rate > 0.0 && rate.is_finite() {
            self.rate = rate;
        }
        self
    }

    pub fn with_maxtrials(mut self, maxtrials: usize) -> Self {
        self.maxtrials = maxtrials.max(1);
        for engine in self.engines.iter_mut() {
            engine.set_maxtrials(self.maxtrials);
        }
        self
    }

    pub fn with_threads(mut self, threads: bool) -> Self {
        self.threads = threads;
        self
    }

    pub fn engines(&self) -> &[Box<dyn Engine>] {
        &self.engines
    }

    /// Per-engine outcome counters, by engine name.
    pub fn reports(&self) -> Vec<(&'static str, EngineReport)> {
        self.engines.iter().map(|e| (e.name(), *e.report())).collect()
    }

    fn budget(&self, walker: &Walker) -> (usize, usize) {
        let moves = (walker.fit_index.len() as f64 / self.rate).ceil() as usize;
        let calls = (self.maxtrials as f64 / self.rate).ceil() as usize;
        (moves.max(1), calls.max(1))
    }

    /// Unit range of the live walkers, widened by the phantoms of the same size.
    pub fn unit_range(&self, live: &[Walker], npars: usize, phantoms: &Mutex<PhantomCollection>) -> UnitRange {
        let mut range = UnitRange::from_walkers(live, &self.likelihood);
        if let Ok(store) = phantoms.lock() {
            if let Some(extra) = store.unit_range(npars, &self.likelihood) {
                range.widen(&extra);
            }
        }
        range
    }

    /// Move every walker of `clones` above `low_l`; returns the total number of moves.
    ///
    /// A walker whose stored log-likelihood disagrees with a recomputation afterwards
    /// aborts the exploration with an invariant violation.
    pub fn explore(
        &mut self,
        clones: &mut [Walker],
        live: &[Walker],
        low_l: f64,
        phantoms: &Mutex<PhantomCollection>,
        iteration: usize,
    ) -> NestedResult<usize> {
        let npars = clones.first().map_or(0, |w| w.npars());
        let unit_range = self.unit_range(live, npars, phantoms);
        let ctx = EngineContext {
            walkers: live,
            unit_range: &unit_range,
            phantoms,
            iteration,
        };

        let moves = if self.threads && clones.len() > 1 {
            self.explore_parallel(clones, low_l, &ctx)?
        } else {
            let mut total = 0;
            for walker in clones.iter_mut() {
                let budget = self.budget(walker);
                total += explore_walker(&mut self.engines, &mut self.rng, walker, low_l, budget, &ctx)?;
            }
            total
        };

        for walker in clones.iter() {
            walker.check(&self.likelihood)?;
        }

        if moves == 0 {
            self.stall += 1;
            if self.stall >= STALL_LIMIT {
                warn!(
                    "engines made no successful move in {} consecutive iterations (iteration {iteration})",
                    self.stall
                );
            }
        } else {
            self.stall = 0;
        }
        debug!("iteration {iteration}: {moves} moves above logL {low_l:.6}");
        Ok(moves)
    }

    fn explore_parallel(&mut self, clones: &mut [Walker], low_l: f64, ctx: &EngineContext) -> NestedResult<usize> {
        let mut tasks: Vec<(Vec<Box<dyn Engine>>, StdRng, (usize, usize))> = Vec::with_capacity(clones.len());
        for walker in clones.iter() {
            let budget = self.budget(walker);
            let mut copies = Vec::with_capacity(self.engines.len());
            for engine in &self.engines {
                let mut copy = engine.box_clone();
                copy.reseed(self.rng.random());
                copy.core_mut().report = EngineReport::default();
                copies.push(copy);
            }
            tasks.push((copies, StdRng::seed_from_u64(self.rng.random()), budget));
        }

        let results: Vec<NestedResult<usize>> = clones
            .par_iter_mut()
            .zip(tasks.par_iter_mut())
            .map(|(walker, (engines, rng, budget))| explore_walker(engines, rng, walker, low_l, *budget, ctx))
            .collect();

        for (copies, _, _) in &tasks {
            for (engine, copy) in self.engines.iter_mut().zip(copies) {
                engine.core_mut().report.merge(copy.report());
            }
        }
        results.into_iter().sum()
    }
}
