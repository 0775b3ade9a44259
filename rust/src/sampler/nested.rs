use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distribution::{distribution_from_name, Constraint, ErrorDistribution, Likelihood};
use crate::engine::{EngineContext, EngineKind, EngineReport, UnitRange, DEFAULT_MAXTRIALS};
use crate::errors::{NestedError, NestedResult};
use crate::explorer::Explorer;
use crate::logspace::log_add_exp;
use crate::optimisers::WithMaxIter;
use crate::phantom::PhantomCollection;
use crate::problem::{Problem, ProblemKind};
use crate::sample::{Sample, SampleList};
use crate::walker::{Walker, WalkerList};

pub const DEFAULT_ENSEMBLE: usize = 100;
pub const MIN_ENSEMBLE: usize = 5;
pub const DEFAULT_END: f64 = 2.0;
pub const DEFAULT_SEED: u64 = 80409;
const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// Nested sampler: evidence and posterior samples of a problem.
///
/// The ensemble starts from independent prior draws. Each iteration discards the
/// lowest-likelihood walkers, credits their shell of prior mass to the evidence, and
/// replaces them with clones of survivors diffused above the new floor.
pub struct NestedSampler {
    problem: Problem,
    distribution: Option<Arc<dyn ErrorDistribution>>,
    limits: Vec<(f64, f64)>,
    hyper_values: Vec<f64>,
    constrain: Option<Constraint>,
    engines: Option<Vec<EngineKind>>,
    ensemble: usize,
    discard: usize,
    rate: f64,
    max_size: Option<usize>,
    max_iterations: usize,
    min_iterations: usize,
    end: f64,
    seed: u64,
    verbose: usize,
    threads: bool,
    keep: BTreeMap<usize, f64>,
    maxtrials: usize,

    likelihood: Option<Arc<Likelihood>>,
    walkers: WalkerList,
    samples: SampleList,
    floors: Vec<f64>,
    reports: Vec<(&'static str, EngineReport)>,
}

impl fmt::Debug for NestedSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedSampler")
            .field("problem", &self.problem.kind().name())
            .field("ensemble", &self.ensemble)
            .field("discard", &self.discard)
            .field("rate", &self.rate)
            .field("engines", &self.engines)
            .field("seed", &self.seed)
            .field("iterations", &self.walkers.iteration)
            .field("log_z", &self.walkers.log_z)
            .finish()
    }
}

impl WithMaxIter for NestedSampler {
    fn set_max_iter(&mut self, max_iter: usize) {
        self.max_iterations = max_iter.max(1);
    }
}

impl NestedSampler {
    pub fn new(problem: Problem) -> Self {
        Self {
            problem,
            distribution: None,
            limits: Vec::new(),
            hyper_values: Vec::new(),
            constrain: None,
            engines: None,
            ensemble: DEFAULT_ENSEMBLE,
            discard: 1,
            rate: 1.0,
            max_size: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            min_iterations: 0,
            end: DEFAULT_END,
            seed: DEFAULT_SEED,
            verbose: 1,
            threads: false,
            keep: BTreeMap::new(),
            maxtrials: DEFAULT_MAXTRIALS,
            likelihood: None,
            walkers: WalkerList::new(),
            samples: SampleList::new(),
            floors: Vec::new(),
            reports: Vec::new(),
        }
    }

    /// Number of walkers, at least [`MIN_ENSEMBLE`].
    pub fn with_ensemble(mut self, ensemble: usize) -> Self {
        self.ensemble = ensemble.max(MIN_ENSEMBLE);
        self
    }

    /// Walkers discarded per iteration; kept below the ensemble size.
    pub fn with_discard(mut self, discard: usize) -> Self {
        self.discard = discard.max(1);
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        if rate > 0.0 && rate.is_finite() {
            self.rate = rate;
        }
        self
    }

    /// Error distribution by name, replacing the problem's default.
    pub fn with_distribution(mut self, name: &str) -> NestedResult<Self> {
        self.distribution = Some(distribution_from_name(name)?);
        Ok(self)
    }

    pub fn with_error_distribution(mut self, distribution: Arc<dyn ErrorDistribution>) -> Self {
        self.distribution = Some(distribution);
        self
    }

    /// Prior limits of the leading hyperparameters; each one given becomes free.
    pub fn with_limits(mut self, limits: Vec<(f64, f64)>) -> Self {
        self.limits = limits;
        self
    }

    /// Values of the fixed hyperparameters, or starting values of the free ones.
    pub fn with_hyper_values(mut self, values: Vec<f64>) -> Self {
        self.hyper_values = values;
        self
    }

    /// Extra log-prior term on `(problem, allpars)`.
    pub fn with_constrain<F>(mut self, constrain: F) -> Self
    where
        F: Fn(&Problem, &[f64]) -> f64 + Send + Sync + 'static,
    {
        self.constrain = Some(Arc::new(constrain));
        self
    }

    /// Engines by name, replacing the problem's defaults.
    pub fn with_engines(mut self, names: &[&str]) -> NestedResult<Self> {
        let kinds = names
            .iter()
            .map(|name| name.parse::<EngineKind>())
            .collect::<NestedResult<Vec<_>>>()?;
        self.engines = Some(kinds);
        Ok(self)
    }

    /// Largest number of samples kept; the lightest are weeded out beyond it.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size.max(1));
        self
    }

    pub fn with_min_iterations(mut self, min_iterations: usize) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    /// Stop once `max logL + log X - log Z` drops below `end`.
    pub fn with_end(mut self, end: f64) -> Self {
        if end.is_finite() {
            self.end = end;
        }
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 0 is silent, 1 logs a summary, 2 progress every 100 iterations, 3 every iteration.
    pub fn with_verbose(mut self, verbose: usize) -> Self {
        self.verbose = verbose;
        self
    }

    /// Explore the replaced walkers in parallel.
    pub fn with_threads(mut self, threads: bool) -> Self {
        self.threads = threads;
        self
    }

    /// Hold problem parameters fixed at the given values.
    pub fn with_keep<I: IntoIterator<Item = (usize, f64)>>(mut self, keep: I) -> Self {
        self.keep = keep.into_iter().collect();
        self
    }

    pub fn with_maxtrials(mut self, maxtrials: usize) -> Self {
        self.maxtrials = maxtrials.max(1);
        self
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    fn build_likelihood(&self) -> NestedResult<Likelihood> {
        let distribution = match &self.distribution {
            Some(d) => d.clone(),
            None => distribution_from_name(self.problem.my_distribution())?,
        };
        let mut likelihood = Likelihood::new(distribution)
            .with_hyper_values(&self.hyper_values)
            .with_limits(&self.limits)?;
        if let Some(constrain) = &self.constrain {
            let constrain = constrain.clone();
            likelihood = likelihood.with_constrain(move |problem, allpars| constrain(problem, allpars));
        }
        likelihood.check(&self.problem)?;
        Ok(likelihood)
    }

    fn engine_kinds(&self) -> NestedResult<Vec<EngineKind>> {
        let kinds = match &self.engines {
            Some(kinds) => kinds.clone(),
            None => self
                .problem
                .my_engines()
                .into_iter()
                .map(str::parse::<EngineKind>)
                .collect::<NestedResult<Vec<_>>>()?,
        };
        let ordering = self.problem.is_ordering();
        if let Some(bad) = kinds.iter().find(|k| k.is_ordering() != ordering) {
            return Err(NestedError::invalid(format!(
                "engine {} does not apply to a {} problem",
                bad.name(),
                self.problem.kind().name()
            )));
        }
        if kinds.is_empty() {
            return Err(NestedError::invalid("no engines configured"));
        }
        Ok(kinds)
    }

    /// Free positions of a fresh walker: unkept problem parameters, then free hypers.
    fn fit_index(&self, likelihood: &Likelihood) -> Vec<isize> {
        let mut fit_index: Vec<isize> = match self.problem.kind() {
            // model parameters are integrated out
            ProblemKind::Evidence => Vec::new(),
            _ => (0..self.problem.npars())
                .filter(|k| !self.keep.contains_key(k))
                .map(|k| k as isize)
                .collect(),
        };
        fit_index.extend(likelihood.free_hyper_index());
        fit_index
    }

    fn seed_walkers(
        &self,
        problem: &Arc<Problem>,
        likelihood: &Arc<Likelihood>,
        fit_index: &[isize],
        rng: &mut StdRng,
        phantoms: &Mutex<PhantomCollection>,
    ) -> NestedResult<WalkerList> {
        let kind: EngineKind = self.problem.my_start_engine().parse()?;
        let mut start = kind.build(likelihood.clone(), rng.random());
        let unit_range = UnitRange::default();
        let ctx = EngineContext {
            walkers: &[],
            unit_range: &unit_range,
            phantoms,
            iteration: 0,
        };
        let mut base = problem.initial_parameters();
        for (pos, value) in &self.keep {
            if let Some(slot) = base.get_mut(*pos) {
                *slot = *value;
            }
        }
        base.extend_from_slice(likelihood.hyper_values());

        let mut list = WalkerList::new();
        for _ in 0..self.ensemble {
            let id = list.next_id();
            let mut walker = Walker::new(id, problem.clone(), base.clone(), fit_index.to_vec(), 0);
            if start.execute(&mut walker, f64::NEG_INFINITY, None, &ctx)? == 0 {
                return Err(NestedError::invalid(format!(
                    "the {} engine found no point with a finite likelihood",
                    kind.name()
                )));
            }
            list.push(walker);
        }
        Ok(list)
    }

    /// Run the sampler; returns the natural log of the evidence.
    pub fn sample(&mut self) -> NestedResult<f64> {
        let likelihood = Arc::new(self.build_likelihood()?);
        let kinds = self.engine_kinds()?;
        let fit_index = self.fit_index(&likelihood);
        if fit_index.is_empty() && !self.problem.is_dynamic() {
            return Err(NestedError::invalid("no free parameters to sample"));
        }
        let ensemble = self.ensemble.max(MIN_ENSEMBLE);
        let discard = self.discard.clamp(1, ensemble - 1);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let problem = Arc::new(self.problem.clone());
        let phantoms = Mutex::new(PhantomCollection::default());
        let mut walkers = self.seed_walkers(&problem, &likelihood, &fit_index, &mut rng, &phantoms)?;
        let engines = kinds.iter().map(|k| k.build(likelihood.clone(), rng.random())).collect();
        let mut explorer = Explorer::new(likelihood.clone(), engines, rng.random())
            .with_rate(self.rate)
            .with_maxtrials(self.maxtrials)
            .with_threads(self.threads);

        if self.verbose >= 1 {
            info!(
                "nested sampling {} problem: {} walkers, discard {}, engines {:?}, distribution {}",
                self.problem.kind().name(),
                ensemble,
                discard,
                kinds.iter().map(|k| k.name()).collect::<Vec<_>>(),
                likelihood.distribution().name()
            );
        }

        let shrink = discard as f64 / ensemble as f64;
        // ln(1 - exp(-d/E)) - ln d: prior mass share of each discarded walker
        let log_share = (-(-shrink).exp_m1()).ln() - (discard as f64).ln();
        let mut log_x = 0.0;
        let mut log_z = f64::NEG_INFINITY;
        let mut info = 0.0;
        let mut samples = SampleList::new();
        let mut floors = Vec::new();
        let progress = match self.verbose {
            0 | 1 => usize::MAX,
            2 => 100,
            _ => 1,
        };

        loop {
            walkers.sort_by_log_l();
            let low_l = walkers.walkers()[discard - 1].log_l;
            floors.push(low_l);

            for walker in &walkers.walkers()[..discard] {
                let log_w = log_share + log_x + walker.log_l;
                (log_z, info) = accumulate(log_z, info, log_w, walker.log_l);
                samples.push(Sample::from_walker(walker, log_w));
            }
            log_x -= shrink;
            if let Some(max_size) = self.max_size {
                if samples.len() > max_size {
                    samples.weed(max_size);
                }
            }

            walkers.iteration += 1;
            let iteration = walkers.iteration;
            if let Ok(mut store) = phantoms.lock() {
                store.prune(low_l);
            }

            let survivors = &walkers.walkers()[discard..];
            let mut clones: Vec<Walker> = Vec::with_capacity(discard);
            for _ in 0..discard {
                let parent = &survivors[rng.random_range(0..survivors.len())];
                clones.push(parent.copy_as(0, iteration));
            }
            for clone in clones.iter_mut() {
                clone.id = walkers.next_id();
            }
            let survivors = &walkers.walkers()[discard..];
            explorer.explore(&mut clones, survivors, low_l, &phantoms, iteration)?;
            for (slot, clone) in clones.into_iter().enumerate() {
                walkers.replace(slot, clone);
            }
            walkers.log_z = log_z;
            walkers.info = info;

            let max_l = walkers.max_log_l();
            if iteration % progress == 0 {
                info!(
                    "iteration {iteration}: logZ {log_z:.4}, H {info:.4}, floor {low_l:.4}, max logL {max_l:.4}"
                );
            }
            if iteration > self.min_iterations && max_l + log_x - log_z < self.end {
                debug!("converged after {iteration} iterations");
                break;
            }
            if iteration >= self.max_iterations {
                warn!(
                    "stopped at the iteration limit {} before convergence (logZ {log_z:.4})",
                    self.max_iterations
                );
                break;
            }
        }

        let log_live = log_x - (ensemble as f64).ln();
        for walker in walkers.iter() {
            let log_w = log_live + walker.log_l;
            (log_z, info) = accumulate(log_z, info, log_w, walker.log_l);
            samples.push(Sample::from_walker(walker, log_w));
        }
        if let Some(max_size) = self.max_size {
            samples.weed(max_size);
        }
        samples.normalise();
        walkers.log_z = log_z;
        walkers.info = info;

        self.reports = explorer.reports();
        if self.verbose >= 1 {
            info!(
                "finished after {} iterations: logZ {:.4} +- {:.4}, information {:.4}, {} samples",
                walkers.iteration,
                log_z,
                (info.max(0.0) / ensemble as f64).sqrt(),
                info,
                samples.len()
            );
            for (name, report) in &self.reports {
                debug!("engine {name}: {report}");
            }
        }

        self.likelihood = Some(likelihood);
        self.walkers = walkers;
        self.samples = samples;
        self.floors = floors;
        Ok(log_z)
    }

    pub fn log_z(&self) -> f64 {
        self.walkers.log_z
    }

    /// Standard deviation of `log_z`: `sqrt(H / ensemble)`.
    pub fn log_z_precision(&self) -> f64 {
        (self.walkers.info.max(0.0) / self.ensemble.max(MIN_ENSEMBLE) as f64).sqrt()
    }

    /// Kullback-Leibler information of the posterior w.r.t. the prior, in nats.
    pub fn information(&self) -> f64 {
        self.walkers.info
    }

    pub fn parameters(&self) -> Vec<f64> {
        self.samples.parameters()
    }

    pub fn stdevs(&self) -> Vec<f64> {
        self.samples.stdevs()
    }

    pub fn hyper_parameters(&self) -> Vec<f64> {
        self.samples.hyper_parameters()
    }

    /// Posterior mean of the noise scale, when the distribution has one.
    pub fn scale(&self) -> Option<f64> {
        self.samples.scale()
    }

    pub fn samples(&self) -> &SampleList {
        &self.samples
    }

    pub fn walkers(&self) -> &WalkerList {
        &self.walkers
    }

    pub fn iterations(&self) -> usize {
        self.walkers.iteration
    }

    /// Likelihood floor of every iteration.
    pub fn floors(&self) -> &[f64] {
        &self.floors
    }

    pub fn likelihood(&self) -> Option<&Likelihood> {
        self.likelihood.as_deref()
    }

    /// Engine counters of the last run.
    pub fn reports(&self) -> &[(&'static str, EngineReport)] {
        &self.reports
    }
}

/// Add a sample of weight `log_w` and likelihood `log_l` to the running evidence and
/// information.
fn accumulate(log_z: f64, info: f64, log_w: f64, log_l: f64) -> (f64, f64) {
    let new_z = log_add_exp(log_z, log_w);
    if !new_z.is_finite() {
        return (log_z, info);
    }
    let own = (log_w - new_z).exp() * log_l;
    let info = if log_z == f64::NEG_INFINITY {
        own - new_z
    } else {
        own + (log_z - new_z).exp() * (info + log_z) - new_z
    };
    (new_z, info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_support::line_problem;

    #[test]
    fn accumulate_matches_direct_sums() {
        let entries = [(-3.0, -1.0), (-2.5, -0.2), (-4.0, 0.5)];
        let (mut log_z, mut info) = (f64::NEG_INFINITY, 0.0);
        for (log_w, log_l) in entries {
            (log_z, info) = accumulate(log_z, info, log_w, log_l);
        }
        let z: f64 = entries.iter().map(|(w, _)| w.exp()).sum();
        assert!((log_z - z.ln()).abs() < 1e-12);
        let h: f64 = entries.iter().map(|(w, l)| w.exp() / z * l).sum::<f64>() - z.ln();
        assert!((info - h).abs() < 1e-12, "info {info} expected {h}");
    }

    #[test]
    fn builders_clamp() {
        let sampler = NestedSampler::new(line_problem())
            .with_ensemble(2)
            .with_discard(0)
            .with_rate(-1.0)
            .with_max_iter(0);
        assert_eq!(sampler.ensemble, MIN_ENSEMBLE);
        assert_eq!(sampler.discard, 1);
        assert_eq!(sampler.rate, 1.0);
        assert_eq!(sampler.max_iterations, 1);
        assert!(NestedSampler::new(line_problem()).with_engines(&["frog"]).is_err());
        assert!(NestedSampler::new(line_problem()).with_distribution("nope").is_err());
    }

    #[test]
    fn ordering_engines_need_a_salesman() {
        let mut sampler = NestedSampler::new(line_problem())
            .with_engines(&["switch"])
            .unwrap();
        let err = sampler.sample().unwrap_err();
        assert!(matches!(err, NestedError::InvalidInput(_)), "{err}");
    }

    #[test]
    fn weights_need_a_weighted_distribution() {
        let problem = line_problem().with_weights(vec![1.0; 12]).unwrap();
        let mut sampler = NestedSampler::new(problem).with_distribution("distance").unwrap();
        assert!(sampler.sample().is_err());
    }

    #[test]
    fn floors_rise_and_weights_normalise() {
        let mut sampler = NestedSampler::new(line_problem())
            .with_ensemble(30)
            .with_hyper_values(vec![0.3])
            .with_verbose(0);
        let log_z = sampler.sample().unwrap();
        assert!(log_z.is_finite());
        assert_eq!(log_z, sampler.log_z());
        assert!(sampler.floors().windows(2).all(|w| w[0] <= w[1]), "floor decreased");
        let total: f64 = sampler.samples().iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
        assert_eq!(sampler.samples().len(), sampler.iterations() + 30);
        for walker in sampler.walkers().iter() {
            walker.check(sampler.likelihood().unwrap()).unwrap();
        }
        let params = sampler.parameters();
        assert!((params[1] - 0.5).abs() < 0.2, "slope {params:?}");
        assert!(sampler.information() > 0.0);
        assert!(sampler.log_z_precision() > 0.0);
    }

    #[test]
    fn kept_parameters_do_not_move() {
        let mut sampler = NestedSampler::new(line_problem())
            .with_ensemble(20)
            .with_hyper_values(vec![0.3])
            .with_keep([(0, 0.4)])
            .with_verbose(0);
        sampler.sample().unwrap();
        assert!(sampler.samples().iter().all(|s| s.parameters[0] == 0.4));
    }

    #[test]
    fn same_seed_same_evidence() {
        let run = |threads| {
            let mut sampler = NestedSampler::new(line_problem())
                .with_ensemble(20)
                .with_seed(5)
                .with_threads(threads)
                .with_verbose(0);
            sampler.sample().unwrap()
        };
        assert_eq!(run(false), run(false));
        assert_eq!(run(true), run(true));
    }
}
