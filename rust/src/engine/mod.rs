//! Engines move a walker to a new position above the likelihood floor.
//!
//! Sampling engines work in unit-cube coordinates, obtained by passing each free
//! parameter through its prior CDF. Ordering engines permute the parameters of
//! salesman-type problems instead.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::distribution::Likelihood;
use crate::errors::{NestedError, NestedResult};
use crate::phantom::PhantomCollection;
use crate::prior::PriorRef;
use crate::problem::Problem;
use crate::walker::Walker;

mod birth;
mod chord;
mod cross;
mod galilean;
mod gibbs;
mod order;
mod random;
mod start;
mod step;
mod structure;

pub use birth::{BirthEngine, DeathEngine};
pub use chord::ChordEngine;
pub use cross::CrossEngine;
pub use galilean::GalileanEngine;
pub use gibbs::GibbsEngine;
pub use order::{LoopEngine, MoveEngine, NearEngine, ReverseEngine, ShuffleEngine, StartOrderEngine, SwitchEngine};
pub use random::RandomEngine;
pub use start::StartEngine;
pub use step::StepEngine;
pub use structure::StructEngine;

/// Proposal rounds per engine call.
pub const DEFAULT_MAXTRIALS: usize = 5;

/// Smallest unit range handed to a proposal.
const MIN_UNIT_RANGE: f64 = 1e-10;

/// Counters of engine outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub success: usize,
    pub reject: usize,
    pub failed: usize,
    pub calls: usize,
}

impl EngineReport {
    pub fn merge(&mut self, other: &EngineReport) {
        self.success += other.success;
        self.reject += other.reject;
        self.failed += other.failed;
        self.calls += other.calls;
    }

    /// Fraction of proposals that were accepted.
    pub fn acceptance(&self) -> f64 {
        let tried = self.success + self.reject + self.failed;
        if tried == 0 {
            0.0
        } else {
            self.success as f64 / tried as f64
        }
    }
}

impl fmt::Display for EngineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "calls={} success={} reject={} failed={}",
            self.calls, self.success, self.reject, self.failed
        )
    }
}

/// Spread of the live ensemble in unit-cube coordinates.
///
/// Problem parameters are indexed from the front of `allpars`, hyperparameters from
/// the back, so dynamic walkers of different lengths share one range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitRange {
    /// `(min, range)` per problem parameter.
    params: Vec<(f64, f64)>,
    /// `(min, range)` per hyperparameter.
    hypers: Vec<(f64, f64)>,
}

fn spans(lo: Vec<f64>, hi: Vec<f64>) -> Vec<(f64, f64)> {
    lo.into_iter()
        .zip(hi)
        .map(|(l, h)| if l <= h { (l, h - l) } else { (0.0, 1.0) })
        .collect()
}

impl UnitRange {
    /// Per-dimension `(max - min)` and `min` of the walkers' unit coordinates.
    ///
    /// Dimensions missing from some walker, or without a prior, get range 1 and min 0.
    pub fn from_walkers<'a, I>(walkers: I, likelihood: &Likelihood) -> Self
    where
        I: IntoIterator<Item = &'a Walker>,
    {
        let walkers: Vec<&Walker> = walkers.into_iter().collect();
        let common = walkers.iter().map(|w| w.npars()).min().unwrap_or(0);
        let widest = walkers.iter().map(|w| w.npars()).max().unwrap_or(0);
        let nhyper = likelihood.nhyper();

        let mut plo = vec![f64::INFINITY; common];
        let mut phi = vec![f64::NEG_INFINITY; common];
        let mut hlo = vec![f64::INFINITY; nhyper];
        let mut hhi = vec![f64::NEG_INFINITY; nhyper];
        let mut unbound = vec![false; common];

        for walker in &walkers {
            for k in 0..common {
                match walker.problem.prior(k) {
                    Some(prior) => {
                        let u = prior.domain_to_unit(walker.allpars[k]);
                        plo[k] = plo[k].min(u);
                        phi[k] = phi[k].max(u);
                    }
                    None => unbound[k] = true,
                }
            }
            let np = walker.npars();
            for j in 0..nhyper {
                if let (Some(prior), Some(x)) = (likelihood.hyper_prior(j), walker.allpars.get(np + j)) {
                    let u = prior.domain_to_unit(*x);
                    hlo[j] = hlo[j].min(u);
                    hhi[j] = hhi[j].max(u);
                }
            }
        }

        let mut params = spans(plo, phi);
        for (k, span) in params.iter_mut().enumerate() {
            if unbound[k] {
                *span = (0.0, 1.0);
            }
        }
        params.resize(widest, (0.0, 1.0));
        Self {
            params,
            hypers: spans(hlo, hhi),
        }
    }

    /// Union with `other`, dimension by dimension.
    pub fn widen(&mut self, other: &UnitRange) {
        fn union(mine: &mut [(f64, f64)], theirs: &[(f64, f64)]) {
            for (m, t) in mine.iter_mut().zip(theirs) {
                let lo = m.0.min(t.0);
                let hi = (m.0 + m.1).max(t.0 + t.1);
                *m = (lo, hi - lo);
            }
        }
        union(&mut self.params, &other.params);
        union(&mut self.hypers, &other.hypers);
    }

    fn span(&self, npars: usize, pos: usize) -> (f64, f64) {
        let found = if pos < npars {
            self.params.get(pos)
        } else {
            self.hypers.get(pos - npars)
        };
        found.copied().unwrap_or((0.0, 1.0))
    }

    /// Unit range of absolute position `pos` for a walker with `npars` problem parameters.
    pub fn range(&self, npars: usize, pos: usize) -> f64 {
        self.span(npars, pos).1.max(MIN_UNIT_RANGE)
    }

    pub fn min(&self, npars: usize, pos: usize) -> f64 {
        self.span(npars, pos).0
    }
}

/// Read-only view of the iteration shared by all engines.
pub struct EngineContext<'a> {
    pub walkers: &'a [Walker],
    pub unit_range: &'a UnitRange,
    pub phantoms: &'a Mutex<PhantomCollection>,
    pub iteration: usize,
}

/// State every engine carries.
#[derive(Debug, Clone)]
pub struct EngineCore {
    pub likelihood: Arc<Likelihood>,
    pub rng: StdRng,
    pub report: EngineReport,
    pub maxtrials: usize,
}

impl EngineCore {
    pub fn new(likelihood: Arc<Likelihood>, seed: u64) -> Self {
        Self {
            likelihood,
            rng: StdRng::seed_from_u64(seed),
            report: EngineReport::default(),
            maxtrials: DEFAULT_MAXTRIALS,
        }
    }

    pub fn log_l(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        self.likelihood.log_likelihood(problem, allpars)
    }

    /// Commit a proposal to the walker and deposit the walker as a phantom.
    pub fn accept(&mut self, walker: &mut Walker, allpars: Vec<f64>, log_l: f64, low_l: f64, ctx: &EngineContext) {
        walker.allpars = allpars;
        walker.log_l = log_l;
        self.report.success += 1;
        if let Ok(mut phantoms) = ctx.phantoms.lock() {
            phantoms.add(walker, low_l);
        }
    }

    /// Outcome of a proposal that reached `log_l`: `true` when it clears the floor.
    ///
    /// Non-finite likelihoods above `-inf` count as failures, the rest as rejects.
    pub fn judge(&mut self, log_l: f64, low_l: f64) -> bool {
        if log_l > low_l {
            return true;
        }
        if log_l.is_nan() || log_l == f64::INFINITY {
            self.report.failed += 1;
        } else {
            self.report.reject += 1;
        }
        false
    }
}

/// Free coordinates of a walker in unit-cube form.
#[derive(Debug, Clone)]
pub struct Cube {
    pub positions: Vec<usize>,
    pub priors: Vec<PriorRef>,
    pub unit: Vec<f64>,
}

impl Cube {
    /// Fails with `LimitViolation` when a free coordinate has no prior.
    pub fn of(likelihood: &Likelihood, walker: &Walker, fit_index: Option<&[isize]>) -> NestedResult<Self> {
        let positions = match fit_index {
            Some(index) => crate::distribution::resolve_all(index, walker.npars(), walker.allpars.len()),
            None => walker.fit_positions(),
        };
        let priors = positions
            .iter()
            .map(|pos| {
                likelihood.prior(&walker.problem, *pos).ok_or_else(|| {
                    NestedError::LimitViolation(format!(
                        "position {pos} of walker {} has no prior to define a unit cube",
                        walker.id
                    ))
                })
            })
            .collect::<NestedResult<Vec<_>>>()?;
        let unit = positions
            .iter()
            .zip(&priors)
            .map(|(pos, prior)| prior.domain_to_unit(walker.allpars[*pos]))
            .collect();
        Ok(Self {
            positions,
            priors,
            unit,
        })
    }

    pub fn dim(&self) -> usize {
        self.positions.len()
    }

    /// Unit ranges of the free coordinates.
    pub fn ranges(&self, range: &UnitRange, npars: usize) -> Vec<f64> {
        self.positions.iter().map(|pos| range.range(npars, *pos)).collect()
    }

    /// `base` with every free coordinate replaced by the domain value of `unit`.
    pub fn to_allpars(&self, base: &[f64], unit: &[f64]) -> Vec<f64> {
        let mut allpars = base.to_vec();
        for ((pos, prior), u) in self.positions.iter().zip(&self.priors).zip(unit) {
            allpars[*pos] = prior.unit_to_domain(*u);
        }
        allpars
    }

    /// `base` with only free coordinate `k` moved to unit value `u`.
    pub fn with_one(&self, base: &[f64], k: usize, u: f64) -> Vec<f64> {
        let mut allpars = base.to_vec();
        allpars[self.positions[k]] = self.priors[k].unit_to_domain(u);
        allpars
    }
}

/// Reflect `u` into [0, 1].
pub fn mirror(u: f64) -> f64 {
    if !u.is_finite() {
        return 0.5;
    }
    let m = u.rem_euclid(2.0);
    if m > 1.0 {
        2.0 - m
    } else {
        m
    }
}

pub trait Engine: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Move `walker` above `low_l`; returns the number of successful moves.
    ///
    /// `fit_index` overrides the walker's own free positions. On zero moves the walker
    /// is left unchanged.
    fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        fit_index: Option<&[isize]>,
        ctx: &EngineContext,
    ) -> NestedResult<usize>;

    fn core(&self) -> &EngineCore;

    fn core_mut(&mut self) -> &mut EngineCore;

    fn report(&self) -> &EngineReport {
        &self.core().report
    }

    fn box_clone(&self) -> Box<dyn Engine>;

    fn reseed(&mut self, seed: u64) {
        self.core_mut().rng = StdRng::seed_from_u64(seed);
    }

    fn set_maxtrials(&mut self, maxtrials: usize) {
        self.core_mut().maxtrials = maxtrials.max(1);
    }

    /// Drop any state kept for walker `id`; called when its exploration ends.
    fn release(&mut self, _id: usize) {}

    /// Number of walkers this engine holds state for.
    fn retained(&self) -> usize {
        0
    }
}

impl Clone for Box<dyn Engine> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Implements the boilerplate accessors of [`Engine`] for a struct with a `core` field.
macro_rules! engine_core {
    () => {
        fn core(&self) -> &$crate::engine::EngineCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::engine::EngineCore {
            &mut self.core
        }

        fn box_clone(&self) -> Box<dyn $crate::engine::Engine> {
            Box::new(self.clone())
        }
    };
}
pub(crate) use engine_core;

/// Every engine the sampler can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Start,
    StartOrder,
    Random,
    Gibbs,
    Step,
    Galilean,
    Chord,
    Cross,
    Birth,
    Death,
    Struct,
    Move,
    Reverse,
    Shuffle,
    Switch,
    Near,
    Loop,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Start => "start",
            EngineKind::StartOrder => "startorder",
            EngineKind::Random => "random",
            EngineKind::Gibbs => "gibbs",
            EngineKind::Step => "step",
            EngineKind::Galilean => "galilean",
            EngineKind::Chord => "chord",
            EngineKind::Cross => "cross",
            EngineKind::Birth => "birth",
            EngineKind::Death => "death",
            EngineKind::Struct => "struct",
            EngineKind::Move => "move",
            EngineKind::Reverse => "reverse",
            EngineKind::Shuffle => "shuffle",
            EngineKind::Switch => "switch",
            EngineKind::Near => "near",
            EngineKind::Loop => "loop",
        }
    }

    /// Engines that permute the parameters instead of moving them in the unit cube.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            EngineKind::StartOrder
                | EngineKind::Move
                | EngineKind::Reverse
                | EngineKind::Shuffle
                | EngineKind::Switch
                | EngineKind::Near
                | EngineKind::Loop
        )
    }

    pub fn build(self, likelihood: Arc<Likelihood>, seed: u64) -> Box<dyn Engine> {
        let core = EngineCore::new(likelihood, seed);
        match self {
            EngineKind::Start => Box::new(StartEngine::new(core)),
            EngineKind::StartOrder => Box::new(StartOrderEngine::new(core)),
            EngineKind::Random => Box::new(RandomEngine::new(core)),
            EngineKind::Gibbs => Box::new(GibbsEngine::new(core)),
            EngineKind::Step => Box::new(StepEngine::new(core)),
            EngineKind::Galilean => Box::new(GalileanEngine::new(core)),
            EngineKind::Chord => Box::new(ChordEngine::new(core)),
            EngineKind::Cross => Box::new(CrossEngine::new(core)),
            EngineKind::Birth => Box::new(BirthEngine::new(core)),
            EngineKind::Death => Box::new(DeathEngine::new(core)),
            EngineKind::Struct => Box::new(StructEngine::new(core)),
            EngineKind::Move => Box::new(MoveEngine::new(core)),
            EngineKind::Reverse => Box::new(ReverseEngine::new(core)),
            EngineKind::Shuffle => Box::new(ShuffleEngine::new(core)),
            EngineKind::Switch => Box::new(SwitchEngine::new(core)),
            EngineKind::Near => Box::new(NearEngine::new(core)),
            EngineKind::Loop => Box::new(LoopEngine::new(core)),
        }
    }
}

impl FromStr for EngineKind {
    type Err = NestedError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "start" => EngineKind::Start,
            "startorder" => EngineKind::StartOrder,
            "random" => EngineKind::Random,
            "gibbs" => EngineKind::Gibbs,
            "step" => EngineKind::Step,
            "galilean" => EngineKind::Galilean,
            "chord" => EngineKind::Chord,
            "cross" => EngineKind::Cross,
            "birth" => EngineKind::Birth,
            "death" => EngineKind::Death,
            "struct" => EngineKind::Struct,
            "move" => EngineKind::Move,
            "reverse" => EngineKind::Reverse,
            "shuffle" => EngineKind::Shuffle,
            "switch" => EngineKind::Switch,
            "near" => EngineKind::Near,
            "loop" => EngineKind::Loop,
            _ => {
                return Err(NestedError::UnknownName {
                    kind: "engine",
                    name: name.to_string(),
                })
            }
        };
        Ok(kind)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in [
            "start", "startorder", "random", "gibbs", "step", "galilean", "chord", "cross", "birth", "death",
            "struct", "move", "reverse", "shuffle", "switch", "near", "loop",
        ] {
            let kind: EngineKind = name.parse().expect("known engine");
            assert_eq!(kind.name(), name);
        }
        let err = "frog".parse::<EngineKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown engine name: frog");
    }

    #[test]
    fn mirror_reflects_into_unit_interval() {
        assert!((mirror(1.2) - 0.8).abs() < 1e-12);
        assert!((mirror(-0.3) - 0.3).abs() < 1e-12);
        assert!((mirror(0.4) - 0.4).abs() < 1e-12);
        assert_eq!(mirror(f64::NAN), 0.5);
    }

    #[test]
    fn unit_range_covers_the_ensemble() {
        let fixture = line_fixture();
        let range = &fixture.unit_range;
        for pos in [0, 1, 2] {
            let r = range.range(2, pos);
            assert!(r > 0.0 && r <= 1.0, "range {r} at {pos}");
            for walker in &fixture.walkers {
                let prior = fixture.likelihood.prior(&walker.problem, pos).unwrap();
                let u = prior.domain_to_unit(walker.allpars[pos]);
                let min = range.min(2, pos);
                assert!(u >= min - 1e-12 && u <= min + r + 1e-12);
            }
        }
        // a missing dimension defaults to the full cube
        assert_eq!(range.range(5, 4), 1.0);
    }

    #[test]
    fn widen_takes_the_union() {
        let mut narrow = UnitRange {
            params: vec![(0.4, 0.1), (0.2, 0.1)],
            hypers: vec![(0.5, 0.2)],
        };
        let wide = UnitRange {
            params: vec![(0.3, 0.1), (0.1, 0.5)],
            hypers: vec![(0.6, 0.05)],
        };
        narrow.widen(&wide);
        assert!((narrow.min(2, 0) - 0.3).abs() < 1e-12 && (narrow.range(2, 0) - 0.2).abs() < 1e-12);
        assert!((narrow.range(2, 1) - 0.5).abs() < 1e-12);
        assert!((narrow.range(2, 2) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn report_merges() {
        let mut a = EngineReport {
            success: 1,
            reject: 2,
            failed: 0,
            calls: 3,
        };
        a.merge(&EngineReport {
            success: 1,
            reject: 0,
            failed: 1,
            calls: 2,
        });
        assert_eq!(a.calls, 5);
        assert!((a.acceptance() - 0.4).abs() < 1e-12);
    }
}
