use rand::Rng;
use rand_distr::StandardNormal;

use super::{engine_core, Cube, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Shrink steps before a chord is declared degenerate.
const MAX_SHRINK: usize = 30;

/// Chord lengths below this count as zero.
const MIN_CHORD: f64 = 1e-12;

/// Slice sampling along a random direction: the chord through the walker is stepped out
/// to the contour, clipped to the unit cube, and shrunk until a point inside is drawn.
#[derive(Debug, Clone)]
pub struct ChordEngine {
    core: EngineCore,
}

impl ChordEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    /// Parameter interval `[lo, hi]` keeping `unit + t * direction` inside the cube.
    fn cube_limits(unit: &[f64], direction: &[f64]) -> (f64, f64) {
        let mut lo = f64::NEG_INFINITY;
        let mut hi = f64::INFINITY;
        for (u, d) in unit.iter().zip(direction) {
            if *d > 0.0 {
                lo = lo.max(-u / d);
                hi = hi.min((1.0 - u) / d);
            } else if *d < 0.0 {
                lo = lo.max((1.0 - u) / d);
                hi = hi.min(-u / d);
            }
        }
        (lo, hi)
    }

    fn point(unit: &[f64], direction: &[f64], t: f64) -> Vec<f64> {
        unit.iter()
            .zip(direction)
            .map(|(u, d)| (u + t * d).clamp(0.0, 1.0))
            .collect()
    }
}

impl Engine for ChordEngine {
    fn name(&self) -> &'static str {
        "chord"
    }

    fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        fit_index: Option<&[isize]>,
        ctx: &EngineContext,
    ) -> NestedResult<usize> {
        self.core.report.calls += 1;
        let cube = Cube::of(&self.core.likelihood, walker, fit_index)?;
        if cube.dim() == 0 {
            return Ok(0);
        }
        let ranges = cube.ranges(ctx.unit_range, walker.npars());
        let raw: Vec<f64> = (0..cube.dim())
            .map(|_| self.core.rng.sample::<f64, _>(StandardNormal))
            .collect();
        let norm = raw.iter().map(|z| z * z).sum::<f64>().sqrt();
        if !(norm > 0.0) {
            self.core.report.failed += 1;
            return Ok(0);
        }
        let direction: Vec<f64> = raw.iter().zip(&ranges).map(|(z, r)| z / norm * r).collect();

        let (tmin, tmax) = Self::cube_limits(&cube.unit, &direction);
        let inside = |core: &EngineCore, t: f64| {
            let unit = Self::point(&cube.unit, &direction, t);
            core.log_l(&walker.problem, &cube.to_allpars(&walker.allpars, &unit)) > low_l
        };

        // step out in unit widths
        let offset: f64 = self.core.rng.random();
        let mut lo = (-offset).max(tmin);
        let mut hi = (1.0 - offset).min(tmax);
        for _ in 0..self.core.maxtrials {
            if lo <= tmin || !inside(&self.core, lo) {
                break;
            }
            lo = (lo - 1.0).max(tmin);
        }
        for _ in 0..self.core.maxtrials {
            if hi >= tmax || !inside(&self.core, hi) {
                break;
            }
            hi = (hi + 1.0).min(tmax);
        }

        for _ in 0..MAX_SHRINK {
            if hi - lo < MIN_CHORD {
                break;
            }
            let t = lo + self.core.rng.random::<f64>() * (hi - lo);
            let unit = Self::point(&cube.unit, &direction, t);
            let allpars = cube.to_allpars(&walker.allpars, &unit);
            let log_l = self.core.log_l(&walker.problem, &allpars);
            if self.core.judge(log_l, low_l) {
                self.core.accept(walker, allpars, log_l, low_l, ctx);
                return Ok(1);
            }
            if t < 0.0 {
                lo = t;
            } else {
                hi = t;
            }
        }
        self.core.report.failed += 1;
        Ok(0)
    }

    engine_core!();
}
