use rand::Rng;
use rand_distr::StandardNormal;

use super::{engine_core, Cube, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Steps along a random direction, doubling the step after an accepted move and
/// halving it after a rejected one.
#[derive(Debug, Clone)]
pub struct StepEngine {
    core: EngineCore,
    expansion: f64,
    max_step: f64,
}

impl StepEngine {
    pub const DEFAULT_EXPANSION: f64 = 2.0;
    pub const DEFAULT_MAX_STEP: f64 = 1.0;

    pub fn new(core: EngineCore) -> Self {
        Self {
            core,
            expansion: Self::DEFAULT_EXPANSION,
            max_step: Self::DEFAULT_MAX_STEP,
        }
    }

    pub fn with_expansion(mut self, expansion: f64) -> Self {
        self.expansion = expansion.max(1.0 + 1e-3);
        self
    }
}

impl Engine for StepEngine {
    fn name(&self) -> &'static str {
        "step"
    }

    fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        fit_index: Option<&[isize]>,
        ctx: &EngineContext,
    ) -> NestedResult<usize> {
        self.core.report.calls += 1;
        let mut cube = Cube::of(&self.core.likelihood, walker, fit_index)?;
        if cube.dim() == 0 {
            return Ok(0);
        }
        let ranges = cube.ranges(ctx.unit_range, walker.npars());
        let mut direction: Vec<f64> = ranges
            .iter()
            .map(|r| r * self.core.rng.sample::<f64, _>(StandardNormal))
            .collect();
        let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        if !(norm > 0.0) {
            self.core.report.failed += 1;
            return Ok(0);
        }
        let length = ranges.iter().map(|r| r * r).sum::<f64>().sqrt();
        for d in direction.iter_mut() {
            *d *= length / norm;
        }

        let mut step = 1.0_f64.min(self.max_step / length.max(f64::MIN_POSITIVE));
        let mut moves = 0;
        for _ in 0..self.core.maxtrials {
            let unit: Vec<f64> = cube.unit.iter().zip(&direction).map(|(u, d)| u + step * d).collect();
            if unit.iter().any(|u| !(0.0..=1.0).contains(u)) {
                self.core.report.reject += 1;
                step /= self.expansion;
                continue;
            }
            let allpars = cube.to_allpars(&walker.allpars, &unit);
            let log_l = self.core.log_l(&walker.problem, &allpars);
            if self.core.judge(log_l, low_l) {
                self.core.accept(walker, allpars, log_l, low_l, ctx);
                cube.unit = unit;
                moves += 1;
                step = (step * self.expansion).min(self.max_step / length.max(f64::MIN_POSITIVE));
            } else {
                step /= self.expansion;
            }
        }
        Ok(moves)
    }

    engine_core!();
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::EngineKind;

    #[test]
    fn keeps_walkers_above_the_floor() {
        check_engine(EngineKind::Step, &line_fixture());
        check_engine(EngineKind::Step, &dynamic_fixture());
    }
}
