use rand::Rng;
use rand_distr::StandardNormal;

use super::{engine_core, mirror, Cube, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Isotropic Gaussian random walk in the unit cube.
///
/// Each coordinate steps by `range * scale * N(0, 1)`; the scale halves after every
/// rejected proposal and resets at the next call.
#[derive(Debug, Clone)]
pub struct RandomEngine {
    core: EngineCore,
    step_scale: f64,
}

impl RandomEngine {
    pub const DEFAULT_STEP_SCALE: f64 = 1.0;

    pub fn new(core: EngineCore) -> Self {
        Self {
            core,
            step_scale: Self::DEFAULT_STEP_SCALE,
        }
    }

    pub fn with_step_scale(mut self, step_scale: f64) -> Self {
        self.step_scale = step_scale.abs().max(1e-6);
        self
    }
}

impl Engine for RandomEngine {
    fn name(&self) -> &'static str {
        "random"
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
        let mut scale = self.step_scale;
        let mut moves = 0;
        for _ in 0..self.core.maxtrials {
            let unit: Vec<f64> = cube
                .unit
                .iter()
                .zip(&ranges)
                .map(|(u, r)| {
                    let z: f64 = self.core.rng.sample(StandardNormal);
                    mirror(u + r * scale * z)
                })
                .collect();
            let allpars = cube.to_allpars(&walker.allpars, &unit);
            let log_l = self.core.log_l(&walker.problem, &allpars);
            if self.core.judge(log_l, low_l) {
                self.core.accept(walker, allpars, log_l, low_l, ctx);
                moves += 1;
                break;
            }
            scale *= 0.5;
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
        check_engine(EngineKind::Random, &line_fixture());
    }

    #[test]
    fn moves_only_free_positions() {
        check_engine(EngineKind::Random, &dynamic_fixture());
    }
}
