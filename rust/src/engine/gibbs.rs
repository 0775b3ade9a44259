use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::StandardNormal;

use super::{engine_core, mirror, Cube, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Moves one free coordinate at a time, visiting them in random order.
#[derive(Debug, Clone)]
pub struct GibbsEngine {
    core: EngineCore,
}

impl GibbsEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }
}

impl Engine for GibbsEngine {
    fn name(&self) -> &'static str {
        "gibbs"
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
        let ranges = cube.ranges(ctx.unit_range, walker.npars());
        let mut order: Vec<usize> = (0..cube.dim()).collect();
        order.shuffle(&mut self.core.rng);

        let mut moves = 0;
        for k in order {
            let mut width = ranges[k];
            for _ in 0..self.core.maxtrials {
                let z: f64 = self.core.rng.sample(StandardNormal);
                let u = mirror(cube.unit[k] + width * z);
                let allpars = cube.with_one(&walker.allpars, k, u);
                let log_l = self.core.log_l(&walker.problem, &allpars);
                if self.core.judge(log_l, low_l) {
                    self.core.accept(walker, allpars, log_l, low_l, ctx);
                    cube.unit[k] = u;
                    moves += 1;
                    break;
                }
                width *= 0.5;
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
        check_engine(EngineKind::Gibbs, &line_fixture());
        check_engine(EngineKind::Gibbs, &dynamic_fixture());
    }
}
