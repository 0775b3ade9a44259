use rand::Rng;

use super::{engine_core, Cube, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Uniform draws before the start engine gives up on a walker.
const START_ATTEMPTS: usize = 10_000;

/// Seeds a walker by drawing every free coordinate uniformly in the unit cube.
#[derive(Debug, Clone)]
pub struct StartEngine {
    core: EngineCore,
}

impl StartEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }
}

impl Engine for StartEngine {
    fn name(&self) -> &'static str {
        "start"
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
        for _ in 0..START_ATTEMPTS {
            let unit: Vec<f64> = (0..cube.dim()).map(|_| self.core.rng.random::<f64>()).collect();
            let allpars = cube.to_allpars(&walker.allpars, &unit);
            let log_l = self.core.log_l(&walker.problem, &allpars);
            if self.core.judge(log_l, low_l) {
                self.core.accept(walker, allpars, log_l, low_l, ctx);
                return Ok(1);
            }
        }
        self.core.report.failed += 1;
        Ok(0)
    }

    engine_core!();
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn seeds_inside_the_prior() {
        let fixture = line_fixture();
        for walker in &fixture.walkers {
            assert!(walker.log_l.is_finite(), "walker {} logL {}", walker.id, walker.log_l);
            assert!(walker.allpars[..2].iter().all(|p| (-5.0..=5.0).contains(p)));
            assert!((0.05..=5.0).contains(&walker.allpars[2]), "scale {}", walker.allpars[2]);
            walker.check(&fixture.likelihood).unwrap();
        }
        // distinct draws
        assert!(fixture.walkers[0].allpars != fixture.walkers[1].allpars);
    }

    #[test]
    fn fixed_positions_are_kept() {
        let fixture = dynamic_fixture();
        for walker in &fixture.walkers {
            assert_eq!(walker.allpars.len(), 2);
            assert_eq!(walker.allpars[1], 0.2, "fixed scale was moved");
        }
    }

    #[test]
    fn unreachable_floor_counts_a_failure() {
        let fixture = line_fixture();
        let mut engine = StartEngine::new(EngineCore::new(fixture.likelihood.clone(), 4));
        let (mut walker, _) = fixture.target();
        let before = walker.allpars.clone();
        let moves = engine.execute(&mut walker, f64::INFINITY, None, &fixture.ctx()).unwrap();
        assert_eq!(moves, 0);
        assert_eq!(walker.allpars, before, "walker changed on failure");
        assert_eq!(engine.report().failed, 1);
        assert_eq!(engine.report().calls, 1);
    }
}
