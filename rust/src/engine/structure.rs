use super::{engine_core, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Varies the structure of a modifiable model (e.g. moves a spline knot) while keeping
/// the parameter count and values.
#[derive(Debug, Clone)]
pub struct StructEngine {
    core: EngineCore,
}

impl StructEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }
}

impl Engine for StructEngine {
    fn name(&self) -> &'static str {
        "struct"
    }

    fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        _fit_index: Option<&[isize]>,
        ctx: &EngineContext,
    ) -> NestedResult<usize> {
        self.core.report.calls += 1;
        if !walker.problem.is_modifiable() {
            return Ok(0);
        }
        for _ in 0..self.core.maxtrials {
            let mut trial = walker.clone();
            let varied = trial
                .problem_mut()
                .model_mut()
                .is_some_and(|model| model.vary(&mut self.core.rng));
            if !varied {
                self.core.report.failed += 1;
                break;
            }
            let log_l = self.core.log_l(&trial.problem, &trial.allpars);
            if self.core.judge(log_l, low_l) {
                let allpars = trial.allpars.clone();
                *walker = trial;
                self.core.accept(walker, allpars, log_l, low_l, ctx);
                return Ok(1);
            }
        }
        Ok(0)
    }

    engine_core!();
}
