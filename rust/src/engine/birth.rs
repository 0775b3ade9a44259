use rand::Rng;

use super::{engine_core, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::problem::Problem;
use crate::walker::Walker;

/// Log ratio of the grow prior between the proposed and the current parameter count.
fn count_log_ratio(problem: &Problem, from: usize, to: usize) -> f64 {
    match problem.model().and_then(|m| m.grow_prior()) {
        Some(prior) => prior.log_result(to as f64) - prior.log_result(from as f64),
        None => 0.0,
    }
}

/// Metropolis test on the parameter-count prior.
fn accept_count(core: &mut EngineCore, log_ratio: f64) -> bool {
    if log_ratio.is_nan() {
        return false;
    }
    log_ratio >= 0.0 || core.rng.random::<f64>().ln() < log_ratio
}

/// Adds a parameter to a dynamic model.
///
/// The new value is a draw from the parameter's prior; models without priors supply
/// their own starting value.
#[derive(Debug, Clone)]
pub struct BirthEngine {
    core: EngineCore,
}

impl BirthEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    fn propose(&mut self, walker: &Walker) -> Option<Walker> {
        let mut trial = walker.clone();
        let old_npars = walker.problem.model_npars();
        let position = trial.problem_mut().model_mut()?.grow(&mut self.core.rng)?;
        let value = match trial.problem.prior(position) {
            Some(prior) => prior.unit_to_domain(self.core.rng.random()),
            None => {
                let model_params = &walker.allpars[..old_npars];
                trial.problem.model()?.grow_value(model_params, position)?
            }
        };
        trial.insert_parameter(position, value);
        let log_ratio = count_log_ratio(&trial.problem, old_npars, old_npars + 1);
        accept_count(&mut self.core, log_ratio).then_some(trial)
    }
}

impl Engine for BirthEngine {
    fn name(&self) -> &'static str {
        "birth"
    }

    fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        _fit_index: Option<&[isize]>,
        ctx: &EngineContext,
    ) -> NestedResult<usize> {
        self.core.report.calls += 1;
        if !walker.problem.is_dynamic() {
            return Ok(0);
        }
        for _ in 0..self.core.maxtrials {
            let Some(trial) = self.propose(walker) else {
                self.core.report.reject += 1;
                continue;
            };
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

/// Removes a parameter from a dynamic model.
#[derive(Debug, Clone)]
pub struct DeathEngine {
    core: EngineCore,
}

impl DeathEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    fn propose(&mut self, walker: &Walker) -> Option<Walker> {
        let mut trial = walker.clone();
        let old_npars = walker.problem.model_npars();
        let position = trial.problem_mut().model_mut()?.shrink(&mut self.core.rng)?;
        trial.remove_parameter(position);
        let log_ratio = count_log_ratio(&trial.problem, old_npars, old_npars - 1);
        accept_count(&mut self.core, log_ratio).then_some(trial)
    }
}

impl Engine for DeathEngine {
    fn name(&self) -> &'static str {
        "death"
    }

    fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        _fit_index: Option<&[isize]>,
        ctx: &EngineContext,
    ) -> NestedResult<usize> {
        self.core.report.calls += 1;
        if !walker.problem.is_dynamic() {
            return Ok(0);
        }
        for _ in 0..self.core.maxtrials {
            let Some(trial) = self.propose(walker) else {
                self.core.report.reject += 1;
                continue;
            };
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

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::EngineKind;
    use super::*;

    #[test]
    fn birth_grows_and_death_shrinks() {
        let fixture = dynamic_fixture();
        let ctx = fixture.ctx();
        let mut birth = EngineKind::Birth.build(fixture.likelihood.clone(), 21);
        let mut death = EngineKind::Death.build(fixture.likelihood.clone(), 22);

        let (mut walker, _) = fixture.target();
        assert_eq!(walker.npars(), 1);
        // a floor of -inf isolates the count prior
        let mut grown = 0;
        for _ in 0..40 {
            grown += birth.execute(&mut walker, f64::NEG_INFINITY, None, &ctx).unwrap();
        }
        assert!(grown > 0, "birth never accepted: {}", birth.report());
        assert_eq!(walker.npars(), 1 + grown);
        assert!(walker.npars() <= 5);
        assert_eq!(walker.allpars.len(), walker.npars() + 1);
        walker.check(&fixture.likelihood).unwrap();

        let before = walker.npars();
        let shrunk = (0..40)
            .map(|_| death.execute(&mut walker, f64::NEG_INFINITY, None, &ctx).unwrap())
            .sum::<usize>();
        assert!(shrunk > 0, "death never accepted: {}", death.report());
        assert_eq!(walker.npars(), before - shrunk);
        assert_eq!(walker.npars(), 1, "death should stop at the minimum degree");
        walker.check(&fixture.likelihood).unwrap();
        assert_eq!(walker.fit_index.len(), walker.npars());
    }

    #[test]
    fn static_models_are_untouched() {
        let fixture = line_fixture();
        let ctx = fixture.ctx();
        let mut birth = EngineKind::Birth.build(fixture.likelihood.clone(), 1);
        let (mut walker, low_l) = fixture.target();
        let before = walker.allpars.clone();
        assert_eq!(birth.execute(&mut walker, low_l, None, &ctx).unwrap(), 0);
        assert_eq!(walker.allpars, before);
    }

    #[test]
    fn birth_respects_the_floor() {
        let fixture = dynamic_fixture();
        let ctx = fixture.ctx();
        let mut birth = BirthEngine::new(EngineCore::new(fixture.likelihood.clone(), 4));
        let (original, low_l) = fixture.target();
        for _ in 0..20 {
            let mut walker = original.clone();
            if birth.execute(&mut walker, low_l, None, &ctx).unwrap() > 0 {
                assert!(walker.log_l > low_l);
                walker.check(&fixture.likelihood).unwrap();
            } else {
                assert_eq!(walker.allpars, original.allpars);
            }
        }
    }
}
