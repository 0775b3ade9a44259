use rand::seq::IndexedRandom;
use rand::Rng;

use super::{engine_core, Engine, EngineContext, EngineCore};
use crate::distribution::resolve_all;
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Cross-over: a contiguous run of free parameters is copied from another live walker
/// with the same parameter layout.
#[derive(Debug, Clone)]
pub struct CrossEngine {
    core: EngineCore,
}

impl CrossEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }
}

impl Engine for CrossEngine {
    fn name(&self) -> &'static str {
        "cross"
    }

    fn execute(
        &mut self,
        walker: &mut Walker,
        low_l: f64,
        fit_index: Option<&[isize]>,
        ctx: &EngineContext,
    ) -> NestedResult<usize> {
        self.core.report.calls += 1;
        let mut positions = match fit_index {
            Some(index) => resolve_all(index, walker.npars(), walker.allpars.len()),
            None => walker.fit_positions(),
        };
        positions.sort_unstable();
        let partners: Vec<&Walker> = ctx
            .walkers
            .iter()
            .filter(|w| w.id != walker.id && w.allpars.len() == walker.allpars.len() && w.npars() == walker.npars())
            .collect();
        if positions.len() < 2 || partners.is_empty() {
            return Ok(0);
        }

        for _ in 0..self.core.maxtrials {
            let Some(partner) = partners.choose(&mut self.core.rng) else {
                break;
            };
            let first = self.core.rng.random_range(0..positions.len());
            let last = self.core.rng.random_range(first..positions.len());
            let mut allpars = walker.allpars.clone();
            for pos in &positions[first..=last] {
                allpars[*pos] = partner.allpars[*pos];
            }
            if allpars == walker.allpars {
                self.core.report.failed += 1;
                continue;
            }
            let log_l = self.core.log_l(&walker.problem, &allpars);
            if self.core.judge(log_l, low_l) {
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

    #[test]
    fn keeps_walkers_above_the_floor() {
        check_engine(EngineKind::Cross, &line_fixture());
    }
}
