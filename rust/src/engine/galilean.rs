use std::collections::HashMap;

use rand::Rng;
use rand_distr::StandardNormal;

use super::{engine_core, Cube, Engine, EngineContext, EngineCore};
use crate::errors::NestedResult;
use crate::walker::Walker;

/// Moves the walker as a particle with a velocity in unit space, reflecting off the
/// likelihood contour along the local gradient.
#[derive(Debug, Clone)]
pub struct GalileanEngine {
    core: EngineCore,
    step_factor: f64,
    /// Velocities of previous successful calls, by walker id, until the walker is released.
    velocities: HashMap<usize, Vec<f64>>,
}

/// Advance `unit` by `velocity`, bouncing off the cube walls.
fn advance(unit: &[f64], velocity: &mut [f64]) -> Vec<f64> {
    unit.iter()
        .zip(velocity.iter_mut())
        .map(|(u, v)| {
            let mut x = u + *v;
            if x < 0.0 {
                x = -x;
                *v = -*v;
            }
            if x > 1.0 {
                x = 2.0 - x;
                *v = -*v;
            }
            x.clamp(0.0, 1.0)
        })
        .collect()
}

impl GalileanEngine {
    pub const DEFAULT_STEP_FACTOR: f64 = 0.5;

    pub fn new(core: EngineCore) -> Self {
        Self {
            core,
            step_factor: Self::DEFAULT_STEP_FACTOR,
            velocities: HashMap::new(),
        }
    }

    fn fresh_velocity(&mut self, ranges: &[f64]) -> Vec<f64> {
        ranges
            .iter()
            .map(|r| self.step_factor * r * self.core.rng.sample::<f64, _>(StandardNormal))
            .collect()
    }

    /// Unit normal of the contour at `unit`, pointing uphill; `None` when flat.
    fn normal(&self, walker: &Walker, cube: &Cube, unit: &[f64]) -> Option<Vec<f64>> {
        let allpars = cube.to_allpars(&walker.allpars, unit);
        let index: Vec<isize> = cube.positions.iter().map(|p| *p as isize).collect();
        let grad = self.core.likelihood.partial_log_l(&walker.problem, &allpars, &index);
        let unit_grad: Vec<f64> = grad
            .iter()
            .zip(&cube.priors)
            .zip(&cube.positions)
            .map(|((g, prior), pos)| g / prior.result(allpars[*pos]))
            .collect();
        let norm = unit_grad.iter().map(|g| g * g).sum::<f64>().sqrt();
        if !(norm.is_finite() && norm > 0.0) {
            return None;
        }
        Some(unit_grad.into_iter().map(|g| g / norm).collect())
    }
}

impl Engine for GalileanEngine {
    fn name(&self) -> &'static str {
        "galilean"
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
        let mut velocity = match self.velocities.remove(&walker.id) {
            Some(v) if v.len() == cube.dim() => v,
            _ => self.fresh_velocity(&ranges),
        };

        let mut moves = 0;
        for _ in 0..self.core.maxtrials {
            let forward = advance(&cube.unit, &mut velocity);
            let allpars = cube.to_allpars(&walker.allpars, &forward);
            let log_l = self.core.log_l(&walker.problem, &allpars);
            if self.core.judge(log_l, low_l) {
                self.core.accept(walker, allpars, log_l, low_l, ctx);
                cube.unit = forward;
                moves += 1;
                continue;
            }

            // outside: mirror the velocity on the contour normal and try from there
            let Some(normal) = self.normal(walker, &cube, &forward) else {
                self.core.report.failed += 1;
                velocity = self.fresh_velocity(&ranges);
                continue;
            };
            let dot: f64 = velocity.iter().zip(&normal).map(|(v, n)| v * n).sum();
            let mut reflected: Vec<f64> = velocity.iter().zip(&normal).map(|(v, n)| v - 2.0 * dot * n).collect();
            let bounced = advance(&forward, &mut reflected);
            let allpars = cube.to_allpars(&walker.allpars, &bounced);
            let log_l = self.core.log_l(&walker.problem, &allpars);
            if self.core.judge(log_l, low_l) {
                self.core.accept(walker, allpars, log_l, low_l, ctx);
                cube.unit = bounced;
                velocity = reflected;
                moves += 1;
            } else {
                velocity = velocity.iter().map(|v| -v).collect();
            }
        }

        if moves > 0 {
            self.velocities.insert(walker.id, velocity);
        }
        Ok(moves)
    }

    fn release(&mut self, id: usize) {
        self.velocities.remove(&id);
    }

    fn retained(&self) -> usize {
        self.velocities.len()
    }

    engine_core!();
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::EngineKind;
    use super::*;

    #[test]
    fn keeps_walkers_above_the_floor() {
        check_engine(EngineKind::Galilean, &line_fixture());
        check_engine(EngineKind::Galilean, &dynamic_fixture());
    }

    #[test]
    fn bounces_off_the_cube() {
        let mut velocity = vec![0.3, -0.4];
        let next = advance(&[0.9, 0.2], &mut velocity);
        assert!((next[0] - 0.8).abs() < 1e-12 && (next[1] - 0.2).abs() < 1e-12, "{next:?}");
        assert_eq!(velocity, vec![-0.3, 0.4]);
    }

    #[test]
    fn remembers_velocity_of_moved_walkers() {
        let fixture = line_fixture();
        let mut engine = GalileanEngine::new(EngineCore::new(fixture.likelihood.clone(), 3));
        let ctx = fixture.ctx();
        let (mut walker, low_l) = fixture.target();
        let moved = (0..10).any(|_| {
            engine.execute(&mut walker, low_l, None, &ctx).unwrap() > 0 && engine.velocities.contains_key(&walker.id)
        });
        assert!(moved, "no call kept a velocity: {}", engine.report());
    }

    #[test]
    fn released_walkers_leave_no_velocity() {
        let fixture = line_fixture();
        let mut engine = GalileanEngine::new(EngineCore::new(fixture.likelihood.clone(), 5));
        let ctx = fixture.ctx();
        let (template, low_l) = fixture.target();
        for id in 0..200 {
            let mut walker = template.copy_as(1000 + id, 1);
            engine.execute(&mut walker, low_l, None, &ctx).unwrap();
            engine.release(walker.id);
        }
        assert_eq!(engine.retained(), 0);
    }
}
