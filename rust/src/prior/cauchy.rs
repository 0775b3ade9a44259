use super::{clamp_unit, Prior};
use std::f64::consts::PI;

/// Lorentzian density around `center` with half-width `scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CauchyPrior {
    center: f64,
    scale: f64,
}

impl CauchyPrior {
    pub fn new(center: f64, scale: f64) -> Self {
        Self {
            center,
            scale: scale.abs().max(f64::MIN_POSITIVE),
        }
    }
}

impl Prior for CauchyPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        let u = clamp_unit(u);
        if u == 0.0 {
            return f64::NEG_INFINITY;
        }
        if u == 1.0 {
            return f64::INFINITY;
        }
        self.center + self.scale * (PI * (u - 0.5)).tan()
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        0.5 + ((x - self.center) / self.scale).atan() / PI
    }

    fn result(&self, x: f64) -> f64 {
        let z = (x - self.center) / self.scale;
        1.0 / (PI * self.scale * (1.0 + z * z))
    }

    fn partial_log(&self, x: f64) -> f64 {
        let z = (x - self.center) / self.scale;
        -2.0 * z / (self.scale * (1.0 + z * z))
    }

    fn name(&self) -> &'static str {
        "cauchy"
    }
}
