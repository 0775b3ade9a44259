use super::{clamp_unit, Prior};

/// Double-exponential density around `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaplacePrior {
    center: f64,
    scale: f64,
}

impl LaplacePrior {
    pub fn new(center: f64, scale: f64) -> Self {
        Self {
            center,
            scale: scale.abs().max(f64::MIN_POSITIVE),
        }
    }
}

impl Prior for LaplacePrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        let u = clamp_unit(u);
        if u < 0.5 {
            self.center + self.scale * (2.0 * u).ln()
        } else {
            self.center - self.scale * (2.0 * (1.0 - u)).ln()
        }
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        let z = (x - self.center) / self.scale;
        if z < 0.0 {
            0.5 * z.exp()
        } else {
            1.0 - 0.5 * (-z).exp()
        }
    }

    fn result(&self, x: f64) -> f64 {
        (-(x - self.center).abs() / self.scale).exp() / (2.0 * self.scale)
    }

    fn log_result(&self, x: f64) -> f64 {
        -(x - self.center).abs() / self.scale - (2.0 * self.scale).ln()
    }

    fn partial_log(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let d = x - self.center;
        if d > 0.0 {
            -1.0 / self.scale
        } else if d < 0.0 {
            1.0 / self.scale
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "laplace"
    }
}
