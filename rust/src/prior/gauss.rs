use super::{clamp_unit, Prior};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::{PI, SQRT_2};

/// Normal density with mean `center` and standard deviation `scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPrior {
    center: f64,
    scale: f64,
}

impl GaussPrior {
    pub fn new(center: f64, scale: f64) -> Self {
        Self {
            center,
            scale: scale.abs().max(f64::MIN_POSITIVE),
        }
    }
}

impl Prior for GaussPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        let u = clamp_unit(u);
        if u == 0.0 {
            return f64::NEG_INFINITY;
        }
        if u == 1.0 {
            return f64::INFINITY;
        }
        // erfc_inv keeps full precision in both tails.
        self.center - self.scale * SQRT_2 * erfc_inv(2.0 * u)
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        let z = (x - self.center) / self.scale;
        0.5 * erfc(-z / SQRT_2)
    }

    fn result(&self, x: f64) -> f64 {
        self.log_result(x).exp()
    }

    fn log_result(&self, x: f64) -> f64 {
        let z = (x - self.center) / self.scale;
        -0.5 * z * z - self.scale.ln() - 0.5 * (2.0 * PI).ln()
    }

    fn partial_log(&self, x: f64) -> f64 {
        -(x - self.center) / (self.scale * self.scale)
    }

    fn name(&self) -> &'static str {
        "gauss"
    }
}
