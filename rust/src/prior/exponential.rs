use super::{clamp_unit, Prior};

/// Exponential density on `[0, inf)`, optionally with a point mass at zero.
///
/// With `zero_fraction = f`, a fraction `f` of the prior mass sits at exactly 0 and the
/// remaining `1 - f` is exponentially distributed. Dynamic models use it as a prior on the
/// number of components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialPrior {
    scale: f64,
    zero_fraction: f64,
}

impl ExponentialPrior {
    pub fn new(scale: f64) -> Self {
        Self {
            scale: scale.abs().max(f64::MIN_POSITIVE),
            zero_fraction: 0.0,
        }
    }

    pub fn with_zero_fraction(mut self, zero_fraction: f64) -> Self {
        self.zero_fraction = zero_fraction.clamp(0.0, 1.0 - f64::EPSILON);
        self
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Prior for ExponentialPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        let u = clamp_unit(u);
        if u <= self.zero_fraction {
            return 0.0;
        }
        let v = (u - self.zero_fraction) / (1.0 - self.zero_fraction);
        -self.scale * (-v).ln_1p()
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        let tail = -(-x / self.scale).exp_m1();
        clamp_unit(self.zero_fraction + (1.0 - self.zero_fraction) * tail)
    }

    fn result(&self, x: f64) -> f64 {
        if x < 0.0 || x.is_nan() {
            0.0
        } else {
            (1.0 - self.zero_fraction) * (-x / self.scale).exp() / self.scale
        }
    }

    fn partial_log(&self, x: f64) -> f64 {
        if x < 0.0 || x.is_nan() {
            f64::NAN
        } else {
            -1.0 / self.scale
        }
    }

    fn low_limit(&self) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "exponential"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fraction_puts_mass_at_origin() {
        let prior = ExponentialPrior::new(1.0).with_zero_fraction(0.3);
        assert_eq!(prior.unit_to_domain(0.1), 0.0);
        assert_eq!(prior.unit_to_domain(0.3), 0.0);
        assert!(prior.unit_to_domain(0.31) > 0.0);
        assert!((prior.domain_to_unit(0.0) - 0.3).abs() < 1e-12);
        let x = prior.unit_to_domain(0.8);
        assert!((prior.domain_to_unit(x) - 0.8).abs() < 1e-12);
    }
}
