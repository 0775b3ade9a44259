use super::{clamp_unit, Prior};

/// Flat density on `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPrior {
    low: f64,
    high: f64,
}

impl UniformPrior {
    pub fn new(low: f64, high: f64) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self { low, high }
    }
}

impl Default for UniformPrior {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl Prior for UniformPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        self.low + clamp_unit(u) * (self.high - self.low)
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        clamp_unit((x - self.low) / (self.high - self.low))
    }

    fn result(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            0.0
        } else {
            1.0 / (self.high - self.low)
        }
    }

    fn partial_log(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            f64::NAN
        } else {
            0.0
        }
    }

    fn low_limit(&self) -> f64 {
        self.low
    }

    fn high_limit(&self) -> f64 {
        self.high
    }

    fn name(&self) -> &'static str {
        "uniform"
    }
}
