use super::{clamp_unit, Prior};

/// Log-uniform density on `[low, high]` with `0 < low < high`; the usual scale prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JeffreysPrior {
    low: f64,
    high: f64,
    log_ratio: f64,
}

impl JeffreysPrior {
    pub fn new(low: f64, high: f64) -> Self {
        let low = low.abs().max(f64::MIN_POSITIVE);
        let high = high.abs().max(low * (1.0 + 1e-12));
        Self {
            low,
            high,
            log_ratio: (high / low).ln(),
        }
    }
}

impl Prior for JeffreysPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        self.low * (clamp_unit(u) * self.log_ratio).exp()
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        if x <= self.low {
            return 0.0;
        }
        clamp_unit((x / self.low).ln() / self.log_ratio)
    }

    fn result(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            0.0
        } else {
            1.0 / (x * self.log_ratio)
        }
    }

    fn partial_log(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            f64::NAN
        } else {
            -1.0 / x
        }
    }

    fn low_limit(&self) -> f64 {
        self.low
    }

    fn high_limit(&self) -> f64 {
        self.high
    }

    fn name(&self) -> &'static str {
        "jeffreys"
    }
}
