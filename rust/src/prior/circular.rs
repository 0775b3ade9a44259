use super::{clamp_unit, Prior, TruncatedPrior, UniformPrior};

/// Wraps domain values into one period `[start, start + period)` before the base CDF applies.
///
/// An unbounded base is truncated to that period first.
#[derive(Debug)]
pub struct CircularPrior {
    inner: Box<dyn Prior>,
    period: f64,
    start: f64,
}

impl CircularPrior {
    pub fn new(base: Box<dyn Prior>, period: f64, start: f64) -> Self {
        let period = period.abs().max(f64::MIN_POSITIVE);
        let inner: Box<dyn Prior> = if base.low_limit() == start && base.high_limit() == start + period {
            base
        } else {
            Box::new(TruncatedPrior::new(base, start, start + period))
        };
        Self {
            inner,
            period,
            start,
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    fn wrap(&self, x: f64) -> f64 {
        self.start + (x - self.start).rem_euclid(self.period)
    }
}

impl Prior for CircularPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        self.inner.unit_to_domain(clamp_unit(u))
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return clamp_unit(self.inner.domain_to_unit(x));
        }
        self.inner.domain_to_unit(self.wrap(x))
    }

    fn result(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return 0.0;
        }
        self.inner.result(self.wrap(x))
    }

    fn log_result(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return f64::NEG_INFINITY;
        }
        self.inner.log_result(self.wrap(x))
    }

    fn partial_log(&self, x: f64) -> f64 {
        if !x.is_finite() {
            return f64::NAN;
        }
        self.inner.partial_log(self.wrap(x))
    }

    fn low_limit(&self) -> f64 {
        self.start
    }

    fn high_limit(&self) -> f64 {
        self.start + self.period
    }

    fn is_out_of_limits(&self, x: f64) -> bool {
        !x.is_finite()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Uniform prior over one period whose domain wraps around.
#[derive(Debug)]
pub struct CircularUniformPrior(CircularPrior);

impl CircularUniformPrior {
    pub fn new(low: f64, high: f64) -> Self {
        let base = UniformPrior::new(low, high);
        let (low, high) = (base.low_limit(), base.high_limit());
        Self(CircularPrior::new(Box::new(base), high - low, low))
    }
}

impl Prior for CircularUniformPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        self.0.unit_to_domain(u)
    }
    fn domain_to_unit(&self, x: f64) -> f64 {
        self.0.domain_to_unit(x)
    }
    fn result(&self, x: f64) -> f64 {
        self.0.result(x)
    }
    fn partial_log(&self, x: f64) -> f64 {
        self.0.partial_log(x)
    }
    fn low_limit(&self) -> f64 {
        self.0.low_limit()
    }
    fn high_limit(&self) -> f64 {
        self.0.high_limit()
    }
    fn is_out_of_limits(&self, x: f64) -> bool {
        self.0.is_out_of_limits(x)
    }
    fn name(&self) -> &'static str {
        "circular-uniform"
    }
}
