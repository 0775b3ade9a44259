use super::{clamp_unit, Prior};

/// Restricts a base prior to `[low, high]` and renormalises it.
///
/// The unit interval is mapped affinely onto `[cdf(low), cdf(high)]` of the base before the
/// base inverse CDF is applied, so the reported support is exactly `[low, high]`.
#[derive(Debug)]
pub struct TruncatedPrior {
    base: Box<dyn Prior>,
    low: f64,
    high: f64,
    unit_low: f64,
    unit_span: f64,
}

impl TruncatedPrior {
    pub fn new(base: Box<dyn Prior>, low: f64, high: f64) -> Self {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let low = low.max(base.low_limit());
        let high = high.min(base.high_limit());
        let unit_low = base.domain_to_unit(low);
        let unit_high = base.domain_to_unit(high);
        Self {
            base,
            low,
            high,
            unit_low,
            unit_span: (unit_high - unit_low).max(f64::MIN_POSITIVE),
        }
    }
}

impl Prior for TruncatedPrior {
    fn unit_to_domain(&self, u: f64) -> f64 {
        let u = clamp_unit(u);
        let x = self.base.unit_to_domain(self.unit_low + u * self.unit_span);
        x.clamp(self.low, self.high)
    }

    fn domain_to_unit(&self, x: f64) -> f64 {
        if x <= self.low {
            return 0.0;
        }
        if x >= self.high {
            return 1.0;
        }
        clamp_unit((self.base.domain_to_unit(x) - self.unit_low) / self.unit_span)
    }

    fn result(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            0.0
        } else {
            self.base.result(x) / self.unit_span
        }
    }

    fn log_result(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            f64::NEG_INFINITY
        } else {
            self.base.log_result(x) - self.unit_span.ln()
        }
    }

    fn partial_log(&self, x: f64) -> f64 {
        if self.is_out_of_limits(x) {
            f64::NAN
        } else {
            self.base.partial_log(x)
        }
    }

    fn low_limit(&self) -> f64 {
        self.low
    }

    fn high_limit(&self) -> f64 {
        self.high
    }

    fn name(&self) -> &'static str {
        self.base.name()
    }
}
