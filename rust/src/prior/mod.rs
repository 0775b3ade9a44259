//! Priors map the unit interval onto a parameter domain.
//!
//! Every prior exposes its inverse CDF (`unit_to_domain`), its CDF (`domain_to_unit`) and
//! its (log) density. Truncation and circularity are decorators that wrap any base prior,
//! so a half-Gauss is `GaussPrior::new(0.0, 1.0).truncated(0.0, f64::INFINITY)`.

use std::fmt;
use std::sync::Arc;

mod cauchy;
mod circular;
mod exponential;
mod gauss;
mod jeffreys;
mod laplace;
mod truncated;
mod uniform;

pub use cauchy::CauchyPrior;
pub use circular::{CircularPrior, CircularUniformPrior};
pub use exponential::ExponentialPrior;
pub use gauss::GaussPrior;
pub use jeffreys::JeffreysPrior;
pub use laplace::LaplacePrior;
pub use truncated::TruncatedPrior;
pub use uniform::UniformPrior;

/// Shared, immutable prior handle. Models and distributions hand these out freely.
pub type PriorRef = Arc<dyn Prior>;

/// Density on one real coordinate with a unit-interval bijection.
pub trait Prior: fmt::Debug + Send + Sync {
    /// Inverse CDF. Values of `u` outside (0, 1) saturate to the domain limits.
    fn unit_to_domain(&self, u: f64) -> f64;

    /// CDF. Total: 0 below and 1 above the domain.
    fn domain_to_unit(&self, x: f64) -> f64;

    /// Probability density at `x`, zero outside the support.
    fn result(&self, x: f64) -> f64;

    /// Derivative of `log_result`; NaN outside the support.
    fn partial_log(&self, x: f64) -> f64;

    fn low_limit(&self) -> f64 {
        f64::NEG_INFINITY
    }

    fn high_limit(&self) -> f64 {
        f64::INFINITY
    }

    fn name(&self) -> &'static str;

    fn log_result(&self, x: f64) -> f64 {
        let density = self.result(x);
        if density > 0.0 {
            density.ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    fn is_bound(&self) -> bool {
        self.low_limit().is_finite() && self.high_limit().is_finite()
    }

    fn is_out_of_limits(&self, x: f64) -> bool {
        x.is_nan() || x < self.low_limit() || x > self.high_limit()
    }

    /// Width of the support; infinite for unbounded priors.
    fn range(&self) -> f64 {
        self.high_limit() - self.low_limit()
    }
}

/// Decorator constructors available on every concrete prior.
pub trait PriorExt: Prior + Sized + 'static {
    /// Restrict the support to `[low, high]`; either side may be infinite.
    fn truncated(self, low: f64, high: f64) -> TruncatedPrior {
        TruncatedPrior::new(Box::new(self), low, high)
    }

    /// Wrap domain values with the given period, starting at `start`.
    fn circular(self, period: f64, start: f64) -> CircularPrior {
        CircularPrior::new(Box::new(self), period, start)
    }

    fn shared(self) -> PriorRef {
        Arc::new(self)
    }
}

impl<P: Prior + Sized + 'static> PriorExt for P {}

impl Prior for Box<dyn Prior> {
    fn unit_to_domain(&self, u: f64) -> f64 {
        self.as_ref().unit_to_domain(u)
    }
    fn domain_to_unit(&self, x: f64) -> f64 {
        self.as_ref().domain_to_unit(x)
    }
    fn result(&self, x: f64) -> f64 {
        self.as_ref().result(x)
    }
    fn partial_log(&self, x: f64) -> f64 {
        self.as_ref().partial_log(x)
    }
    fn low_limit(&self) -> f64 {
        self.as_ref().low_limit()
    }
    fn high_limit(&self) -> f64 {
        self.as_ref().high_limit()
    }
    fn name(&self) -> &'static str {
        self.as_ref().name()
    }
    fn log_result(&self, x: f64) -> f64 {
        self.as_ref().log_result(x)
    }
    fn is_bound(&self) -> bool {
        self.as_ref().is_bound()
    }
    fn is_out_of_limits(&self, x: f64) -> bool {
        self.as_ref().is_out_of_limits(x)
    }
    fn range(&self) -> f64 {
        self.as_ref().range()
    }
}

/// Clamp a unit value into [0, 1]; NaN maps to 0.5.
pub(crate) fn clamp_unit(u: f64) -> f64 {
    if u.is_nan() {
        0.5
    } else {
        u.clamp(0.0, 1.0)
    }
}
