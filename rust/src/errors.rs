use thiserror::Error;

/// Errors surfaced by problems, distributions, engines and the sampler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NestedError {
    /// Data or configuration rejected at construction time.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A prior or hyperparameter needs bounded support but has none.
    #[error("Limit violation: {0}")]
    LimitViolation(String),

    /// Internal bookkeeping disagrees with a recomputation.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A classical fitter did not converge.
    #[error("Convergence failure: {0}")]
    ConvergenceFailure(String),

    /// A string name did not match any known engine, distribution or problem.
    #[error("Unknown {kind} name: {name}")]
    UnknownName { kind: &'static str, name: String },
}

impl NestedError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// True for the error kinds that must abort a running sampler.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

pub type NestedResult<T> = Result<T, NestedError>;
