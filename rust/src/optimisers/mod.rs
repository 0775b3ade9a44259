//! Classical fitters used next to the sampler: a Nelder-Mead minimiser, weighted linear
//! least squares and a Laplace-approximation evidence.

use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, Instant};

pub mod laplace;
pub mod linear;

pub use laplace::{laplace_evidence, LaplaceEvidence};
pub use linear::{weighted_least_squares, LinearFit};

// Optimiser traits
pub trait WithMaxIter: Sized {
    fn set_max_iter(&mut self, max_iter: usize);
    fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.set_max_iter(max_iter);
        self
    }
}

pub trait WithThreshold: Sized {
    fn set_threshold(&mut self, threshold: f64);
    fn with_threshold(mut self, threshold: f64) -> Self {
        self.set_threshold(threshold);
        self
    }
}

pub trait WithSigma0: Sized {
    fn set_sigma0(&mut self, sigma0: f64);
    fn with_sigma0(mut self, sigma0: f64) -> Self {
        self.set_sigma0(sigma0);
        self
    }
}

pub trait WithPatience: Sized {
    fn set_patience(&mut self, patience_seconds: f64);
    fn with_patience(mut self, patience_seconds: f64) -> Self {
        self.set_patience(patience_seconds);
        self
    }
}

#[derive(Debug, Clone)]
struct SimplexVertex {
    point: Vec<f64>,
    value: f64,
}

impl SimplexVertex {
    fn new(point: Vec<f64>, value: f64) -> Self {
        Self { point, value }
    }
}

fn by_value(a: &SimplexVertex, b: &SimplexVertex) -> Ordering {
    a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    FunctionToleranceReached,
    ParameterToleranceReached,
    BothTolerancesReached,
    MaxIterationsReached,
    MaxFunctionEvaluationsReached,
    PatienceElapsed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::FunctionToleranceReached => write!(f, "Function tolerance met"),
            TerminationReason::ParameterToleranceReached => write!(f, "Parameter tolerance met"),
            TerminationReason::BothTolerancesReached => {
                write!(f, "Function and parameter tolerances met")
            }
            TerminationReason::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            TerminationReason::MaxFunctionEvaluationsReached => {
                write!(f, "Maximum function evaluations reached")
            }
            TerminationReason::PatienceElapsed => write!(f, "Patience elapsed"),
        }
    }
}

/// Downhill simplex (amoeba) minimiser.
///
/// Non-finite objective values rank as `+inf`, so a vertex outside the support is always
/// the first to be replaced.
#[derive(Debug, Clone)]
pub struct NelderMead {
    max_iter: usize,
    threshold: f64,
    sigma0: f64,
    position_tolerance: f64,
    max_evaluations: Option<usize>,
    alpha: f64,
    gamma: f64,
    rho: f64,
    sigma: f64,
    patience: Option<Duration>,
    strict: bool,
}

impl NelderMead {
    pub fn new() -> Self {
        Self {
            max_iter: 1000,
            threshold: 1e-6,
            sigma0: 0.1,
            position_tolerance: 1e-6,
            max_evaluations: None,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            patience: None,
            strict: false,
        }
    }

    pub fn with_position_tolerance(mut self, tolerance: f64) -> Self {
        self.position_tolerance = tolerance.max(0.0);
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = Some(max_evaluations);
        self
    }

    /// Only stop once both the function and the position tolerance are met.
    pub fn with_strict_convergence(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_coefficients(mut self, alpha: f64, gamma: f64, rho: f64, sigma: f64) -> Self {
        self.alpha = alpha;
        self.gamma = gamma;
        self.rho = rho;
        self.sigma = sigma;
        self
    }

    fn reached_max_evaluations(&self, evaluations: usize) -> bool {
        self.max_evaluations.is_some_and(|limit| evaluations >= limit)
    }

    fn convergence_reason(&self, simplex: &[SimplexVertex]) -> Option<TerminationReason> {
        let (best, worst) = (simplex.first()?, simplex.last()?);
        let fun_diff = (worst.value - best.value).abs();

        let max_dist = simplex
            .iter()
            .skip(1)
            .map(|vertex| {
                vertex
                    .point
                    .iter()
                    .zip(&best.point)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
            })
            .fold(0.0, f64::max);

        let fun_converged = fun_diff <= self.threshold;
        let position_converged = max_dist <= self.position_tolerance;

        match (fun_converged, position_converged) {
            (true, true) => Some(TerminationReason::BothTolerancesReached),
            _ if self.strict => None,
            (true, false) => Some(TerminationReason::FunctionToleranceReached),
            (false, true) => Some(TerminationReason::ParameterToleranceReached),
            _ => None,
        }
    }

    fn build_results(simplex: &[SimplexVertex], nit: usize, nfev: usize, reason: TerminationReason) -> OptimisationResults {
        let mut ordered = simplex.to_vec();
        ordered.sort_by(by_value);

        let best = ordered
            .first()
            .cloned()
            .unwrap_or_else(|| SimplexVertex::new(Vec::new(), f64::NAN));

        let success = matches!(
            reason,
            TerminationReason::FunctionToleranceReached
                | TerminationReason::ParameterToleranceReached
                | TerminationReason::BothTolerancesReached
        );

        OptimisationResults {
            x: best.point,
            fun: best.value,
            nit,
            nfev,
            success,
            message: reason.to_string(),
            termination_reason: reason,
            final_simplex: ordered.iter().map(|v| v.point.clone()).collect(),
            final_simplex_values: ordered.iter().map(|v| v.value).collect(),
        }
    }

    fn evaluate<F: Fn(&[f64]) -> f64>(objective: &F, point: &[f64]) -> f64 {
        let value = objective(point);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }

    fn centroid(simplex: &[SimplexVertex]) -> Vec<f64> {
        let dim = simplex[0].point.len();
        let count = simplex.len() as f64;
        let mut centroid = vec![0.0; dim];
        for vertex in simplex {
            for (c, val) in centroid.iter_mut().zip(&vertex.point) {
                *c += val;
            }
        }
        centroid.iter_mut().for_each(|c| *c /= count);
        centroid
    }

    /// Affine step `from + coef * (to - from)`.
    fn towards(from: &[f64], to: &[f64], coef: f64) -> Vec<f64> {
        from.iter().zip(to).map(|(f, t)| f + coef * (t - f)).collect()
    }

    /// Minimise `objective` starting from `initial`.
    pub fn run<F: Fn(&[f64]) -> f64>(&self, objective: F, initial: Vec<f64>) -> OptimisationResults {
        let start_time = Instant::now();
        let dim = initial.len();

        let start_value = Self::evaluate(&objective, &initial);
        if dim == 0 {
            return Self::build_results(
                &[SimplexVertex::new(initial, start_value)],
                0,
                1,
                TerminationReason::BothTolerancesReached,
            );
        }

        let mut simplex = vec![SimplexVertex::new(initial.clone(), start_value)];
        let mut nfev = 1usize;

        for i in 0..dim {
            if self.reached_max_evaluations(nfev) {
                return Self::build_results(&simplex, 0, nfev, TerminationReason::MaxFunctionEvaluationsReached);
            }
            let mut point = initial.clone();
            if point[i] != 0.0 {
                point[i] *= 1.0 + self.sigma0;
            } else {
                point[i] = self.sigma0;
            }
            let value = Self::evaluate(&objective, &point);
            simplex.push(SimplexVertex::new(point, value));
            nfev += 1;
        }

        let mut nit = 0usize;
        let termination = loop {
            if self.patience.is_some_and(|p| start_time.elapsed() >= p) {
                break TerminationReason::PatienceElapsed;
            }

            simplex.sort_by(by_value);

            if let Some(reason) = self.convergence_reason(&simplex) {
                break reason;
            }
            if nit >= self.max_iter {
                break TerminationReason::MaxIterationsReached;
            }
            if self.reached_max_evaluations(nfev) {
                break TerminationReason::MaxFunctionEvaluationsReached;
            }

            nit += 1;

            let worst_index = simplex.len() - 1;
            let centroid = Self::centroid(&simplex[..worst_index]);
            let worst = simplex[worst_index].clone();

            let reflected_point = Self::towards(&centroid, &worst.point, -self.alpha);
            let reflected_value = Self::evaluate(&objective, &reflected_point);
            nfev += 1;

            if reflected_value < simplex[0].value {
                let expanded_point = Self::towards(&centroid, &reflected_point, self.gamma);
                let expanded_value = Self::evaluate(&objective, &expanded_point);
                nfev += 1;
                simplex[worst_index] = if expanded_value < reflected_value {
                    SimplexVertex::new(expanded_point, expanded_value)
                } else {
                    SimplexVertex::new(reflected_point, reflected_value)
                };
                continue;
            }

            if reflected_value < simplex[worst_index - 1].value {
                simplex[worst_index] = SimplexVertex::new(reflected_point, reflected_value);
                continue;
            }

            // Outside contraction when the reflection improved on the worst vertex
            let contract_point = if reflected_value < worst.value {
                Self::towards(&centroid, &reflected_point, self.rho)
            } else {
                Self::towards(&centroid, &worst.point, self.rho)
            };
            let contract_value = Self::evaluate(&objective, &contract_point);
            nfev += 1;

            if contract_value < worst.value.min(reflected_value) {
                simplex[worst_index] = SimplexVertex::new(contract_point, contract_value);
                continue;
            }

            // Shrink
            let best_point = simplex[0].point.clone();
            for vertex in simplex.iter_mut().skip(1) {
                let point = Self::towards(&best_point, &vertex.point, self.sigma);
                let value = Self::evaluate(&objective, &point);
                *vertex = SimplexVertex::new(point, value);
                nfev += 1;
            }
        };

        Self::build_results(&simplex, nit, nfev, termination)
    }
}

impl WithMaxIter for NelderMead {
    fn set_max_iter(&mut self, max_iter: usize) {
        self.max_iter = max_iter;
    }
}

impl WithThreshold for NelderMead {
    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }
}

impl WithSigma0 for NelderMead {
    fn set_sigma0(&mut self, sigma0: f64) {
        self.sigma0 = sigma0;
    }
}

impl WithPatience for NelderMead {
    fn set_patience(&mut self, patience_seconds: f64) {
        if patience_seconds.is_finite() && patience_seconds > 0.0 {
            self.patience = Some(Duration::from_secs_f64(patience_seconds));
        } else {
            self.patience = None;
        }
    }
}

impl Default for NelderMead {
    fn default() -> Self {
        Self::new()
    }
}

// Results object
#[derive(Debug, Clone)]
pub struct OptimisationResults {
    pub x: Vec<f64>,
    pub fun: f64,
    pub nit: usize,
    pub nfev: usize,
    pub success: bool,
    pub message: String,
    pub termination_reason: TerminationReason,
    pub final_simplex: Vec<Vec<f64>>,
    pub final_simplex_values: Vec<f64>,
}

impl fmt::Display for OptimisationResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimisationResults(x={:?}, fun={:.6}, nit={}, nfev={}, success={}, reason={})",
            self.x, self.fun, self.nit, self.nfev, self.success, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nelder_mead_minimises_quadratic() {
        let objective = |x: &[f64]| {
            let x0 = x[0] - 1.5;
            let x1 = x[1] + 0.5;
            x0 * x0 + x1 * x1
        };

        let optimiser = NelderMead::new()
            .with_max_iter(400)
            .with_threshold(1e-10)
            .with_sigma0(0.6)
            .with_position_tolerance(1e-8);

        let result = optimiser.run(objective, vec![5.0, -4.0]);

        assert!(result.success, "Expected success: {}", result.message);
        assert!((result.x[0] - 1.5).abs() < 1e-5);
        assert!((result.x[1] + 0.5).abs() < 1e-5);
        assert!(result.fun < 1e-9, "Final value too large: {}", result.fun);
        assert!(result.nit > 0);
        assert!(result.nfev >= result.nit + 1);
    }

    #[test]
    fn nelder_mead_respects_max_iterations() {
        let optimiser = NelderMead::new().with_max_iter(1).with_sigma0(1.0);
        let result = optimiser.run(|x: &[f64]| x.iter().map(|xi| xi * xi).sum(), vec![10.0, -10.0]);

        assert_eq!(result.termination_reason, TerminationReason::MaxIterationsReached);
        assert!(!result.success);
        assert!(result.nit <= 1);
    }

    #[test]
    fn nelder_mead_respects_max_function_evaluations() {
        let optimiser = NelderMead::new().with_max_evaluations(2).with_sigma0(0.5).with_max_iter(500);
        let result = optimiser.run(|x: &[f64]| x.iter().map(|xi| xi * xi).sum(), vec![2.0, 2.0]);

        assert_eq!(result.termination_reason, TerminationReason::MaxFunctionEvaluationsReached);
        assert!(!result.success);
        assert!(result.nfev <= 2);
    }

    #[test]
    fn nelder_mead_avoids_infinite_region() {
        let objective = |x: &[f64]| {
            if x[0] < 0.0 {
                f64::INFINITY
            } else {
                (x[0] - 0.3).powi(2) + (x[1] - 2.0).powi(2)
            }
        };
        let result = NelderMead::new()
            .with_threshold(1e-12)
            .with_sigma0(0.5)
            .run(objective, vec![1.0, 1.0]);
        assert!(result.success, "{result}");
        assert!((result.x[0] - 0.3).abs() < 1e-4 && (result.x[1] - 2.0).abs() < 1e-4, "{result}");
    }

    #[test]
    fn strict_convergence_waits_for_collapsed_simplex() {
        // vertices straddle the minimum with equal values after one contraction
        let objective = |x: &[f64]| (x[0] - 1.025).powi(2);
        let loose = NelderMead::new()
            .with_threshold(1e-10)
            .with_sigma0(0.1)
            .with_position_tolerance(1e-9);
        let result = loose.run(objective, vec![1.0]);
        assert_eq!(result.termination_reason, TerminationReason::FunctionToleranceReached);
        assert!((result.x[0] - 1.025).abs() > 0.01, "{result}");

        let result = loose.with_strict_convergence().run(objective, vec![1.0]);
        assert_eq!(result.termination_reason, TerminationReason::BothTolerancesReached);
        assert!((result.x[0] - 1.025).abs() < 1e-6, "{result}");
    }

    #[test]
    fn nelder_mead_respects_patience() {
        let objective = |x: &[f64]| {
            std::thread::sleep(Duration::from_millis(5));
            x.iter().map(|xi| xi * xi).sum()
        };
        let result = NelderMead::new().with_sigma0(0.5).with_patience(0.01).run(objective, vec![5.0, -5.0]);

        assert_eq!(result.termination_reason, TerminationReason::PatienceElapsed);
        assert!(!result.success);
    }
}
