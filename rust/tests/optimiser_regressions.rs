use std::f64::consts::PI;

use nalgebra::DMatrix;
use nestfit::optimisers::TerminationReason;
use nestfit::prelude::*;

fn rosenbrock(x: &[f64]) -> f64 {
    let a = 1.0 - x[0];
    let b = x[1] - x[0] * x[0];
    a * a + 100.0 * b * b
}

#[test]
fn nelder_mead_follows_rosenbrock_valley() {
    let optimiser = NelderMead::new()
        .with_max_iter(5000)
        .with_threshold(1e-14)
        .with_sigma0(0.2)
        .with_position_tolerance(1e-10);
    let result = optimiser.run(rosenbrock, vec![-1.2, 1.0]);

    assert!(result.success, "Expected convergence: {}", result.message);
    assert!((result.x[0] - 1.0).abs() < 1e-3, "x = {:?}", result.x);
    assert!((result.x[1] - 1.0).abs() < 1e-3, "x = {:?}", result.x);
    assert!(result.fun < 1e-6, "Final value too large: {}", result.fun);
}

#[test]
fn nelder_mead_stops_at_evaluation_budget() {
    let optimiser = NelderMead::new().with_max_iter(5000).with_max_evaluations(20);
    let result = optimiser.run(rosenbrock, vec![-1.2, 1.0]);

    assert_eq!(result.termination_reason, TerminationReason::MaxFunctionEvaluationsReached);
    assert!(!result.success);
    // a single step may evaluate up to one vertex per dimension past the limit
    assert!(result.nfev >= 20 && result.nfev <= 23, "nfev = {}", result.nfev);
}

#[test]
fn nelder_mead_treats_nan_as_worst() {
    let objective = |x: &[f64]| {
        if x[0] < 0.0 {
            f64::NAN
        } else {
            (x[0] - 2.0).powi(2)
        }
    };
    let optimiser = NelderMead::new()
        .with_max_iter(500)
        .with_sigma0(0.5)
        .with_threshold(1e-12)
        .with_strict_convergence();
    let result = optimiser.run(objective, vec![0.5]);

    assert!(result.fun.is_finite(), "fun = {}", result.fun);
    assert!((result.x[0] - 2.0).abs() < 1e-4, "x = {:?}", result.x);
}

#[test]
fn weighted_least_squares_recovers_exact_line() {
    let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
    let design = DMatrix::from_fn(xs.len(), 2, |i, j| if j == 0 { 1.0 } else { xs[i] });
    let target: Vec<f64> = xs.iter().map(|x| 1.5 - 0.25 * x).collect();
    let weights = vec![1.0, 2.0, 1.0, 0.5, 1.0];

    let fit = weighted_least_squares(&design, &target, &weights).unwrap();
    assert!((fit.params[0] - 1.5).abs() < 1e-10, "{:?}", fit.params);
    assert!((fit.params[1] + 0.25).abs() < 1e-10, "{:?}", fit.params);
    assert!(fit.chisq.abs() < 1e-18, "chisq = {}", fit.chisq);
    assert!(fit.stdevs().iter().all(|s| *s > 0.0));
}

#[test]
fn weighted_least_squares_rejects_mismatched_lengths() {
    let design = DMatrix::from_element(3, 2, 1.0);
    let err = weighted_least_squares(&design, &[1.0, 2.0], &[1.0, 1.0, 1.0]).unwrap_err();
    assert!(matches!(err, NestedError::InvalidInput(_)), "{err}");
}

#[test]
fn laplace_matches_analytic_constant_model() {
    let sigma: f64 = 0.5;
    let xdata: Vec<f64> = (0..8).map(f64::from).collect();
    let ydata = vec![1.1, 0.7, 1.3, 0.9, 1.0, 1.4, 0.6, 1.2];
    let n = ydata.len() as f64;
    let mean = ydata.iter().sum::<f64>() / n;
    let spread: f64 = ydata.iter().map(|y| (y - mean) * (y - mean)).sum();

    let model = PolynomialModel::new(0).with_prior(UniformPrior::new(-10.0, 10.0).shared());
    let problem = Problem::classic(Box::new(model), xdata, ydata).unwrap();
    let likelihood = Likelihood::from_name("gauss").unwrap().with_hyper_values(&[sigma]);

    let laplace = laplace_evidence(&problem, &likelihood, None).unwrap();
    let var = sigma * sigma;
    let exact = (1.0f64 / 20.0).ln() - 0.5 * n * (2.0 * PI * var).ln() - 0.5 * spread / var
        + 0.5 * (2.0 * PI * var / n).ln();

    assert!((laplace.log_z - exact).abs() < 1e-3, "{} vs {exact}", laplace.log_z);
    assert!((laplace.allpars[0] - mean).abs() < 1e-5, "mode {:?}", laplace.allpars);
    assert!((laplace.stdevs[0] - sigma / n.sqrt()).abs() < 1e-3, "{:?}", laplace.stdevs);
}
