use std::f64::consts::PI;

use nestfit::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// `y = 1 + 0.5 x` with a fixed, deterministic noise pattern.
fn line_data(n: usize, noise: f64) -> (Vec<f64>, Vec<f64>) {
    let xdata: Vec<f64> = (0..n).map(|i| i as f64 * 0.5).collect();
    let ydata = xdata
        .iter()
        .enumerate()
        .map(|(i, x)| 1.0 + 0.5 * x + noise * ((i * 5 % 7) as f64 - 3.0) / 3.0)
        .collect();
    (xdata, ydata)
}

fn line_problem() -> Problem {
    let (xdata, ydata) = line_data(12, 0.2);
    let model = PolynomialModel::new(1).with_prior(UniformPrior::new(-5.0, 5.0).shared());
    Problem::classic(Box::new(model), xdata, ydata).expect("failed to build problem")
}

#[test]
fn linear_evidence_agrees_with_laplace() {
    let problem = line_problem();
    let likelihood = Likelihood::from_name("gauss")
        .expect("gauss distribution")
        .with_hyper_values(&[0.2]);
    let laplace = laplace_evidence(&problem, &likelihood, None).expect("laplace evidence");

    let mut sampler = NestedSampler::new(problem)
        .with_ensemble(100)
        .with_hyper_values(vec![0.2])
        .with_verbose(0);
    let log_z = sampler.sample().expect("sampler run");

    let tolerance = 4.0 * sampler.log_z_precision() + 0.3;
    assert!(
        (log_z - laplace.log_z).abs() < tolerance,
        "nested logZ {log_z} vs laplace {} (tolerance {tolerance})",
        laplace.log_z
    );

    let params = sampler.parameters();
    let stdevs = sampler.stdevs();
    for k in 0..2 {
        assert!(
            (params[k] - laplace.allpars[k]).abs() < 3.0 * laplace.stdevs[k],
            "parameter {k}: {} vs mode {} +- {}",
            params[k],
            laplace.allpars[k],
            laplace.stdevs[k]
        );
        assert!(
            stdevs[k] > 0.3 * laplace.stdevs[k] && stdevs[k] < 3.0 * laplace.stdevs[k],
            "stdev {k}: {} vs {}",
            stdevs[k],
            laplace.stdevs[k]
        );
    }
}

#[test]
fn linear_evidence_is_stable_over_seeds() {
    let problem = line_problem();
    let likelihood = Likelihood::from_name("gauss")
        .expect("gauss distribution")
        .with_hyper_values(&[0.2]);
    let laplace = laplace_evidence(&problem, &likelihood, None).expect("laplace evidence");

    let mut log_zs = Vec::new();
    let mut precisions = Vec::new();
    for seed in 0..10 {
        let mut sampler = NestedSampler::new(problem.clone())
            .with_ensemble(100)
            .with_hyper_values(vec![0.2])
            .with_seed(1000 + seed)
            .with_verbose(0);
        log_zs.push(sampler.sample().expect("sampler run"));
        precisions.push(sampler.log_z_precision());
    }

    let within = log_zs
        .iter()
        .zip(&precisions)
        .filter(|(z, p)| (*z - laplace.log_z).abs() < 2.0 * *p)
        .count();
    let mean = log_zs.iter().sum::<f64>() / 10.0;
    let precision = precisions.iter().sum::<f64>() / 10.0;
    assert!(
        (mean - laplace.log_z).abs() < 2.0 * precision,
        "mean logZ {mean} vs laplace {} (precision {precision})",
        laplace.log_z
    );
    assert!(within >= 8, "only {within} of 10 runs within 2 precision: {log_zs:?}");
}

#[test]
fn constant_model_on_gaussian_noise() {
    let sigma: f64 = 0.1;
    let mut rng = StdRng::seed_from_u64(2024);
    let ydata: Vec<f64> = (0..100).map(|_| sigma * rng.sample::<f64, _>(StandardNormal)).collect();
    let xdata: Vec<f64> = (0..100).map(f64::from).collect();
    let n = ydata.len() as f64;
    let mean = ydata.iter().sum::<f64>() / n;
    let spread: f64 = ydata.iter().map(|y| (y - mean) * (y - mean)).sum();
    let var = sigma * sigma;
    let exact = (0.25f64).ln() - 0.5 * n * (2.0 * PI * var).ln() - 0.5 * spread / var
        + 0.5 * (2.0 * PI * var / n).ln();

    let model = PolynomialModel::new(0).with_prior(UniformPrior::new(-2.0, 2.0).shared());
    let problem = Problem::classic(Box::new(model), xdata, ydata).unwrap();
    let mut sampler = NestedSampler::new(problem)
        .with_ensemble(100)
        .with_hyper_values(vec![sigma])
        .with_verbose(0);
    let log_z = sampler.sample().unwrap();

    let precision = sampler.log_z_precision();
    assert!(
        (log_z - exact).abs() < 4.0 * precision,
        "logZ {log_z} vs analytic {exact} (precision {precision})"
    );
    let offset = sampler.parameters()[0];
    let stdev = sampler.stdevs()[0];
    assert!((offset - mean).abs() < 0.005, "offset {offset} vs data mean {mean}");
    assert!(stdev > 0.007 && stdev < 0.013, "stdev {stdev}");
}

#[test]
fn four_point_line_with_errors_in_x_and_y() {
    let xdata = vec![0.0, 2.0, 8.0, 10.0];
    let ydata = vec![2.0, 0.0, 10.0, 8.0];
    let model = PolynomialModel::new(1).with_prior(UniformPrior::new(-5.0, 5.0).shared());
    let problem = Problem::errors_in_xy(Box::new(model), xdata, ydata, vec![[[1.0, 0.0], [0.0, 2.0]]]).unwrap();
    assert_eq!(problem.npars(), 6);

    let mut sampler = NestedSampler::new(problem)
        .with_ensemble(100)
        .with_hyper_values(vec![1.0])
        .with_verbose(0);
    sampler.sample().unwrap();

    let params = sampler.parameters();
    assert!(params[0].abs() < 1.5, "intercept {params:?}");
    assert!((params[1] - 1.0).abs() < 0.3, "slope {params:?}");
    for (x, target) in params[2..].iter().zip([1.0, 1.0, 9.0, 9.0]) {
        assert!((x - target).abs() < 1.0, "nuisance x {params:?}");
    }
}

#[test]
fn free_noise_scale_is_recovered() {
    let (xdata, ydata) = line_data(20, 0.3);
    let model = PolynomialModel::new(1).with_prior(UniformPrior::new(-5.0, 5.0).shared());
    let problem = Problem::classic(Box::new(model), xdata, ydata).unwrap();
    let mut sampler = NestedSampler::new(problem)
        .with_ensemble(50)
        .with_limits(vec![(0.01, 10.0)])
        .with_verbose(0);
    sampler.sample().unwrap();

    let scale = sampler.scale().expect("scale hyperparameter");
    assert!(scale > 0.1 && scale < 0.5, "scale {scale}");
    for sample in sampler.samples().iter() {
        assert_eq!(sample.hyper_parameters.len(), 1);
        assert!((0.01..=10.0).contains(&sample.hyper_parameters[0]));
    }
    let total: f64 = sampler.samples().iter().map(|s| s.weight()).sum();
    assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
}

#[test]
fn poisson_rate() {
    let counts = [3.0, 5.0, 4.0, 6.0, 2.0, 5.0, 7.0, 4.0, 3.0, 5.0];
    let xdata: Vec<f64> = (0..counts.len()).map(|i| i as f64).collect();
    let model = PolynomialModel::new(0).with_prior(UniformPrior::new(0.0, 20.0).shared());
    let problem = Problem::classic(Box::new(model), xdata, counts.to_vec()).unwrap();
    let mut sampler = NestedSampler::new(problem)
        .with_ensemble(50)
        .with_distribution("poisson")
        .unwrap()
        .with_verbose(0);
    let log_z = sampler.sample().unwrap();

    assert!(log_z.is_finite());
    let rate = sampler.parameters()[0];
    // posterior mean of a flat-prior Poisson rate: (sum + 1) / n
    assert!((rate - 4.5).abs() < 0.4, "rate {rate}");
}

#[test]
fn bernoulli_probability() {
    let labels: Vec<usize> = (0..40).map(|i| usize::from(i % 10 < 3)).collect();
    let xdata: Vec<f64> = (0..40).map(|i| i as f64).collect();
    let model = PolynomialModel::new(0).with_prior(UniformPrior::new(0.0, 1.0).shared());
    let problem = Problem::categorical(Box::new(model), xdata, labels).unwrap();
    let mut sampler = NestedSampler::new(problem).with_ensemble(40).with_verbose(0);
    sampler.sample().unwrap();

    let p = sampler.parameters()[0];
    assert!((p - 0.3).abs() < 0.08, "probability {p}");
}

#[test]
fn errors_in_x_and_y() {
    let xtrue: Vec<f64> = (0..8).map(|i| i as f64).collect();
    let xdata: Vec<f64> = xtrue
        .iter()
        .enumerate()
        .map(|(i, x)| x + 0.1 * ((i * 3 % 5) as f64 - 2.0) / 2.0)
        .collect();
    let ydata: Vec<f64> = xtrue
        .iter()
        .enumerate()
        .map(|(i, x)| 2.0 - 0.5 * x + 0.1 * ((i * 2 % 5) as f64 - 2.0) / 2.0)
        .collect();
    let model = PolynomialModel::new(1).with_prior(UniformPrior::new(-5.0, 5.0).shared());
    let problem = Problem::errors_in_xy(Box::new(model), xdata, ydata, vec![[[0.01, 0.0], [0.0, 0.01]]]).unwrap();
    assert_eq!(problem.npars(), 10);

    let mut sampler = NestedSampler::new(problem)
        .with_ensemble(50)
        .with_hyper_values(vec![1.0])
        .with_verbose(0);
    let log_z = sampler.sample().unwrap();

    assert!(log_z.is_finite());
    let params = sampler.parameters();
    assert_eq!(params.len(), 10);
    assert!((params[0] - 2.0).abs() < 0.3, "offset {params:?}");
    assert!((params[1] + 0.5).abs() < 0.1, "slope {params:?}");
    for walker in sampler.walkers().iter() {
        walker.check(sampler.likelihood().unwrap()).unwrap();
    }
}

#[test]
fn explicit_engines_and_threads() {
    for engines in [vec!["gibbs", "step"], vec!["random", "cross"], vec!["chord"]] {
        let mut sampler = NestedSampler::new(line_problem())
            .with_ensemble(30)
            .with_discard(3)
            .with_hyper_values(vec![0.2])
            .with_engines(&engines)
            .unwrap()
            .with_threads(true)
            .with_verbose(0);
        let log_z = sampler.sample().unwrap();
        assert!(log_z.is_finite(), "{engines:?}");
        assert!(sampler.floors().windows(2).all(|w| w[0] <= w[1]), "{engines:?}: floor went down");
        let calls: usize = sampler.reports().iter().map(|(_, r)| r.calls).sum();
        assert!(calls > 0);
        let params = sampler.parameters();
        assert!((params[1] - 0.5).abs() < 0.15, "{engines:?}: slope {params:?}");
    }
}

#[test]
fn max_size_weeds_samples() {
    let mut sampler = NestedSampler::new(line_problem())
        .with_ensemble(30)
        .with_hyper_values(vec![0.2])
        .with_max_size(100)
        .with_verbose(0);
    sampler.sample().unwrap();
    assert!(sampler.samples().len() <= 100);
    let total: f64 = sampler.samples().iter().map(|s| s.weight()).sum();
    assert!((total - 1.0).abs() < 1e-9);
}
