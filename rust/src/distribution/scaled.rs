//! Location-scale noise families sharing one residual/scale machinery.
//!
//! Each element's effective scale is `sqrt(s^2 + accuracy_k^2)`, where `s` is the first
//! hyperparameter.

use nalgebra::DMatrix;
use statrs::function::gamma::{digamma, ln_gamma};
use std::f64::consts::PI;

use super::{split_pars, weighted_sum, ErrorDistribution, Hyper, HyperKind};
use crate::problem::Problem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Gauss,
    Laplace,
    Cauchy,
    Uniform,
    Exponential,
}

impl Kernel {
    fn log_density(self, r: f64, s: f64, power: f64) -> f64 {
        match self {
            Kernel::Gauss => -0.5 * (r / s).powi(2) - s.ln() - 0.5 * (2.0 * PI).ln(),
            Kernel::Laplace => -r.abs() / s - (2.0 * s).ln(),
            Kernel::Cauchy => (s / PI).ln() - (s * s + r * r).ln(),
            Kernel::Uniform => {
                if r.abs() <= s {
                    -(2.0 * s).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
            Kernel::Exponential => {
                power.ln() - (2.0 * s).ln() - ln_gamma(1.0 / power) - (r.abs() / s).powf(power)
            }
        }
    }

    /// Derivative of the log density w.r.t. the residual.
    fn d_residual(self, r: f64, s: f64, power: f64) -> f64 {
        match self {
            Kernel::Gauss => -r / (s * s),
            Kernel::Laplace => {
                if r == 0.0 {
                    0.0
                } else {
                    -r.signum() / s
                }
            }
            Kernel::Cauchy => -2.0 * r / (s * s + r * r),
            Kernel::Uniform => 0.0,
            Kernel::Exponential => {
                if r == 0.0 {
                    0.0
                } else {
                    -power * (r.abs() / s).powf(power - 1.0) * r.signum() / s
                }
            }
        }
    }

    /// Derivative of the log density w.r.t. the effective scale.
    fn d_scale(self, r: f64, s: f64, power: f64) -> f64 {
        match self {
            Kernel::Gauss => r * r / (s * s * s) - 1.0 / s,
            Kernel::Laplace => r.abs() / (s * s) - 1.0 / s,
            Kernel::Cauchy => 1.0 / s - 2.0 * s / (s * s + r * r),
            Kernel::Uniform => -1.0 / s,
            Kernel::Exponential => -1.0 / s + power * (r.abs() / s).powf(power) / s,
        }
    }

    fn d_power(self, r: f64, s: f64, power: f64) -> f64 {
        let z = r.abs() / s;
        let tail = if z > 0.0 { z.powf(power) * z.ln() } else { 0.0 };
        1.0 / power + digamma(1.0 / power) / (power * power) - tail
    }
}

#[derive(Debug, Clone, Copy)]
struct Hypers {
    scale: f64,
    power: f64,
}

fn hypers_of(kernel: Kernel, hyper: &[f64]) -> Hypers {
    Hypers {
        scale: hyper.first().copied().unwrap_or(1.0),
        power: if kernel == Kernel::Exponential {
            hyper.get(1).copied().unwrap_or(2.0)
        } else {
            2.0
        },
    }
}

fn effective_scale(problem: &Problem, scale: f64, k: usize) -> f64 {
    let acc = problem.element_accuracy(k);
    if acc > 0.0 {
        scale.hypot(acc)
    } else {
        scale
    }
}

fn log_l_data(kernel: Kernel, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
    let (pars, hyper) = split_pars(problem, allpars);
    let h = hypers_of(kernel, hyper);
    if !(h.scale > 0.0 && h.power > 0.0) {
        return vec![f64::NEG_INFINITY; problem.ndata() * problem.nout()];
    }
    problem
        .residuals(pars, None)
        .iter()
        .enumerate()
        .map(|(k, r)| kernel.log_density(*r, effective_scale(problem, h.scale, k), h.power))
        .collect()
}

fn partial_log_l_data(kernel: Kernel, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
    let (pars, hyper) = split_pars(problem, allpars);
    let np = pars.len();
    let h = hypers_of(kernel, hyper);
    let res = problem.residuals(pars, None);
    let jac = problem.partial(pars);
    let mut out = DMatrix::zeros(res.len(), positions.len());
    for (k, r) in res.iter().enumerate() {
        let s = effective_scale(problem, h.scale, k);
        for (j, &pos) in positions.iter().enumerate() {
            out[(k, j)] = if pos < np {
                // r = y - f, so dr/dp = -df/dp
                -kernel.d_residual(*r, s, h.power) * jac[(k, pos)]
            } else if pos == np {
                kernel.d_scale(*r, s, h.power) * h.scale / s
            } else {
                kernel.d_power(*r, s, h.power)
            };
        }
    }
    out
}

/// Normal noise with standard deviation `scale`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussDistribution;

impl ErrorDistribution for GaussDistribution {
    fn name(&self) -> &'static str {
        "gauss"
    }

    fn hypers(&self) -> Vec<Hyper> {
        vec![Hyper::scale()]
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        log_l_data(Kernel::Gauss, problem, allpars)
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        if problem.has_accuracy() {
            return self.log_likelihood_alt(problem, allpars);
        }
        let (pars, hyper) = split_pars(problem, allpars);
        let scale = hypers_of(Kernel::Gauss, hyper).scale;
        if scale <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let chisq: f64 = problem.weighted_res_sq(pars).iter().sum();
        let sw = problem.sum_weight();
        -0.5 * chisq / (scale * scale) - sw * (scale.ln() + 0.5 * (2.0 * PI).ln())
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        partial_log_l_data(Kernel::Gauss, problem, allpars, positions)
    }
}

/// Double-exponential noise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaplaceDistribution;

impl ErrorDistribution for LaplaceDistribution {
    fn name(&self) -> &'static str {
        "laplace"
    }

    fn hypers(&self) -> Vec<Hyper> {
        vec![Hyper::scale()]
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        log_l_data(Kernel::Laplace, problem, allpars)
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        if problem.has_accuracy() {
            return self.log_likelihood_alt(problem, allpars);
        }
        let (pars, hyper) = split_pars(problem, allpars);
        let scale = hypers_of(Kernel::Laplace, hyper).scale;
        if scale <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let abs: Vec<f64> = problem.residuals(pars, None).iter().map(|r| r.abs()).collect();
        -weighted_sum(problem, &abs) / scale - problem.sum_weight() * (2.0 * scale).ln()
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        partial_log_l_data(Kernel::Laplace, problem, allpars, positions)
    }
}

/// Lorentzian noise with half-width `scale`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CauchyDistribution;

impl ErrorDistribution for CauchyDistribution {
    fn name(&self) -> &'static str {
        "cauchy"
    }

    fn hypers(&self) -> Vec<Hyper> {
        vec![Hyper::scale()]
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        log_l_data(Kernel::Cauchy, problem, allpars)
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        if problem.has_accuracy() {
            return self.log_likelihood_alt(problem, allpars);
        }
        let (pars, hyper) = split_pars(problem, allpars);
        let scale = hypers_of(Kernel::Cauchy, hyper).scale;
        if scale <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let logs: Vec<f64> = problem
            .residuals(pars, None)
            .iter()
            .map(|r| (scale * scale + r * r).ln())
            .collect();
        problem.sum_weight() * (scale / PI).ln() - weighted_sum(problem, &logs)
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        partial_log_l_data(Kernel::Cauchy, problem, allpars, positions)
    }
}

/// Flat noise on `[-scale, scale]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformDistribution;

impl ErrorDistribution for UniformDistribution {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn hypers(&self) -> Vec<Hyper> {
        vec![Hyper::scale()]
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        log_l_data(Kernel::Uniform, problem, allpars)
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        if problem.has_accuracy() {
            return self.log_likelihood_alt(problem, allpars);
        }
        let (pars, hyper) = split_pars(problem, allpars);
        let scale = hypers_of(Kernel::Uniform, hyper).scale;
        let worst = problem
            .residuals(pars, None)
            .iter()
            .fold(0.0f64, |acc, r| acc.max(r.abs()));
        if scale <= 0.0 || worst > scale {
            return f64::NEG_INFINITY;
        }
        -problem.sum_weight() * (2.0 * scale).ln()
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        partial_log_l_data(Kernel::Uniform, problem, allpars, positions)
    }
}

/// Generalised Gaussian `exp(-(|r|/scale)^power)`; power 2 is Gauss-like, 1 is Laplace.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialDistribution;

impl ErrorDistribution for ExponentialDistribution {
    fn name(&self) -> &'static str {
        "exponential"
    }

    fn hypers(&self) -> Vec<Hyper> {
        vec![
            Hyper::scale(),
            Hyper {
                name: "power",
                kind: HyperKind::Power,
                default: 2.0,
            },
        ]
    }

    fn log_l_data(&self, problem: &Problem, allpars: &[f64]) -> Vec<f64> {
        log_l_data(Kernel::Exponential, problem, allpars)
    }

    fn log_likelihood(&self, problem: &Problem, allpars: &[f64]) -> f64 {
        if problem.has_accuracy() {
            return self.log_likelihood_alt(problem, allpars);
        }
        let (pars, hyper) = split_pars(problem, allpars);
        let Hypers { scale, power } = hypers_of(Kernel::Exponential, hyper);
        if !(scale > 0.0 && power > 0.0) {
            return f64::NEG_INFINITY;
        }
        let tails: Vec<f64> = problem
            .residuals(pars, None)
            .iter()
            .map(|r| (r.abs() / scale).powf(power))
            .collect();
        problem.sum_weight() * (power.ln() - (2.0 * scale).ln() - ln_gamma(1.0 / power))
            - weighted_sum(problem, &tails)
    }

    fn partial_log_l_data(&self, problem: &Problem, allpars: &[f64], positions: &[usize]) -> DMatrix<f64> {
        partial_log_l_data(Kernel::Exponential, problem, allpars, positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_support::{
        check_consistency, line_problem, two_output_problem, weighted_line_problem,
    };

    fn families() -> Vec<Box<dyn ErrorDistribution>> {
        vec![
            Box::new(GaussDistribution),
            Box::new(LaplaceDistribution),
            Box::new(CauchyDistribution),
            Box::new(ExponentialDistribution),
        ]
    }

    #[test]
    fn closed_form_matches_reference_and_partials() {
        for problem in [line_problem(), weighted_line_problem()] {
            for distribution in families() {
                let mut allpars = vec![0.35, 0.55, 0.4];
                let mut fit_index = vec![0, 1, -1];
                if distribution.nhyper() == 2 {
                    allpars.push(1.6);
                    fit_index = vec![0, 1, -2, -1];
                }
                check_consistency(distribution.as_ref(), &problem, &allpars, &fit_index);
            }
        }
    }

    #[test]
    fn multiple_outputs_use_every_element() {
        let problem = two_output_problem();
        let allpars = [0.1, 1.0, 0.9, 0.3];
        check_consistency(&GaussDistribution, &problem, &allpars, &[0, 1, 2, -1]);
        assert_eq!(GaussDistribution.log_l_data(&problem, &allpars).len(), 8);
    }

    #[test]
    fn gauss_matches_textbook_value() {
        let problem = line_problem();
        let allpars = [0.4, 0.5, 0.3];
        let res = problem.residuals(&allpars[..2], None);
        let expected: f64 = res
            .iter()
            .map(|r| -0.5 * (r / 0.3).powi(2) - (0.3f64 * (2.0 * PI).sqrt()).ln())
            .sum();
        let logl = GaussDistribution.log_likelihood(&problem, &allpars);
        assert!((logl - expected).abs() < 1e-10);
    }

    #[test]
    fn uniform_is_minus_infinity_outside_support() {
        let problem = line_problem();
        assert_eq!(
            UniformDistribution.log_likelihood(&problem, &[0.4, 0.5, 0.01]),
            f64::NEG_INFINITY
        );
        let logl = UniformDistribution.log_likelihood(&problem, &[0.4, 0.5, 2.0]);
        let alt = UniformDistribution.log_likelihood_alt(&problem, &[0.4, 0.5, 2.0]);
        assert!((logl - alt).abs() < 1e-10);
        assert!((logl + 12.0 * 4.0f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        let problem = line_problem();
        for distribution in families() {
            let mut allpars = vec![0.4, 0.5, -1.0];
            if distribution.nhyper() == 2 {
                allpars.push(2.0);
            }
            assert_eq!(distribution.log_likelihood(&problem, &allpars), f64::NEG_INFINITY);
        }
    }
}
