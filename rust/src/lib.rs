pub mod distribution;
pub mod engine;
pub mod errors;
pub mod explorer;
pub mod logspace;
pub mod model;
pub mod optimisers;
pub mod phantom;
pub mod prior;
pub mod problem;
pub mod sample;
pub mod sampler;
pub mod walker;

// Convenience re-exports so users can `use nestfit::prelude::*;`
pub mod prelude {
    pub use crate::distribution::{distribution_from_name, ErrorDistribution, Likelihood};
    pub use crate::engine::{Engine, EngineKind, EngineReport};
    pub use crate::errors::{NestedError, NestedResult};
    pub use crate::model::{
        CompoundModel, FixedModel, FixedValue, GaussModel, Model, Operation, PolynomialModel, SplinesModel,
        StackModel, WithPriors,
    };
    pub use crate::optimisers::{
        laplace_evidence, weighted_least_squares, LaplaceEvidence, NelderMead, OptimisationResults, WithMaxIter,
        WithPatience, WithSigma0, WithThreshold,
    };
    pub use crate::prior::{
        CauchyPrior, CircularUniformPrior, ExponentialPrior, GaussPrior, JeffreysPrior, LaplacePrior, Prior,
        PriorExt, PriorRef, UniformPrior,
    };
    pub use crate::problem::{Distance, Problem};
    pub use crate::sample::{Sample, SampleList};
    pub use crate::sampler::NestedSampler;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn test_simple_optimisation() {
        let optimiser = NelderMead::new().with_max_iter(500).with_sigma0(0.4);
        let result = optimiser.run(|x: &[f64]| x[0].powi(2) + x[1].powi(2), vec![1.0, 1.0]);

        assert!(result.success);
        assert!(result.fun < 0.01, "Expected fun < 0.01, but got: {}", result.fun);
    }

    #[test]
    fn test_constant_model_evidence() {
        let xdata: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ydata = vec![1.0, 1.2, 0.9, 1.1, 1.0, 0.8, 1.1, 1.0, 1.2, 0.9];
        let model = PolynomialModel::new(0).with_prior(UniformPrior::new(-10.0, 10.0).shared());
        let problem = Problem::classic(Box::new(model), xdata, ydata).unwrap();

        let mut sampler = NestedSampler::new(problem)
            .with_ensemble(40)
            .with_limits(vec![(0.01, 10.0)])
            .with_verbose(0);
        let log_z = sampler.sample().unwrap();

        assert!(log_z.is_finite(), "Expected finite logZ, got: {log_z}");
        let params = sampler.parameters();
        assert!((params[0] - 1.02).abs() < 0.1, "Expected offset near 1.02, got: {params:?}");
        let scale = sampler.scale().unwrap();
        assert!(scale > 0.05 && scale < 0.4, "Expected scale near 0.13, got: {scale}");
    }
}
