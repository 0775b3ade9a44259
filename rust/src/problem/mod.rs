//! Problems bind a model to data and decide how residuals are formed.
//!
//! The variant in [`ProblemKind`] selects the residual geometry, the engines that can
//! move a walker and the error distribution used when none is configured.

use nalgebra::DMatrix;
use std::fmt;
use std::sync::Arc;

use crate::errors::{NestedError, NestedResult};
use crate::model::Model;
use crate::prior::PriorRef;

mod salesman;
mod xy_errors;

pub use salesman::{Distance, Tour};
pub use xy_errors::XYErrors;

/// Observations shared by every copy of a problem.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub xdata: Vec<f64>,
    /// `N x nout`; class labels for categorical problems, city y-coordinates for salesman.
    pub ydata: DMatrix<f64>,
    pub weights: Option<Vec<f64>>,
    pub accuracy: Option<Vec<f64>>,
}

impl Dataset {
    fn new(xdata: Vec<f64>, ydata: DMatrix<f64>) -> NestedResult<Self> {
        if xdata.len() != ydata.nrows() {
            return Err(NestedError::invalid(format!(
                "xdata has {} points but ydata has {} rows",
                xdata.len(),
                ydata.nrows()
            )));
        }
        if xdata.is_empty() {
            return Err(NestedError::invalid("no data points"));
        }
        check_finite("xdata", &xdata)?;
        check_finite("ydata", ydata.as_slice())?;
        Ok(Self {
            xdata,
            ydata,
            weights: None,
            accuracy: None,
        })
    }

    pub fn ndata(&self) -> usize {
        self.xdata.len()
    }

    /// Row `i` of `ydata`.
    pub fn y(&self, i: usize, output: usize) -> f64 {
        self.ydata[(i, output)]
    }
}

fn check_finite(what: &str, values: &[f64]) -> NestedResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(k) => Err(NestedError::invalid(format!(
            "{what}[{k}] is not finite: {}",
            values[k]
        ))),
        None => Ok(()),
    }
}

/// Residual geometry of a problem.
#[derive(Debug, Clone)]
pub enum ProblemKind {
    Classic,
    /// Both coordinates carry noise; `allpars` holds one nuisance "true x" per datum.
    ErrorsInXandY(XYErrors),
    MultipleOutput,
    /// Labels in `ydata`; the model yields class probabilities.
    Categorical { nclass: usize },
    /// The model structure itself is sampled.
    Evidence,
    /// `allpars` is a permutation of city indices.
    Salesman(Tour),
}

impl ProblemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProblemKind::Classic => "classic",
            ProblemKind::ErrorsInXandY(_) => "errors",
            ProblemKind::MultipleOutput => "multiple",
            ProblemKind::Categorical { .. } => "categorical",
            ProblemKind::Evidence => "evidence",
            ProblemKind::Salesman(_) => "salesman",
        }
    }
}

/// A model together with the data it is fitted to.
///
/// Walkers hold problems through an `Arc`; only dynamic models force a private copy.
#[derive(Clone)]
pub struct Problem {
    kind: ProblemKind,
    model: Option<Box<dyn Model>>,
    data: Arc<Dataset>,
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("kind", &self.kind.name())
            .field("model", &self.model.as_ref().map(|m| m.name()))
            .field("ndata", &self.data.ndata())
            .finish()
    }
}

impl Problem {
    pub fn classic(model: Box<dyn Model>, xdata: Vec<f64>, ydata: Vec<f64>) -> NestedResult<Self> {
        let n = ydata.len();
        let data = Dataset::new(xdata, DMatrix::from_vec(n, 1, ydata))?;
        Self::with_model(ProblemKind::Classic, model, data)
    }

    /// `covariance` holds one `[[var_x, cov], [cov, var_y]]` per datum, or a single one
    /// shared by all data.
    pub fn errors_in_xy(
        model: Box<dyn Model>,
        xdata: Vec<f64>,
        ydata: Vec<f64>,
        covariance: Vec<[[f64; 2]; 2]>,
    ) -> NestedResult<Self> {
        if model.is_dynamic() {
            return Err(NestedError::invalid(
                "errors-in-x-and-y problems need a model with a fixed parameter count",
            ));
        }
        let n = ydata.len();
        let data = Dataset::new(xdata, DMatrix::from_vec(n, 1, ydata))?;
        let errors = XYErrors::new(&data.xdata, covariance)?;
        Self::with_model(ProblemKind::ErrorsInXandY(errors), model, data)
    }

    pub fn multiple_output(model: Box<dyn Model>, xdata: Vec<f64>, ydata: DMatrix<f64>) -> NestedResult<Self> {
        if ydata.ncols() != model.nout() {
            return Err(NestedError::invalid(format!(
                "model has {} outputs but ydata has {} columns",
                model.nout(),
                ydata.ncols()
            )));
        }
        let data = Dataset::new(xdata, ydata)?;
        Self::with_model(ProblemKind::MultipleOutput, model, data)
    }

    /// A single-output model gives the probability of label 1; a model with `k` outputs
    /// gives (unnormalised) probabilities for labels `0..k`.
    pub fn categorical(model: Box<dyn Model>, xdata: Vec<f64>, labels: Vec<usize>) -> NestedResult<Self> {
        let nclass = model.nout().max(2);
        if let Some(bad) = labels.iter().find(|l| **l >= nclass) {
            return Err(NestedError::invalid(format!(
                "label {bad} out of range for {nclass} classes"
            )));
        }
        let n = labels.len();
        let ydata = DMatrix::from_iterator(n, 1, labels.into_iter().map(|l| l as f64));
        let data = Dataset::new(xdata, ydata)?;
        Self::with_model(ProblemKind::Categorical { nclass }, model, data)
    }

    pub fn evidence(model: Box<dyn Model>, xdata: Vec<f64>, ydata: Vec<f64>) -> NestedResult<Self> {
        let n = ydata.len();
        let data = Dataset::new(xdata, DMatrix::from_vec(n, 1, ydata))?;
        Self::with_model(ProblemKind::Evidence, model, data)
    }

    /// Cities at `(xcoords[i], ycoords[i])`.
    pub fn salesman(xcoords: Vec<f64>, ycoords: Vec<f64>, distance: Distance) -> NestedResult<Self> {
        let n = ycoords.len();
        let data = Dataset::new(xcoords, DMatrix::from_vec(n, 1, ycoords))?;
        if data.ndata() < 3 {
            return Err(NestedError::invalid("a tour needs at least 3 cities"));
        }
        let tour = Tour::new(&data, distance);
        Ok(Self {
            kind: ProblemKind::Salesman(tour),
            model: None,
            data: Arc::new(data),
        })
    }

    /// Build a problem from its string kind. Categorical labels are `ydata` rounded;
    /// errors-in-x-and-y uses a unit covariance; salesman ignores `model`.
    pub fn from_name(
        name: &str,
        model: Option<Box<dyn Model>>,
        xdata: Vec<f64>,
        ydata: Vec<f64>,
    ) -> NestedResult<Self> {
        let need_model = |model: Option<Box<dyn Model>>| {
            model.ok_or_else(|| NestedError::invalid(format!("problem '{name}' needs a model")))
        };
        match name.to_ascii_lowercase().as_str() {
            "classic" => Self::classic(need_model(model)?, xdata, ydata),
            "errors" => Self::errors_in_xy(need_model(model)?, xdata, ydata, vec![[[1.0, 0.0], [0.0, 1.0]]]),
            "multiple" => {
                let model = need_model(model)?;
                let nout = model.nout().max(1);
                if ydata.len() % nout != 0 {
                    return Err(NestedError::invalid(format!(
                        "{} ydata values do not fill rows of {nout} outputs",
                        ydata.len()
                    )));
                }
                let ydata = DMatrix::from_row_slice(ydata.len() / nout, nout, &ydata);
                Self::multiple_output(model, xdata, ydata)
            }
            "categorical" => {
                check_finite("ydata", &ydata)?;
                if let Some(bad) = ydata.iter().find(|y| **y < 0.0 || y.fract() != 0.0) {
                    return Err(NestedError::invalid(format!("label {bad} is not a non-negative integer")));
                }
                let labels = ydata.iter().map(|y| *y as usize).collect();
                Self::categorical(need_model(model)?, xdata, labels)
            }
            "evidence" => Self::evidence(need_model(model)?, xdata, ydata),
            "salesman" => Self::salesman(xdata, ydata, Distance::Euclid),
            _ => Err(NestedError::UnknownName {
                kind: "problem",
                name: name.to_string(),
            }),
        }
    }

    fn with_model(kind: ProblemKind, model: Box<dyn Model>, data: Dataset) -> NestedResult<Self> {
        Ok(Self {
            kind,
            model: Some(model),
            data: Arc::new(data),
        })
    }

    /// Per-datum weights; all must be positive and finite.
    pub fn with_weights(mut self, weights: Vec<f64>) -> NestedResult<Self> {
        self.check_per_datum("weights", &weights)?;
        if let Some(k) = weights.iter().position(|w| *w <= 0.0) {
            return Err(NestedError::invalid(format!(
                "weights[{k}] must be positive, got {}",
                weights[k]
            )));
        }
        Arc::make_mut(&mut self.data).weights = Some(weights);
        Ok(self)
    }

    /// Per-datum measurement accuracy, added in quadrature to the noise scale.
    pub fn with_accuracy(mut self, accuracy: Vec<f64>) -> NestedResult<Self> {
        self.check_per_datum("accuracy", &accuracy)?;
        if let Some(k) = accuracy.iter().position(|a| *a < 0.0) {
            return Err(NestedError::invalid(format!(
                "accuracy[{k}] must be non-negative, got {}",
                accuracy[k]
            )));
        }
        Arc::make_mut(&mut self.data).accuracy = Some(accuracy);
        Ok(self)
    }

    fn check_per_datum(&self, what: &str, values: &[f64]) -> NestedResult<()> {
        if values.len() != self.ndata() {
            return Err(NestedError::invalid(format!(
                "{what} has {} entries for {} data points",
                values.len(),
                self.ndata()
            )));
        }
        check_finite(what, values)
    }

    pub fn kind(&self) -> &ProblemKind {
        &self.kind
    }

    pub fn model(&self) -> Option<&dyn Model> {
        self.model.as_deref()
    }

    pub fn model_mut(&mut self) -> Option<&mut Box<dyn Model>> {
        self.model.as_mut()
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn ndata(&self) -> usize {
        self.data.ndata()
    }

    /// Outputs per datum in the residual layout.
    pub fn nout(&self) -> usize {
        match &self.kind {
            ProblemKind::ErrorsInXandY(_) => 2,
            ProblemKind::Categorical { .. } | ProblemKind::Salesman(_) => 1,
            _ => self.model.as_ref().map_or(1, |m| m.nout()),
        }
    }

    pub fn model_npars(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.npars())
    }

    /// Number of problem parameters in `allpars`, hyperparameters excluded.
    pub fn npars(&self) -> usize {
        match &self.kind {
            ProblemKind::ErrorsInXandY(_) => self.model_npars() + self.ndata(),
            ProblemKind::Salesman(_) => self.ndata(),
            _ => self.model_npars(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.model.as_ref().is_some_and(|m| m.is_dynamic())
    }

    pub fn is_modifiable(&self) -> bool {
        self.model.as_ref().is_some_and(|m| m.is_modifiable())
    }

    /// Ordering problems carry permutations and have no priors.
    pub fn is_ordering(&self) -> bool {
        matches!(self.kind, ProblemKind::Salesman(_))
    }

    pub fn tour(&self) -> Option<&Tour> {
        match &self.kind {
            ProblemKind::Salesman(tour) => Some(tour),
            _ => None,
        }
    }

    pub fn xy_errors(&self) -> Option<&XYErrors> {
        match &self.kind {
            ProblemKind::ErrorsInXandY(errors) => Some(errors),
            _ => None,
        }
    }

    /// Model prediction at `pars`; for salesman the leg lengths of the tour.
    pub fn result(&self, pars: &[f64]) -> Vec<f64> {
        match (&self.kind, &self.model) {
            (ProblemKind::Salesman(tour), _) => tour.legs(pars),
            (ProblemKind::ErrorsInXandY(_), Some(model)) => {
                let np = model.npars();
                model.result(&pars[np..np + self.ndata()], &pars[..np])
            }
            (_, Some(model)) => model.result(&self.data.xdata, &pars[..model.npars()]),
            (_, None) => Vec::new(),
        }
    }

    /// Residuals `y - f`, datum-major, cyclic outputs wrapped to `(-P/2, P/2]`.
    ///
    /// Errors-in-x-and-y residuals interleave `(x - xtrue, y - f(xtrue))` per datum.
    pub fn residuals(&self, pars: &[f64], mockdata: Option<&DMatrix<f64>>) -> Vec<f64> {
        let ydata = mockdata.unwrap_or(&self.data.ydata);
        let fit = self.result(pars);
        match &self.kind {
            ProblemKind::Salesman(_) => fit,
            ProblemKind::Categorical { .. } => {
                let width = fit.len() / self.ndata().max(1);
                (0..self.ndata())
                    .map(|i| {
                        let label = ydata[(i, 0)];
                        if width <= 1 {
                            return label - fit[i];
                        }
                        let row = &fit[i * width..(i + 1) * width];
                        let total: f64 = row.iter().sum();
                        1.0 - row.get(label as usize).copied().unwrap_or(0.0) / total
                    })
                    .collect()
            }
            ProblemKind::ErrorsInXandY(_) => {
                let np = self.model_npars();
                (0..self.ndata())
                    .flat_map(|i| {
                        let rx = self.data.xdata[i] - pars[np + i];
                        let ry = self.wrap(0, ydata[(i, 0)] - fit[i]);
                        [rx, ry]
                    })
                    .collect()
            }
            _ => {
                let nout = self.nout();
                fit.iter()
                    .enumerate()
                    .map(|(row, f)| {
                        let (i, o) = (row / nout, row % nout);
                        self.wrap(o, ydata[(i, o)] - f)
                    })
                    .collect()
            }
        }
    }

    fn wrap(&self, output: usize, residual: f64) -> f64 {
        match self.model.as_ref().and_then(|m| m.cyclic(output)) {
            Some(period) if period > 0.0 => residual - period * (residual / period - 0.5).ceil(),
            _ => residual,
        }
    }

    /// Weighted squared residuals, one per element of the distribution's layout.
    pub fn weighted_res_sq(&self, pars: &[f64]) -> Vec<f64> {
        self.weighted_res_sq_extra(pars).0
    }

    /// As [`Problem::weighted_res_sq`], also returning the raw residuals.
    pub fn weighted_res_sq_extra(&self, pars: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let res = self.residuals(pars, None);
        let weights = self.element_weights();
        let wres: Vec<f64> = match &self.kind {
            ProblemKind::ErrorsInXandY(errors) => (0..self.ndata())
                .map(|i| {
                    let q = errors.quadratic(i, res[2 * i], res[2 * i + 1]);
                    weights.as_ref().map_or(q, |w| w[i] * q)
                })
                .collect(),
            _ => res
                .iter()
                .enumerate()
                .map(|(k, r)| weights.as_ref().map_or(r * r, |w| w[k] * r * r))
                .collect(),
        };
        (wres, res)
    }

    /// Jacobian of [`Problem::result`] w.r.t. the problem parameters.
    pub fn partial(&self, pars: &[f64]) -> DMatrix<f64> {
        match (&self.kind, &self.model) {
            (ProblemKind::ErrorsInXandY(_), Some(model)) => {
                let np = model.npars();
                let n = self.ndata();
                let xtrue = &pars[np..np + n];
                let mp = model.partial(xtrue, &pars[..np]);
                let slope = model.derivative(xtrue, &pars[..np]);
                let mut jac = DMatrix::zeros(n, np + n);
                jac.view_mut((0, 0), (n, np)).copy_from(&mp);
                for i in 0..n {
                    jac[(i, np + i)] = slope[i];
                }
                jac
            }
            (ProblemKind::Salesman(_), _) | (_, None) => DMatrix::zeros(self.ndata(), self.npars()),
            (_, Some(model)) => model.partial(&self.data.xdata, &pars[..model.npars()]),
        }
    }

    /// Prior on problem parameter `k`; `None` for ordering problems.
    pub fn prior(&self, k: usize) -> Option<PriorRef> {
        let np = self.model_npars();
        match &self.kind {
            ProblemKind::Salesman(_) => None,
            ProblemKind::ErrorsInXandY(errors) if k >= np => {
                (k < np + self.ndata()).then(|| errors.nuisance_prior())
            }
            _ => self.model.as_ref().and_then(|m| m.prior(k)),
        }
    }

    /// Starting parameters for the ensemble before the start engine draws free ones.
    pub fn initial_parameters(&self) -> Vec<f64> {
        match &self.kind {
            ProblemKind::Salesman(_) => (0..self.ndata()).map(|k| k as f64).collect(),
            ProblemKind::ErrorsInXandY(_) => {
                let mut pars = vec![0.0; self.model_npars()];
                pars.extend_from_slice(&self.data.xdata);
                pars
            }
            _ => vec![0.0; self.model_npars()],
        }
    }

    pub fn my_engines(&self) -> Vec<&'static str> {
        match &self.kind {
            ProblemKind::Salesman(_) => vec!["move", "reverse", "shuffle", "switch", "near", "loop"],
            ProblemKind::Evidence => {
                let mut engines = vec!["birth", "death"];
                if self.is_modifiable() {
                    engines.push("struct");
                }
                engines
            }
            _ => {
                let mut engines = vec!["galilean", "chord"];
                if self.is_dynamic() {
                    engines.extend(["birth", "death"]);
                }
                if self.is_modifiable() {
                    engines.push("struct");
                }
                engines
            }
        }
    }

    pub fn my_start_engine(&self) -> &'static str {
        if self.is_ordering() {
            "startorder"
        } else {
            "start"
        }
    }

    pub fn my_distribution(&self) -> &'static str {
        match &self.kind {
            ProblemKind::Classic | ProblemKind::MultipleOutput => "gauss",
            ProblemKind::ErrorsInXandY(_) => "gauss2d",
            ProblemKind::Categorical { .. } => "bernoulli",
            ProblemKind::Evidence => "model",
            ProblemKind::Salesman(_) => "distance",
        }
    }

    pub fn has_weights(&self) -> bool {
        self.data.weights.is_some()
    }

    pub fn has_accuracy(&self) -> bool {
        self.data.accuracy.is_some()
    }

    /// Sum of the weights over all residual elements.
    pub fn sum_weight(&self) -> f64 {
        let per_datum = match &self.kind {
            ProblemKind::ErrorsInXandY(_) | ProblemKind::Categorical { .. } => 1.0,
            _ => self.nout() as f64,
        };
        match &self.data.weights {
            Some(w) => per_datum * w.iter().sum::<f64>(),
            None => per_datum * self.ndata() as f64,
        }
    }

    /// Weights expanded to one per residual element.
    pub fn element_weights(&self) -> Option<Vec<f64>> {
        let weights = self.data.weights.as_ref()?;
        let repeat = match &self.kind {
            ProblemKind::ErrorsInXandY(_) | ProblemKind::Categorical { .. } => 1,
            _ => self.nout(),
        };
        Some(
            weights
                .iter()
                .flat_map(|w| std::iter::repeat(*w).take(repeat))
                .collect(),
        )
    }

    /// Accuracy of residual element `k`, zero when none is set.
    pub fn element_accuracy(&self, k: usize) -> f64 {
        match &self.data.accuracy {
            Some(acc) => acc[k / self.nout().max(1)],
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PolynomialModel, StackModel, WithPriors};
    use crate::prior::{PriorExt, UniformPrior};

    fn line() -> Box<dyn Model> {
        Box::new(PolynomialModel::new(1).with_prior(UniformPrior::new(-5.0, 5.0).shared()))
    }

    #[test]
    fn rejects_bad_input() {
        let err = Problem::classic(line(), vec![0.0, 1.0], vec![1.0]).unwrap_err();
        assert!(matches!(err, NestedError::InvalidInput(_)), "{err}");

        let err = Problem::classic(line(), vec![0.0, f64::NAN], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, NestedError::InvalidInput(_)), "{err}");

        let problem = Problem::classic(line(), vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
        assert!(problem.clone().with_weights(vec![1.0, 0.0]).is_err());
        assert!(problem.clone().with_weights(vec![1.0]).is_err());
        assert!(problem.with_accuracy(vec![0.1, -0.1]).is_err());

        let err = Problem::from_name("frog", Some(line()), vec![0.0], vec![0.0]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown problem name: frog");
    }

    #[test]
    fn residuals_and_weights() {
        let problem = Problem::classic(line(), vec![0.0, 1.0, 2.0], vec![1.0, 3.0, 4.0])
            .unwrap()
            .with_weights(vec![1.0, 2.0, 0.5])
            .unwrap();
        let pars = [1.0, 2.0];
        assert_eq!(problem.residuals(&pars, None), vec![0.0, 0.0, -1.0]);
        assert_eq!(problem.weighted_res_sq(&pars), vec![0.0, 0.0, 0.5]);
        assert!((problem.sum_weight() - 3.5).abs() < 1e-12);
        assert!(problem.has_weights());
        assert!(!problem.has_accuracy());
        assert_eq!(problem.my_engines(), vec!["galilean", "chord"]);
        assert_eq!(problem.my_distribution(), "gauss");
        assert_eq!(problem.my_start_engine(), "start");
    }

    #[test]
    fn cyclic_residuals_wrap_to_half_period() {
        let model = PolynomialModel::new(0).with_cyclic(360.0);
        let problem = Problem::classic(Box::new(model), vec![0.0, 1.0, 2.0], vec![350.0, 10.0, 180.0]).unwrap();
        let res = problem.residuals(&[0.0], None);
        assert!((res[0] + 10.0).abs() < 1e-12);
        assert!((res[1] - 10.0).abs() < 1e-12);
        assert!((res[2] - 180.0).abs() < 1e-12);
    }

    #[test]
    fn errors_in_xy_extends_parameters() {
        let problem = Problem::errors_in_xy(
            line(),
            vec![0.0, 2.0, 8.0, 10.0],
            vec![2.0, 0.0, 10.0, 8.0],
            vec![[[1.0, 0.0], [0.0, 2.0]]],
        )
        .unwrap();
        assert_eq!(problem.npars(), 6);
        assert_eq!(problem.nout(), 2);
        let prior = problem.prior(3).expect("nuisance prior");
        assert_eq!(prior.low_limit(), -5.0);
        assert_eq!(prior.high_limit(), 15.0);
        assert!(problem.prior(6).is_none());

        let pars = [0.0, 1.0, 1.0, 1.0, 9.0, 9.0];
        let res = problem.residuals(&pars, None);
        assert_eq!(res, vec![-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0]);
        let wres = problem.weighted_res_sq(&pars);
        for q in wres {
            assert!((q - 1.5).abs() < 1e-12, "quadratic form {q}");
        }
        assert_eq!(problem.partial(&pars).shape(), (4, 6));
        assert_eq!(problem.my_distribution(), "gauss2d");
    }

    #[test]
    fn multiple_output_checks_columns() {
        let model = StackModel::new(vec![Box::new(PolynomialModel::new(0)), Box::new(PolynomialModel::new(0))]);
        let ydata = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let problem = Problem::multiple_output(Box::new(model.clone()), vec![0.0, 1.0], ydata).unwrap();
        assert_eq!(problem.residuals(&[1.0, 2.0], None), vec![0.0, 0.0, 2.0, 2.0]);
        let bad = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        assert!(Problem::multiple_output(Box::new(model), vec![0.0, 1.0], bad).is_err());
    }

    #[test]
    fn named_kinds_validate_their_data() {
        let stack = || -> Option<Box<dyn Model>> {
            Some(Box::new(StackModel::new(vec![
                Box::new(PolynomialModel::new(0)),
                Box::new(PolynomialModel::new(0)),
            ])))
        };
        let err = Problem::from_name("multiple", stack(), vec![0.0, 1.0], vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap_err();
        assert!(matches!(err, NestedError::InvalidInput(_)), "{err}");
        let problem = Problem::from_name("multiple", stack(), vec![0.0, 1.0], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(problem.residuals(&[1.0, 2.0], None), vec![0.0, 0.0, 2.0, 2.0]);

        for labels in [vec![0.0, -1.0], vec![0.0, 1.5]] {
            let err = Problem::from_name("categorical", Some(line()), vec![0.0, 1.0], labels).unwrap_err();
            assert!(matches!(err, NestedError::InvalidInput(_)), "{err}");
        }
        assert!(Problem::from_name("categorical", Some(line()), vec![0.0, 1.0], vec![0.0, 1.0]).is_ok());
    }

    #[test]
    fn dynamic_models_add_birth_and_death() {
        let problem = Problem::classic(Box::new(PolynomialModel::dynamic(0, 4)), vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        assert_eq!(problem.my_engines(), vec!["galilean", "chord", "birth", "death"]);
        let problem = Problem::evidence(Box::new(PolynomialModel::dynamic(0, 4)), vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        assert_eq!(problem.my_engines(), vec!["birth", "death"]);
        assert_eq!(problem.my_distribution(), "model");
    }

    #[test]
    fn salesman_uses_ordering_engines() {
        let problem = Problem::from_name("salesman", None, vec![0.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!(problem.is_ordering());
        assert_eq!(problem.npars(), 4);
        assert_eq!(problem.my_start_engine(), "startorder");
        assert_eq!(problem.my_distribution(), "distance");
        assert!(problem.prior(0).is_none());
        let legs = problem.result(&[0.0, 1.0, 2.0, 3.0]);
        assert!((legs.iter().sum::<f64>() - 4.0).abs() < 1e-12);
    }
}
