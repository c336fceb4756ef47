//! Bounded nonlinear least-squares fitting of a scalar curve `f(x, params)`.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{DMatrix, DVector, Dyn, Owned};

use crate::analysis::bounds::Bound;
use crate::error::ForecastError;

/// Evaluation budget used when the caller does not choose one.
pub const DEFAULT_MAX_EVALUATIONS: usize = 10_000;

/// Residual substituted for a non-finite model value so the solver rejects the step.
const NON_FINITE_PENALTY: f64 = 1e100;

/// Cube root of machine epsilon, the usual step for central differences.
const CENTRAL_STEP: f64 = 6.055_454_452_393_343e-6;

/// Solver options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Maximum number of model evaluations before the fit is declared failed.
    pub max_evaluations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
        }
    }
}

/// Parameter covariance, tagged explicitly when it cannot be computed.
#[derive(Debug, Clone, PartialEq)]
pub enum Covariance {
    Defined(DMatrix<f64>),
    /// The normal-equations matrix was singular or the fit had no spare degrees of freedom.
    Undefined { dimension: usize },
}

impl Covariance {
    pub fn dimension(&self) -> usize {
        match self {
            Covariance::Defined(m) => m.nrows(),
            Covariance::Undefined { dimension } => *dimension,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Covariance::Defined(_))
    }

    pub fn matrix(&self) -> Option<&DMatrix<f64>> {
        match self {
            Covariance::Defined(m) => Some(m),
            Covariance::Undefined { .. } => None,
        }
    }

    /// Square roots of the diagonal. NaN everywhere when undefined.
    pub fn standard_errors(&self) -> Vec<f64> {
        match self {
            Covariance::Defined(m) => m.diagonal().iter().map(|v| v.sqrt()).collect(),
            Covariance::Undefined { dimension } => vec![f64::NAN; *dimension],
        }
    }

    /// Row-major copy for export, NaN-filled when undefined.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        match self {
            Covariance::Defined(m) => m
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect(),
            Covariance::Undefined { dimension } => vec![vec![f64::NAN; *dimension]; *dimension],
        }
    }
}

/// Result of a successful fit.
#[derive(Debug, Clone)]
pub struct CurveFit {
    pub params: Vec<f64>,
    pub covariance: Covariance,
    pub evaluations: usize,
    pub sum_squared_residuals: f64,
}

/// Finite-difference step policy.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Absolute(f64),
    /// Scaled by `max(1, |p|)` for each parameter.
    Relative(f64),
}

impl Step {
    fn for_value(&self, p: f64) -> f64 {
        match *self {
            Step::Absolute(h) => h,
            Step::Relative(h) => h * p.abs().max(1.0),
        }
    }
}

/// Jacobian of `model(x_i, params)` with respect to `params` by central differences.
pub(crate) fn central_jacobian<F>(model: &F, x: &[f64], params: &[f64], step: Step) -> DMatrix<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let mut jac = DMatrix::zeros(x.len(), params.len());
    let mut forward = params.to_vec();
    let mut backward = params.to_vec();

    for j in 0..params.len() {
        let h = step.for_value(params[j]);
        forward[j] = params[j] + h;
        backward[j] = params[j] - h;
        for (i, &xi) in x.iter().enumerate() {
            jac[(i, j)] = (model(xi, &forward) - model(xi, &backward)) / (2.0 * h);
        }
        forward[j] = params[j];
        backward[j] = params[j];
    }

    jac
}

fn sum_squared_residuals<F>(model: &F, x: &[f64], y: &[f64], params: &[f64]) -> f64
where
    F: Fn(f64, &[f64]) -> f64,
{
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| (model(xi, params) - yi).powi(2))
        .sum()
}

/// Covariance of a least-squares solution: `s^2 * pinv(J^T J)` with `s^2 = SSR / (n - p)`.
///
/// The pseudo-inverse drops singular values of `J` below `eps * max(n, p) * s_max`.
pub(crate) fn fit_covariance<F>(model: &F, x: &[f64], y: &[f64], params: &[f64]) -> Covariance
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = x.len();
    let p = params.len();
    if n <= p {
        return Covariance::Undefined { dimension: p };
    }

    let jac = central_jacobian(model, x, params, Step::Relative(CENTRAL_STEP));
    let svd = jac.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return Covariance::Undefined { dimension: p };
    };

    let singular = &svd.singular_values;
    let threshold = f64::EPSILON * n.max(p) as f64 * singular.max();
    let mut cov = DMatrix::zeros(p, p);
    for (k, &s) in singular.iter().enumerate() {
        if s > threshold {
            let row = v_t.row(k);
            cov += row.transpose() * row / (s * s);
        }
    }

    let s_sq = sum_squared_residuals(model, x, y, params) / (n - p) as f64;
    cov *= s_sq;

    if cov.iter().all(|v| v.is_finite()) {
        Covariance::Defined(cov)
    } else {
        Covariance::Undefined { dimension: p }
    }
}

/// Least-squares problem over the solver's unconstrained coordinates.
struct BoundedProblem<'a, F> {
    model: &'a F,
    x: &'a [f64],
    y: &'a [f64],
    bounds: &'a [Bound],
    internal: DVector<f64>,
}

impl<F> BoundedProblem<'_, F>
where
    F: Fn(f64, &[f64]) -> f64,
{
    fn external(&self, internal: &[f64]) -> Vec<f64> {
        self.bounds
            .iter()
            .zip(internal)
            .map(|(b, &u)| b.to_external(u))
            .collect()
    }

    fn residuals_at(&self, internal: &[f64]) -> DVector<f64> {
        let params = self.external(internal);
        DVector::from_iterator(
            self.x.len(),
            self.x.iter().zip(self.y).map(|(&xi, &yi)| {
                let r = (self.model)(xi, &params) - yi;
                if r.is_finite() {
                    r
                } else {
                    NON_FINITE_PENALTY
                }
            }),
        )
    }
}

impl<F> LeastSquaresProblem<f64, Dyn, Dyn> for BoundedProblem<'_, F>
where
    F: Fn(f64, &[f64]) -> f64,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.internal.copy_from(params);
    }

    fn params(&self) -> DVector<f64> {
        self.internal.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(self.internal.as_slice()))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let n = self.x.len();
        let p = self.internal.len();
        let mut jac = DMatrix::zeros(n, p);
        let mut shifted = self.internal.as_slice().to_vec();

        for j in 0..p {
            let u = self.internal[j];
            let h = Step::Relative(CENTRAL_STEP).for_value(u);
            shifted[j] = u + h;
            let forward = self.residuals_at(&shifted);
            shifted[j] = u - h;
            let backward = self.residuals_at(&shifted);
            shifted[j] = u;
            jac.set_column(j, &((forward - backward) / (2.0 * h)));
        }

        Some(jac)
    }
}

/// Fit `model` to `(x, y)` within `bounds`, starting from `initial`.
///
/// Fails with `FitNonConvergence` when the evaluation budget runs out or the
/// solver breaks down numerically; a degraded result is never returned.
pub fn fit_curve<F>(
    label: &str,
    model: F,
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    bounds: &[Bound],
    options: &FitOptions,
) -> Result<CurveFit, ForecastError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    if x.len() != y.len() {
        return Err(ForecastError::ValidationError(format!(
            "{} x values but {} y values",
            x.len(),
            y.len()
        )));
    }
    if initial.len() != bounds.len() {
        return Err(ForecastError::ValidationError(format!(
            "{} initial parameters but {} bounds",
            initial.len(),
            bounds.len()
        )));
    }
    if initial.is_empty() {
        return Err(ForecastError::ValidationError(
            "At least one parameter is required".to_string(),
        ));
    }
    if x.len() < initial.len() {
        return Err(ForecastError::InsufficientData(format!(
            "{label} has {} parameters but only {} observations",
            initial.len(),
            x.len()
        )));
    }
    if let Some(bad) = initial.iter().position(|v| !v.is_finite()) {
        return Err(ForecastError::ValidationError(format!(
            "Initial guess for parameter {bad} is not finite"
        )));
    }
    if options.max_evaluations == 0 {
        return Err(ForecastError::ValidationError(
            "Evaluation budget must be positive".to_string(),
        ));
    }

    let internal: Vec<f64> = bounds
        .iter()
        .zip(initial)
        .map(|(b, &p)| b.to_internal(p))
        .collect();
    tracing::debug!(model = label, ?initial, ?bounds, "Starting bounded fit");

    let problem = BoundedProblem {
        model: &model,
        x,
        y,
        bounds,
        internal: DVector::from_vec(internal),
    };

    let patience = (options.max_evaluations / (initial.len() + 1)).max(1);
    let (solved, report) = LevenbergMarquardt::new()
        .with_patience(patience)
        .minimize(problem);

    tracing::debug!(
        model = label,
        evaluations = report.number_of_evaluations,
        termination = ?report.termination,
        "Solver finished"
    );

    // `NoImprovementPossible` means the tolerances are tighter than the
    // achievable precision; the current point is still a minimum.
    let accepted = report.termination.was_successful()
        || matches!(report.termination, TerminationReason::NoImprovementPossible(_));
    if !accepted {
        let reason = match report.termination {
            TerminationReason::LostPatience => format!(
                "number of model evaluations reached the budget of {}",
                options.max_evaluations
            ),
            ref other => format!("solver stopped: {other:?}"),
        };
        return Err(ForecastError::FitNonConvergence {
            model: label.to_string(),
            reason,
        });
    }

    let params = solved.external(solved.internal.as_slice());
    if params.iter().any(|p| !p.is_finite()) {
        return Err(ForecastError::FitNonConvergence {
            model: label.to_string(),
            reason: "solution contains non-finite parameters".to_string(),
        });
    }

    let covariance = fit_covariance(&model, x, y, &params);
    if !covariance.is_defined() {
        tracing::warn!(model = label, "Covariance of the fitted parameters is undefined");
    }

    Ok(CurveFit {
        sum_squared_residuals: sum_squared_residuals(&model, x, y, &params),
        params,
        covariance,
        evaluations: report.number_of_evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::growth::{logistic, CurveKind};

    fn logistic_model(x: f64, p: &[f64]) -> f64 {
        CurveKind::Logistic.evaluate(x, p)
    }

    fn sample_years() -> Vec<f64> {
        (2010..=2030).map(|y| y as f64).collect()
    }

    fn logistic_bounds() -> Vec<Bound> {
        Bound::from_vectors(&[100.0, 0.0, 2000.0], &[2000.0, 5.0, 2040.0]).unwrap()
    }

    #[test]
    fn test_fit_recovers_exact_logistic() {
        let x = sample_years();
        let y: Vec<f64> = x.iter().map(|&t| logistic(t, 500.0, 0.4, 2022.0)).collect();
        let fit = fit_curve(
            "Logistic",
            logistic_model,
            &x,
            &y,
            &[400.0, 0.3, 2020.0],
            &logistic_bounds(),
            &FitOptions::default(),
        )
        .unwrap();
        assert!((fit.params[0] - 500.0).abs() / 500.0 < 1e-3);
        assert!((fit.params[1] - 0.4).abs() < 1e-3);
        assert!((fit.params[2] - 2022.0).abs() < 1e-2);
        assert!(fit.sum_squared_residuals < 1e-3);
    }

    #[test]
    fn test_fit_respects_upper_bound() {
        let x = sample_years();
        let y: Vec<f64> = x.iter().map(|&t| logistic(t, 500.0, 0.4, 2022.0)).collect();
        let bounds = Bound::from_vectors(&[100.0, 0.0, 2000.0], &[300.0, 5.0, 2040.0]).unwrap();
        let fit = fit_curve(
            "Logistic",
            logistic_model,
            &x,
            &y,
            &[200.0, 0.3, 2020.0],
            &bounds,
            &FitOptions::default(),
        )
        .unwrap();
        assert!(fit.params[0] <= 300.0);
        assert!(fit.params.iter().zip(&bounds).all(|(p, b)| b.contains(*p)));
    }

    #[test]
    fn test_fit_insufficient_data() {
        let result = fit_curve(
            "Logistic",
            logistic_model,
            &[2020.0, 2021.0],
            &[1.0, 2.0],
            &[10.0, 0.1, 2020.0],
            &logistic_bounds(),
            &FitOptions::default(),
        );
        assert!(matches!(result, Err(ForecastError::InsufficientData(_))));
    }

    #[test]
    fn test_fit_length_mismatch() {
        let result = fit_curve(
            "Logistic",
            logistic_model,
            &[2020.0, 2021.0, 2022.0],
            &[1.0, 2.0],
            &[10.0, 0.1, 2020.0],
            &logistic_bounds(),
            &FitOptions::default(),
        );
        assert!(matches!(result, Err(ForecastError::ValidationError(_))));
    }

    #[test]
    fn test_fit_budget_exhausted() {
        let x = sample_years();
        let y: Vec<f64> = x.iter().map(|&t| logistic(t, 500.0, 0.4, 2022.0)).collect();
        let result = fit_curve(
            "Logistic",
            logistic_model,
            &x,
            &y,
            &[300.0, 0.2, 2015.0],
            &logistic_bounds(),
            &FitOptions { max_evaluations: 1 },
        );
        match result {
            Err(ForecastError::FitNonConvergence { model, reason }) => {
                assert_eq!(model, "Logistic");
                assert!(reason.contains("budget"));
            }
            other => panic!("expected non-convergence, got {other:?}"),
        }
    }

    #[test]
    fn test_fit_covariance_is_symmetric_with_noise() {
        let x = sample_years();
        let noise = [1.5, -2.0, 0.5, 3.0, -1.0, -2.5, 2.0, 0.0, 1.0, -1.5];
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &t)| logistic(t, 500.0, 0.4, 2022.0) + noise[i % noise.len()])
            .collect();
        let fit = fit_curve(
            "Logistic",
            logistic_model,
            &x,
            &y,
            &[400.0, 0.3, 2020.0],
            &logistic_bounds(),
            &FitOptions::default(),
        )
        .unwrap();
        let cov = fit.covariance.matrix().expect("covariance defined");
        assert_eq!(cov.nrows(), 3);
        for i in 0..3 {
            assert!(cov[(i, i)] > 0.0);
            for j in 0..3 {
                assert!((cov[(i, j)] - cov[(j, i)]).abs() <= 1e-9 * cov[(i, i)].abs().max(1.0));
            }
        }
        assert!(fit.covariance.standard_errors().iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_covariance_undefined_without_spare_points() {
        let cov = fit_covariance(&logistic_model, &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &[5.0, 1.0, 2.0]);
        assert_eq!(cov, Covariance::Undefined { dimension: 3 });
        assert!(cov.standard_errors().iter().all(|s| s.is_nan()));
        assert!(cov.to_rows().iter().flatten().all(|v| v.is_nan()));
    }

    #[test]
    fn test_central_jacobian_linear_model() {
        let model = |x: f64, p: &[f64]| p[0] + p[1] * x;
        let jac = central_jacobian(&model, &[0.0, 1.0, 2.0], &[3.0, 2.0], Step::Absolute(1e-6));
        for i in 0..3 {
            assert!((jac[(i, 0)] - 1.0).abs() < 1e-6);
            assert!((jac[(i, 1)] - i as f64).abs() < 1e-6);
        }
    }
}
