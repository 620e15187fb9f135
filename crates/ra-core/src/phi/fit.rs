//! Binomial regression of recency outcomes on time since infection.
//!
//! Both model kinds share one iteratively reweighted least squares (IRLS)
//! fit. Under an independence working correlation the GEE point estimates
//! equal the GLM ones; the two differ only in the coefficient covariance:
//! inverse Fisher information for the GLM, the cluster-robust (HC0) sandwich
//! for the GEE.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use super::link::Link;
use super::model::{ModelKind, PhiModel, PolynomialBasis};
use crate::error::{Error, Result};

/// Default IRLS iteration cap.
pub const DEFAULT_MAX_ITER: usize = 25;
/// Default relative deviance tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Fitted means closer than this to 0 or 1 are clipped in the weights.
const MU_EPS: f64 = 1e-10;

/// IRLS budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MAX_ITER,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Diagnostics shared by both model kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    pub iterations: usize,
    pub deviance: f64,
    pub n_observations: usize,
}

/// GLM fit with model-based covariance.
#[derive(Debug, Clone)]
pub struct GlmFit {
    coefficients: DVector<f64>,
    covariance: DMatrix<f64>,
    basis: PolynomialBasis,
    link: Link,
    pub summary: FitSummary,
}

/// GEE fit with independence working correlation and sandwich covariance.
#[derive(Debug, Clone)]
pub struct GeeFit {
    coefficients: DVector<f64>,
    covariance: DMatrix<f64>,
    basis: PolynomialBasis,
    link: Link,
    pub n_clusters: usize,
    pub summary: FitSummary,
}

impl PhiModel for GlmFit {
    fn coefficients(&self) -> &DVector<f64> {
        &self.coefficients
    }

    fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    fn basis(&self) -> &PolynomialBasis {
        &self.basis
    }

    fn link(&self) -> Link {
        self.link
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Glm
    }
}

impl PhiModel for GeeFit {
    fn coefficients(&self) -> &DVector<f64> {
        &self.coefficients
    }

    fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    fn basis(&self) -> &PolynomialBasis {
        &self.basis
    }

    fn link(&self) -> Link {
        self.link
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Gee
    }
}

struct Irls {
    x: DMatrix<f64>,
    beta: DVector<f64>,
    /// Inverse Fisher information at `beta`.
    bread: DMatrix<f64>,
    summary: FitSummary,
}

impl GlmFit {
    pub fn fit(
        times: &[f64],
        outcomes: &[bool],
        basis: PolynomialBasis,
        link: Link,
        options: FitOptions,
    ) -> Result<Self> {
        let irls = irls(times, outcomes, &basis, link, options)?;
        Ok(Self {
            coefficients: irls.beta,
            covariance: irls.bread,
            basis,
            link,
            summary: irls.summary,
        })
    }
}

impl GeeFit {
    /// `clusters` defaults to one cluster per observation.
    pub fn fit(
        times: &[f64],
        outcomes: &[bool],
        clusters: Option<&[u64]>,
        basis: PolynomialBasis,
        link: Link,
        options: FitOptions,
    ) -> Result<Self> {
        if let Some(ids) = clusters {
            if ids.len() != times.len() {
                return Err(Error::configuration(
                    "clusters",
                    format!("length ({}) != number of observations ({})", ids.len(), times.len()),
                ));
            }
        }

        let irls = irls(times, outcomes, &basis, link, options)?;

        // Score contributions x_i · d_i (y_i - μ_i) / V_i, summed per cluster.
        let p = irls.beta.len();
        let eta = &irls.x * &irls.beta;
        let mut scores: BTreeMap<u64, DVector<f64>> = BTreeMap::new();
        for i in 0..times.len() {
            let mu = link.inverse(eta[i]).clamp(MU_EPS, 1.0 - MU_EPS);
            let d = link.working_derivative(eta[i]);
            let y = if outcomes[i] { 1.0 } else { 0.0 };
            let factor = d * (y - mu) / (mu * (1.0 - mu));
            let id = clusters.map_or(i as u64, |ids| ids[i]);
            let entry = scores.entry(id).or_insert_with(|| DVector::zeros(p));
            for k in 0..p {
                entry[k] += irls.x[(i, k)] * factor;
            }
        }

        let mut meat = DMatrix::<f64>::zeros(p, p);
        for s in scores.values() {
            meat += s * s.transpose();
        }
        let sandwich = &irls.bread * meat * &irls.bread;
        let covariance = (&sandwich + sandwich.transpose()) * 0.5;

        Ok(Self {
            coefficients: irls.beta,
            covariance,
            basis,
            link,
            n_clusters: scores.len(),
            summary: irls.summary,
        })
    }
}

/// Fit the requested model kind and return it behind the common interface.
pub fn fit_binomial(
    kind: ModelKind,
    times: &[f64],
    outcomes: &[bool],
    clusters: Option<&[u64]>,
    basis: PolynomialBasis,
    link: Link,
    options: FitOptions,
) -> Result<Box<dyn PhiModel>> {
    Ok(match kind {
        ModelKind::Glm => Box::new(GlmFit::fit(times, outcomes, basis, link, options)?),
        ModelKind::Gee => Box::new(GeeFit::fit(times, outcomes, clusters, basis, link, options)?),
    })
}

fn irls(
    times: &[f64],
    outcomes: &[bool],
    basis: &PolynomialBasis,
    link: Link,
    options: FitOptions,
) -> Result<Irls> {
    let n = times.len();
    let p = basis.n_coefficients();
    if outcomes.len() != n {
        return Err(Error::configuration(
            "outcomes",
            format!("length ({}) != number of times ({})", outcomes.len(), n),
        ));
    }
    if n <= p {
        return Err(Error::numerical_range(
            "phi regression",
            format!("{} observations cannot identify {} coefficients", n, p),
        ));
    }

    let x = basis.model_matrix(times);
    let y: Vec<f64> = outcomes.iter().map(|&o| if o { 1.0 } else { 0.0 }).collect();

    let mut eta: DVector<f64> =
        DVector::from_iterator(n, y.iter().map(|&yi| link.apply((yi + 0.5) / 2.0)));
    let mut deviance = binomial_deviance(&y, &eta, link);

    for iteration in 1..=options.max_iter {
        let (weights, working) = working_response(&y, &eta, link);
        let xtwx = weighted_gram(&x, &weights);
        let xtwz = x.transpose() * DVector::from_iterator(n, (0..n).map(|i| weights[i] * working[i]));

        let chol = xtwx.cholesky().ok_or_else(|| {
            Error::numerical_range(
                "phi regression information matrix",
                format!("not positive definite at IRLS iteration {}", iteration),
            )
        })?;
        let beta = chol.solve(&xtwz);
        eta = &x * &beta;

        let previous = deviance;
        deviance = binomial_deviance(&y, &eta, link);
        if !deviance.is_finite() {
            return Err(Error::numerical_range(
                "phi regression deviance",
                format!("non-finite at IRLS iteration {}", iteration),
            ));
        }

        if (deviance - previous).abs() / (deviance.abs() + 0.1) < options.tolerance {
            let (weights, _) = working_response(&y, &eta, link);
            let bread = weighted_gram(&x, &weights)
                .try_inverse()
                .ok_or_else(|| {
                    Error::numerical_range("phi regression information matrix", "singular at convergence")
                })?;
            let bread = (&bread + bread.transpose()) * 0.5;

            let boundary = eta
                .iter()
                .map(|&e| link.inverse(e))
                .filter(|&mu| !(MU_EPS..=1.0 - MU_EPS).contains(&mu))
                .count();
            if boundary > 0 {
                warn!(
                    boundary,
                    n, "fitted probabilities numerically 0 or 1 occurred"
                );
            }
            debug!(iteration, deviance, n, link = %link, "IRLS converged");

            return Ok(Irls {
                x,
                beta,
                bread,
                summary: FitSummary {
                    iterations: iteration,
                    deviance,
                    n_observations: n,
                },
            });
        }
    }

    Err(Error::numerical_range(
        "phi regression",
        format!(
            "IRLS did not converge in {} iterations (deviance {})",
            options.max_iter, deviance
        ),
    ))
}

/// IRLS weights `d²/V` and working response `η + (y - μ)/d`.
fn working_response(y: &[f64], eta: &DVector<f64>, link: Link) -> (Vec<f64>, Vec<f64>) {
    let mut weights = Vec::with_capacity(y.len());
    let mut working = Vec::with_capacity(y.len());
    for (i, &yi) in y.iter().enumerate() {
        let mu = link.inverse(eta[i]).clamp(MU_EPS, 1.0 - MU_EPS);
        let d = link.working_derivative(eta[i]);
        weights.push(d * d / (mu * (1.0 - mu)));
        working.push(eta[i] + (yi - mu) / d);
    }
    (weights, working)
}

fn weighted_gram(x: &DMatrix<f64>, weights: &[f64]) -> DMatrix<f64> {
    let p = x.ncols();
    DMatrix::from_fn(p, p, |a, b| {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| w * x[(i, a)] * x[(i, b)])
            .sum()
    })
}

fn binomial_deviance(y: &[f64], eta: &DVector<f64>, link: Link) -> f64 {
    -2.0 * y
        .iter()
        .enumerate()
        .map(|(i, &yi)| {
            let mu = link.inverse(eta[i]).clamp(MU_EPS, 1.0 - MU_EPS);
            yi * mu.ln() + (1.0 - yi) * (-mu).ln_1p()
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Bernoulli draws from a known logistic curve in t.
    fn logistic_sample(n: usize, b0: f64, b1: f64, seed: u64) -> (Vec<f64>, Vec<bool>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut times = Vec::with_capacity(n);
        let mut outcomes = Vec::with_capacity(n);
        for _ in 0..n {
            let t: f64 = rng.random::<f64>() * 4.0;
            let p = Link::Logit.inverse(b0 + b1 * t);
            times.push(t);
            outcomes.push(rng.random::<f64>() < p);
        }
        (times, outcomes)
    }

    #[test]
    fn glm_recovers_logistic_coefficients() {
        let (times, outcomes) = logistic_sample(5000, 1.5, -1.2, 11);
        let basis = PolynomialBasis::new(1, 1.0).unwrap();
        let fit = GlmFit::fit(&times, &outcomes, basis, Link::Logit, FitOptions::default()).unwrap();
        let beta = fit.coefficients();
        assert!((beta[0] - 1.5).abs() < 0.2, "intercept {}", beta[0]);
        assert!((beta[1] + 1.2).abs() < 0.15, "slope {}", beta[1]);
        assert!(fit.summary.iterations <= DEFAULT_MAX_ITER);
        assert!(fit.covariance()[(0, 0)] > 0.0);
    }

    #[test]
    fn gee_shares_point_estimates_with_glm() {
        let (times, outcomes) = logistic_sample(2000, 0.5, -0.8, 5);
        let basis = PolynomialBasis::new(2, 4.0).unwrap();
        let glm = GlmFit::fit(&times, &outcomes, basis, Link::Logit, FitOptions::default()).unwrap();
        let gee =
            GeeFit::fit(&times, &outcomes, None, basis, Link::Logit, FitOptions::default()).unwrap();
        for k in 0..3 {
            assert!((glm.coefficients()[k] - gee.coefficients()[k]).abs() < 1e-12);
        }
        assert_eq!(gee.n_clusters, 2000);
        // Correctly specified model: robust and model variances agree roughly.
        let ratio = gee.covariance()[(0, 0)] / glm.covariance()[(0, 0)];
        assert!((0.7..1.4).contains(&ratio), "variance ratio {}", ratio);
    }

    #[test]
    fn gee_groups_clusters() {
        let (times, outcomes) = logistic_sample(600, 0.5, -0.8, 9);
        let clusters: Vec<u64> = (0..600).map(|i| (i / 3) as u64).collect();
        let basis = PolynomialBasis::new(1, 1.0).unwrap();
        let gee = GeeFit::fit(
            &times,
            &outcomes,
            Some(&clusters),
            basis,
            Link::Logit,
            FitOptions::default(),
        )
        .unwrap();
        assert_eq!(gee.n_clusters, 200);
        assert_eq!(gee.kind(), ModelKind::Gee);
    }

    #[test]
    fn cloglog_fit_tracks_true_curve() {
        let (times, outcomes) = logistic_sample(4000, 1.0, -1.5, 21);
        let basis = PolynomialBasis::new(3, 4.0).unwrap();
        let fit = GlmFit::fit(&times, &outcomes, basis, Link::CLogLog, FitOptions::default()).unwrap();
        let pred = fit.predict(&[0.5, 2.0]).unwrap();
        for (i, t) in [0.5, 2.0].iter().enumerate() {
            let truth = Link::Logit.inverse(1.0 - 1.5 * t);
            assert!(
                (pred.point[i] - truth).abs() < 0.06,
                "t={}: fitted {} vs true {}",
                t,
                pred.point[i],
                truth
            );
        }
    }

    #[test]
    fn too_few_observations_is_error() {
        let basis = PolynomialBasis::new(3, 1.0).unwrap();
        let err = fit_binomial(
            ModelKind::Glm,
            &[0.1, 0.2],
            &[true, false],
            None,
            basis,
            Link::Logit,
            FitOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::NumericalRange { .. }));
    }

    #[test]
    fn iteration_cap_is_enforced() {
        let (times, outcomes) = logistic_sample(500, 1.0, -1.0, 3);
        let basis = PolynomialBasis::new(1, 1.0).unwrap();
        let options = FitOptions {
            max_iter: 1,
            tolerance: 1e-300,
        };
        let err = GlmFit::fit(&times, &outcomes, basis, Link::Logit, options).unwrap_err();
        assert!(matches!(err, Error::NumericalRange { .. }));
    }

    #[test]
    fn mismatched_clusters_are_rejected() {
        let basis = PolynomialBasis::new(1, 1.0).unwrap();
        let err = GeeFit::fit(
            &[0.0, 1.0, 2.0],
            &[true, false, false],
            Some(&[1, 2]),
            basis,
            Link::Logit,
            FitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
