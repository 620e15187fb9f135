//! Fitted φ models and delta-method prediction.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::link::Link;
use crate::error::{Error, Result};

/// Which regression produced the coefficients and covariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Glm,
    Gee,
}

impl From<ra_config::ModelKindName> for ModelKind {
    fn from(name: ra_config::ModelKindName) -> Self {
        match name {
            ra_config::ModelKindName::Glm => ModelKind::Glm,
            ra_config::ModelKindName::Gee => ModelKind::Gee,
        }
    }
}

/// Polynomial design `[1, t/scale, (t/scale)^2, ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolynomialBasis {
    degree: usize,
    scale: f64,
}

impl PolynomialBasis {
    pub fn new(degree: usize, scale: f64) -> Result<Self> {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(Error::configuration(
                "basis.scale",
                format!("must be positive and finite, got {}", scale),
            ));
        }
        Ok(Self { degree, scale })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn n_coefficients(&self) -> usize {
        self.degree + 1
    }

    pub fn model_matrix(&self, times: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(times.len(), self.n_coefficients(), |i, k| {
            (times[i] / self.scale).powi(k as i32)
        })
    }
}

/// Predicted φ and its covariance at a set of times.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiPrediction {
    pub times: Vec<f64>,
    pub point: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

/// A fitted binomial regression of recency on time since infection.
pub trait PhiModel: Send + Sync {
    fn coefficients(&self) -> &DVector<f64>;

    fn covariance(&self) -> &DMatrix<f64>;

    fn basis(&self) -> &PolynomialBasis;

    fn link(&self) -> Link;

    fn kind(&self) -> ModelKind;

    fn model_matrix(&self, times: &[f64]) -> DMatrix<f64> {
        self.basis().model_matrix(times)
    }

    fn link_inverse(&self, eta: f64) -> f64 {
        self.link().inverse(eta)
    }

    fn link_derivative(&self, eta: f64) -> f64 {
        self.link().derivative(eta)
    }

    /// Point prediction and delta-method covariance of φ at `times`.
    ///
    /// With `Var(β) = L·Lᵀ`, `R = J·T·L` and `Var(φ̂) = R·Rᵀ`, so the result is
    /// symmetric positive semi-definite.
    fn predict(&self, times: &[f64]) -> Result<PhiPrediction> {
        let t = self.model_matrix(times);
        let eta = &t * self.coefficients();

        let chol = self.covariance().clone().cholesky().ok_or_else(|| {
            Error::numerical_range(
                "coefficient covariance",
                "not positive definite (Cholesky failed)",
            )
        })?;
        let tl = &t * chol.l();

        let derivative: Vec<f64> = eta.iter().map(|&e| self.link_derivative(e)).collect();
        let r = DMatrix::from_fn(tl.nrows(), tl.ncols(), |i, k| derivative[i] * tl[(i, k)]);
        let covariance = &r * r.transpose();

        Ok(PhiPrediction {
            times: times.to_vec(),
            point: eta.map(|e| self.link_inverse(e)),
            covariance,
        })
    }
}
