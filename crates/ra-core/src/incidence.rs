//! Incidence models: time → instantaneous HIV incidence rate.

use std::fmt;
use std::sync::Arc;

use ra_config::{IncidenceSpec, PiecewiseSegment};

use crate::error::{Error, Result};

/// User-supplied incidence curve.
pub type IncidenceFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Parametric or user-supplied incidence curve λ(t).
#[derive(Clone)]
pub enum IncidenceModel {
    Constant {
        lambda_0: f64,
    },
    /// `λ(t) = λ0 - ρ·t`, unclamped.
    Linear {
        lambda_0: f64,
        rho: f64,
    },
    /// `λ(t) = λ0·exp(-ρ·t)`
    Exponential {
        lambda_0: f64,
        rho: f64,
    },
    /// Constant pieces sorted by start; the first rate also covers earlier times.
    Piecewise {
        segments: Vec<PiecewiseSegment>,
    },
    Custom(IncidenceFn),
}

impl IncidenceModel {
    pub fn from_spec(spec: &IncidenceSpec) -> Self {
        match spec {
            IncidenceSpec::Constant { baseline_incidence } => IncidenceModel::Constant {
                lambda_0: *baseline_incidence,
            },
            IncidenceSpec::Linear {
                baseline_incidence,
                rho,
            } => IncidenceModel::Linear {
                lambda_0: *baseline_incidence,
                rho: *rho,
            },
            IncidenceSpec::Exponential {
                baseline_incidence,
                rho,
            } => IncidenceModel::Exponential {
                lambda_0: *baseline_incidence,
                rho: *rho,
            },
            IncidenceSpec::Piecewise { segments } => IncidenceModel::Piecewise {
                segments: segments.clone(),
            },
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        IncidenceModel::Custom(Arc::new(f))
    }

    /// Instantaneous incidence at calendar time `t`.
    pub fn rate(&self, t: f64) -> f64 {
        match self {
            IncidenceModel::Constant { lambda_0 } => *lambda_0,
            IncidenceModel::Linear { lambda_0, rho } => lambda_0 - rho * t,
            IncidenceModel::Exponential { lambda_0, rho } => lambda_0 * (-rho * t).exp(),
            IncidenceModel::Piecewise { segments } => piecewise_rate(segments, t),
            IncidenceModel::Custom(f) => f(t),
        }
    }

    /// Like [`rate`](Self::rate), but a negative or NaN rate is a domain error.
    pub fn checked_rate(&self, t: f64) -> Result<f64> {
        let rate = self.rate(t);
        if rate.is_nan() {
            return Err(Error::numerical_range(
                format!("incidence rate at t={}", t),
                "rate evaluated to NaN",
            ));
        }
        if rate < 0.0 {
            return Err(Error::domain(
                format!("incidence rate at t={}", t),
                rate,
                "incidence must be non-negative over the sampled horizon",
            ));
        }
        Ok(rate)
    }

    pub fn family(&self) -> &'static str {
        match self {
            IncidenceModel::Constant { .. } => "constant",
            IncidenceModel::Linear { .. } => "linear",
            IncidenceModel::Exponential { .. } => "exponential",
            IncidenceModel::Piecewise { .. } => "piecewise",
            IncidenceModel::Custom(_) => "custom",
        }
    }
}

fn piecewise_rate(segments: &[PiecewiseSegment], t: f64) -> f64 {
    let idx = segments.partition_point(|s| s.start <= t);
    match idx {
        0 => segments.first().map_or(0.0, |s| s.rate),
        i => segments[i - 1].rate,
    }
}

impl fmt::Debug for IncidenceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidenceModel::Constant { lambda_0 } => {
                f.debug_struct("Constant").field("lambda_0", lambda_0).finish()
            }
            IncidenceModel::Linear { lambda_0, rho } => f
                .debug_struct("Linear")
                .field("lambda_0", lambda_0)
                .field("rho", rho)
                .finish(),
            IncidenceModel::Exponential { lambda_0, rho } => f
                .debug_struct("Exponential")
                .field("lambda_0", lambda_0)
                .field("rho", rho)
                .finish(),
            IncidenceModel::Piecewise { segments } => f
                .debug_struct("Piecewise")
                .field("segments", segments)
                .finish(),
            IncidenceModel::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}
