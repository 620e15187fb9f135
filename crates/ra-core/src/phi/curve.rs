//! True recency curves φ(t) used to drive simulations.

use std::fmt;
use std::sync::Arc;

use ra_config::PhiSpec;
use ra_math::{adaptive_simpson, gamma_survival, QuadratureOptions};

use crate::error::{Error, Result};

/// Callable recency curve.
pub type PhiFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

#[derive(Clone)]
enum Shape {
    Curve(PhiFn),
    /// `1{t ≤ window}`, otherwise `frr`.
    Step { window: f64, frr: f64 },
}

/// Probability of testing "recent" as a function of time since infection.
#[derive(Clone)]
pub struct PhiFunction {
    shape: Shape,
    label: String,
}

impl PhiFunction {
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            shape: Shape::Curve(Arc::new(f)),
            label: label.into(),
        }
    }

    /// `1 - GammaCDF(t; shape, rate)`.
    pub fn gamma_survival(shape: f64, rate: f64) -> Self {
        Self::new(format!("gamma_survival(shape={}, rate={})", shape, rate), move |t| {
            gamma_survival(t, shape, rate)
        })
    }

    /// `exp(-(t/scale)^shape)`.
    pub fn weibull_survival(shape: f64, scale: f64) -> Self {
        Self::new(
            format!("weibull_survival(shape={}, scale={})", shape, scale),
            move |t| {
                if t <= 0.0 {
                    1.0
                } else {
                    (-(t / scale).powf(shape)).exp()
                }
            },
        )
    }

    /// Recent within `window`, then a flat false-recency rate.
    pub fn time_based(window: f64, frr: f64) -> Self {
        Self {
            shape: Shape::Step { window, frr },
            label: format!("time_based(window={}, frr={})", window, frr),
        }
    }

    /// Lift the curve to `floor + (1 - floor)·φ(t)`.
    pub fn with_floor(self, floor: f64) -> Self {
        if floor == 0.0 {
            return self;
        }
        let label = format!("{} floored at {}", self.label, floor);
        let inner = self;
        Self::new(label, move |t| floor + (1.0 - floor) * inner.eval(t))
    }

    pub fn from_spec(spec: &PhiSpec) -> Self {
        match *spec {
            PhiSpec::GammaSurvival { shape, rate, floor } => {
                Self::gamma_survival(shape, rate).with_floor(floor)
            }
            PhiSpec::WeibullSurvival {
                shape,
                scale,
                floor,
            } => Self::weibull_survival(shape, scale).with_floor(floor),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Raw curve value, unchecked.
    pub fn eval(&self, t: f64) -> f64 {
        match &self.shape {
            Shape::Curve(f) => f(t),
            Shape::Step { window, frr } => {
                if t <= *window {
                    1.0
                } else {
                    *frr
                }
            }
        }
    }

    /// Curve value at `t`, which must be a probability.
    pub fn probability(&self, t: f64) -> Result<f64> {
        let p = self.eval(t);
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::numerical_range(
                format!("phi({})", t),
                format!("{} evaluated to {}, outside [0, 1]", self.label, p),
            ));
        }
        Ok(p)
    }

    /// `∫_0^upper φ(s) ds`.
    ///
    /// The step curve integrates in closed form; other curves use adaptive
    /// Simpson and fail if the depth budget runs out.
    pub fn integral(&self, upper: f64, options: QuadratureOptions) -> Result<f64> {
        if upper.is_nan() {
            return Err(Error::numerical_range("phi integral", "upper bound is NaN"));
        }
        if upper <= 0.0 {
            return Ok(0.0);
        }
        match &self.shape {
            Shape::Step { window, frr } => {
                Ok(upper.min(*window) + frr * (upper - window).max(0.0))
            }
            Shape::Curve(f) => {
                let q = adaptive_simpson(|s| f(s), 0.0, upper, options);
                if !q.converged {
                    return Err(Error::numerical_range(
                        format!("integral of {} over [0, {}]", self.label, upper),
                        format!(
                            "quadrature did not converge within depth {} ({} evaluations)",
                            options.max_depth, q.evaluations
                        ),
                    ));
                }
                Ok(q.value)
            }
        }
    }
}

impl fmt::Debug for PhiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PhiFunction").field(&self.label).finish()
    }
}
