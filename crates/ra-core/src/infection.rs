//! Infection-time sampling by inverting the cumulative hazard.
//!
//! A positive subject enrolled at calendar time `t` under prevalence `p` is
//! given an infection duration `u` such that the incidence accumulated over
//! `[t - u, t]` equals the target hazard `e·p/(1-p)` for a uniform draw `e`.
//! Parametric families invert in closed form; a user-supplied incidence curve
//! is inverted against a cumulative-hazard lookup table built once per
//! enrollment time.

use std::fmt;
use std::sync::Arc;

use ra_config::PiecewiseSegment;

use crate::error::{Error, Result};
use crate::incidence::IncidenceModel;

/// Default step of the cumulative-hazard table.
pub const DEFAULT_STEP: f64 = 0.001;
/// Default look-back horizon of the cumulative-hazard table.
pub const DEFAULT_HORIZON: f64 = 100.0;

/// Target cumulative hazard for uniform draw `e` under prevalence `p`.
pub fn hazard_threshold(e: f64, prevalence: f64) -> f64 {
    e * prevalence / (1.0 - prevalence)
}

/// Direct infection-time callable `(e, enrollment_time, prevalence) -> infection_time`.
pub type InfectionFn = Arc<dyn Fn(f64, f64, f64) -> f64 + Send + Sync>;

/// Where infection times come from. Exactly one source per run.
#[derive(Clone)]
pub enum InfectionSource {
    Incidence(IncidenceModel),
    Direct(InfectionFn),
}

impl fmt::Debug for InfectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfectionSource::Incidence(model) => f.debug_tuple("Incidence").field(model).finish(),
            InfectionSource::Direct(_) => f.write_str("Direct(<fn>)"),
        }
    }
}

/// Grid budget for numeric inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericInversion {
    pub step: f64,
    pub horizon: f64,
}

impl Default for NumericInversion {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            horizon: DEFAULT_HORIZON,
        }
    }
}

/// Cumulative hazard looking backward from one enrollment time.
///
/// `cumulative[k] = Σ_{j<k} λ(t - j·step)·step`, non-decreasing in `k`.
#[derive(Debug, Clone)]
pub struct CumulativeHazardTable {
    step: f64,
    horizon: f64,
    cumulative: Vec<f64>,
}

impl CumulativeHazardTable {
    pub fn build(model: &IncidenceModel, enrollment_time: f64, budget: NumericInversion) -> Result<Self> {
        if !(budget.step > 0.0) || !(budget.horizon > budget.step) {
            return Err(Error::configuration(
                "numeric.hazard_step",
                format!(
                    "step ({}) must be positive and below the horizon ({})",
                    budget.step, budget.horizon
                ),
            ));
        }

        let n = (budget.horizon / budget.step).round() as usize;
        let mut cumulative = Vec::with_capacity(n + 1);
        let mut total = 0.0;
        cumulative.push(total);
        for j in 0..n {
            let rate = model.checked_rate(enrollment_time - j as f64 * budget.step)?;
            total += rate * budget.step;
            cumulative.push(total);
        }

        Ok(Self {
            step: budget.step,
            horizon: budget.horizon,
            cumulative,
        })
    }

    /// Largest hazard the table can reach.
    pub fn max_hazard(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Duration `k·step` for the largest `k` with `cumulative[k] < hazard`.
    pub fn invert(&self, hazard: f64) -> Result<f64> {
        if hazard.is_nan() {
            return Err(Error::numerical_range("hazard threshold", "threshold is NaN"));
        }
        if hazard > self.max_hazard() {
            return Err(Error::numerical_range(
                "cumulative hazard",
                format!(
                    "threshold {} exceeds the maximum {} reachable with step {} over horizon {}; use a finer step or a longer horizon",
                    hazard,
                    self.max_hazard(),
                    self.step,
                    self.horizon
                ),
            ));
        }
        let below = self.cumulative.partition_point(|&c| c < hazard);
        Ok(below.saturating_sub(1) as f64 * self.step)
    }
}

/// Draws infection times for one run.
#[derive(Debug, Clone)]
pub struct InfectionTimeSampler {
    source: InfectionSource,
    prevalence: f64,
    enrollment_times: Vec<f64>,
    tables: Vec<CumulativeHazardTable>,
}

impl InfectionTimeSampler {
    /// Builds lookup tables up front when the source needs numeric inversion.
    pub fn new(
        source: InfectionSource,
        prevalence: f64,
        enrollment_times: &[f64],
        budget: NumericInversion,
    ) -> Result<Self> {
        if !(prevalence > 0.0 && prevalence < 1.0) {
            return Err(Error::configuration(
                "prevalence",
                format!("must be in (0, 1), got {}", prevalence),
            ));
        }

        let tables = match &source {
            InfectionSource::Incidence(model @ IncidenceModel::Custom(_)) => enrollment_times
                .iter()
                .map(|&t| CumulativeHazardTable::build(model, t, budget))
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            source,
            prevalence,
            enrollment_times: enrollment_times.to_vec(),
            tables,
        })
    }

    pub fn enrollment_times(&self) -> &[f64] {
        &self.enrollment_times
    }

    /// Infection time for uniform draw `e` and the enrollment time at `time_index`.
    pub fn sample(&self, e: f64, time_index: usize) -> Result<f64> {
        let t = self.enrollment_times.get(time_index).copied().ok_or_else(|| {
            Error::configuration(
                "enrollment_times",
                format!("time index {} out of range", time_index),
            )
        })?;

        let infection_time = match &self.source {
            InfectionSource::Direct(f) => f(e, t, self.prevalence),
            InfectionSource::Incidence(model) => {
                let hazard = hazard_threshold(e, self.prevalence);
                let duration = match model {
                    IncidenceModel::Custom(_) => self.tables[time_index].invert(hazard)?,
                    _ => closed_form_duration(model, hazard, t)?,
                };
                t - duration
            }
        };

        if infection_time.is_nan() {
            return Err(Error::numerical_range(
                "infection time",
                format!("draw e={} at t={} produced NaN", e, t),
            ));
        }
        if infection_time > t {
            return Err(Error::domain(
                "infection time",
                infection_time,
                format!("must not exceed the enrollment time {}", t),
            ));
        }
        Ok(infection_time)
    }
}

/// Infection duration `u` with `∫_{t-u}^{t} λ(s) ds = hazard`, for the
/// parametric families. A custom curve has no closed form and is a
/// configuration error here.
pub fn closed_form_duration(model: &IncidenceModel, hazard: f64, t: f64) -> Result<f64> {
    if hazard.is_nan() || hazard < 0.0 {
        return Err(Error::numerical_range(
            "hazard threshold",
            format!("must be a non-negative number, got {}", hazard),
        ));
    }
    if hazard == 0.0 {
        return Ok(0.0);
    }

    match model {
        IncidenceModel::Constant { lambda_0 } => constant_duration(*lambda_0, hazard),
        IncidenceModel::Linear { lambda_0, rho } => {
            let b = model.checked_rate(t)?;
            if *rho == 0.0 {
                return constant_duration(*lambda_0, hazard);
            }
            let disc = b * b + 2.0 * rho * hazard;
            if disc < 0.0 {
                return Err(unreachable_hazard(hazard, "linear incidence reaches zero first"));
            }
            let denom = b + disc.sqrt();
            if !(denom > 0.0) {
                return Err(unreachable_hazard(hazard, "linear incidence is zero at enrollment"));
            }
            let u = 2.0 * hazard / denom;
            model.checked_rate(t - u)?;
            Ok(u)
        }
        IncidenceModel::Exponential { lambda_0, rho } => {
            if *rho == 0.0 {
                return constant_duration(*lambda_0, hazard);
            }
            if *lambda_0 <= 0.0 {
                return Err(unreachable_hazard(hazard, "baseline incidence is zero"));
            }
            let arg = hazard * rho * (rho * t).exp() / lambda_0;
            if !(arg > -1.0) {
                return Err(unreachable_hazard(
                    hazard,
                    "exponential incidence integrates to less than the threshold",
                ));
            }
            Ok(arg.ln_1p() / rho)
        }
        IncidenceModel::Piecewise { segments } => piecewise_duration(segments, hazard, t),
        IncidenceModel::Custom(_) => Err(Error::configuration(
            "incidence",
            "a custom incidence curve needs numeric inversion",
        )),
    }
}

fn constant_duration(lambda_0: f64, hazard: f64) -> Result<f64> {
    if lambda_0 < 0.0 {
        return Err(Error::domain(
            "baseline incidence",
            lambda_0,
            "incidence must be non-negative",
        ));
    }
    if lambda_0 == 0.0 {
        return Err(unreachable_hazard(hazard, "incidence is zero"));
    }
    Ok(hazard / lambda_0)
}

fn piecewise_duration(segments: &[PiecewiseSegment], hazard: f64, t: f64) -> Result<f64> {
    if segments.is_empty() {
        return Err(Error::configuration(
            "incidence.segments",
            "piecewise incidence needs at least one segment",
        ));
    }

    let mut idx = segments.partition_point(|s| s.start <= t).saturating_sub(1);
    let mut remaining = hazard;
    let mut cursor = t;
    loop {
        let rate = segments[idx].rate;
        if rate < 0.0 {
            return Err(Error::domain(
                format!("incidence.segments[{}].rate", idx),
                rate,
                "incidence must be non-negative",
            ));
        }
        // The earliest segment extends to -inf.
        let start = if idx == 0 {
            f64::NEG_INFINITY
        } else {
            segments[idx].start
        };
        let exposure = rate * (cursor - start);
        if rate > 0.0 && exposure >= remaining {
            return Ok(t - (cursor - remaining / rate));
        }
        if idx == 0 {
            return Err(unreachable_hazard(hazard, "earliest segment has zero rate"));
        }
        remaining -= exposure;
        cursor = start;
        idx -= 1;
    }
}

fn unreachable_hazard(hazard: f64, reason: &str) -> Error {
    Error::numerical_range(
        "cumulative hazard",
        format!("threshold {} is unreachable: {}", hazard, reason),
    )
}
