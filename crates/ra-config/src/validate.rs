//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::settings::{
    AssaySettings, IncidenceSpec, NumericSettings, PhiSpec, PriorTestSpec, PriorTestTimingSpec,
    RecencySpec, SimulationSettings,
};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Largest polynomial degree accepted for the fitted φ model.
pub const MAX_DEGREE: usize = 8;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
        }
    }

    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a cohort simulation configuration semantically.
pub fn validate_simulation(settings: &SimulationSettings) -> ValidationResult<()> {
    if settings.n_sims == 0 {
        return Err(ValidationError::invalid("n_sims", "Must be at least 1"));
    }
    if settings.n == 0 {
        return Err(ValidationError::invalid("n", "Must be at least 1"));
    }
    validate_open_unit("prevalence", settings.prevalence)?;
    validate_incidence("incidence", &settings.incidence)?;
    validate_enrollment_times(&settings.enrollment_times)?;
    validate_recency(&settings.recency)?;
    validate_windows(settings.big_t, settings.tau, false)?;

    if let Some(ref prior) = settings.prior_test {
        validate_prior_test(prior)?;
        if prior.enabled && settings.recency == RecencySpec::None {
            return Err(ValidationError::SemanticError(
                "prior_test requires a recency mechanism (phi or time_based)".to_string(),
            ));
        }
    }

    validate_numeric(&settings.numeric)
}

/// Validate an assay estimation configuration semantically.
pub fn validate_assay(settings: &AssaySettings) -> ValidationResult<()> {
    if settings.n_replicates == 0 {
        return Err(ValidationError::invalid("n_replicates", "Must be at least 1"));
    }
    if settings.n_subjects == 0 {
        return Err(ValidationError::invalid("n_subjects", "Must be at least 1"));
    }
    validate_phi("phi", &settings.phi)?;
    validate_windows(settings.big_t, settings.tau, true)?;
    validate_open_unit("prevalence", settings.prevalence)?;
    validate_incidence("incidence", &settings.incidence)?;

    if settings.degree == 0 || settings.degree > MAX_DEGREE {
        return Err(ValidationError::invalid(
            "degree",
            format!("Must be in 1..={}, got {}", MAX_DEGREE, settings.degree),
        ));
    }

    if !settings.grid_step.is_finite() || settings.grid_step <= 0.0 {
        return Err(ValidationError::invalid(
            "grid_step",
            format!("Must be positive, got {}", settings.grid_step),
        ));
    }
    if settings.grid_step >= settings.tau {
        return Err(ValidationError::SemanticError(format!(
            "grid_step ({}) must be smaller than tau ({})",
            settings.grid_step, settings.tau
        )));
    }

    validate_numeric(&settings.numeric)
}

/// Validate incidence family parameters.
pub fn validate_incidence(field: &str, spec: &IncidenceSpec) -> ValidationResult<()> {
    match spec {
        IncidenceSpec::Constant { baseline_incidence } => {
            validate_non_negative(&format!("{}.baseline_incidence", field), *baseline_incidence)
        }
        IncidenceSpec::Linear {
            baseline_incidence,
            rho,
        }
        | IncidenceSpec::Exponential {
            baseline_incidence,
            rho,
        } => {
            validate_non_negative(&format!("{}.baseline_incidence", field), *baseline_incidence)?;
            if !rho.is_finite() {
                return Err(ValidationError::invalid(
                    format!("{}.rho", field),
                    format!("Must be finite, got {}", rho),
                ));
            }
            Ok(())
        }
        IncidenceSpec::Piecewise { segments } => {
            if segments.is_empty() {
                return Err(ValidationError::invalid(
                    format!("{}.segments", field),
                    "Must contain at least one segment",
                ));
            }
            for (i, segment) in segments.iter().enumerate() {
                if !segment.start.is_finite() {
                    return Err(ValidationError::invalid(
                        format!("{}.segments[{}].start", field, i),
                        format!("Must be finite, got {}", segment.start),
                    ));
                }
                validate_non_negative(&format!("{}.segments[{}].rate", field, i), segment.rate)?;
            }
            if segments.windows(2).any(|w| w[1].start <= w[0].start) {
                return Err(ValidationError::SemanticError(format!(
                    "{}.segments must have strictly increasing start times",
                    field
                )));
            }
            Ok(())
        }
    }
}

/// Validate recency curve parameters.
pub fn validate_phi(field: &str, spec: &PhiSpec) -> ValidationResult<()> {
    let (shape, second, second_name, floor) = match spec {
        PhiSpec::GammaSurvival { shape, rate, floor } => (*shape, *rate, "rate", *floor),
        PhiSpec::WeibullSurvival {
            shape,
            scale,
            floor,
        } => (*shape, *scale, "scale", *floor),
    };

    validate_positive(&format!("{}.shape", field), shape)?;
    validate_positive(&format!("{}.{}", field, second_name), second)?;

    if !(0.0..1.0).contains(&floor) {
        return Err(ValidationError::invalid(
            format!("{}.floor", field),
            format!("Must be in [0, 1), got {}", floor),
        ));
    }

    Ok(())
}

fn validate_recency(spec: &RecencySpec) -> ValidationResult<()> {
    match spec {
        RecencySpec::None => Ok(()),
        RecencySpec::Phi { phi } => validate_phi("recency.phi", phi),
        RecencySpec::TimeBased { window, frr } => {
            validate_non_negative("recency.window", *window)?;
            validate_probability("recency.frr", *frr)
        }
    }
}

fn validate_prior_test(spec: &PriorTestSpec) -> ValidationResult<()> {
    validate_probability("prior_test.availability", spec.availability)?;
    validate_probability("prior_test.d_misrep", spec.d_misrep)?;
    validate_probability("prior_test.q_misrep", spec.q_misrep)?;
    validate_probability("prior_test.p_misrep", spec.p_misrep)?;
    validate_non_negative("prior_test.timing_noise_sd", spec.timing_noise_sd)?;

    match spec.timing {
        PriorTestTimingSpec::Uniform { lower, upper } => {
            validate_non_negative("prior_test.timing.lower", lower)?;
            if !upper.is_finite() || upper < lower {
                return Err(ValidationError::invalid(
                    "prior_test.timing.upper",
                    format!("Must be finite and >= lower ({}), got {}", lower, upper),
                ));
            }
        }
        PriorTestTimingSpec::GeneralizedGammaResidual {
            scale,
            d_shape,
            p_shape,
        } => {
            validate_positive("prior_test.timing.scale", scale)?;
            validate_positive("prior_test.timing.d_shape", d_shape)?;
            validate_positive("prior_test.timing.p_shape", p_shape)?;
        }
    }

    Ok(())
}

fn validate_enrollment_times(times: &[f64]) -> ValidationResult<()> {
    if times.is_empty() {
        return Err(ValidationError::invalid(
            "enrollment_times",
            "Must contain at least one time",
        ));
    }
    for (i, t) in times.iter().enumerate() {
        validate_non_negative(&format!("enrollment_times[{}]", i), *t)?;
    }
    if times.windows(2).any(|w| w[1] < w[0]) {
        return Err(ValidationError::SemanticError(
            "enrollment_times must be sorted ascending".to_string(),
        ));
    }
    Ok(())
}

fn validate_windows(big_t: f64, tau: f64, strict: bool) -> ValidationResult<()> {
    validate_non_negative("big_t", big_t)?;
    validate_non_negative("tau", tau)?;

    let ordered = if strict { tau > big_t } else { tau >= big_t };
    if !ordered {
        let relation = if strict { "greater than" } else { "at least" };
        return Err(ValidationError::SemanticError(format!(
            "tau ({}) must be {} big_t ({})",
            tau, relation, big_t
        )));
    }
    Ok(())
}

fn validate_numeric(numeric: &NumericSettings) -> ValidationResult<()> {
    validate_positive("numeric.hazard_step", numeric.hazard_step)?;
    if !numeric.hazard_horizon.is_finite() || numeric.hazard_horizon <= numeric.hazard_step {
        return Err(ValidationError::invalid(
            "numeric.hazard_horizon",
            format!(
                "Must exceed hazard_step ({}), got {}",
                numeric.hazard_step, numeric.hazard_horizon
            ),
        ));
    }
    validate_positive("numeric.quadrature_tolerance", numeric.quadrature_tolerance)?;
    if numeric.quadrature_max_depth == 0 {
        return Err(ValidationError::invalid(
            "numeric.quadrature_max_depth",
            "Must be at least 1",
        ));
    }
    Ok(())
}

fn validate_probability(field: &str, value: f64) -> ValidationResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::invalid(
            field,
            format!("Must be in [0, 1], got {}", value),
        ));
    }
    Ok(())
}

fn validate_open_unit(field: &str, value: f64) -> ValidationResult<()> {
    if !(value > 0.0 && value < 1.0) {
        return Err(ValidationError::invalid(
            field,
            format!("Must be in (0, 1), got {}", value),
        ));
    }
    Ok(())
}

fn validate_positive(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::invalid(
            field,
            format!("Must be positive, got {}", value),
        ));
    }
    Ok(())
}

fn validate_non_negative(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::invalid(
            field,
            format!("Must be non-negative, got {}", value),
        ));
    }
    Ok(())
}
