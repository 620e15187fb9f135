//! Settings for simulation and assay-estimation runs.
//!
//! These are the plain-data, serde-typed forms of a run configuration as it
//! appears in a TOML or JSON file. Choices that are mutually exclusive
//! (incidence family, recency mechanism, prior-test timing model) are tagged
//! enums, so a file can only ever name one of them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::validate::{ValidationError, ValidationResult};

/// Default false-recency cutoff (years).
pub const DEFAULT_BIG_T: f64 = 2.0;
/// Default window truncation horizon (years).
pub const DEFAULT_TAU: f64 = 12.0;
/// Default step of the cumulative-hazard lookup grid.
pub const DEFAULT_HAZARD_STEP: f64 = 0.001;
/// Default look-back horizon of the cumulative-hazard lookup grid.
pub const DEFAULT_HAZARD_HORIZON: f64 = 100.0;
/// Default absolute tolerance for recency-curve quadrature.
pub const DEFAULT_QUADRATURE_TOLERANCE: f64 = 1e-10;
/// Default bisection depth budget for recency-curve quadrature.
pub const DEFAULT_QUADRATURE_DEPTH: u32 = 40;
/// Default spacing of the φ integration grid.
pub const DEFAULT_GRID_STEP: f64 = 0.01;
/// Default polynomial degree of the fitted φ model.
pub const DEFAULT_DEGREE: usize = 3;

/// Parametric incidence family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum IncidenceSpec {
    Constant {
        baseline_incidence: f64,
    },
    /// `λ(t) = λ0 - ρ·t`
    Linear {
        baseline_incidence: f64,
        rho: f64,
    },
    /// `λ(t) = λ0·exp(-ρ·t)`
    Exponential {
        baseline_incidence: f64,
        rho: f64,
    },
    /// Piecewise constant; segments sorted by `start`.
    Piecewise {
        segments: Vec<PiecewiseSegment>,
    },
}

/// One constant-rate piece of a piecewise incidence curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseSegment {
    pub start: f64,
    pub rate: f64,
}

/// Parametric recency curve φ(t).
///
/// `floor` lifts the curve to `floor + (1 - floor)·S(t)` so that long-infected
/// subjects keep a false-recency probability of `floor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhiSpec {
    /// `1 - GammaCDF(t; shape, rate)`
    GammaSurvival {
        shape: f64,
        rate: f64,
        #[serde(default)]
        floor: f64,
    },
    /// `exp(-(t/scale)^shape)`
    WeibullSurvival {
        shape: f64,
        scale: f64,
        #[serde(default)]
        floor: f64,
    },
}

/// How a positive subject's recency indicator is drawn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "snake_case")]
pub enum RecencySpec {
    /// No recency indicator is simulated.
    #[default]
    None,
    /// Bernoulli(φ(duration)).
    Phi { phi: PhiSpec },
    /// Recent within `window`, otherwise Bernoulli(`frr`).
    TimeBased { window: f64, frr: f64 },
}

/// Distribution of the time since a subject's prior test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriorTestTimingSpec {
    Uniform {
        lower: f64,
        upper: f64,
    },
    /// Residual time of a renewal process with generalized-gamma gaps.
    GeneralizedGammaResidual {
        scale: f64,
        d_shape: f64,
        p_shape: f64,
    },
}

/// Prior-test history simulation, including reporting errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorTestSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub timing: PriorTestTimingSpec,
    /// Probability that a prior test exists.
    #[serde(default = "default_one")]
    pub availability: f64,
    /// Probability a positive prior result is reported as negative.
    #[serde(default)]
    pub d_misrep: f64,
    /// Probability a subject without a prior test reports one.
    #[serde(default)]
    pub q_misrep: f64,
    /// Probability an existing prior test goes unreported.
    #[serde(default)]
    pub p_misrep: f64,
    /// Standard deviation of additive noise on the reported test time.
    #[serde(default)]
    pub timing_noise_sd: f64,
}

/// Step/horizon and tolerance budgets for the numerical routines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericSettings {
    pub hazard_step: f64,
    pub hazard_horizon: f64,
    pub quadrature_tolerance: f64,
    pub quadrature_max_depth: u32,
}

impl Default for NumericSettings {
    fn default() -> Self {
        Self {
            hazard_step: DEFAULT_HAZARD_STEP,
            hazard_horizon: DEFAULT_HAZARD_HORIZON,
            quadrature_tolerance: DEFAULT_QUADRATURE_TOLERANCE,
            quadrature_max_depth: DEFAULT_QUADRATURE_DEPTH,
        }
    }
}

/// Cohort simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSettings {
    pub n_sims: usize,
    /// Subjects screened per (replicate, enrollment time) cell.
    pub n: u64,
    pub prevalence: f64,
    pub incidence: IncidenceSpec,
    #[serde(default = "default_enrollment_times")]
    pub enrollment_times: Vec<f64>,
    #[serde(default)]
    pub recency: RecencySpec,
    #[serde(default = "default_big_t", alias = "bigT")]
    pub big_t: f64,
    #[serde(default = "default_tau")]
    pub tau: f64,
    #[serde(default)]
    pub prior_test: Option<PriorTestSpec>,
    #[serde(default = "default_true")]
    pub summarize: bool,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub numeric: NumericSettings,
}

/// Link function of the fitted φ model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkName {
    #[default]
    Logit,
    Cloglog,
}

/// Which regression supplies the φ coefficients and covariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKindName {
    /// Generalized linear model, model-based covariance.
    #[default]
    Glm,
    /// Generalized estimating equations, sandwich covariance.
    Gee,
}

/// Assay property estimation run ("nsim" driver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssaySettings {
    pub n_replicates: usize,
    /// Subjects screened per replicate; positives form the assay study.
    pub n_subjects: u64,
    pub phi: PhiSpec,
    #[serde(default = "default_big_t", alias = "bigT")]
    pub big_t: f64,
    #[serde(default = "default_tau")]
    pub tau: f64,
    #[serde(default)]
    pub last_point: bool,
    pub prevalence: f64,
    pub incidence: IncidenceSpec,
    #[serde(default = "default_degree")]
    pub degree: usize,
    #[serde(default)]
    pub link: LinkName,
    #[serde(default)]
    pub model: ModelKindName,
    #[serde(default = "default_grid_step")]
    pub grid_step: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub numeric: NumericSettings,
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_enrollment_times() -> Vec<f64> {
    vec![0.0]
}

fn default_big_t() -> f64 {
    DEFAULT_BIG_T
}

fn default_tau() -> f64 {
    DEFAULT_TAU
}

fn default_degree() -> usize {
    DEFAULT_DEGREE
}

fn default_grid_step() -> f64 {
    DEFAULT_GRID_STEP
}

impl SimulationSettings {
    /// Load settings from a `.toml` file, or JSON for any other extension.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        load(path)
    }

    /// Parse settings from a JSON string.
    pub fn from_json(json: &str) -> ValidationResult<Self> {
        parse_json(json)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str) -> ValidationResult<Self> {
        parse_toml(content)
    }
}

impl AssaySettings {
    /// Load settings from a `.toml` file, or JSON for any other extension.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        load(path)
    }

    /// Parse settings from a JSON string.
    pub fn from_json(json: &str) -> ValidationResult<Self> {
        parse_json(json)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str) -> ValidationResult<Self> {
        parse_toml(content)
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> ValidationResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => parse_toml(&content),
        _ => parse_json(&content),
    }
}

fn parse_json<T: DeserializeOwned>(json: &str) -> ValidationResult<T> {
    serde_json::from_str(json)
        .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
}

fn parse_toml<T: DeserializeOwned>(content: &str) -> ValidationResult<T> {
    toml::from_str(content).map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))
}
