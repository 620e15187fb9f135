//! Validated, immutable configuration for a cohort simulation run.

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;

use ra_config::{validate_simulation, RecencySpec, SimulationSettings};
use ra_math::QuadratureOptions;

use crate::error::{Error, Result};
use crate::incidence::IncidenceModel;
use crate::infection::{InfectionSource, NumericInversion};
use crate::phi::PhiFunction;
use crate::prior_test::PriorTestConfig;

/// How a positive subject's recency indicator is drawn.
#[derive(Debug, Clone, Default)]
pub enum RecencyMechanism {
    #[default]
    None,
    /// Bernoulli(φ(u)).
    Phi(PhiFunction),
    /// Recent iff `u ≤ window`, else Bernoulli(`frr`).
    TimeBased { window: f64, frr: f64 },
}

/// One recency draw for a positive subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecencyDraw {
    /// φ(u), for φ-based recency only.
    pub probability: Option<f64>,
    pub recent: bool,
}

impl RecencyMechanism {
    pub fn from_spec(spec: &RecencySpec) -> Self {
        match spec {
            RecencySpec::None => RecencyMechanism::None,
            RecencySpec::Phi { phi } => RecencyMechanism::Phi(PhiFunction::from_spec(phi)),
            RecencySpec::TimeBased { window, frr } => RecencyMechanism::TimeBased {
                window: *window,
                frr: *frr,
            },
        }
    }

    /// The curve behind the mechanism; time-based recency is a step curve.
    pub fn phi(&self) -> Option<PhiFunction> {
        match self {
            RecencyMechanism::None => None,
            RecencyMechanism::Phi(phi) => Some(phi.clone()),
            RecencyMechanism::TimeBased { window, frr } => Some(PhiFunction::time_based(*window, *frr)),
        }
    }

    /// Draws one uniform unless the mechanism is `None`.
    pub fn draw(&self, duration: f64, rng: &mut StdRng) -> Result<Option<RecencyDraw>> {
        match self {
            RecencyMechanism::None => Ok(None),
            RecencyMechanism::Phi(phi) => {
                let p = phi.probability(duration)?;
                Ok(Some(RecencyDraw {
                    probability: Some(p),
                    recent: rng.random::<f64>() < p,
                }))
            }
            RecencyMechanism::TimeBased { window, frr } => {
                let u: f64 = rng.random();
                Ok(Some(RecencyDraw {
                    probability: None,
                    recent: duration <= *window || u < *frr,
                }))
            }
        }
    }
}

/// Everything a [`crate::cohort::Simulator`] needs. Build with [`SimulationConfig::new`]
/// and the `with_*` methods, or from file settings with
/// [`SimulationConfig::from_settings`].
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub n_sims: usize,
    pub n: u64,
    pub prevalence: f64,
    pub source: InfectionSource,
    pub enrollment_times: Vec<f64>,
    pub recency: RecencyMechanism,
    pub big_t: f64,
    pub tau: f64,
    pub prior_test: Option<PriorTestConfig>,
    pub seed: u64,
    pub inversion: NumericInversion,
    pub quadrature: QuadratureOptions,
}

impl SimulationConfig {
    pub fn new(source: InfectionSource, prevalence: f64) -> Self {
        Self {
            n_sims: 1,
            n: 1000,
            prevalence,
            source,
            enrollment_times: vec![0.0],
            recency: RecencyMechanism::None,
            big_t: ra_config::settings::DEFAULT_BIG_T,
            tau: ra_config::settings::DEFAULT_TAU,
            prior_test: None,
            seed: 0,
            inversion: NumericInversion::default(),
            quadrature: QuadratureOptions::default(),
        }
    }

    pub fn with_n_sims(mut self, n_sims: usize) -> Self {
        self.n_sims = n_sims;
        self
    }

    pub fn with_n(mut self, n: u64) -> Self {
        self.n = n;
        self
    }

    pub fn with_enrollment_times(mut self, times: Vec<f64>) -> Self {
        self.enrollment_times = times;
        self
    }

    pub fn with_recency(mut self, recency: RecencyMechanism) -> Self {
        self.recency = recency;
        self
    }

    pub fn with_windows(mut self, big_t: f64, tau: f64) -> Self {
        self.big_t = big_t;
        self.tau = tau;
        self
    }

    pub fn with_prior_test(mut self, prior_test: PriorTestConfig) -> Self {
        self.prior_test = Some(prior_test);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_inversion(mut self, inversion: NumericInversion) -> Self {
        self.inversion = inversion;
        self
    }

    /// Checks the invariants programmatic construction can break.
    pub fn validate(&self) -> Result<()> {
        if self.n_sims == 0 {
            return Err(Error::configuration("n_sims", "must be at least 1"));
        }
        if !(self.prevalence > 0.0 && self.prevalence < 1.0) {
            return Err(Error::configuration(
                "prevalence",
                format!("must be in (0, 1), got {}", self.prevalence),
            ));
        }
        if self.enrollment_times.is_empty() {
            return Err(Error::configuration(
                "enrollment_times",
                "must contain at least one time",
            ));
        }
        if self.enrollment_times.iter().any(|t| !t.is_finite()) {
            return Err(Error::configuration("enrollment_times", "must be finite"));
        }
        if !(self.big_t > 0.0) || self.tau < self.big_t {
            return Err(Error::configuration(
                "big_t",
                format!("need 0 < big_t <= tau, got big_t={} tau={}", self.big_t, self.tau),
            ));
        }
        if self.prior_test.is_some() && matches!(self.recency, RecencyMechanism::None) {
            return Err(Error::configuration(
                "prior_test",
                "requires a recency mechanism",
            ));
        }
        Ok(())
    }

    /// Validates file settings and converts them into runtime models.
    pub fn from_settings(settings: &SimulationSettings) -> Result<Self> {
        validate_simulation(settings)?;

        let mut config = Self::new(
            InfectionSource::Incidence(IncidenceModel::from_spec(&settings.incidence)),
            settings.prevalence,
        )
        .with_n_sims(settings.n_sims)
        .with_n(settings.n)
        .with_enrollment_times(settings.enrollment_times.clone())
        .with_recency(RecencyMechanism::from_spec(&settings.recency))
        .with_windows(settings.big_t, settings.tau)
        .with_seed(settings.seed)
        .with_inversion(NumericInversion {
            step: settings.numeric.hazard_step,
            horizon: settings.numeric.hazard_horizon,
        });
        config.quadrature = QuadratureOptions {
            tolerance: settings.numeric.quadrature_tolerance,
            max_depth: settings.numeric.quadrature_max_depth,
        };
        config.prior_test = settings.prior_test.as_ref().and_then(PriorTestConfig::from_spec);

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn constant_config() -> SimulationConfig {
        SimulationConfig::new(
            InfectionSource::Incidence(IncidenceModel::Constant { lambda_0: 0.03 }),
            0.2,
        )
    }

    #[test]
    fn time_based_recency_is_certain_inside_window() {
        let mechanism = RecencyMechanism::TimeBased {
            window: 1.0,
            frr: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            assert!(mechanism.draw(0.5, &mut rng).unwrap().unwrap().recent);
            assert!(!mechanism.draw(1.5, &mut rng).unwrap().unwrap().recent);
        }
    }

    #[test]
    fn phi_recency_reports_probability() {
        let mechanism = RecencyMechanism::Phi(PhiFunction::gamma_survival(1.0, 2.0));
        let mut rng = StdRng::seed_from_u64(9);
        let draw = mechanism.draw(0.5, &mut rng).unwrap().unwrap();
        assert!((draw.probability.unwrap() - (-1.0f64).exp()).abs() < 1e-10);
        assert!(RecencyMechanism::None.draw(0.5, &mut rng).unwrap().is_none());
    }

    #[test]
    fn validate_rejects_prior_test_without_recency() {
        use crate::prior_test::PriorTestTiming;
        let config = constant_config().with_prior_test(PriorTestConfig::new(PriorTestTiming::Uniform {
            lower: 0.0,
            upper: 1.0,
        }));
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn validate_rejects_bad_prevalence_and_empty_times() {
        let mut config = constant_config();
        config.prevalence = 1.0;
        assert!(config.validate().is_err());
        assert!(constant_config().with_enrollment_times(vec![]).validate().is_err());
        assert!(constant_config().validate().is_ok());
    }

    #[test]
    fn from_settings_maps_every_section() {
        let toml = r#"
n_sims = 3
n = 250
prevalence = 0.3
enrollment_times = [0.0, 1.0]
seed = 11

[incidence]
family = "exponential"
baseline_incidence = 0.05
rho = 0.1

[recency]
mechanism = "phi"
phi = { kind = "gamma_survival", shape = 1.0, rate = 2.0 }

[prior_test]
timing = { kind = "uniform", lower = 0.0, upper = 3.0 }
availability = 0.5
"#;
        let settings = SimulationSettings::from_toml(toml).unwrap();
        let config = SimulationConfig::from_settings(&settings).unwrap();
        assert_eq!(config.n_sims, 3);
        assert_eq!(config.n, 250);
        assert_eq!(config.enrollment_times, vec![0.0, 1.0]);
        assert_eq!(config.seed, 11);
        assert!(matches!(config.recency, RecencyMechanism::Phi(_)));
        assert!(config.prior_test.is_some());
        assert!(matches!(
            config.source,
            InfectionSource::Incidence(IncidenceModel::Exponential { .. })
        ));
    }

    #[test]
    fn disabled_prior_test_is_dropped() {
        let toml = r#"
n_sims = 1
n = 10
prevalence = 0.3

[incidence]
family = "constant"
baseline_incidence = 0.05

[prior_test]
enabled = false
timing = { kind = "uniform", lower = 0.0, upper = 3.0 }
"#;
        let settings = SimulationSettings::from_toml(toml).unwrap();
        let config = SimulationConfig::from_settings(&settings).unwrap();
        assert!(config.prior_test.is_none());
    }
}
