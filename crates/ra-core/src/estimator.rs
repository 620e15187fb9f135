//! Assay parameter estimation: μ, Ω and β with delta-method variances.
//!
//! Each replicate simulates a study of positives under the true φ, fits a
//! binomial regression of recency on time since infection, and integrates
//! the fitted curve over a uniform grid on `[0, τ]`. Replicates are
//! independent and run on the rayon pool; [`NsimSummary`] aggregates them.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ra_config::{validate_assay, AssaySettings};
use ra_math::QuadratureOptions;

use crate::cohort::{PrevalenceFlag, Simulator};
use crate::error::{Error, Result};
use crate::grid::{CumulativeGrid, TimeGrid};
use crate::incidence::IncidenceModel;
use crate::infection::{InfectionSource, NumericInversion};
use crate::phi::{fit_binomial, FitOptions, Link, ModelKind, PhiFunction, PhiModel, PolynomialBasis};
use crate::simulation::{RecencyMechanism, SimulationConfig};

/// Validated estimation run.
#[derive(Debug, Clone)]
pub struct AssayConfig {
    pub n_replicates: usize,
    pub n_subjects: u64,
    pub phi: PhiFunction,
    pub big_t: f64,
    pub tau: f64,
    /// Report μ as C(τ) instead of C(T).
    pub last_point: bool,
    pub prevalence: f64,
    pub incidence: IncidenceModel,
    pub degree: usize,
    pub link: Link,
    pub model: ModelKind,
    pub grid_step: f64,
    pub seed: u64,
    pub fit: FitOptions,
    pub inversion: NumericInversion,
    pub quadrature: QuadratureOptions,
}

impl AssayConfig {
    pub fn new(phi: PhiFunction, incidence: IncidenceModel, prevalence: f64) -> Self {
        Self {
            n_replicates: 1,
            n_subjects: 1000,
            phi,
            big_t: ra_config::settings::DEFAULT_BIG_T,
            tau: ra_config::settings::DEFAULT_TAU,
            last_point: false,
            prevalence,
            incidence,
            degree: ra_config::settings::DEFAULT_DEGREE,
            link: Link::default(),
            model: ModelKind::default(),
            grid_step: ra_config::settings::DEFAULT_GRID_STEP,
            seed: 0,
            fit: FitOptions::default(),
            inversion: NumericInversion::default(),
            quadrature: QuadratureOptions::default(),
        }
    }

    pub fn with_replicates(mut self, n_replicates: usize) -> Self {
        self.n_replicates = n_replicates;
        self
    }

    pub fn with_subjects(mut self, n_subjects: u64) -> Self {
        self.n_subjects = n_subjects;
        self
    }

    pub fn with_windows(mut self, big_t: f64, tau: f64) -> Self {
        self.big_t = big_t;
        self.tau = tau;
        self
    }

    pub fn with_regression(mut self, degree: usize, link: Link, model: ModelKind) -> Self {
        self.degree = degree;
        self.link = link;
        self.model = model;
        self
    }

    pub fn with_grid_step(mut self, grid_step: f64) -> Self {
        self.grid_step = grid_step;
        self
    }

    pub fn with_last_point(mut self, last_point: bool) -> Self {
        self.last_point = last_point;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_settings(settings: &AssaySettings) -> Result<Self> {
        validate_assay(settings)?;

        let mut config = Self::new(
            PhiFunction::from_spec(&settings.phi),
            IncidenceModel::from_spec(&settings.incidence),
            settings.prevalence,
        )
        .with_replicates(settings.n_replicates)
        .with_subjects(settings.n_subjects)
        .with_windows(settings.big_t, settings.tau)
        .with_regression(settings.degree, settings.link.into(), settings.model.into())
        .with_grid_step(settings.grid_step)
        .with_last_point(settings.last_point)
        .with_seed(settings.seed);
        config.inversion = NumericInversion {
            step: settings.numeric.hazard_step,
            horizon: settings.numeric.hazard_horizon,
        };
        config.quadrature = QuadratureOptions {
            tolerance: settings.numeric.quadrature_tolerance,
            max_depth: settings.numeric.quadrature_max_depth,
        };
        Ok(config)
    }

    fn simulation(&self) -> SimulationConfig {
        let mut sim = SimulationConfig::new(InfectionSource::Incidence(self.incidence.clone()), self.prevalence)
            .with_n_sims(self.n_replicates)
            .with_n(self.n_subjects)
            .with_recency(RecencyMechanism::Phi(self.phi.clone()))
            .with_windows(self.big_t, self.tau)
            .with_seed(self.seed)
            .with_inversion(self.inversion);
        sim.quadrature = self.quadrature;
        sim
    }
}

/// Point estimates and analytic variances for one replicate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AssayEstimates {
    pub mu_est: f64,
    pub mu_var: f64,
    pub omega_est: f64,
    pub omega_var: f64,
    pub beta_est: f64,
    pub beta_var: f64,
    /// Fitted φ mass on `(T, τ]`, `C(τ) - C(T)`.
    pub tail_mass: f64,
}

/// Aggregation over replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NsimSummary {
    pub n_replicates: usize,
    /// Mean point estimates with across-replicate sample variances.
    pub estimates: AssayEstimates,
    /// Mean point estimates with mean analytic variances.
    pub analytic: AssayEstimates,
    pub replicates: Vec<AssayEstimates>,
}

impl NsimSummary {
    pub fn from_replicates(replicates: Vec<AssayEstimates>) -> Result<Self> {
        let n = replicates.len();
        if n == 0 {
            return Err(Error::configuration("n_replicates", "must be at least 1"));
        }

        let mean = |f: fn(&AssayEstimates) -> f64| replicates.iter().map(f).sum::<f64>() / n as f64;
        let sample_var = |f: fn(&AssayEstimates) -> f64, analytic: fn(&AssayEstimates) -> f64| {
            if n == 1 {
                return analytic(&replicates[0]);
            }
            let m = mean(f);
            replicates.iter().map(|e| (f(e) - m).powi(2)).sum::<f64>() / (n - 1) as f64
        };

        let analytic = AssayEstimates {
            mu_est: mean(|e| e.mu_est),
            mu_var: mean(|e| e.mu_var),
            omega_est: mean(|e| e.omega_est),
            omega_var: mean(|e| e.omega_var),
            beta_est: mean(|e| e.beta_est),
            beta_var: mean(|e| e.beta_var),
            tail_mass: mean(|e| e.tail_mass),
        };
        let estimates = AssayEstimates {
            mu_var: sample_var(|e| e.mu_est, |e| e.mu_var),
            omega_var: sample_var(|e| e.omega_est, |e| e.omega_var),
            beta_var: sample_var(|e| e.beta_est, |e| e.beta_var),
            ..analytic
        };

        Ok(Self {
            n_replicates: n,
            estimates,
            analytic,
            replicates,
        })
    }
}

/// Runs the estimation pipeline for one configuration.
#[derive(Debug, Clone)]
pub struct AssayEstimator {
    config: AssayConfig,
    simulator: Simulator,
    grid: TimeGrid,
    basis: PolynomialBasis,
}

impl AssayEstimator {
    pub fn new(config: AssayConfig) -> Result<Self> {
        if config.tau <= config.big_t {
            return Err(Error::configuration(
                "tau",
                format!("must exceed big_t ({}), got {}", config.big_t, config.tau),
            ));
        }
        let grid = TimeGrid::new(config.grid_step, config.tau)?;
        grid.index_of(config.big_t).map_err(|_| {
            Error::configuration(
                "grid_step",
                format!("{} does not divide big_t {}", config.grid_step, config.big_t),
            )
        })?;
        let basis = PolynomialBasis::new(config.degree, config.tau)?;
        let simulator = Simulator::new(config.simulation())?;
        Ok(Self {
            config,
            simulator,
            grid,
            basis,
        })
    }

    pub fn config(&self) -> &AssayConfig {
        &self.config
    }

    /// Estimates for replicate `r` (1-based).
    pub fn estimate_replicate(&self, r: usize) -> Result<AssayEstimates> {
        let (times, outcomes): (Vec<f64>, Vec<bool>) = self
            .simulator
            .replicate(r)?
            .iter()
            .filter(|s| s.prevalence == PrevalenceFlag::Positive)
            .filter_map(|s| Some((s.duration()?, s.recency_indicator?)))
            .filter(|&(u, _)| u <= self.config.tau)
            .unzip();

        let clusters: Vec<u64> = (0..times.len() as u64).collect();
        let model = fit_binomial(
            self.config.model,
            &times,
            &outcomes,
            Some(clusters.as_slice()),
            self.basis,
            self.config.link,
            self.config.fit,
        )?;

        let estimates = self.estimates_from_model(model.as_ref(), &times, &outcomes)?;
        debug!(
            replicate = r,
            observations = times.len(),
            mu = estimates.mu_est,
            omega = estimates.omega_est,
            beta = estimates.beta_est,
            "Estimated replicate"
        );
        Ok(estimates)
    }

    /// μ, Ω, β from a fitted model and the observations β is counted on.
    pub fn estimates_from_model(
        &self,
        model: &dyn PhiModel,
        times: &[f64],
        outcomes: &[bool],
    ) -> Result<AssayEstimates> {
        let prediction = model.predict(&self.grid.positive_times())?;
        let cumulative = CumulativeGrid::from_prediction(&prediction, self.grid.step())?;
        let (beta_est, beta_var) = false_recency(times, outcomes, self.config.big_t, self.config.tau)?;
        estimates_from_grid(
            &cumulative,
            self.config.big_t,
            self.config.tau,
            self.config.last_point,
            beta_est,
            beta_var,
        )
    }

    /// All replicates, aggregated.
    pub fn estimate(&self) -> Result<NsimSummary> {
        let replicates = (1..=self.config.n_replicates)
            .into_par_iter()
            .map(|r| self.estimate_replicate(r))
            .collect::<Result<Vec<_>>>()?;
        let summary = NsimSummary::from_replicates(replicates)?;

        info!(
            n_replicates = summary.n_replicates,
            model = ?self.config.model,
            link = %self.config.link,
            mu = summary.estimates.mu_est,
            omega = summary.estimates.omega_est,
            beta = summary.estimates.beta_est,
            "Assay estimation complete"
        );
        Ok(summary)
    }
}

/// Fraction recent among observations with `T < u ≤ τ`, and its binomial variance.
pub fn false_recency(times: &[f64], outcomes: &[bool], big_t: f64, tau: f64) -> Result<(f64, f64)> {
    let (n_tail, n_recent) = times
        .iter()
        .zip(outcomes)
        .filter(|&(&u, _)| u > big_t && u <= tau)
        .fold((0u64, 0u64), |(n, k), (_, &recent)| (n + 1, k + u64::from(recent)));

    if n_tail == 0 {
        return Err(Error::numerical_range(
            "false recency rate",
            format!("no observations with {} < duration <= {}", big_t, tau),
        ));
    }
    let beta = n_recent as f64 / n_tail as f64;
    Ok((beta, beta * (1.0 - beta) / n_tail as f64))
}

/// μ and Ω from a cumulative grid given β̂ and Var(β̂).
///
/// Ω averages `C_i - β̂·(t_i - T)` over grid points in `[T, τ]` with weights
/// proportional to `1/V_ii`. Points with zero variance carry no weight.
pub fn estimates_from_grid(
    grid: &CumulativeGrid,
    big_t: f64,
    tau: f64,
    last_point: bool,
    beta_est: f64,
    beta_var: f64,
) -> Result<AssayEstimates> {
    let i_t = grid.grid().index_of(big_t)?;
    let i_tau = grid.grid().index_of(tau)?;
    let i_mu = if last_point { i_tau } else { i_t };

    let (indices, raw): (Vec<usize>, Vec<f64>) = (i_t..=i_tau)
        .filter(|&i| grid.variance(i, i) > 0.0)
        .map(|i| (i, 1.0 / grid.variance(i, i)))
        .unzip();
    let total: f64 = raw.iter().sum();
    if indices.is_empty() || !(total > 0.0) || !total.is_finite() {
        return Err(Error::numerical_range(
            "omega weights",
            "no grid point in [T, tau] has positive variance",
        ));
    }
    let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();

    let mut omega_est = 0.0;
    let mut lever = 0.0;
    for (&i, &w) in indices.iter().zip(&weights) {
        let excess = grid.grid().time(i) - big_t;
        omega_est += w * (grid.cumulative(i) - beta_est * excess);
        lever += w * excess;
    }

    let mut omega_var = lever * lever * beta_var;
    for (&i, &wi) in indices.iter().zip(&weights) {
        for (&j, &wj) in indices.iter().zip(&weights) {
            omega_var += wi * wj * grid.variance(i, j);
        }
    }

    Ok(AssayEstimates {
        mu_est: grid.cumulative(i_mu),
        mu_var: grid.variance(i_mu, i_mu),
        omega_est,
        omega_var,
        beta_est,
        beta_var,
        tail_mass: grid.cumulative(i_tau) - grid.cumulative(i_t),
    })
}

/// Validates settings and runs every replicate.
pub fn estimate(settings: &AssaySettings) -> Result<NsimSummary> {
    AssayEstimator::new(AssayConfig::from_settings(settings)?)?.estimate()
}
