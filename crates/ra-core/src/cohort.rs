//! Cohort simulation: replicates × enrollment times × subjects.
//!
//! Replicate `r` (1-based) owns the random stream
//! `StdRng::seed_from_u64(seed.wrapping_add(r))`. Inside a replicate, draws
//! follow enrollment time order, then subject order, so a replicate's output
//! depends only on its index and the configuration. Replicates run on the
//! rayon pool and the result is identical to a serial loop.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::infection::InfectionTimeSampler;
use crate::prior_test::{enhanced_recency, ContributionCalculator, PriorTest};
use crate::simulation::SimulationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrevalenceFlag {
    Negative,
    Positive,
}

/// One screened subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub replicate: usize,
    pub enrollment_time: f64,
    pub prevalence: PrevalenceFlag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infection_time: Option<f64>,
    /// Absolute time of the reported prior test, `enrollment_time - d`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_test_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_since_prior_test: Option<f64>,
    /// Reported result, `true` = positive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_test_result: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recency_indicator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_recency_indicator: Option<bool>,
}

impl SubjectRecord {
    fn negative(replicate: usize, enrollment_time: f64) -> Self {
        Self {
            replicate,
            enrollment_time,
            prevalence: PrevalenceFlag::Negative,
            infection_time: None,
            prior_test_time: None,
            time_since_prior_test: None,
            prior_test_result: None,
            recency_probability: None,
            recency_indicator: None,
            enhanced_recency_indicator: None,
        }
    }

    /// Time since infection at enrollment, for positives.
    pub fn duration(&self) -> Option<f64> {
        self.infection_time.map(|i| self.enrollment_time - i)
    }

    pub fn prior_test(&self) -> Option<PriorTest> {
        match (self.time_since_prior_test, self.prior_test_result) {
            (Some(time_since), Some(reported_positive)) => Some(PriorTest {
                time_since,
                reported_positive,
            }),
            _ => None,
        }
    }

    fn sort_key_cmp(&self, other: &Self) -> Ordering {
        self.replicate
            .cmp(&other.replicate)
            .then(self.enrollment_time.total_cmp(&other.enrollment_time))
            .then(self.prevalence.cmp(&other.prevalence))
            .then(match (self.infection_time, other.infection_time) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            })
    }
}

/// Per replicate, per enrollment time counts and prior-test sums.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub n: u64,
    pub n_positive: u64,
    pub n_negative: u64,
    pub n_recent: u64,
    /// Recent after prior-test reclassification; equals `n_recent` without
    /// prior-test simulation.
    pub n_recent_with_priortest: u64,
    pub numerator_beta: f64,
    pub denominator_omega: f64,
    pub denominator_beta: f64,
}

/// One long-format summary row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub replicate: usize,
    pub enrollment_time: f64,
    #[serde(flatten)]
    pub stats: SummaryStatistics,
}

/// Summaries shaped `enrollment_times × replicates`, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMatrix {
    enrollment_times: Vec<f64>,
    n_replicates: usize,
    cells: Vec<SummaryStatistics>,
}

impl SummaryMatrix {
    /// Builds from per-replicate columns, each holding one entry per time.
    fn from_columns(enrollment_times: Vec<f64>, columns: Vec<Vec<SummaryStatistics>>) -> Self {
        let n_replicates = columns.len();
        let mut cells = Vec::with_capacity(enrollment_times.len() * n_replicates);
        for row in 0..enrollment_times.len() {
            cells.extend(columns.iter().map(|col| col[row]));
        }
        Self {
            enrollment_times,
            n_replicates,
            cells,
        }
    }

    pub fn enrollment_times(&self) -> &[f64] {
        &self.enrollment_times
    }

    pub fn n_replicates(&self) -> usize {
        self.n_replicates
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.enrollment_times.len(), self.n_replicates)
    }

    /// Cell at `time_index`, `replicate` (1-based).
    pub fn get(&self, time_index: usize, replicate: usize) -> Option<&SummaryStatistics> {
        if time_index >= self.enrollment_times.len() || replicate == 0 || replicate > self.n_replicates {
            return None;
        }
        self.cells.get(time_index * self.n_replicates + replicate - 1)
    }

    /// All replicates at one enrollment time.
    pub fn row(&self, time_index: usize) -> Option<&[SummaryStatistics]> {
        if time_index >= self.enrollment_times.len() {
            return None;
        }
        let start = time_index * self.n_replicates;
        Some(&self.cells[start..start + self.n_replicates])
    }

    /// The single row of a one-time matrix, for display.
    pub fn squeeze(&self) -> Option<&[SummaryStatistics]> {
        if self.enrollment_times.len() == 1 {
            self.row(0)
        } else {
            None
        }
    }

    /// Long format ordered by replicate, then enrollment time.
    pub fn rows(&self) -> Vec<SummaryRow> {
        let mut rows = Vec::with_capacity(self.cells.len());
        for replicate in 1..=self.n_replicates {
            for (time_index, &enrollment_time) in self.enrollment_times.iter().enumerate() {
                if let Some(stats) = self.get(time_index, replicate) {
                    rows.push(SummaryRow {
                        replicate,
                        enrollment_time,
                        stats: *stats,
                    });
                }
            }
        }
        rows
    }
}

/// Runs cohort simulations for one validated configuration.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulationConfig,
    sampler: InfectionTimeSampler,
    contributions: Option<ContributionCalculator>,
    binomial: Binomial,
}

impl Simulator {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let sampler = InfectionTimeSampler::new(
            config.source.clone(),
            config.prevalence,
            &config.enrollment_times,
            config.inversion,
        )?;

        let contributions = match (&config.prior_test, config.recency.phi()) {
            (Some(_), Some(phi)) => Some(ContributionCalculator::new(
                phi,
                config.big_t,
                config.tau,
                config.quadrature,
            )?),
            _ => None,
        };

        let binomial = Binomial::new(config.n, config.prevalence)
            .map_err(|e| Error::configuration("prevalence", e.to_string()))?;

        Ok(Self {
            config,
            sampler,
            contributions,
            binomial,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// All subjects of replicate `r` (1-based), in draw order.
    pub fn replicate(&self, r: usize) -> Result<Vec<SubjectRecord>> {
        Ok(self.replicate_cells(r)?.into_iter().flatten().collect())
    }

    /// Subjects of replicate `r` grouped by enrollment time index.
    fn replicate_cells(&self, r: usize) -> Result<Vec<Vec<SubjectRecord>>> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(r as u64));
        let mut cells = Vec::with_capacity(self.config.enrollment_times.len());

        for (time_index, &t) in self.config.enrollment_times.iter().enumerate() {
            let n_positive = self.binomial.sample(&mut rng);
            let n_negative = self.config.n - n_positive;

            let mut cell = Vec::with_capacity(self.config.n as usize);
            for _ in 0..n_positive {
                cell.push(self.positive_subject(r, time_index, t, &mut rng)?);
            }
            cell.extend((0..n_negative).map(|_| SubjectRecord::negative(r, t)));
            cells.push(cell);
        }

        debug!(replicate = r, enrollment_times = cells.len(), "Simulated replicate");
        Ok(cells)
    }

    fn positive_subject(&self, r: usize, time_index: usize, t: f64, rng: &mut StdRng) -> Result<SubjectRecord> {
        let e: f64 = rng.random();
        let infection_time = self.sampler.sample(e, time_index)?;
        let duration = t - infection_time;

        let prior = match &self.config.prior_test {
            Some(prior_test) => prior_test.simulate(infection_time, t, rng)?,
            None => None,
        };

        let recency = self.config.recency.draw(duration, rng)?;
        let enhanced = match (&self.config.prior_test, recency) {
            (Some(_), Some(draw)) => Some(enhanced_recency(draw.recent, prior.as_ref(), self.config.big_t)),
            _ => None,
        };

        Ok(SubjectRecord {
            replicate: r,
            enrollment_time: t,
            prevalence: PrevalenceFlag::Positive,
            infection_time: Some(infection_time),
            prior_test_time: prior.map(|p| t - p.time_since),
            time_since_prior_test: prior.map(|p| p.time_since),
            prior_test_result: prior.map(|p| p.reported_positive),
            recency_probability: recency.and_then(|d| d.probability),
            recency_indicator: recency.map(|d| d.recent),
            enhanced_recency_indicator: enhanced,
        })
    }

    /// Summary of replicate `r`, one entry per enrollment time.
    pub fn replicate_summary(&self, r: usize) -> Result<Vec<SummaryStatistics>> {
        self.replicate_cells(r)?
            .iter()
            .map(|cell| self.summarize_records(cell))
            .collect()
    }

    /// Aggregates subjects that share a replicate and enrollment time.
    pub fn summarize_records<'a, I>(&self, records: I) -> Result<SummaryStatistics>
    where
        I: IntoIterator<Item = &'a SubjectRecord>,
    {
        let mut stats = SummaryStatistics::default();
        for subject in records {
            stats.n += 1;
            match subject.prevalence {
                PrevalenceFlag::Negative => stats.n_negative += 1,
                PrevalenceFlag::Positive => stats.n_positive += 1,
            }

            let recent = subject.recency_indicator.unwrap_or(false);
            if recent {
                stats.n_recent += 1;
            }
            if subject.enhanced_recency_indicator.unwrap_or(recent) {
                stats.n_recent_with_priortest += 1;
            }

            if let (Some(calc), Some(prior)) = (&self.contributions, subject.prior_test()) {
                let c = calc.contributions(&prior)?;
                stats.numerator_beta += c.numerator_beta;
                stats.denominator_omega += c.denominator_omega;
                stats.denominator_beta += c.denominator_beta;
            }
        }
        Ok(stats)
    }

    /// Summary matrix over all replicates, computed in parallel.
    pub fn summarize(&self) -> Result<SummaryMatrix> {
        let columns = (1..=self.config.n_sims)
            .into_par_iter()
            .map(|r| self.replicate_summary(r))
            .collect::<Result<Vec<_>>>()?;

        info!(
            n_sims = self.config.n_sims,
            enrollment_times = self.config.enrollment_times.len(),
            n = self.config.n,
            "Cohort summary complete"
        );
        Ok(SummaryMatrix::from_columns(self.config.enrollment_times.clone(), columns))
    }

    /// Unit records of all replicates, sorted by replicate, enrollment time,
    /// prevalence flag and infection time.
    pub fn unit_records(&self) -> Result<Vec<SubjectRecord>> {
        let per_replicate = (1..=self.config.n_sims)
            .into_par_iter()
            .map(|r| self.replicate(r))
            .collect::<Result<Vec<_>>>()?;

        let mut records: Vec<SubjectRecord> = per_replicate.into_iter().flatten().collect();
        records.sort_by(SubjectRecord::sort_key_cmp);

        info!(
            n_sims = self.config.n_sims,
            records = records.len(),
            "Unit-record simulation complete"
        );
        Ok(records)
    }
}
