//! Cross-sectional incidence from survey counts and assay estimates.
//!
//! `λ̂ = (N_rec − β̂·N_pos) / (N_neg·(Ω̂ − β̂·T))`. The variance combines the
//! multinomial sampling of the survey counts with the assay variances by the
//! delta method; survey and assay are treated as independent, and so are
//! Ω̂ and β̂.

use serde::{Deserialize, Serialize};

use crate::cohort::SummaryStatistics;
use crate::error::{Error, Result};
use crate::estimator::AssayEstimates;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncidenceEstimate {
    pub incidence: f64,
    pub variance: f64,
    pub std_error: f64,
}

/// Standard estimator using the assay-only recency count.
pub fn standard_incidence(
    stats: &SummaryStatistics,
    assay: &AssayEstimates,
    big_t: f64,
) -> Result<IncidenceEstimate> {
    incidence(
        stats,
        stats.n_recent as f64,
        Window {
            omega: assay.omega_est,
            omega_var: assay.omega_var,
            beta: assay.beta_est,
            beta_var: assay.beta_var,
        },
        big_t,
    )
}

/// Estimator using prior-test reclassified recency and the adjusted Ω̂', β̂'.
pub fn enhanced_incidence(
    stats: &SummaryStatistics,
    assay: &AssayEstimates,
    big_t: f64,
    tau: f64,
) -> Result<IncidenceEstimate> {
    if stats.n_positive == 0 {
        return Err(Error::numerical_range("incidence", "no positive subjects"));
    }
    let n_pos = stats.n_positive as f64;
    let omega = assay.omega_est + stats.denominator_omega / n_pos;

    let tail = assay.tail_mass;
    let reported = if tau > big_t {
        stats.denominator_beta / (tau - big_t)
    } else {
        0.0
    };
    let beta = if tail > 0.0 && reported > 0.0 {
        assay.beta_est * (stats.numerator_beta + (n_pos - reported) * tail) / (n_pos * tail)
    } else {
        assay.beta_est
    };
    let beta_var = if assay.beta_est > 0.0 {
        (beta / assay.beta_est).powi(2) * assay.beta_var
    } else {
        assay.beta_var
    };

    incidence(
        stats,
        stats.n_recent_with_priortest as f64,
        Window {
            omega,
            omega_var: assay.omega_var,
            beta,
            beta_var,
        },
        big_t,
    )
}

struct Window {
    omega: f64,
    omega_var: f64,
    beta: f64,
    beta_var: f64,
}

fn incidence(stats: &SummaryStatistics, recent: f64, w: Window, big_t: f64) -> Result<IncidenceEstimate> {
    let n = stats.n as f64;
    let pos = stats.n_positive as f64;
    let neg = stats.n_negative as f64;
    if stats.n_negative == 0 {
        return Err(Error::numerical_range("incidence", "no negative subjects"));
    }
    if stats.n_positive == 0 {
        return Err(Error::numerical_range("incidence", "no positive subjects"));
    }

    let window = w.omega - w.beta * big_t;
    if !(window > 0.0) {
        return Err(Error::numerical_range(
            "incidence",
            format!("omega - beta·T = {} is not positive", window),
        ));
    }
    let den = neg * window;
    let lambda = (recent - w.beta * pos) / den;

    let d_recent = 1.0 / den;
    let d_pos = -w.beta / den;
    let d_neg = -lambda / neg;
    let d_omega = -lambda / window;
    let d_beta = -pos / den + lambda * big_t / window;

    // Multinomial plug-in covariances; recent subjects are a subset of positives.
    let (p_r, p_p, p_n) = (recent / n, pos / n, neg / n);
    let var_r = n * p_r * (1.0 - p_r);
    let var_p = n * p_p * (1.0 - p_p);
    let var_n = n * p_n * (1.0 - p_n);
    let cov_rp = n * p_r * (1.0 - p_p);
    let cov_rn = -n * p_r * p_n;
    let cov_pn = -n * p_p * p_n;

    let survey = d_recent * d_recent * var_r
        + d_pos * d_pos * var_p
        + d_neg * d_neg * var_n
        + 2.0 * d_recent * d_pos * cov_rp
        + 2.0 * d_recent * d_neg * cov_rn
        + 2.0 * d_pos * d_neg * cov_pn;
    let assay = d_omega * d_omega * w.omega_var + d_beta * d_beta * w.beta_var;
    let variance = survey + assay;

    Ok(IncidenceEstimate {
        incidence: lambda,
        variance,
        std_error: variance.max(0.0).sqrt(),
    })
}
