//! Binomial link functions.

use serde::{Deserialize, Serialize};

use ra_config::LinkName;
use ra_math::{cloglog, cloglog_inverse, logit, sigmoid};

/// Smallest derivative used as an IRLS working weight.
const MIN_DERIVATIVE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    #[default]
    Logit,
    #[serde(rename = "cloglog")]
    CLogLog,
}

impl Link {
    /// Mean from linear predictor.
    pub fn inverse(self, eta: f64) -> f64 {
        match self {
            Link::Logit => sigmoid(eta),
            Link::CLogLog => cloglog_inverse(eta),
        }
    }

    /// `dμ/dη`.
    pub fn derivative(self, eta: f64) -> f64 {
        match self {
            Link::Logit => {
                let mu = sigmoid(eta);
                mu * (1.0 - mu)
            }
            Link::CLogLog => (eta - eta.exp()).exp(),
        }
    }

    /// `dμ/dη`, bounded away from zero.
    pub(crate) fn working_derivative(self, eta: f64) -> f64 {
        self.derivative(eta).max(MIN_DERIVATIVE)
    }

    /// Linear predictor from mean.
    pub fn apply(self, mu: f64) -> f64 {
        match self {
            Link::Logit => logit(mu),
            Link::CLogLog => cloglog(mu),
        }
    }
}

impl From<LinkName> for Link {
    fn from(name: LinkName) -> Self {
        match name {
            LinkName::Logit => Link::Logit,
            LinkName::Cloglog => Link::CLogLog,
        }
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Logit => write!(f, "logit"),
            Link::CLogLog => write!(f, "cloglog"),
        }
    }
}
