//! Recency curves: the true φ used for simulation and the fitted φ models
//! used for estimation.
//!
//! Fitted models are consumed only through [`PhiModel`]: coefficients, their
//! covariance, a model matrix builder and the link. [`GlmFit`] and [`GeeFit`]
//! are the two implementations, chosen at construction by [`ModelKind`].

pub mod curve;
pub mod fit;
pub mod link;
pub mod model;

pub use curve::{PhiFn, PhiFunction};
pub use fit::{fit_binomial, FitOptions, FitSummary, GeeFit, GlmFit};
pub use link::Link;
pub use model::{ModelKind, PhiModel, PhiPrediction, PolynomialBasis};
