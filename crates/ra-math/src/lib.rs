//! Recency assay math utilities.

pub mod math;

pub use math::gamma::*;
pub use math::quadrature::*;
pub use math::stable::*;
