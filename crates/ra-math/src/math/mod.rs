//! Core math modules.

pub mod gamma;
pub mod quadrature;
pub mod stable;
