//! Recency assay run configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for simulation and assay-estimation settings
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation

pub mod resolve;
pub mod settings;
pub mod validate;

pub use resolve::{resolve_config, ConfigKind, ConfigSource, ResolvedConfig};
pub use settings::{
    AssaySettings, IncidenceSpec, LinkName, ModelKindName, NumericSettings, PhiSpec,
    PiecewiseSegment, PriorTestSpec, PriorTestTimingSpec, RecencySpec, SimulationSettings,
};
pub use validate::{validate_assay, validate_simulation, ValidationError, ValidationResult};
