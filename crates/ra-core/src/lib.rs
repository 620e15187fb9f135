//! Recency assay core library.
//!
//! Simulates cross-sectional HIV survey cohorts with known infection times,
//! optional prior-test histories and recency test results, and estimates the
//! assay parameters used by incidence estimators:
//! - mean duration of recent infection μ
//! - false-recency rate β
//! - the inverse-variance weighted recency window Ω
//!
//! The `recency` binary in `main.rs` is a thin dispatcher over this crate.

pub mod cohort;
pub mod error;
pub mod estimator;
pub mod exit_codes;
pub mod grid;
pub mod incidence;
pub mod incidence_estimate;
pub mod infection;
pub mod logging;
pub mod output;
pub mod phi;
pub mod simulation;

pub use cohort::{PrevalenceFlag, Simulator, SubjectRecord, SummaryMatrix, SummaryRow, SummaryStatistics};
pub use error::{Error, Result};
pub use estimator::{estimate, AssayConfig, AssayEstimates, AssayEstimator, NsimSummary};
pub use exit_codes::ExitCode;
pub use grid::{CumulativeGrid, GridCell, TimeGrid};
pub use incidence::IncidenceModel;
pub use incidence_estimate::{enhanced_incidence, standard_incidence, IncidenceEstimate};
pub use infection::{InfectionSource, InfectionTimeSampler, NumericInversion};
pub use output::write_json;
pub use phi::{Link, ModelKind, PhiFunction, PhiModel};
pub use prior_test::{PriorTest, PriorTestAvailability, PriorTestConfig, PriorTestTiming, ReportingErrors};
pub use simulation::{RecencyMechanism, SimulationConfig};
