//! `ffb-recon` — duplicate harvest-transaction reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded scanner rows and an employee lookup,
//! returns verification outcomes, per-employee statistics and roll-ups.
//! No CLI, no console output; data problems come back as warnings.

pub mod classify;
pub mod config;
pub mod difference;
pub mod engine;
pub mod error;
pub mod group;
pub mod ingest;
pub mod model;
pub mod role;
pub mod summary;
pub mod totals;

pub use classify::{VerificationClassifier, VERIFIED_STATUS};
pub use config::{KeyScheme, Policy, ReconConfig, StatusGate};
pub use difference::{DifferenceCalculator, SIGNIFICANCE_THRESHOLD};
pub use engine::{run, run_with_gate};
pub use error::ReconError;
pub use group::{group_by_key, TransactionGroup};
pub use model::{ReconInput, ReconResult, TransactionRecord};
pub use role::Role;
