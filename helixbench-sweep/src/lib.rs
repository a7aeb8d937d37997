#![warn(missing_docs)]
//! HelixBench Sweep - Adaptive Parameter Sweeps
//!
//! This crate orchestrates batches of pipeline runs over a swept parameter:
//! - `ResultsTable`/`SampleResult` accumulate per-run outcomes
//! - `Manager` collaborators execute batches and persist results
//! - `FocusVariator` adaptively concentrates samples around the estimated
//!   success threshold using sigmoid fits

mod manager;
mod results;
mod variator;

pub use manager::{CsvManager, InMemoryManager, Manager, ManagerError, MetricFn, PreparedRun};
pub use results::{ResultsTable, RunRecord, RunStatus, SampleResult};
pub use variator::{FocusConfig, FocusVariator, PipelineFactory, VariatorError};
