#![warn(missing_docs)]
//! # HelixBench
//!
//! Adaptive benchmarking engine for DNA data storage codecs.
//!
//! HelixBench characterizes a codec's robustness by running it inside
//! simulated error channels and locating the channel intensity at which
//! decoding starts to fail:
//! - **Process Monitoring**: external tools run under a supervisor that
//!   samples CPU and memory across the whole process tree and enforces
//!   wall-clock limits with full-tree termination
//! - **Pipeline Sequencing**: ordered encode/channel/decode steps with
//!   partial-failure semantics; a step succeeds only if it exits cleanly
//!   and its declared output exists
//! - **Sigmoid Fitting**: logistic fits over the success metric with
//!   structured rejection reasons and threshold derivation at any target
//!   probability
//! - **Focus Sweeps**: log-uniform initial sampling followed by focus
//!   rounds that concentrate runs around the estimated transition
//!
//! ## Quick Start
//!
//! ```ignore
//! use helixbench::prelude::*;
//! use std::time::Duration;
//!
//! let encode = MonitoredCommand::new(ExternalCommand::new("dna-encode"));
//! let pipeline = Pipeline::new("my-codec", Duration::from_secs(3600))
//!     .step(Step::new("encode", "input.bin", "encoded.fasta", Box::new(encode)));
//! ```

// Re-export core types
pub use helixbench_core::{
    ExecutionResult, ExternalCommand, MonitorConfig, MonitorError, MonitoredCommand, OutputDir,
    Pipeline, PipelineError, PipelineRun, ProcessMonitor, Step, StepError, StepRecord,
    ToolInvocation,
};

// Re-export fitting
pub use helixbench_stats::{
    fit_sigmoid, log_spaced, sigmoid, FitFailure, FitState, DEFAULT_TARGET_P,
};

// Re-export sweep orchestration
pub use helixbench_sweep::{
    CsvManager, FocusConfig, FocusVariator, InMemoryManager, Manager, ManagerError, MetricFn,
    PipelineFactory, PreparedRun, ResultsTable, RunRecord, RunStatus, SampleResult, VariatorError,
};

// Re-export configuration
pub use helixbench_cli::{HelixConfig, TemplateFactory};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        fit_sigmoid, ExternalCommand, FocusConfig, FocusVariator, InMemoryManager, Manager,
        MonitoredCommand, Pipeline, PipelineFactory, PreparedRun, ProcessMonitor, Step,
    };
}

/// Run the HelixBench CLI harness.
///
/// Call this from your binary's `main()`:
/// ```ignore
/// fn main() {
///     helixbench::run().unwrap();
/// }
/// ```
pub use helixbench_cli::run;
