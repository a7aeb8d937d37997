#![warn(missing_docs)]
//! HelixBench Core - External Process Execution
//!
//! This crate provides the execution environment for benchmark pipelines:
//! - `ExternalCommand` for describing external tool invocations
//! - `ProcessMonitor` for timeout-bounded, resource-sampled process execution
//! - `Step`/`ToolInvocation` as the capability contract all wrapped tools satisfy
//! - `Pipeline` for running ordered steps with partial-failure semantics

mod command;
mod error;
mod monitor;
mod pipeline;
mod step;

pub use command::ExternalCommand;
pub use error::{MonitorError, PipelineError, StepError};
pub use monitor::{ExecutionResult, MonitorConfig, ProcessMonitor, ResourceStats};
pub use pipeline::{OutputDir, Pipeline, PipelineRun, StepRecord};
pub use step::{MonitoredCommand, Step, ToolInvocation};
