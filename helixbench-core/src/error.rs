//! Error types for process execution and pipeline sequencing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the process monitor.
///
/// Non-zero exit codes and timeouts are *not* errors - they are reported in
/// the `ExecutionResult`. These variants cover the inability to launch or
/// observe the process at all.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The executable could not be spawned.
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        /// The command that failed to launch.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The process log file could not be created.
    #[error("failed to open process log {path}: {source}")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed.
    #[error("failed to wait on process: {0}")]
    WaitFailed(#[from] std::io::Error),
}

/// Error from a single tool invocation.
#[derive(Debug, Error)]
pub enum StepError {
    /// The wrapped process could not be launched or observed.
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    /// The tool rejected the invocation before launching anything.
    #[error("invalid tool invocation: {0}")]
    Invalid(String),
}

/// Pipeline-level fatal errors.
///
/// A step reporting a non-zero exit is recoverable and recorded in the
/// `PipelineRun`; these variants abort the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The exclusive output directory already exists.
    #[error("output directory {0} already exists")]
    OutputDirExists(PathBuf),

    /// The output directory could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDirCreate {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A declared seed file could not be copied into the output directory.
    #[error("failed to copy seed file {path}: {source}")]
    SeedCopy {
        /// Source path of the seed file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A step invocation failed fatally (e.g. missing executable).
    #[error("step '{step}' could not be invoked: {source}")]
    StepInvocation {
        /// Name of the failing step.
        step: String,
        /// Underlying invocation error.
        #[source]
        source: StepError,
    },
}
