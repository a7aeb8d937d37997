//! Pipeline Sequencer
//!
//! Runs an ordered list of steps, each wrapping one external tool call.
//! Partial-failure semantics: the first failing step stops the run, and
//! downstream steps that would depend on its output never execute. A step
//! "fails" when its process exits non-zero or its declared output path does
//! not exist afterwards; both are recorded, not raised. Only a fatal
//! invocation problem (e.g. missing executable) aborts the run with an
//! error.
//!
//! Step paths given as relative are resolved against the pipeline's output
//! directory at run time, so a pipeline can be relocated (e.g. nested under
//! a unique run id) without rebuilding its steps.

use crate::error::PipelineError;
use crate::monitor::ExecutionResult;
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

const LOG_SUFFIX: &str = ".log";

/// Where a pipeline writes its step logs and intermediate files.
#[derive(Debug, Clone)]
pub enum OutputDir {
    /// A caller-chosen directory; must not exist yet, kept after the run.
    Fixed(PathBuf),
    /// A temporary directory, deleted after the run.
    Temporary,
}

/// Metadata for one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name.
    pub step: String,
    /// Execution metadata with `success` filled in by the sequencer.
    pub result: ExecutionResult,
}

/// Completion result of a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// True iff every step succeeded.
    pub completed: bool,
    /// Name of the first failing step, if any.
    pub failed_at: Option<String>,
    /// Per-step metadata, in execution order, up to the first failure.
    pub performance: Vec<StepRecord>,
}

/// An ordered sequence of steps over one exclusive output directory.
///
/// Created per invocation and run exactly once; the caller persists or
/// discards the returned [`PipelineRun`].
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    output: OutputDir,
    timeout: Duration,
    steps: Vec<Step>,
    seed_files: Vec<(PathBuf, String)>,
    ran: bool,
}

impl Pipeline {
    /// Create a pipeline writing into a temporary directory (deleted after
    /// the run).
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            output: OutputDir::Temporary,
            timeout,
            steps: Vec::new(),
            seed_files: Vec::new(),
            ran: false,
        }
    }

    /// Use a fixed output directory; it must not exist yet and is kept.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output = OutputDir::Fixed(dir.into());
        self
    }

    /// Append a step; steps run in exactly the order they are added.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Copy `src` into the output directory as `dest` before the first step
    /// runs (e.g. codec side files required for decoding).
    pub fn seed_file(mut self, src: impl Into<PathBuf>, dest: impl Into<String>) -> Self {
        self.seed_files.push((src.into(), dest.into()));
        self
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared steps, in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Relocate the output directory (e.g. nest it under a unique run id).
    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output = OutputDir::Fixed(dir.into());
    }

    /// The fixed output directory, if one is set.
    pub fn output_dir(&self) -> Option<&Path> {
        match &self.output {
            OutputDir::Fixed(path) => Some(path),
            OutputDir::Temporary => None,
        }
    }

    /// Run all steps in order, stopping at the first failure.
    ///
    /// Returns an error only for pipeline-level fatal problems: an already
    /// existing output directory, or a step whose tool could not be invoked
    /// at all.
    pub fn run(&mut self) -> Result<PipelineRun, PipelineError> {
        debug_assert!(!self.ran, "pipelines are single-use");
        self.ran = true;

        let (dir, delete_after) = self.prepare_output_dir()?;
        let span = info_span!("pipeline", name = %self.name, dir = %dir.display());
        let _guard = span.enter();

        let start = Instant::now();
        let outcome = self.run_steps(&dir);
        info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "pipeline finished"
        );

        if delete_after {
            let _ = std::fs::remove_dir_all(&dir);
        }
        outcome
    }

    fn prepare_output_dir(&self) -> Result<(PathBuf, bool), PipelineError> {
        match &self.output {
            OutputDir::Fixed(path) => {
                if path.exists() {
                    return Err(PipelineError::OutputDirExists(path.clone()));
                }
                std::fs::create_dir_all(path).map_err(|source| {
                    PipelineError::OutputDirCreate {
                        path: path.clone(),
                        source,
                    }
                })?;
                Ok((path.clone(), false))
            }
            OutputDir::Temporary => {
                let dir = tempfile::Builder::new()
                    .prefix("helixbench-")
                    .tempdir()
                    .map_err(|source| PipelineError::OutputDirCreate {
                        path: std::env::temp_dir(),
                        source,
                    })?;
                // Deleted manually after the run rather than on drop.
                Ok((dir.into_path(), true))
            }
        }
    }

    fn run_steps(&self, dir: &Path) -> Result<PipelineRun, PipelineError> {
        for (src, dest) in &self.seed_files {
            std::fs::copy(src, dir.join(dest)).map_err(|source| PipelineError::SeedCopy {
                path: src.clone(),
                source,
            })?;
        }

        let mut performance = Vec::new();
        let mut failed_at = None;

        for step in &self.steps {
            let input = resolve(dir, &step.input);
            let output = resolve(dir, &step.output);
            let log_file = dir.join(format!("{}{}", step.name, LOG_SUFFIX));
            debug!(step = %step.name, "running step");

            let mut result = step
                .invoke_with(dir, &input, &output, &log_file, self.timeout)
                .map_err(|source| PipelineError::StepInvocation {
                    step: step.name.clone(),
                    source,
                })?;

            // Success is exit code plus output existence; the sequencer
            // never inspects output contents.
            result.success = result.return_code == 0 && output.exists();

            if !result.success {
                warn!(
                    step = %step.name,
                    return_code = result.return_code,
                    output_exists = output.exists(),
                    "step failed"
                );
                failed_at = Some(step.name.clone());
            }

            let success = result.success;
            performance.push(StepRecord {
                step: step.name.clone(),
                result,
            });
            if !success {
                break;
            }
        }

        Ok(PipelineRun {
            completed: failed_at.is_none(),
            failed_at,
            performance,
        })
    }
}

fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}
