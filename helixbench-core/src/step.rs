//! Pipeline Steps
//!
//! Every wrapped external tool (codec encoder/decoder, error-channel
//! simulator, clustering tool) satisfies the single capability contract
//! [`ToolInvocation`]: take an input path and an output path, run, and
//! report `ExecutionResult`-shaped metadata. A [`Step`] is the declarative
//! descriptor the pipeline consumes: a name, the two paths, and the tool.

use crate::command::ExternalCommand;
use crate::error::StepError;
use crate::monitor::{ExecutionResult, MonitorConfig, ProcessMonitor};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capability contract for all wrapped external tools.
pub trait ToolInvocation: Send {
    /// Run the tool on `input`, producing `output`, with `run_dir` as the
    /// working directory, process output redirected to `log_file`, and the
    /// given wall-clock limit.
    fn invoke(
        &self,
        run_dir: &Path,
        input: &Path,
        output: &Path,
        log_file: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, StepError>;
}

/// One declarative pipeline step.
pub struct Step {
    /// Step name, used for log files and failure reporting.
    pub name: String,
    /// Input path handed to the tool.
    pub input: PathBuf,
    /// Output path the tool is expected to produce.
    pub output: PathBuf,
    tool: Box<dyn ToolInvocation>,
}

impl Step {
    /// Build a step from its name, paths, and tool.
    pub fn new(
        name: impl Into<String>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        tool: Box<dyn ToolInvocation>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            output: output.into(),
            tool,
        }
    }

    /// Invoke the step's tool with its declared paths, running in `run_dir`.
    pub fn invoke(
        &self,
        run_dir: &Path,
        log_file: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, StepError> {
        self.tool
            .invoke(run_dir, &self.input, &self.output, log_file, timeout)
    }

    /// Invoke the step's tool with resolved paths (used by the pipeline,
    /// which rebases relative paths onto its output directory).
    pub fn invoke_with(
        &self,
        run_dir: &Path,
        input: &Path,
        output: &Path,
        log_file: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, StepError> {
        self.tool.invoke(run_dir, input, output, log_file, timeout)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// Stock tool: run an `ExternalCommand` under the process monitor.
///
/// The input and output paths are appended as the final two arguments,
/// resolved to absolute form where possible.
pub struct MonitoredCommand {
    command: ExternalCommand,
    sample_interval: Duration,
    append_paths: bool,
}

impl MonitoredCommand {
    /// Wrap a command, appending input/output paths at invocation time.
    pub fn new(command: ExternalCommand) -> Self {
        Self {
            command,
            sample_interval: MonitorConfig::default().sample_interval,
            append_paths: true,
        }
    }

    /// Wrap a command whose argument list already names its paths.
    pub fn without_path_args(command: ExternalCommand) -> Self {
        Self {
            command,
            sample_interval: MonitorConfig::default().sample_interval,
            append_paths: false,
        }
    }

    /// Override the resource sampling interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

impl ToolInvocation for MonitoredCommand {
    fn invoke(
        &self,
        run_dir: &Path,
        input: &Path,
        output: &Path,
        log_file: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, StepError> {
        let command = if self.append_paths {
            self.command
                .clone()
                .arg(resolved(input))
                .arg(resolved(output))
        } else {
            self.command.clone()
        };

        let monitor = ProcessMonitor::new(MonitorConfig {
            timeout,
            sample_interval: self.sample_interval,
        });
        Ok(monitor.execute(&command, Some(log_file), Some(run_dir))?)
    }
}

fn resolved(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_monitored_command_appends_paths() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "payload").unwrap();

        // `cp <input> <output>` via the appended path arguments.
        let tool = MonitoredCommand::new(ExternalCommand::new("cp"));
        let step = Step::new("copy", &input, &output, Box::new(tool));

        let log = dir.path().join("copy.log");
        let result = step
            .invoke(dir.path(), &log, Duration::from_secs(10))
            .unwrap();

        assert_eq!(result.return_code, 0);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "payload");
    }

    #[test]
    fn test_missing_tool_is_a_step_error() {
        let tool = MonitoredCommand::new(ExternalCommand::new("/no/such/binary"));
        let step = Step::new("broken", "in", "out", Box::new(tool));

        let dir = tempfile::tempdir().unwrap();
        let err = step
            .invoke(dir.path(), &dir.path().join("broken.log"), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, StepError::Monitor(_)));
    }
}
