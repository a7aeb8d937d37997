//! Command Templates
//!
//! Turns `[[step]]` config sections into pipelines. Each step template
//! names a program and an argument list with `{value}`, `{input}`, and
//! `{output}` placeholders. The parameter value is substituted when the
//! pipeline is built; the path placeholders are substituted at invocation
//! time, once the run's output directory is known.

use crate::config::StepSection;
use helixbench_core::{
    ExecutionResult, ExternalCommand, MonitorConfig, Pipeline, ProcessMonitor, Step, StepError,
    ToolInvocation,
};
use helixbench_sweep::PipelineFactory;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A step template with `{value}` already substituted.
struct TemplateTool {
    program: String,
    args: Vec<String>,
    sample_interval: Duration,
}

impl ToolInvocation for TemplateTool {
    fn invoke(
        &self,
        run_dir: &Path,
        input: &Path,
        output: &Path,
        log_file: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, StepError> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        let mut command = ExternalCommand::new(&self.program);
        for arg in &self.args {
            command = command.arg(arg.replace("{input}", &input).replace("{output}", &output));
        }

        let monitor = ProcessMonitor::new(MonitorConfig {
            timeout,
            sample_interval: self.sample_interval,
        });
        Ok(monitor.execute(&command, Some(log_file), Some(run_dir))?)
    }
}

/// Builds one pipeline per swept value from the configured step templates.
///
/// The seed file is copied into each run directory; the first step reads
/// it, and every later step reads its predecessor's output.
pub struct TemplateFactory {
    steps: Vec<StepSection>,
    seed: PathBuf,
    seed_name: String,
    monitor: MonitorConfig,
}

impl TemplateFactory {
    /// Create a factory over the given step templates and seed input file.
    pub fn new(steps: Vec<StepSection>, seed: impl Into<PathBuf>, monitor: MonitorConfig) -> Self {
        let seed = seed.into();
        let seed_name = seed
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.dat".to_string());
        Self {
            steps,
            seed,
            seed_name,
            monitor,
        }
    }
}

impl PipelineFactory for TemplateFactory {
    fn build(&self, parameter_value: f64) -> Pipeline {
        let mut pipeline = Pipeline::new(format!("sweep-{parameter_value}"), self.monitor.timeout)
            .seed_file(&self.seed, &self.seed_name);

        let value = parameter_value.to_string();
        let mut previous = self.seed_name.clone();
        for section in &self.steps {
            let tool = TemplateTool {
                program: section.program.clone(),
                args: section
                    .args
                    .iter()
                    .map(|arg| arg.replace("{value}", &value))
                    .collect(),
                sample_interval: self.monitor.sample_interval,
            };
            pipeline = pipeline.step(Step::new(
                &section.name,
                &previous,
                &section.output,
                Box::new(tool),
            ));
            previous = section.output.clone();
        }
        pipeline
    }
}
