//! Configuration loading from helix.toml
//!
//! HelixBench configuration can be specified in a `helix.toml` file in the
//! project root. The configuration is automatically discovered by walking up
//! from the current directory.

use helixbench_core::MonitorConfig;
use helixbench_sweep::FocusConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// HelixBench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HelixConfig {
    /// Process monitoring configuration
    #[serde(default)]
    pub monitor: MonitorSection,
    /// Sweep configuration
    #[serde(default)]
    pub sweep: SweepSection,
    /// Output and results-store configuration
    #[serde(default)]
    pub output: OutputSection,
    /// Pipeline step templates, in execution order
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSection>,
}

/// Process monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Wall-clock limit for a whole pipeline (e.g., "1h", "90m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Resource sampling interval (e.g., "200ms")
    #[serde(default = "default_sample_interval")]
    pub sample_interval: String,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            sample_interval: default_sample_interval(),
        }
    }
}

fn default_timeout() -> String {
    "1h".to_string()
}
fn default_sample_interval() -> String {
    "200ms".to_string()
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSection {
    /// Lower bound of the swept parameter (must be positive)
    #[serde(default = "default_low")]
    pub low: f64,
    /// Upper bound of the swept parameter
    #[serde(default = "default_high")]
    pub high: f64,
    /// Whether the success metric decreases as the parameter increases
    #[serde(default)]
    pub metric_reversed: bool,
    /// Number of focus rounds after the initial batch
    #[serde(default = "default_focus_iterations")]
    pub focus_iterations: usize,
    /// Sample count of the initial batch
    #[serde(default = "default_batch_size")]
    pub initial_samples: usize,
    /// Sample count of each focus round
    #[serde(default = "default_batch_size")]
    pub samples_per_round: usize,
    /// Multiplicative half-width of the focus window
    #[serde(default = "default_focus_factor")]
    pub focus_factor: f64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            low: default_low(),
            high: default_high(),
            metric_reversed: false,
            focus_iterations: default_focus_iterations(),
            initial_samples: default_batch_size(),
            samples_per_round: default_batch_size(),
            focus_factor: default_focus_factor(),
        }
    }
}

fn default_low() -> f64 {
    0.001
}
fn default_high() -> f64 {
    0.5
}
fn default_focus_iterations() -> usize {
    2
}
fn default_batch_size() -> usize {
    10
}
fn default_focus_factor() -> f64 {
    2.0
}

/// Output and results-store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Directory holding per-run output directories
    #[serde(default = "default_run_dir")]
    pub directory: String,
    /// Directory holding the CSV results store
    #[serde(default = "default_store_dir")]
    pub store: String,
    /// Number of pipelines to run in parallel per batch
    #[serde(default)]
    pub jobs: Option<usize>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: default_run_dir(),
            store: default_store_dir(),
            jobs: None,
        }
    }
}

fn default_run_dir() -> String {
    "target/helixbench/runs".to_string()
}
fn default_store_dir() -> String {
    "target/helixbench/store".to_string()
}

/// One pipeline step template
///
/// Argument strings may reference `{value}` (the swept parameter),
/// `{input}`, and `{output}`; the path placeholders are substituted with
/// resolved paths inside the run's output directory at invocation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSection {
    /// Step name, used for log files and failure reporting
    pub name: String,
    /// Executable to run
    pub program: String,
    /// Argument template
    #[serde(default)]
    pub args: Vec<String>,
    /// File the step must produce, relative to the run directory
    pub output: String,
}

impl HelixConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("helix.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Monitor settings with durations parsed
    pub fn monitor_config(&self) -> anyhow::Result<MonitorConfig> {
        Ok(MonitorConfig {
            timeout: Self::parse_duration(&self.monitor.timeout)?,
            sample_interval: Self::parse_duration(&self.monitor.sample_interval)?,
        })
    }

    /// Sweep settings as a `FocusConfig`
    pub fn focus_config(&self) -> FocusConfig {
        FocusConfig::new(self.sweep.low, self.sweep.high)
            .reversed(self.sweep.metric_reversed)
            .focus_iterations(self.sweep.focus_iterations)
            .initial_samples(self.sweep.initial_samples)
            .samples_per_round(self.sweep.samples_per_round)
            .focus_factor(self.sweep.focus_factor)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# HelixBench Configuration

[monitor]
# Wall-clock limit for a whole pipeline
timeout = "1h"
# Resource sampling interval
sample_interval = "200ms"

[sweep]
# Swept parameter range (e.g., channel error rate)
low = 0.001
high = 0.5
# Set to true when the success metric decreases as the parameter grows
metric_reversed = false
# Focus rounds after the initial batch
focus_iterations = 2
# Samples in the initial batch and in each focus round
initial_samples = 10
samples_per_round = 10
# Multiplicative half-width of the focus window
focus_factor = 2.0

[output]
# Per-run output directories land here, keyed by run id
directory = "target/helixbench/runs"
# CSV results store (overview.csv, performance.csv)
store = "target/helixbench/store"
# Pipelines to run in parallel per batch (uncomment to enable)
# jobs = 4

# Pipeline steps, in order. {value} is the swept parameter; {input} and
# {output} are substituted with resolved paths in the run directory.
[[step]]
name = "encode"
program = "dna-encode"
args = ["{input}", "{output}"]
output = "encoded.fasta"

[[step]]
name = "channel"
program = "dna-channel"
args = ["--error-rate", "{value}", "{input}", "{output}"]
output = "received.fasta"

[[step]]
name = "decode"
program = "dna-decode"
args = ["{input}", "{output}"]
output = "decoded.bin"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "200ms", "90s", "2m", "1h")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;

        let seconds = match unit_part.to_lowercase().as_str() {
            "ms" => value / 1000.0,
            "s" | "" => value,
            "m" | "min" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_secs_f64(seconds))
    }
}
