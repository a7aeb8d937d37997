//! Sweep Results
//!
//! One [`SampleResult`] per pipeline run, keyed by a unique run id and
//! collected into a [`ResultsTable`] usable for fitting. Records are never
//! mutated after finalization; fits always consume the full accumulated set.

use chrono::{DateTime, Utc};
use helixbench_core::StepRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of one pipeline run inside a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Submitted, not finished yet.
    Running,
    /// Finished (the pipeline may still have failed a step; that shows up
    /// in the metric, not the status).
    Finished,
    /// Aborted by a pipeline-level fatal error, with the reason.
    Failed(String),
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Finished => write!(f, "Finished"),
            RunStatus::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// One row of the sweep results: swept value, observed metric, status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Unique run identifier.
    pub id: Uuid,
    /// The swept parameter value for this run.
    pub parameter_value: f64,
    /// Success metric in `[0, 1]`; meaningful only when `Finished`.
    pub metric_value: f64,
    /// Run status.
    pub status: RunStatus,
}

/// Full per-run record persisted by managers: the sample plus timing and
/// per-step performance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run identifier.
    pub id: Uuid,
    /// The swept parameter value.
    pub parameter_value: f64,
    /// Run status.
    pub status: RunStatus,
    /// Observed metric; meaningful only when `Finished`.
    pub metric_value: f64,
    /// Whether every step succeeded.
    pub completed: bool,
    /// First failing step, if any.
    pub failed_at: Option<String>,
    /// Submission timestamp.
    pub started_at: DateTime<Utc>,
    /// Per-step execution metadata.
    pub performance: Vec<StepRecord>,
}

impl RunRecord {
    /// Project this record onto its sweep sample.
    pub fn sample(&self) -> SampleResult {
        SampleResult {
            id: self.id,
            parameter_value: self.parameter_value,
            metric_value: self.metric_value,
            status: self.status.clone(),
        }
    }
}

/// Accumulated sweep samples, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    samples: Vec<SampleResult>,
}

impl ResultsTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample.
    pub fn push(&mut self, sample: SampleResult) {
        self.samples.push(sample);
    }

    /// All samples, in submission order.
    pub fn samples(&self) -> &[SampleResult] {
        &self.samples
    }

    /// Number of samples (all statuses).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the table holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Parameter/metric pairs of finished runs, the input to fitting.
    /// Failed runs carry no trustworthy metric and are excluded.
    pub fn finished_points(&self) -> (Vec<f64>, Vec<f64>) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for sample in &self.samples {
            if sample.status == RunStatus::Finished {
                xs.push(sample.parameter_value);
                ys.push(sample.metric_value);
            }
        }
        (xs, ys)
    }
}
