//! Batch Managers
//!
//! A `Manager` accepts batches of constructed pipelines, executes each one,
//! and persists `{overview, results, performance}` keyed by a unique run id.
//! The sweep core only requires `submit` and `current_results`.
//!
//! Two implementations: an in-memory store (optionally running batches in
//! parallel across pipelines), and a CSV-backed store layered on top of it
//! with bounded-retry file access.

use crate::results::{ResultsTable, RunRecord, RunStatus, SampleResult};
use chrono::Utc;
use helixbench_core::{Pipeline, PipelineRun};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, info_span};
use uuid::Uuid;

/// How long to keep retrying a locked/unavailable results store.
const STORE_RETRY_BUDGET: Duration = Duration::from_secs(60);
const STORE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Errors from batch managers.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The results store stayed unavailable past the retry budget.
    #[error("results store {path} unavailable after {seconds} seconds")]
    StoreTimeout {
        /// Store file path.
        path: PathBuf,
        /// Retry budget that was exhausted.
        seconds: u64,
    },

    /// Writing to the results store failed.
    #[error("failed to write results store {path}: {source}")]
    StoreWrite {
        /// Store file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the results store failed.
    #[error("failed to read results store {path}: {source}")]
    StoreRead {
        /// Store file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The parallel worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
}

/// Derives the sweep metric from a finished pipeline run.
///
/// The default maps `completed` to 1.0/0.0; callers layer content
/// validation (byte-equality of decoded files, etc.) by supplying their
/// own evaluator.
pub type MetricFn = Arc<dyn Fn(&PipelineRun) -> f64 + Send + Sync>;

/// One pipeline queued for execution, keyed by a fresh run id.
pub struct PreparedRun {
    /// Unique run identifier.
    pub id: Uuid,
    /// The swept parameter value this pipeline was built for.
    pub parameter_value: f64,
    /// The pipeline to execute.
    pub pipeline: Pipeline,
}

impl PreparedRun {
    /// Queue a pipeline under a fresh v4 id.
    pub fn new(parameter_value: f64, pipeline: Pipeline) -> Self {
        Self {
            id: Uuid::new_v4(),
            parameter_value,
            pipeline,
        }
    }
}

/// Batch execution and result persistence.
pub trait Manager {
    /// Execute a batch of runs and persist their records. A single run's
    /// failure is isolated: it is recorded as `Failed` and the rest of the
    /// batch continues.
    fn submit(&mut self, batch: Vec<PreparedRun>) -> Result<(), ManagerError>;

    /// All accumulated samples, usable for fitting.
    fn current_results(&self) -> ResultsTable;
}

fn default_metric() -> MetricFn {
    Arc::new(|run: &PipelineRun| if run.completed { 1.0 } else { 0.0 })
}

/// Manager keeping all records in memory.
pub struct InMemoryManager {
    base_dir: Option<PathBuf>,
    metric: MetricFn,
    jobs: usize,
    records: Vec<RunRecord>,
}

impl InMemoryManager {
    /// Create a manager; each run gets an exclusive output directory
    /// `base_dir/<run id>`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            metric: default_metric(),
            jobs: 1,
            records: Vec::new(),
        }
    }

    /// Create a manager that leaves pipeline output locations untouched
    /// (pipelines then default to temporary directories).
    pub fn without_base_dir() -> Self {
        Self {
            base_dir: None,
            metric: default_metric(),
            jobs: 1,
            records: Vec::new(),
        }
    }

    /// Supply a custom metric evaluator.
    pub fn with_metric(mut self, metric: MetricFn) -> Self {
        self.metric = metric;
        self
    }

    /// Run up to `jobs` pipelines in parallel per batch. Each pipeline's
    /// step order stays strictly sequential; only distinct pipelines (with
    /// exclusive output directories) overlap.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// All accumulated full records.
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Execute a batch, returning the new records without storing them.
    fn run_batch(&self, mut batch: Vec<PreparedRun>) -> Result<Vec<RunRecord>, ManagerError> {
        let total = batch.len();
        info!(pipelines = total, "running pipeline batch");
        let start = Instant::now();

        for run in &mut batch {
            if let Some(base) = &self.base_dir {
                run.pipeline.set_output_dir(base.join(run.id.to_string()));
            }
        }

        let records = if self.jobs == 1 || total <= 1 {
            batch
                .into_iter()
                .enumerate()
                .map(|(i, run)| self.execute(run, i, total))
                .collect()
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.jobs.min(total))
                .build()
                .map_err(|e| ManagerError::PoolBuild(e.to_string()))?;
            pool.install(|| {
                batch
                    .into_par_iter()
                    .enumerate()
                    .map(|(i, run)| self.execute(run, i, total))
                    .collect()
            })
        };

        info!(
            pipelines = total,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "finished pipeline batch"
        );
        Ok(records)
    }

    fn execute(&self, mut run: PreparedRun, index: usize, total: usize) -> RunRecord {
        let span = info_span!("run", id = %run.id, value = run.parameter_value);
        let _guard = span.enter();
        info!(
            pipeline = %run.pipeline.name(),
            position = index + 1,
            total,
            "running pipeline"
        );

        let started_at = Utc::now();
        match run.pipeline.run() {
            Ok(result) => {
                let metric = (self.metric)(&result);
                RunRecord {
                    id: run.id,
                    parameter_value: run.parameter_value,
                    status: RunStatus::Finished,
                    metric_value: metric,
                    completed: result.completed,
                    failed_at: result.failed_at,
                    started_at,
                    performance: result.performance,
                }
            }
            Err(e) => {
                error!(id = %run.id, error = %e, "pipeline failed");
                RunRecord {
                    id: run.id,
                    parameter_value: run.parameter_value,
                    status: RunStatus::Failed(e.to_string()),
                    metric_value: 0.0,
                    completed: false,
                    failed_at: None,
                    started_at,
                    performance: Vec::new(),
                }
            }
        }
    }
}

impl Manager for InMemoryManager {
    fn submit(&mut self, batch: Vec<PreparedRun>) -> Result<(), ManagerError> {
        let records = self.run_batch(batch)?;
        self.records.extend(records);
        Ok(())
    }

    fn current_results(&self) -> ResultsTable {
        let mut table = ResultsTable::new();
        for record in &self.records {
            table.push(record.sample());
        }
        table
    }
}

/// Manager appending overview and per-step performance rows to CSV files.
///
/// The shared store files may be held by a concurrent reader; appends
/// retry with backoff and surface a timeout error rather than blocking
/// indefinitely.
pub struct CsvManager {
    inner: InMemoryManager,
    overview_path: PathBuf,
    performance_path: PathBuf,
}

const OVERVIEW_HEADER: &str =
    "id,parameter_value,status,metric_value,completed,failed_at,started_at";
const PERFORMANCE_HEADER: &str =
    "id,step,return_code,duration_secs,cpu_percent,memory_percent,memory_gb,success";

impl CsvManager {
    /// Store under `store_dir/overview.csv` and `store_dir/performance.csv`,
    /// with run output directories nested in `base_dir`.
    pub fn new(
        store_dir: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Self, ManagerError> {
        let store_dir = store_dir.into();
        std::fs::create_dir_all(&store_dir).map_err(|source| ManagerError::StoreWrite {
            path: store_dir.clone(),
            source,
        })?;
        Ok(Self {
            inner: InMemoryManager::new(base_dir),
            overview_path: store_dir.join("overview.csv"),
            performance_path: store_dir.join("performance.csv"),
        })
    }

    /// Supply a custom metric evaluator.
    pub fn with_metric(mut self, metric: MetricFn) -> Self {
        self.inner = self.inner.with_metric(metric);
        self
    }

    /// Run up to `jobs` pipelines in parallel per batch.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.inner = self.inner.with_jobs(jobs);
        self
    }

    /// Path of the overview CSV.
    pub fn overview_path(&self) -> &Path {
        &self.overview_path
    }

    /// Load previously stored samples from an overview CSV.
    pub fn load_overview(path: &Path) -> Result<ResultsTable, ManagerError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ManagerError::StoreRead {
                path: path.to_path_buf(),
                source,
            })?;

        let mut table = ResultsTable::new();
        for line in contents.lines().skip(1) {
            if line.is_empty() {
                continue;
            }
            let fields = split_csv_line(line);
            if fields.len() < 4 {
                continue;
            }
            let id = fields[0].parse().unwrap_or_else(|_| Uuid::nil());
            let parameter_value: f64 = match fields[1].parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            let status = match fields[2].as_str() {
                "Running" => RunStatus::Running,
                "Finished" => RunStatus::Finished,
                other => RunStatus::Failed(
                    other.strip_prefix("Failed: ").unwrap_or(other).to_string(),
                ),
            };
            let metric_value: f64 = fields[3].parse().unwrap_or(0.0);
            table.push(SampleResult {
                id,
                parameter_value,
                metric_value,
                status,
            });
        }
        Ok(table)
    }

    fn append_records(&self, records: &[RunRecord]) -> Result<(), ManagerError> {
        let mut overview = open_with_retry(&self.overview_path, OVERVIEW_HEADER)?;
        for record in records {
            writeln!(
                overview,
                "{},{},{},{},{},{},{}",
                record.id,
                record.parameter_value,
                csv_escape(&record.status.to_string()),
                record.metric_value,
                record.completed,
                csv_escape(record.failed_at.as_deref().unwrap_or("")),
                record.started_at.to_rfc3339(),
            )
            .map_err(|source| ManagerError::StoreWrite {
                path: self.overview_path.clone(),
                source,
            })?;
        }

        let mut performance = open_with_retry(&self.performance_path, PERFORMANCE_HEADER)?;
        for record in records {
            for step in &record.performance {
                let r = &step.result;
                writeln!(
                    performance,
                    "{},{},{},{},{},{},{},{}",
                    record.id,
                    csv_escape(&step.step),
                    r.return_code,
                    r.duration_secs,
                    r.cpu_percent,
                    r.memory_percent,
                    r.memory_gb,
                    r.success,
                )
                .map_err(|source| ManagerError::StoreWrite {
                    path: self.performance_path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

impl Manager for CsvManager {
    fn submit(&mut self, batch: Vec<PreparedRun>) -> Result<(), ManagerError> {
        let records = self.inner.run_batch(batch)?;
        self.append_records(&records)?;
        self.inner.records.extend(records);
        Ok(())
    }

    fn current_results(&self) -> ResultsTable {
        self.inner.current_results()
    }
}

/// Open a store file for appending, writing the header on creation.
/// Retries with backoff while the file is unavailable, up to the budget.
fn open_with_retry(path: &Path, header: &str) -> Result<std::fs::File, ManagerError> {
    let deadline = Instant::now() + STORE_RETRY_BUDGET;
    loop {
        let existed = path.exists();
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut file) => {
                if !existed {
                    writeln!(file, "{}", header).map_err(|source| ManagerError::StoreWrite {
                        path: path.to_path_buf(),
                        source,
                    })?;
                }
                return Ok(file);
            }
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(STORE_RETRY_BACKOFF);
            }
            Err(_) => {
                return Err(ManagerError::StoreTimeout {
                    path: path.to_path_buf(),
                    seconds: STORE_RETRY_BUDGET.as_secs(),
                });
            }
        }
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
