#![warn(missing_docs)]
//! HelixBench CLI Library
//!
//! Command-line front end for adaptive codec sweeps: discovers `helix.toml`,
//! builds pipelines from the configured step templates, drives the focus
//! sweep, and inspects stored results.

mod config;
mod tools;

pub use config::*;
pub use tools::TemplateFactory;

use clap::{Parser, Subcommand};
use helixbench_stats::{fit_sigmoid, DEFAULT_TARGET_P};
use helixbench_sweep::{
    CsvManager, FocusVariator, Manager, ManagerError, PreparedRun, ResultsTable,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

/// HelixBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "helixbench")]
#[command(author, version, about = "HelixBench - adaptive benchmarking for DNA storage codecs")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Path to helix.toml (discovered by walking up from the current
    /// directory if not given)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default helix.toml to the current directory
    Init {
        /// Overwrite an existing helix.toml
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and check that step programs are available
    Check,
    /// Run the adaptive sweep over the configured pipeline
    Run {
        /// Seed input file copied into every run directory
        input: PathBuf,
        /// Number of pipelines to run in parallel per batch
        #[arg(long)]
        jobs: Option<usize>,
        /// Override the sweep lower bound
        #[arg(long)]
        low: Option<f64>,
        /// Override the sweep upper bound
        #[arg(long)]
        high: Option<f64>,
        /// Override the number of focus rounds
        #[arg(long)]
        rounds: Option<usize>,
    },
    /// Fit stored results and report the codec's threshold
    Fit {
        /// Success probability the threshold should achieve
        #[arg(long, default_value_t = DEFAULT_TARGET_P)]
        probability: f64,
        /// Results store directory (defaults to the configured one)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

/// Run the HelixBench CLI with arguments from the environment.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the HelixBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("helixbench=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("helixbench=info")
            .init();
    }

    let config = match &cli.config {
        Some(path) => HelixConfig::load(path)?,
        None => HelixConfig::discover().unwrap_or_default(),
    };

    match cli.command {
        Commands::Init { force } => init_config(force),
        Commands::Check => check_config(&config),
        Commands::Run {
            ref input,
            jobs,
            low,
            high,
            rounds,
        } => run_sweep(&config, input, jobs, low, high, rounds),
        Commands::Fit { probability, ref store } => {
            let store = store
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.output.store));
            fit_store(&store, probability)
        }
    }
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = Path::new("helix.toml");
    if path.exists() && !force {
        return Err(anyhow::anyhow!(
            "helix.toml already exists (use --force to overwrite)"
        ));
    }
    std::fs::write(path, HelixConfig::default_toml())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn check_config(config: &HelixConfig) -> anyhow::Result<()> {
    config.monitor_config()?;

    if !(config.sweep.low > 0.0 && config.sweep.low < config.sweep.high) {
        return Err(anyhow::anyhow!(
            "invalid sweep range ({}, {}): bounds must be positive and increasing",
            config.sweep.low,
            config.sweep.high
        ));
    }
    if config.steps.is_empty() {
        return Err(anyhow::anyhow!("no [[step]] sections configured"));
    }

    let mut missing = 0;
    for step in &config.steps {
        let rendered = format!("{} {}", step.program, step.args.join(" "));
        if find_program(&step.program).is_some() {
            println!("  ✓ {}: {} -> {}", step.name, rendered.trim_end(), step.output);
        } else {
            println!("  ✗ {}: {} not found", step.name, step.program);
            missing += 1;
        }
    }
    if missing > 0 {
        return Err(anyhow::anyhow!("{} step program(s) not found", missing));
    }

    println!("Configuration OK: {} step(s).", config.steps.len());
    Ok(())
}

/// Locate a program: explicit paths are checked directly, bare names are
/// searched on PATH.
fn find_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.exists().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.exists())
}

fn run_sweep(
    config: &HelixConfig,
    input: &Path,
    jobs: Option<usize>,
    low: Option<f64>,
    high: Option<f64>,
    rounds: Option<usize>,
) -> anyhow::Result<()> {
    check_config(config)?;
    if !input.exists() {
        return Err(anyhow::anyhow!("input file not found: {}", input.display()));
    }

    let mut focus = config.focus_config();
    if let Some(low) = low {
        focus.range.0 = low;
    }
    if let Some(high) = high {
        focus.range.1 = high;
    }
    if let Some(rounds) = rounds {
        focus.focus_iterations = rounds;
    }
    let jobs = jobs.or(config.output.jobs).unwrap_or(1);

    let total = focus.initial_samples + focus.focus_iterations * focus.samples_per_round;
    println!(
        "Sweeping ({}, {}) with {} samples, {} worker(s)...\n",
        focus.range.0, focus.range.1, total, jobs
    );

    let monitor = config.monitor_config()?;
    let factory = TemplateFactory::new(config.steps.clone(), input, monitor);
    let manager = CsvManager::new(&config.output.store, &config.output.directory)?
        .with_jobs(jobs);
    let mut manager = ProgressManager::new(manager, total as u64);

    FocusVariator::new(focus).run(&factory, &mut manager)?;
    manager.finish();

    let table = manager.current_results();
    print_fit(&table, DEFAULT_TARGET_P);
    println!(
        "\nResults stored in {}",
        config.output.store
    );
    Ok(())
}

fn fit_store(store: &Path, probability: f64) -> anyhow::Result<()> {
    let overview = store.join("overview.csv");
    let table = CsvManager::load_overview(&overview)?;
    if table.is_empty() {
        return Err(anyhow::anyhow!(
            "no samples in {}; run a sweep first",
            overview.display()
        ));
    }
    println!("Loaded {} sample(s) from {}.\n", table.len(), overview.display());
    print_fit(&table, probability);
    Ok(())
}

fn print_fit(table: &ResultsTable, probability: f64) {
    let (xs, ys) = table.finished_points();
    println!("Finished samples: {}", xs.len());

    let fit = fit_sigmoid(&xs, &ys, true);
    match fit.threshold(probability) {
        Some(threshold) => {
            println!(
                "Threshold at p={}: {:.6} (midpoint {:.6}, slope {:.3})",
                probability,
                threshold,
                fit.threshold_forced(0.5).unwrap_or(f64::NAN),
                fit.slope_k().unwrap_or(f64::NAN),
            );
        }
        None => {
            let reason = fit
                .failure()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no data".to_string());
            println!("No trustworthy fit: {}", reason);
        }
    }
}

/// Manager wrapper advancing a progress bar as batches resolve.
struct ProgressManager<M> {
    inner: M,
    bar: ProgressBar,
}

impl<M: Manager> ProgressManager<M> {
    fn new(inner: M, total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { inner, bar }
    }

    fn finish(&self) {
        self.bar.finish_with_message("Complete");
    }
}

impl<M: Manager> Manager for ProgressManager<M> {
    fn submit(&mut self, batch: Vec<PreparedRun>) -> Result<(), ManagerError> {
        let count = batch.len() as u64;
        self.inner.submit(batch)?;
        self.bar.inc(count);
        Ok(())
    }

    fn current_results(&self) -> ResultsTable {
        self.inner.current_results()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helixbench_sweep::{InMemoryManager, RunStatus};

    #[test]
    fn test_find_program() {
        assert!(find_program("sh").is_some());
        assert!(find_program("helixbench-no-such-tool").is_none());
        assert!(find_program("/no/such/dir/tool").is_none());
    }

    #[test]
    fn test_check_rejects_empty_steps() {
        let config = HelixConfig::default();
        assert!(check_config(&config).is_err());
    }

    #[test]
    fn test_check_rejects_bad_range() {
        let mut config = HelixConfig::default();
        config.sweep.low = 2.0;
        config.sweep.high = 1.0;
        assert!(check_config(&config).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_progress_manager_passes_through() {
        use helixbench_core::{ExternalCommand, MonitoredCommand, Pipeline, Step};
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let inner = InMemoryManager::new(dir.path().join("runs"));
        let mut manager = ProgressManager::new(inner, 1);

        let tool = MonitoredCommand::without_path_args(
            ExternalCommand::new("sh").arg("-c").arg("touch out.txt"),
        );
        let pipeline = Pipeline::new("touch", Duration::from_secs(10)).step(Step::new(
            "touch",
            "in.txt",
            "out.txt",
            Box::new(tool),
        ));

        manager.submit(vec![PreparedRun::new(0.5, pipeline)]).unwrap();
        manager.finish();

        let table = manager.current_results();
        assert_eq!(table.len(), 1);
        assert_eq!(table.samples()[0].status, RunStatus::Finished);
    }
}
