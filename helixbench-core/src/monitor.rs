//! Process Monitor
//!
//! Launches an external command, polls it until exit, samples CPU and
//! resident-memory usage of the process *and all of its descendants* at a
//! fixed interval, and enforces a wall-clock timeout with forced termination
//! of the whole process tree.
//!
//! Resource figures are means over all samples taken, not instantaneous
//! final values - a single noisy sample does not dominate the result.
//!
//! A non-zero exit code or a timeout is reported through the returned
//! `ExecutionResult`; the only hard failures are spawning or observing the
//! process.

use crate::command::ExternalCommand;
use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, System};
use tracing::{debug, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// How long to wait for a killed process tree to disappear.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Sleep between poll iterations.
const POLL_SLEEP: Duration = Duration::from_millis(50);

/// Execution metadata for one finished (or force-terminated) process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code; negative terminating signal on Unix if killed by signal.
    pub return_code: i32,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Mean CPU usage across all samples, percent, summed over the tree.
    pub cpu_percent: f64,
    /// Mean resident memory across all samples, percent of total memory.
    pub memory_percent: f64,
    /// Mean resident memory across all samples, gigabytes.
    pub memory_gb: f64,
    /// Whether the step producing this result succeeded. The monitor always
    /// reports `false`; the pipeline overwrites it after checking the exit
    /// code and the declared output path (the monitor has no knowledge of
    /// expected outputs).
    pub success: bool,
}

/// Accumulated resource samples for a process tree.
///
/// Each call to [`ResourceStats::sample`] adds one data point covering the
/// root process and every descendant still alive. Accessors return means.
#[derive(Debug, Default, Clone)]
pub struct ResourceStats {
    sum_cpu_percent: f64,
    sum_memory_percent: f64,
    sum_memory_bytes: f64,
    samples: usize,
}

impl ResourceStats {
    /// Mean CPU percent over all samples.
    pub fn cpu_percent(&self) -> f64 {
        self.sum_cpu_percent / self.samples.max(1) as f64
    }

    /// Mean memory percent over all samples.
    pub fn memory_percent(&self) -> f64 {
        self.sum_memory_percent / self.samples.max(1) as f64
    }

    /// Mean resident memory over all samples, in gigabytes.
    pub fn memory_gb(&self) -> f64 {
        self.sum_memory_bytes / self.samples.max(1) as f64 / BYTES_PER_GB
    }

    /// Number of samples taken.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Sample the process tree rooted at `root`.
    ///
    /// Silently no-ops if the root process has already exited - the process
    /// may disappear between scheduling and observation.
    pub fn sample(&mut self, system: &mut System, root: Pid) {
        system.refresh_processes_specifics(ProcessRefreshKind::new().with_cpu().with_memory());

        if system.process(root).is_none() {
            return;
        }

        let total_memory = system.total_memory().max(1) as f64;
        let mut cpu = 0.0f64;
        let mut memory_bytes = 0.0f64;

        for pid in process_tree(system, root) {
            if let Some(process) = system.process(pid) {
                cpu += process.cpu_usage() as f64;
                memory_bytes += process.memory() as f64;
            }
        }

        self.sum_cpu_percent += cpu;
        self.sum_memory_percent += memory_bytes / total_memory * 100.0;
        self.sum_memory_bytes += memory_bytes;
        self.samples += 1;
    }
}

/// Collect the root pid and all of its descendants from the process table.
fn process_tree(system: &System, root: Pid) -> Vec<Pid> {
    let mut members = vec![root];
    // Fixpoint over the parent links; the table is a snapshot, so this
    // terminates after at most tree-depth passes.
    loop {
        let before = members.len();
        for (pid, process) in system.processes() {
            if members.contains(pid) {
                continue;
            }
            if let Some(parent) = process.parent() {
                if members.contains(&parent) {
                    members.push(*pid);
                }
            }
        }
        if members.len() == before {
            break;
        }
    }
    members
}

/// Kill `child` and all of its descendants, reap the child, then wait a
/// bounded grace period for the descendants.
///
/// The direct child must be reaped via `wait()` or it lingers as a zombie
/// in the process table; descendants are reparented to init and only have
/// to disappear (or turn zombie) from the table. Processes that refuse to
/// die within the grace period are logged as orphaned; there is no further
/// escalation.
fn kill_and_reap(
    child: &mut Child,
    system: &mut System,
) -> Result<std::process::ExitStatus, MonitorError> {
    let root = Pid::from_u32(child.id());
    system.refresh_processes_specifics(ProcessRefreshKind::new());
    let targets = process_tree(system, root);

    for pid in &targets {
        // The process may already be gone; the error is irrelevant.
        unsafe {
            libc::kill(pid.as_u32() as libc::pid_t, libc::SIGKILL);
        }
    }

    // Reaps the direct child; returns the real status even if the kill
    // raced with a normal exit.
    let status = child.wait().map_err(MonitorError::WaitFailed)?;

    let deadline = Instant::now() + KILL_GRACE;
    loop {
        system.refresh_processes_specifics(ProcessRefreshKind::new());
        let alive: Vec<Pid> = targets
            .iter()
            .filter(|&&pid| pid != root && !gone(system, pid))
            .copied()
            .collect();
        if alive.is_empty() {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!(
                orphaned = ?alive.iter().map(|p| p.as_u32()).collect::<Vec<_>>(),
                "processes were not killed within the grace period"
            );
            return Ok(status);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Whether a killed process is effectively dead: absent from the table, or
/// present only as an unreaped zombie awaiting its parent's `wait()`.
fn gone(system: &System, pid: Pid) -> bool {
    match system.process(pid) {
        None => true,
        Some(process) => matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
    }
}

/// Monitor settings: timeout and resource sampling interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Wall-clock limit before the process tree is killed.
    pub timeout: Duration,
    /// Interval between resource samples.
    pub sample_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60 * 60),
            sample_interval: Duration::from_millis(200),
        }
    }
}

/// Executes external commands with resource sampling and a timeout.
#[derive(Debug, Clone, Default)]
pub struct ProcessMonitor {
    config: MonitorConfig,
}

impl ProcessMonitor {
    /// Create a monitor with the given settings.
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Run `command` to completion (or timeout), sampling resources.
    ///
    /// If `log_file` is given, stdout and stderr are redirected to it
    /// (parent directories are created). If `cwd` is given, the process
    /// runs with that working directory. The returned result carries the
    /// exit status even after a forced termination.
    pub fn execute(
        &self,
        command: &ExternalCommand,
        log_file: Option<&Path>,
        cwd: Option<&Path>,
    ) -> Result<ExecutionResult, MonitorError> {
        let mut child = self.spawn(command, log_file, cwd)?;
        let pid = Pid::from_u32(child.id());
        debug!(command = %command, pid = child.id(), "starting subprocess");

        let mut system = System::new();
        let mut stats = ResourceStats::default();
        let start = Instant::now();
        let mut last_sample: Option<Instant> = None;

        let (status, duration_secs) = loop {
            if let Some(status) = child.try_wait().map_err(MonitorError::WaitFailed)? {
                break (status, start.elapsed().as_secs_f64());
            }

            let due = last_sample
                .map(|t| t.elapsed() >= self.config.sample_interval)
                .unwrap_or(true);
            if due {
                stats.sample(&mut system, pid);
                last_sample = Some(Instant::now());
            }

            if start.elapsed() > self.config.timeout {
                warn!(
                    command = %command,
                    timeout_secs = self.config.timeout.as_secs_f64(),
                    "subprocess timed out, killing process tree"
                );
                // Duration is taken at the timeout decision, not after the
                // kill and reap have run their course.
                let duration_secs = start.elapsed().as_secs_f64();
                break (kill_and_reap(&mut child, &mut system)?, duration_secs);
            }

            std::thread::sleep(POLL_SLEEP.min(self.config.sample_interval));
        };

        Ok(ExecutionResult {
            return_code: exit_code(&status),
            duration_secs,
            cpu_percent: stats.cpu_percent(),
            memory_percent: stats.memory_percent(),
            memory_gb: stats.memory_gb(),
            success: false,
        })
    }

    fn spawn(
        &self,
        command: &ExternalCommand,
        log_file: Option<&Path>,
        cwd: Option<&Path>,
    ) -> Result<Child, MonitorError> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.arg_list()).stdin(Stdio::null());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        match log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| MonitorError::LogFile {
                        path: path.to_path_buf(),
                        source,
                    })?;
                }
                let file = File::create(path).map_err(|source| MonitorError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
                let stderr = file.try_clone().map_err(|source| MonitorError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
                cmd.stdout(file).stderr(stderr);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        cmd.spawn().map_err(|source| MonitorError::SpawnFailed {
            command: command.to_string(),
            source,
        })
    }
}

/// Exit code of a status: the code itself, or the negative terminating
/// signal on Unix, or -1 when neither is available.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
