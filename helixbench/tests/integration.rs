//! Integration tests for HelixBench
//!
//! These tests verify the end-to-end behavior of the sweep engine, using
//! shell one-liners as stand-ins for codec binaries.

#![cfg(unix)]

use helixbench::{
    fit_sigmoid, ExternalCommand, FocusConfig, FocusVariator, InMemoryManager, Manager,
    MonitorConfig, MonitoredCommand, Pipeline, PreparedRun, ProcessMonitor, RunStatus, Step,
};
use std::time::Duration;

fn shell_step(name: &str, input: &str, output: &str, script: &str) -> Step {
    let tool = MonitoredCommand::without_path_args(
        ExternalCommand::new("sh").arg("-c").arg(script),
    );
    Step::new(name, input, output, Box::new(tool))
}

/// A three-step pipeline: each step transforms its predecessor's output.
#[test]
fn test_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("payload.txt");
    std::fs::write(&seed, "ACGT").unwrap();

    let out = dir.path().join("run");
    let mut pipeline = Pipeline::new("codec", Duration::from_secs(30))
        .seed_file(&seed, "payload.txt")
        .step(shell_step(
            "encode",
            "payload.txt",
            "encoded.txt",
            "tr A T < payload.txt > encoded.txt",
        ))
        .step(shell_step(
            "decode",
            "encoded.txt",
            "decoded.txt",
            "tr T A < encoded.txt > decoded.txt",
        ));
    pipeline.set_output_dir(&out);

    let run = pipeline.run().unwrap();
    assert!(run.completed);
    assert!(run.failed_at.is_none());
    assert_eq!(run.performance.len(), 2);
    assert!(run.performance.iter().all(|s| s.result.success));
    // The original 'T' also collapses to 'A' on the way back.
    assert_eq!(
        std::fs::read_to_string(out.join("decoded.txt")).unwrap(),
        "ACGA"
    );
}

/// A failed step stops the pipeline; later steps never run.
#[test]
fn test_partial_failure_stops_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("run");

    let mut pipeline = Pipeline::new("failing", Duration::from_secs(30))
        .step(shell_step("a", "in", "a.out", "exit 3"))
        .step(shell_step("b", "a.out", "b.out", "touch b.marker; touch b.out"))
        .step(shell_step("c", "b.out", "c.out", "touch c.out"));
    pipeline.set_output_dir(&out);

    let run = pipeline.run().unwrap();
    assert!(!run.completed);
    assert_eq!(run.failed_at.as_deref(), Some("a"));
    assert_eq!(run.performance.len(), 1);
    assert_eq!(run.performance[0].result.return_code, 3);
    assert!(!out.join("b.marker").exists());
}

/// The monitor kills a process that exceeds its wall-clock limit.
#[test]
fn test_monitor_enforces_timeout() {
    let monitor = ProcessMonitor::new(MonitorConfig {
        timeout: Duration::from_millis(300),
        sample_interval: Duration::from_millis(50),
    });

    let command = ExternalCommand::new("sleep").arg("30");
    let start = std::time::Instant::now();
    let result = monitor.execute(&command, None, None).unwrap();

    // The kill must reap the child promptly, not wait out a grace period,
    // and the recorded duration reflects the timeout rather than cleanup.
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(result.duration_secs < 1.0);
    assert_ne!(result.return_code, 0);
}

/// Full adaptive sweep over real (shell) pipelines: 10 initial samples
/// plus two focus rounds of 10.
#[test]
fn test_adaptive_sweep_sample_count_and_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let runs = dir.path().join("runs");

    // Decoding "succeeds" only for parameter values at or above 1.0.
    let factory = |value: f64| -> Pipeline {
        let script = if value >= 1.0 { "touch out.txt" } else { "true" };
        Pipeline::new(format!("sweep-{value}"), Duration::from_secs(10)).step(shell_step(
            "decode", "in.txt", "out.txt", script,
        ))
    };

    let config = FocusConfig::new(0.01, 100.0)
        .initial_samples(10)
        .samples_per_round(10)
        .focus_iterations(2);
    let mut manager = InMemoryManager::new(&runs);

    FocusVariator::new(config)
        .run(&factory, &mut manager)
        .unwrap();

    let table = manager.current_results();
    assert_eq!(table.len(), 30);
    assert!(table
        .samples()
        .iter()
        .all(|s| s.status == RunStatus::Finished));
    assert!(table
        .samples()
        .iter()
        .all(|s| (0.01..=100.0).contains(&s.parameter_value)));

    // The transition sits at 1.0; the fitted midpoint should land near it.
    let (xs, ys) = table.finished_points();
    let fit = fit_sigmoid(&xs, &ys, true);
    assert!(fit.succeeded(), "fit rejected: {:?}", fit.failure());
    let mid = fit.threshold(0.5).unwrap();
    assert!(
        (0.2..=5.0).contains(&mid),
        "midpoint {mid} far from the true transition at 1.0"
    );
}

/// Reversed-metric sweep over an error-rate style range: decoding succeeds
/// only at low parameter values, so the metric falls as the parameter
/// rises.
#[test]
fn test_adaptive_sweep_with_reversed_metric() {
    let dir = tempfile::tempdir().unwrap();
    let runs = dir.path().join("runs");

    // Decoding survives error rates up to 0.05 and fails beyond.
    let factory = |value: f64| -> Pipeline {
        let script = if value <= 0.05 { "touch out.txt" } else { "true" };
        Pipeline::new(format!("sweep-{value}"), Duration::from_secs(10)).step(shell_step(
            "decode", "in.txt", "out.txt", script,
        ))
    };

    let config = FocusConfig::new(0.001, 0.4)
        .reversed(true)
        .initial_samples(10)
        .samples_per_round(10)
        .focus_iterations(2);
    let mut manager = InMemoryManager::new(&runs);

    FocusVariator::new(config)
        .run(&factory, &mut manager)
        .unwrap();

    let table = manager.current_results();
    assert_eq!(table.len(), 30);
    assert!(table
        .samples()
        .iter()
        .all(|s| (0.001..=0.4).contains(&s.parameter_value)));

    // The fit handles the falling direction itself; the midpoint should
    // land near the breaking rate at 0.05.
    let (xs, ys) = table.finished_points();
    let fit = fit_sigmoid(&xs, &ys, true);
    assert!(fit.succeeded(), "fit rejected: {:?}", fit.failure());
    let mid = fit.threshold(0.5).unwrap();
    assert!(
        (0.01..=0.2).contains(&mid),
        "midpoint {mid} far from the breaking rate at 0.05"
    );
}

/// Zero focus rounds means exactly one log-uniform batch.
#[test]
fn test_sweep_without_focus_rounds() {
    let dir = tempfile::tempdir().unwrap();

    let factory = |value: f64| -> Pipeline {
        Pipeline::new(format!("flat-{value}"), Duration::from_secs(10)).step(shell_step(
            "noop", "in.txt", "out.txt", "touch out.txt",
        ))
    };

    let config = FocusConfig::new(0.1, 10.0).initial_samples(6).focus_iterations(0);
    let mut manager = InMemoryManager::new(dir.path().join("runs"));

    FocusVariator::new(config)
        .run(&factory, &mut manager)
        .unwrap();

    assert_eq!(manager.current_results().len(), 6);
}

/// A pipeline whose tool cannot even spawn is recorded as failed without
/// sinking the batch.
#[test]
fn test_manager_isolates_broken_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = InMemoryManager::new(dir.path().join("runs"));

    let broken = Pipeline::new("broken", Duration::from_secs(5)).step(Step::new(
        "missing",
        "in",
        "out",
        Box::new(MonitoredCommand::new(ExternalCommand::new(
            "/nonexistent/helixbench-ghost",
        ))),
    ));
    let fine = Pipeline::new("fine", Duration::from_secs(5)).step(shell_step(
        "noop", "in", "out.txt", "touch out.txt",
    ));

    manager
        .submit(vec![
            PreparedRun::new(0.5, broken),
            PreparedRun::new(0.7, fine),
        ])
        .unwrap();

    let samples = manager.current_results().samples().to_vec();
    assert_eq!(samples.len(), 2);
    assert!(matches!(samples[0].status, RunStatus::Failed(_)));
    assert_eq!(samples[1].status, RunStatus::Finished);
}

/// The canonical clean transition: y jumps from 0 to 1 between x=3 and
/// x=4, so the fitted midpoint lands in between.
#[test]
fn test_fit_midpoint_on_clean_transition() {
    let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let ys = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

    let fit = fit_sigmoid(&xs, &ys, false);
    assert!(fit.succeeded());
    let mid = fit.threshold(0.5).unwrap();
    assert!((3.0..4.0).contains(&mid), "midpoint {mid} outside (3, 4)");
}
