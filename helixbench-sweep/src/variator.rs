//! Adaptive parameter sweeps
//!
//! `FocusVariator` drives a sweep over one positive parameter: an initial
//! log-uniform batch across the full range, then a fixed number of focus
//! rounds that re-fit the accumulated results and concentrate the next
//! batch around the estimated transition.

use crate::manager::{Manager, ManagerError, PreparedRun};
use helixbench_core::Pipeline;
use helixbench_stats::{fit_sigmoid, log_spaced, FitFailure, FitState};
use thiserror::Error;
use tracing::{debug, info};

/// Tolerance for the in-range check on generated sample values, relative
/// to the range bounds.
const RANGE_TOLERANCE: f64 = 0.01;

/// Errors from sweep control.
#[derive(Debug, Error)]
pub enum VariatorError {
    /// The sweep range must satisfy `0 < low < high`.
    #[error("invalid sweep range ({low}, {high}): bounds must be positive and increasing")]
    InvalidRange {
        /// Lower bound as configured.
        low: f64,
        /// Upper bound as configured.
        high: f64,
    },

    /// A generated sample landed outside the sweep range past tolerance.
    #[error("sample value {value} outside sweep range ({low}, {high})")]
    SampleOutOfRange {
        /// The offending value.
        value: f64,
        /// Range lower bound.
        low: f64,
        /// Range upper bound.
        high: f64,
    },

    /// Batch submission failed.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// Builds one pipeline per swept parameter value.
pub trait PipelineFactory {
    /// Construct the pipeline exercising the given parameter value.
    fn build(&self, parameter_value: f64) -> Pipeline;
}

impl<F> PipelineFactory for F
where
    F: Fn(f64) -> Pipeline,
{
    fn build(&self, parameter_value: f64) -> Pipeline {
        self(parameter_value)
    }
}

/// Sweep configuration.
#[derive(Debug, Clone)]
pub struct FocusConfig {
    /// Sweep range `(low, high)`, both strictly positive.
    pub range: (f64, f64),
    /// Whether the metric decreases as the parameter increases.
    pub metric_reversed: bool,
    /// Number of focus rounds after the initial batch.
    pub focus_iterations: usize,
    /// Sample count of the initial batch.
    pub initial_samples: usize,
    /// Sample count of each focus round.
    pub samples_per_round: usize,
    /// Multiplicative half-width of the focus window around the fitted
    /// transition midpoint.
    pub focus_factor: f64,
}

impl FocusConfig {
    /// Sweep the given range with default batch sizes.
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            range: (low, high),
            metric_reversed: false,
            focus_iterations: 2,
            initial_samples: 10,
            samples_per_round: 10,
            focus_factor: 2.0,
        }
    }

    /// Mark the metric as decreasing in the parameter.
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.metric_reversed = reversed;
        self
    }

    /// Set the number of focus rounds.
    pub fn focus_iterations(mut self, rounds: usize) -> Self {
        self.focus_iterations = rounds;
        self
    }

    /// Set the initial batch size.
    pub fn initial_samples(mut self, n: usize) -> Self {
        self.initial_samples = n;
        self
    }

    /// Set the per-round batch size.
    pub fn samples_per_round(mut self, n: usize) -> Self {
        self.samples_per_round = n;
        self
    }

    /// Set the focus window factor.
    pub fn focus_factor(mut self, factor: f64) -> Self {
        self.focus_factor = factor;
        self
    }
}

/// Adaptive sweep controller.
pub struct FocusVariator {
    config: FocusConfig,
}

impl FocusVariator {
    /// Create a variator; the range is validated on `run`.
    pub fn new(config: FocusConfig) -> Self {
        Self { config }
    }

    /// Run the full sweep: one initial batch plus the configured focus
    /// rounds. Results only accumulate in the manager; termination is
    /// purely by iteration count.
    pub fn run(
        &self,
        factory: &dyn PipelineFactory,
        manager: &mut dyn Manager,
    ) -> Result<(), VariatorError> {
        let (low, high) = self.config.range;
        if !(low > 0.0 && low < high) {
            return Err(VariatorError::InvalidRange { low, high });
        }

        info!(
            low,
            high,
            rounds = self.config.focus_iterations,
            "starting adaptive sweep"
        );
        let initial = log_spaced(low, high, self.config.initial_samples);
        self.submit_batch(factory, manager, initial)?;

        for round in 0..self.config.focus_iterations {
            let table = manager.current_results();
            let (window_low, window_high) = self.focus_window(&table);
            info!(
                round = round + 1,
                window_low, window_high, "focus round"
            );
            let values = log_spaced(window_low, window_high, self.config.samples_per_round);
            self.submit_batch(factory, manager, values)?;
        }
        Ok(())
    }

    /// Decide where the next batch should sample, from the results so far.
    fn focus_window(&self, table: &crate::results::ResultsTable) -> (f64, f64) {
        let (low, high) = self.config.range;
        let factor = self.config.focus_factor;
        let (xs, ys) = table.finished_points();

        let reached_one = ys.iter().any(|&y| y >= 1.0);
        let reached_zero = ys.iter().any(|&y| y <= 0.0);

        // The end where the metric rises depends on the metric direction.
        let rising_end = if self.config.metric_reversed {
            start_window(low, high, factor)
        } else {
            end_window(low, high, factor)
        };
        let falling_end = if self.config.metric_reversed {
            end_window(low, high, factor)
        } else {
            start_window(low, high, factor)
        };

        if !reached_one {
            debug!("metric never reached 1, sampling the rising end");
            return rising_end;
        }
        if !reached_zero {
            debug!("metric never reached 0, sampling the falling end");
            return falling_end;
        }

        let fit = fit_sigmoid(&xs, &ys, true);
        match fit.failure() {
            None => self.fitted_window(&fit, low, high, factor),
            Some(FitFailure::MidpointOutOfBounds) => {
                // Diagnostics carry the parameters even for rejected fits.
                match fit.threshold_forced(0.5) {
                    Some(mid) => midpoint_window(mid, low, high, factor),
                    None => (low, high),
                }
            }
            Some(reason) => {
                debug!(%reason, "fit rejected, sampling the whole range");
                (low, high)
            }
        }
    }

    fn fitted_window(&self, fit: &FitState, low: f64, high: f64, factor: f64) -> (f64, f64) {
        // threshold() back-transforms to original units, so the window
        // arithmetic below is in parameter space regardless of the fit
        // being done on log10 values.
        let mid = match fit.threshold(0.5) {
            Some(mid) => mid,
            None => return (low, high),
        };
        let th_low = fit.threshold(0.01);
        let th_high = fit.threshold(0.99);
        let (near, far) = match (th_low, th_high) {
            (Some(a), Some(b)) => (a.min(b), a.max(b)),
            _ => (mid, mid),
        };

        let window_low = (mid / factor).min(near).max(low);
        let window_high = (mid * factor).max(far).min(high);
        debug!(mid, window_low, window_high, "window around fitted midpoint");
        (window_low, window_high)
    }

    fn submit_batch(
        &self,
        factory: &dyn PipelineFactory,
        manager: &mut dyn Manager,
        values: Vec<f64>,
    ) -> Result<(), VariatorError> {
        let (low, high) = self.config.range;
        let mut batch = Vec::with_capacity(values.len());
        for value in values {
            if value < low * (1.0 - RANGE_TOLERANCE) || value > high * (1.0 + RANGE_TOLERANCE) {
                return Err(VariatorError::SampleOutOfRange { value, low, high });
            }
            let value = value.clamp(low, high);
            batch.push(PreparedRun::new(value, factory.build(value)));
        }
        manager.submit(batch)?;
        Ok(())
    }
}

/// Focus window for a rejected fit whose forced midpoint landed at `mid`.
///
/// The decision is against the declared sweep range: below it, sample the
/// lower end; above it, the upper end. A midpoint inside the declared
/// range (the fit was rejected against the observed sample span, which
/// can be narrower) gives no directional signal, so the whole range is
/// resampled.
fn midpoint_window(mid: f64, low: f64, high: f64, factor: f64) -> (f64, f64) {
    if mid < low {
        debug!(mid, "midpoint below range, sampling the lower end");
        start_window(low, high, factor)
    } else if mid > high {
        debug!(mid, "midpoint above range, sampling the upper end");
        end_window(low, high, factor)
    } else {
        debug!(mid, "midpoint inside range, sampling the whole range");
        (low, high)
    }
}

/// Focus window hugging the upper end of the range.
fn end_window(low: f64, high: f64, factor: f64) -> (f64, f64) {
    ((high / factor).max(low), high)
}

/// Focus window hugging the lower end of the range.
fn start_window(low: f64, high: f64, factor: f64) -> (f64, f64) {
    (low, (low * factor).min(high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{ResultsTable, RunStatus, SampleResult};
    use helixbench_core::{ExternalCommand, MonitoredCommand, Pipeline, Step};
    use std::time::Duration;
    use uuid::Uuid;

    // Records submitted values and scores them with a closure instead of
    // executing anything.
    struct ScriptedManager {
        metric: fn(f64) -> f64,
        batches: Vec<Vec<f64>>,
    }

    impl ScriptedManager {
        fn new(metric: fn(f64) -> f64) -> Self {
            Self {
                metric,
                batches: Vec::new(),
            }
        }

        fn all_values(&self) -> Vec<f64> {
            self.batches.iter().flatten().copied().collect()
        }
    }

    impl Manager for ScriptedManager {
        fn submit(&mut self, batch: Vec<PreparedRun>) -> Result<(), ManagerError> {
            self.batches
                .push(batch.iter().map(|r| r.parameter_value).collect());
            Ok(())
        }

        fn current_results(&self) -> ResultsTable {
            let mut table = ResultsTable::new();
            for &value in self.batches.iter().flatten() {
                table.push(SampleResult {
                    id: Uuid::new_v4(),
                    parameter_value: value,
                    metric_value: (self.metric)(value),
                    status: RunStatus::Finished,
                });
            }
            table
        }
    }

    fn stub_factory(value: f64) -> Pipeline {
        let tool =
            MonitoredCommand::without_path_args(ExternalCommand::new("true"));
        Pipeline::new(format!("stub-{value}"), Duration::from_secs(1)).step(Step::new(
            "stub",
            "in",
            "out",
            Box::new(tool),
        ))
    }

    fn step_at_one(value: f64) -> f64 {
        if value >= 1.0 {
            1.0
        } else {
            0.0
        }
    }

    #[test]
    fn test_total_sample_count() {
        let config = FocusConfig::new(0.01, 100.0)
            .initial_samples(10)
            .samples_per_round(10)
            .focus_iterations(2);
        let mut manager = ScriptedManager::new(step_at_one);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        assert_eq!(manager.batches.len(), 3);
        assert_eq!(manager.all_values().len(), 30);
    }

    #[test]
    fn test_zero_iterations_single_batch() {
        let config = FocusConfig::new(0.01, 100.0).focus_iterations(0);
        let mut manager = ScriptedManager::new(step_at_one);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        assert_eq!(manager.batches.len(), 1);
        assert_eq!(manager.batches[0].len(), 10);
    }

    #[test]
    fn test_initial_batch_is_log_spaced() {
        let config = FocusConfig::new(0.1, 10.0).focus_iterations(0).initial_samples(5);
        let mut manager = ScriptedManager::new(step_at_one);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        let expected = log_spaced(0.1, 10.0, 5);
        for (got, want) in manager.batches[0].iter().zip(&expected) {
            assert!((got / want - 1.0).abs() < 1e-9, "{got} != {want}");
        }
    }

    #[test]
    fn test_all_samples_within_range() {
        let config = FocusConfig::new(0.05, 50.0).focus_iterations(3);
        let mut manager = ScriptedManager::new(step_at_one);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        for value in manager.all_values() {
            assert!((0.05..=50.0).contains(&value), "value {value} out of range");
        }
    }

    #[test]
    fn test_focus_narrows_around_transition() {
        let config = FocusConfig::new(0.01, 100.0).focus_iterations(2);
        let mut manager = ScriptedManager::new(step_at_one);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        // Focus batches should hug the transition at 1.0 far tighter than
        // the four-decade range.
        for batch in &manager.batches[1..] {
            let lo = batch.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = batch.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(lo > 0.1, "window low {lo} did not narrow");
            assert!(hi < 10.0, "window high {hi} did not narrow");
        }
    }

    #[test]
    fn test_never_reaching_one_samples_rising_end() {
        let config = FocusConfig::new(0.1, 10.0).focus_iterations(1);
        let mut manager = ScriptedManager::new(|_| 0.0);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        for &value in &manager.batches[1] {
            assert!(value >= 4.999, "expected upper-end sample, got {value}");
        }
    }

    #[test]
    fn test_never_reaching_one_reversed_samples_start() {
        let config = FocusConfig::new(0.1, 10.0).focus_iterations(1).reversed(true);
        let mut manager = ScriptedManager::new(|_| 0.0);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        for &value in &manager.batches[1] {
            assert!(value <= 0.201, "expected lower-end sample, got {value}");
        }
    }

    #[test]
    fn test_never_reaching_zero_samples_falling_end() {
        let config = FocusConfig::new(0.1, 10.0).focus_iterations(1);
        let mut manager = ScriptedManager::new(|_| 1.0);

        FocusVariator::new(config)
            .run(&stub_factory, &mut manager)
            .unwrap();

        for &value in &manager.batches[1] {
            assert!(value <= 0.201, "expected lower-end sample, got {value}");
        }
    }

    #[test]
    fn test_invalid_range_rejected() {
        let mut manager = ScriptedManager::new(step_at_one);
        let err = FocusVariator::new(FocusConfig::new(5.0, 1.0))
            .run(&stub_factory, &mut manager)
            .unwrap_err();
        assert!(matches!(err, VariatorError::InvalidRange { .. }));

        let err = FocusVariator::new(FocusConfig::new(0.0, 1.0))
            .run(&stub_factory, &mut manager)
            .unwrap_err();
        assert!(matches!(err, VariatorError::InvalidRange { .. }));
    }

    #[test]
    fn test_window_helpers_stay_in_range() {
        assert_eq!(end_window(0.1, 10.0, 2.0), (5.0, 10.0));
        assert_eq!(start_window(0.1, 10.0, 2.0), (0.1, 0.2));
        // Narrow range where the factor would overshoot.
        assert_eq!(end_window(1.0, 1.5, 2.0), (1.0, 1.5));
        assert_eq!(start_window(1.0, 1.5, 2.0), (1.0, 1.5));
    }

    #[test]
    fn test_midpoint_window_follows_declared_range() {
        // Below and above the declared range pick the respective ends.
        assert_eq!(midpoint_window(0.01, 0.1, 10.0, 2.0), (0.1, 0.2));
        assert_eq!(midpoint_window(50.0, 0.1, 10.0, 2.0), (5.0, 10.0));
        // Inside the declared range there is no direction to favor, even
        // near the upper bound.
        assert_eq!(midpoint_window(9.0, 0.1, 10.0, 2.0), (0.1, 10.0));
        assert_eq!(midpoint_window(0.11, 0.1, 10.0, 2.0), (0.1, 10.0));
    }
}
