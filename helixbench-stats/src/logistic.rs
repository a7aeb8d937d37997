//! Sigmoid Threshold Fitting
//!
//! Fits a logistic curve to a binary (or fractional) success metric over a
//! swept parameter and derives the parameter value achieving a target
//! success probability.
//!
//! The fit is deliberately conservative: it refuses to extrapolate. A fit is
//! rejected when the metric never reaches both extremes, when fewer than two
//! points sit at either extreme, or when the fitted midpoint or the
//! default-target threshold falls outside the observed parameter range.
//! Rejections are structured states, never errors - callers check
//! [`FitState::succeeded`] before trusting a threshold.

use tracing::{debug, warn};

/// Default target success probability for the bounds check and for
/// [`FitState::default_threshold`].
pub const DEFAULT_TARGET_P: f64 = 0.95;

/// Exponent clamp keeping `exp` finite for extreme inputs.
const EXP_CLAMP: f64 = 500.0;

/// Newton iteration limit for the logistic solve. Perfectly separated data
/// drives the coefficients toward infinity; the cap (together with the
/// flat-Hessian break) pins the midpoint without blowing up.
const MAX_ITERATIONS: usize = 50;

const STEP_TOLERANCE: f64 = 1e-10;
const HESSIAN_EPS: f64 = 1e-12;

/// Evaluate the sigmoid `1 / (1 + exp(-k (x - x0)))`.
pub fn sigmoid(x: f64, k: f64, x0: f64) -> f64 {
    let exponent = (-k * (x - x0)).clamp(-EXP_CLAMP, EXP_CLAMP);
    1.0 / (1.0 + exponent.exp())
}

/// Why a fit was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FitFailure {
    /// The metric never reaches both 0 and 1 in the sample set.
    #[error("metric never reaches 0 or 1")]
    NeverReachesExtremes,
    /// Fewer than 2 points at either extreme.
    #[error("metric has fewer than 2 points at 0 or 1")]
    TooFewExtremePoints,
    /// The numeric solve produced non-finite or degenerate parameters.
    #[error("logistic fit did not converge")]
    DidNotConverge,
    /// The fitted midpoint lies outside the observed parameter range.
    #[error("fitted midpoint exceeds the observed range")]
    MidpointOutOfBounds,
    /// The default-target threshold lies outside the observed range.
    #[error("derived threshold exceeds the observed range")]
    ThresholdOutOfBounds,
}

/// Result of one fitting call.
///
/// Recomputed fresh from the full sample set on every call - never
/// incrementally updated. Either fully populated (`succeeded()`), or marked
/// failed with diagnostics; the raw parameters are retained for the
/// out-of-bounds rejections so they can be inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct FitState {
    params: Option<(f64, f64)>,
    inverted: Option<bool>,
    switch_x: Option<f64>,
    failure: Option<FitFailure>,
    log_scale: bool,
    x_min: f64,
    x_max: f64,
}

impl FitState {
    /// Whether the fit can be trusted for threshold claims.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// The rejection reason, if any.
    pub fn failure(&self) -> Option<FitFailure> {
        self.failure
    }

    /// Fitted sigmoid slope `k` (in log10 space when `log_scale`).
    pub fn slope_k(&self) -> Option<f64> {
        self.params.map(|(k, _)| k)
    }

    /// Fitted sigmoid midpoint `x0` (in log10 space when `log_scale`).
    pub fn midpoint_x0(&self) -> Option<f64> {
        self.params.map(|(_, x0)| x0)
    }

    /// Whether the metric decreases as the parameter increases.
    pub fn inverted(&self) -> Option<bool> {
        self.inverted
    }

    /// Approximate transition point used to seed the fit (fit space).
    pub fn switch_x(&self) -> Option<f64> {
        self.switch_x
    }

    /// Parameter value achieving success probability `p`, in original
    /// (non-log) units. `None` unless the fit succeeded - a rejected fit
    /// makes no threshold claims.
    pub fn threshold(&self, p: f64) -> Option<f64> {
        if !self.succeeded() {
            return None;
        }
        self.threshold_forced(p)
    }

    /// Threshold at the default target probability.
    pub fn default_threshold(&self) -> Option<f64> {
        self.threshold(DEFAULT_TARGET_P)
    }

    /// Threshold bypassing the success check, for diagnostics on fits
    /// rejected by the bounds rules. `None` when no parameters exist.
    pub fn threshold_forced(&self, p: f64) -> Option<f64> {
        let (k, x0) = self.params?;
        let t = threshold_in_fit_space(k, x0, p);
        Some(if self.log_scale { 10f64.powf(t) } else { t })
    }

    fn failed(
        failure: FitFailure,
        params: Option<(f64, f64)>,
        inverted: Option<bool>,
        switch_x: Option<f64>,
        log_scale: bool,
        x_min: f64,
        x_max: f64,
    ) -> Self {
        Self {
            params,
            inverted,
            switch_x,
            failure: Some(failure),
            log_scale,
            x_min,
            x_max,
        }
    }
}

fn threshold_in_fit_space(k: f64, x0: f64, p: f64) -> f64 {
    x0 - (1.0 / k) * (1.0 / p - 1.0).ln()
}

/// Bounds rejection: a fit cannot be trusted to extrapolate, so the
/// midpoint and the default-target threshold must both lie inside the
/// observed range.
fn bounds_failure(k: f64, x0: f64, x_min: f64, x_max: f64) -> Option<FitFailure> {
    if x0 < x_min || x0 > x_max {
        return Some(FitFailure::MidpointOutOfBounds);
    }
    let t = threshold_in_fit_space(k, x0, DEFAULT_TARGET_P);
    if t < x_min || t > x_max {
        return Some(FitFailure::ThresholdOutOfBounds);
    }
    None
}

/// Fit a sigmoid to `ys` (each in `[0, 1]`) over `xs`.
///
/// With `log_scale`, `xs` are base-10 log transformed before fitting and
/// thresholds are exponentiated back out.
pub fn fit_sigmoid(xs: &[f64], ys: &[f64], log_scale: bool) -> FitState {
    assert_eq!(xs.len(), ys.len(), "x and y lengths must match");

    let xs: Vec<f64> = if log_scale {
        xs.iter().map(|x| x.log10()).collect()
    } else {
        xs.to_vec()
    };

    let (x_min, x_max) = xs.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &x| {
        (acc.0.min(x), acc.1.max(x))
    });

    // The metric must show both extremes to evidence a transition.
    let y_max = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let y_min = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    if xs.is_empty() || y_max < 1.0 || y_min > 0.0 {
        warn!("metric never reaches 0 or 1, refusing to fit");
        return FitState::failed(
            FitFailure::NeverReachesExtremes,
            None,
            None,
            None,
            log_scale,
            x_min,
            x_max,
        );
    }

    let zeros = ys.iter().filter(|&&y| y == 0.0).count();
    let ones = ys.iter().filter(|&&y| y == 1.0).count();
    if zeros < 2 || ones < 2 {
        warn!(zeros, ones, "fewer than 2 points at either extreme");
        return FitState::failed(
            FitFailure::TooFewExtremePoints,
            None,
            None,
            None,
            log_scale,
            x_min,
            x_max,
        );
    }

    // Sort by x; the metric value at the smallest x decides the direction.
    let mut order: Vec<usize> = (0..xs.len()).collect();
    order.sort_by(|&a, &b| xs[a].partial_cmp(&xs[b]).unwrap_or(std::cmp::Ordering::Equal));
    let inverted = ys[order[0]] == 1.0;

    // First x (in sorted order) where the metric leaves its initial-majority
    // value seeds the midpoint.
    let switch_x = order
        .iter()
        .find(|&&i| if inverted { ys[i] < 1.0 } else { ys[i] > 0.0 })
        .map(|&i| xs[i])
        .unwrap_or((x_min + x_max) / 2.0);

    // Seed (slope, intercept) = (1, -switch); inverted flips both signs.
    let (mut b0, mut b1) = if inverted {
        (switch_x, -1.0)
    } else {
        (-switch_x, 1.0)
    };

    solve_logistic(&xs, ys, &mut b0, &mut b1);

    if !b0.is_finite() || !b1.is_finite() || b1 == 0.0 {
        warn!(switch_x, inverted, "logistic solve did not converge");
        return FitState::failed(
            FitFailure::DidNotConverge,
            None,
            Some(inverted),
            Some(switch_x),
            log_scale,
            x_min,
            x_max,
        );
    }

    // Convert regression coefficients to sigmoid form.
    let k = b1;
    let x0 = -b0 / b1;
    debug!(k, x0, inverted, switch_x, "sigmoid fit converged");

    if let Some(failure) = bounds_failure(k, x0, x_min, x_max) {
        warn!(k, x0, ?failure, "rejecting fit outside observed range");
        // Raw parameters retained for diagnostics.
        return FitState::failed(
            failure,
            Some((k, x0)),
            Some(inverted),
            Some(switch_x),
            log_scale,
            x_min,
            x_max,
        );
    }

    FitState {
        params: Some((k, x0)),
        inverted: Some(inverted),
        switch_x: Some(switch_x),
        failure: None,
        log_scale,
        x_min,
        x_max,
    }
}

/// Newton/IRLS steps for the 2-parameter logistic regression
/// `p = sigmoid(b0 + b1 x)` on possibly fractional `y` values.
fn solve_logistic(xs: &[f64], ys: &[f64], b0: &mut f64, b1: &mut f64) {
    for _ in 0..MAX_ITERATIONS {
        let mut g0 = 0.0;
        let mut g1 = 0.0;
        let mut h00 = 0.0;
        let mut h01 = 0.0;
        let mut h11 = 0.0;

        for (&x, &y) in xs.iter().zip(ys) {
            let linear = (*b0 + *b1 * x).clamp(-EXP_CLAMP, EXP_CLAMP);
            let p = 1.0 / (1.0 + (-linear).exp());
            let residual = y - p;
            let weight = p * (1.0 - p);

            g0 += residual;
            g1 += x * residual;
            h00 += weight;
            h01 += weight * x;
            h11 += weight * x * x;
        }

        let det = h00 * h11 - h01 * h01;
        if !det.is_finite() || det.abs() < HESSIAN_EPS {
            // Saturated (separated) fit: the Hessian flattens out as the
            // probabilities pin to 0/1. The midpoint is already stable.
            return;
        }

        let d0 = (h11 * g0 - h01 * g1) / det;
        let d1 = (-h01 * g0 + h00 * g1) / det;
        *b0 += d0;
        *b1 += d1;

        if !b0.is_finite() || !b1.is_finite() {
            return;
        }
        if d0.abs().max(d1.abs()) < STEP_TOLERANCE {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_shape() {
        assert!((sigmoid(0.0, 1.0, 0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(100.0, 1.0, 0.0) > 0.999);
        assert!(sigmoid(-100.0, 1.0, 0.0) < 0.001);
        // Extreme arguments stay finite thanks to the exponent clamp.
        assert!(sigmoid(1e9, -1e9, 0.0).is_finite());
    }

    #[test]
    fn test_clean_transition_fits() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let state = fit_sigmoid(&xs, &ys, false);

        assert!(state.succeeded(), "failure: {:?}", state.failure());
        let x0 = state.midpoint_x0().unwrap();
        assert!(x0 > 3.0 && x0 < 4.0, "midpoint {x0} outside (3, 4)");
        assert!(state.slope_k().unwrap() > 0.0);
        // The 50% threshold is the midpoint in non-log space.
        let mid = state.threshold(0.5).unwrap();
        assert!((mid - x0).abs() < 1e-9);
        assert_eq!(state.inverted(), Some(false));
    }

    #[test]
    fn test_constant_metric_never_reaches_one() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [0.0, 0.0, 0.0, 0.0];
        let state = fit_sigmoid(&xs, &ys, false);

        assert!(!state.succeeded());
        assert_eq!(state.failure(), Some(FitFailure::NeverReachesExtremes));
        assert_eq!(state.threshold(0.5), None);
        assert!(state.failure().unwrap().to_string().contains("never reaches"));
    }

    #[test]
    fn test_single_extreme_point_rejected() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [0.0, 1.0, 1.0, 1.0, 1.0];
        let state = fit_sigmoid(&xs, &ys, false);

        assert_eq!(state.failure(), Some(FitFailure::TooFewExtremePoints));
    }

    #[test]
    fn test_inverted_metric_detection() {
        // Success decreases as x increases; crossing near 3.5.
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let state = fit_sigmoid(&xs, &ys, false);

        assert!(state.succeeded(), "failure: {:?}", state.failure());
        assert_eq!(state.inverted(), Some(true));
        assert!(state.slope_k().unwrap() < 0.0);
        let mid = state.threshold(0.5).unwrap();
        assert!(mid > 3.0 && mid < 4.0, "midpoint {mid} off the crossing");
    }

    #[test]
    fn test_log_scale_threshold_in_original_units() {
        // Transition between 1e-2 and 1e-1 on a log-spaced grid.
        let xs = [1e-4, 1e-3, 1e-2, 1e-1, 1.0, 10.0];
        let ys = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let state = fit_sigmoid(&xs, &ys, true);

        assert!(state.succeeded(), "failure: {:?}", state.failure());
        let mid = state.threshold(0.5).unwrap();
        assert!(mid > 1e-2 && mid < 1e-1, "midpoint {mid} outside decade");
    }

    #[test]
    fn test_fit_is_idempotent() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let ys = [0.0, 0.0, 0.5, 0.0, 1.0, 1.0, 1.0];
        let a = fit_sigmoid(&xs, &ys, false);
        let b = fit_sigmoid(&xs, &ys, false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bounds_rejections() {
        // Midpoint left of the observed range.
        assert_eq!(
            bounds_failure(2.0, 0.5, 1.0, 6.0),
            Some(FitFailure::MidpointOutOfBounds)
        );
        // Midpoint inside, but the shallow slope pushes the 95% threshold
        // past the right edge: 3.5 + ln(19)/0.5 ~ 9.4.
        assert_eq!(
            bounds_failure(0.5, 3.5, 1.0, 6.0),
            Some(FitFailure::ThresholdOutOfBounds)
        );
        // Steep slope keeps everything inside.
        assert_eq!(bounds_failure(5.0, 3.5, 1.0, 6.0), None);
    }

    #[test]
    fn test_forced_threshold_available_on_bounds_failure() {
        let state = FitState::failed(
            FitFailure::ThresholdOutOfBounds,
            Some((0.5, 3.5)),
            Some(false),
            Some(3.0),
            false,
            1.0,
            6.0,
        );
        assert_eq!(state.threshold(0.95), None);
        let forced = state.threshold_forced(0.95).unwrap();
        assert!(forced > 6.0);
    }
}
