//! Log-Uniform Point Generation
//!
//! Sweep values are drawn log-uniformly across a range: equal spacing in
//! base-10 log space, endpoints included.

/// Generate `n` log-uniformly spaced points across `[low, high]`.
///
/// Both bounds must be positive. `n == 0` yields an empty vector and
/// `n == 1` yields `[low]`.
pub fn log_spaced(low: f64, high: f64, n: usize) -> Vec<f64> {
    assert!(
        low > 0.0 && high > 0.0,
        "log spacing requires positive bounds"
    );

    match n {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let log_low = low.log10();
            let log_high = high.log10();
            let step = (log_high - log_low) / (n - 1) as f64;
            (0..n)
                .map(|i| 10f64.powf(log_low + step * i as f64))
                .collect()
        }
    }
}
